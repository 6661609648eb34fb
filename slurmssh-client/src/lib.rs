//! slurmssh client
//!
//! Runs batch jobs on a Slurm cluster from a local checkout: the project is
//! rsynced to the login node, the job script is handed to `sbatch`, and the
//! job's output files are tailed over ssh while it runs.
//!
//! Everything remote goes through the [`Transport`] trait; [`SshTransport`]
//! implements it with the system's `ssh` and `rsync` binaries.
//!
//! # Example
//!
//! ```no_run
//! use slurmssh_client::{ClientConfig, LogEvent, SlurmClient, SubmitRequest};
//! use slurmssh_core::StreamOptions;
//! use tokio_stream::StreamExt;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("alice@login.cluster.org".parse()?);
//!     let client = SlurmClient::new(config);
//!
//!     let handle = client
//!         .submit(&SubmitRequest::new("/home/alice/project", "train.sbatch"))
//!         .await?;
//!     println!("Submitted job {}", handle.job_id);
//!
//!     let mut logs = client.stream(&handle, StreamOptions::default(), CancellationToken::new())?;
//!     while let Some(event) = logs.next().await {
//!         match event? {
//!             LogEvent::Line(line) => println!("{}", line.text),
//!             LogEvent::Finished(state) => println!("Job ended: {}", state),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod ssh;
pub mod status;
pub mod stream;
pub mod submit;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use ssh::{SshTransport, TransportConfig};
pub use stream::{LogEvent, LogStream, LogStreamer};
pub use submit::{JobSubmitter, SubmitRequest, parse_submission};
pub use transport::{ChunkSink, CommandOutput, Transport};

use slurmssh_core::{ClusterTarget, JobHandle, JobState, RemoteLayout, StreamOptions};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a [`SlurmClient`] needs to reach one cluster
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub target: ClusterTarget,
    pub transport: TransportConfig,
    pub layout: RemoteLayout,
}

impl ClientConfig {
    /// Default transport settings and remote layout for `target`
    pub fn new(target: ClusterTarget) -> Self {
        Self {
            target,
            transport: TransportConfig::default(),
            layout: RemoteLayout::default(),
        }
    }
}

/// Submits jobs to one cluster and follows their output
///
/// Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct SlurmClient {
    target: ClusterTarget,
    layout: RemoteLayout,
    transport: Arc<dyn Transport>,
}

impl SlurmClient {
    /// Create a client that talks to the cluster through `ssh` and `rsync`
    pub fn new(config: ClientConfig) -> Self {
        let transport = Arc::new(SshTransport::new(config.transport.clone()));
        Self::with_transport(config, transport)
    }

    /// Create a client on top of a custom transport
    ///
    /// `config.transport` is ignored.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            target: config.target,
            layout: config.layout,
            transport,
        }
    }

    pub fn target(&self) -> &ClusterTarget {
        &self.target
    }

    pub fn layout(&self) -> &RemoteLayout {
        &self.layout
    }

    /// Sync the project and submit its job script
    ///
    /// See [`JobSubmitter::submit`].
    pub async fn submit(&self, request: &SubmitRequest) -> Result<JobHandle> {
        JobSubmitter::new(self.transport.clone(), self.target.clone(), self.layout.clone())
            .submit(request)
            .await
    }

    /// Handle for a job submitted earlier from project `project`
    pub fn handle_for(&self, job_id: &str, project: &str) -> Result<JobHandle> {
        let job_id = job_id.trim();
        if job_id.is_empty() {
            return Err(ClientError::InvalidInput("job id must not be empty".to_string()));
        }

        let remote_root = self.layout.remote_root(project)?;
        Ok(JobHandle::new(job_id, self.target.clone(), remote_root))
    }

    /// Current state of a job
    pub async fn status(&self, handle: &JobHandle) -> Result<JobState> {
        status::query_state(self.transport.as_ref(), &handle.target, &handle.job_id).await
    }

    /// Current state of a job on this client's target, by id
    pub async fn job_state(&self, job_id: &str) -> Result<JobState> {
        let job_id = job_id.trim();
        if job_id.is_empty() {
            return Err(ClientError::InvalidInput("job id must not be empty".to_string()));
        }

        status::query_state(self.transport.as_ref(), &self.target, job_id).await
    }

    /// Follow a job's output until it finishes or `cancel` fires
    ///
    /// # Errors
    /// `InvalidInput` if `options` are invalid
    pub fn stream(
        &self,
        handle: &JobHandle,
        options: StreamOptions,
        cancel: CancellationToken,
    ) -> Result<LogStream> {
        let streamer = LogStreamer::new(self.transport.clone(), self.layout.clone(), options)?;
        Ok(streamer.spawn(handle.clone(), cancel))
    }
}

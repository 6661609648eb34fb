//! Job submission
//!
//! Stages the local project on the login node and hands the job descriptor
//! to `sbatch`:
//! 1. `mkdir -p` the project's remote root
//! 2. rsync the project tree into it
//! 3. `cd` there and run `sbatch`
//! 4. parse the job id out of sbatch's reply
//!
//! Any failure stops the sequence, so a failed sync never leads to a
//! submission of stale files.

use once_cell::sync::Lazy;
use regex::Regex;
use slurmssh_core::shell;
use slurmssh_core::{ClusterTarget, JobHandle, RemoteLayout, SubmissionResult, SyncSpec};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{ClientError, Result};
use crate::transport::Transport;

static SUBMITTED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Submitted batch job\s+(\S+)").expect("valid regex"));

/// Everything needed to submit one job
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    /// Local project directory; synced as a whole
    pub local_root: PathBuf,

    /// Job script, relative to `local_root` or an absolute path inside it
    pub descriptor: PathBuf,

    /// Extra rsync exclude patterns, appended after the defaults
    pub excludes: Vec<String>,

    /// Whether to apply [`slurmssh_core::DEFAULT_EXCLUDES`]
    pub use_default_excludes: bool,

    /// Remote project directory name; defaults to the name of `local_root`
    pub project: Option<String>,

    /// Options placed before the descriptor on the sbatch command line
    pub sbatch_args: Vec<String>,

    /// Arguments passed through to the job script
    pub script_args: Vec<String>,
}

impl SubmitRequest {
    pub fn new(local_root: impl Into<PathBuf>, descriptor: impl Into<PathBuf>) -> Self {
        Self {
            local_root: local_root.into(),
            descriptor: descriptor.into(),
            excludes: Vec::new(),
            use_default_excludes: true,
            project: None,
            sbatch_args: Vec::new(),
            script_args: Vec::new(),
        }
    }

    pub fn with_excludes(mut self, excludes: Vec<String>) -> Self {
        self.excludes = excludes;
        self
    }

    pub fn without_default_excludes(mut self) -> Self {
        self.use_default_excludes = false;
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_sbatch_args(mut self, args: Vec<String>) -> Self {
        self.sbatch_args = args;
        self
    }

    pub fn with_script_args(mut self, args: Vec<String>) -> Self {
        self.script_args = args;
        self
    }
}

/// Syncs a project to a target and submits its job descriptor
pub struct JobSubmitter {
    transport: Arc<dyn Transport>,
    target: ClusterTarget,
    layout: RemoteLayout,
}

impl JobSubmitter {
    pub fn new(transport: Arc<dyn Transport>, target: ClusterTarget, layout: RemoteLayout) -> Self {
        Self {
            transport,
            target,
            layout,
        }
    }

    /// Syncs the project and submits the descriptor
    ///
    /// Issues exactly one sync and, only if it succeeded, exactly one sbatch.
    /// Input problems are reported before any remote command runs.
    ///
    /// # Errors
    /// - `InvalidInput` for a bad project name, descriptor path or exclude
    /// - `Transport` if mkdir, rsync or sbatch fail
    /// - `SubmissionParse` if sbatch's reply has no job id
    pub async fn submit(&self, request: &SubmitRequest) -> Result<JobHandle> {
        let project = project_name(request)?;
        let remote_root = self.layout.remote_root(&project)?;
        let descriptor = remote_descriptor(&request.local_root, &request.descriptor)?;
        let spec = SyncSpec::new(
            &request.local_root,
            &remote_root,
            &request.excludes,
            request.use_default_excludes,
        )?;

        self.ensure_remote_root(&remote_root).await?;

        info!(
            "Syncing {} to {}:{}",
            request.local_root.display(),
            self.target,
            remote_root
        );
        let synced = self.transport.sync(&self.target, &spec).await?;
        if !synced.stdout.trim().is_empty() {
            debug!("rsync output: {}", synced.stdout.trim());
        }

        let command = submit_command(&remote_root, &descriptor, request);
        info!("Submitting {} on {}", descriptor, self.target);
        let output = self.transport.run_remote(&self.target, &command).await?;

        let result = parse_submission(&output.stdout)?;
        info!("Job submitted with ID: {}", result.job_id);

        Ok(JobHandle::new(result.job_id, self.target.clone(), remote_root))
    }

    /// Creates the remote root; a no-op when it already exists
    async fn ensure_remote_root(&self, remote_root: &str) -> Result<()> {
        let command = format!("mkdir -p {}", shell::quote_path(remote_root));
        self.transport.run_remote(&self.target, &command).await?;
        Ok(())
    }
}

/// Extracts the job id from sbatch's standard output
///
/// # Errors
/// `SubmissionParse` when no `Submitted batch job <id>` line is present
pub fn parse_submission(stdout: &str) -> Result<SubmissionResult> {
    SUBMITTED_RE
        .captures(stdout)
        .and_then(|caps| caps.get(1))
        .map(|id| SubmissionResult {
            job_id: id.as_str().to_string(),
        })
        .ok_or_else(|| ClientError::SubmissionParse {
            output: stdout.trim().to_string(),
        })
}

fn project_name(request: &SubmitRequest) -> Result<String> {
    if let Some(project) = &request.project {
        return Ok(project.clone());
    }

    request
        .local_root
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| {
            ClientError::InvalidInput(format!(
                "cannot derive a project name from '{}'; pass one explicitly",
                request.local_root.display()
            ))
        })
}

/// Descriptor path relative to the remote root, with `/` separators
fn remote_descriptor(local_root: &Path, descriptor: &Path) -> Result<String> {
    let relative = if descriptor.is_absolute() {
        descriptor.strip_prefix(local_root).map_err(|_| {
            ClientError::InvalidInput(format!(
                "job script '{}' is outside the project directory '{}'",
                descriptor.display(),
                local_root.display()
            ))
        })?
    } else {
        descriptor
    };

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().to_string()),
            Component::CurDir => {}
            _ => {
                return Err(ClientError::InvalidInput(format!(
                    "job script '{}' is outside the project directory",
                    descriptor.display()
                )));
            }
        }
    }

    if parts.is_empty() {
        return Err(ClientError::InvalidInput(format!(
            "'{}' does not name a job script",
            descriptor.display()
        )));
    }

    Ok(parts.join("/"))
}

fn submit_command(remote_root: &str, descriptor: &str, request: &SubmitRequest) -> String {
    let mut words = vec!["sbatch".to_string()];
    words.extend(request.sbatch_args.iter().map(|arg| shell::quote(arg)));
    words.push(shell::quote(descriptor));
    words.extend(request.script_args.iter().map(|arg| shell::quote(arg)));

    format!("cd {} && {}", shell::quote_path(remote_root), words.join(" "))
}

//! Transport seam
//!
//! Everything that leaves the local machine goes through [`Transport`]: remote
//! shell commands, streamed remote reads, and project syncs. The production
//! implementation shells out to `ssh` and `rsync` (see [`crate::ssh`]); tests
//! substitute a scripted fake.

use async_trait::async_trait;
use slurmssh_core::{ClusterTarget, SyncSpec};
use std::ops::ControlFlow;

use crate::error::Result;

/// Captured result of a one-shot command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Receives streamed stdout chunks as they arrive
///
/// Returning `ControlFlow::Break` asks the transport to stop reading; the
/// bytes already handed over stay delivered.
#[async_trait]
pub trait ChunkSink: Send {
    async fn write_chunk(&mut self, chunk: &[u8]) -> ControlFlow<()>;
}

/// Executes commands against a cluster target
///
/// Implementations never retry. A non-zero exit is reported as
/// [`crate::ClientError::Transport`] carrying the exit code and stderr.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Runs a shell command on the target and buffers its output
    async fn run_remote(&self, target: &ClusterTarget, command: &str) -> Result<CommandOutput>;

    /// Runs a shell command on the target, handing stdout to `sink` chunk by
    /// chunk instead of buffering it
    ///
    /// # Returns
    /// The number of bytes passed to the sink
    async fn run_remote_streaming(
        &self,
        target: &ClusterTarget,
        command: &str,
        sink: &mut dyn ChunkSink,
    ) -> Result<u64>;

    /// Mirrors `spec.local_root` into `spec.remote_root` on the target
    async fn sync(&self, target: &ClusterTarget, spec: &SyncSpec) -> Result<CommandOutput>;
}

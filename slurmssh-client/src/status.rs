//! Job state queries

use slurmssh_core::shell;
use slurmssh_core::{ClusterTarget, JobState};
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::transport::Transport;

/// `squeue` prints this once a finished job has been purged from the controller
const PURGED_JOB_MARKER: &str = "Invalid job id specified";

/// Remote command listing the state of every task of `job_id`
pub fn status_command(job_id: &str) -> String {
    format!("squeue --noheader --jobs {} --format %T", shell::quote(job_id))
}

/// Asks the workload manager for the current state of a job
///
/// A job that no longer appears in the queue is reported as
/// [`JobState::Finished`].
pub async fn query_state(
    transport: &dyn Transport,
    target: &ClusterTarget,
    job_id: &str,
) -> Result<JobState> {
    match transport.run_remote(target, &status_command(job_id)).await {
        Ok(output) => {
            let state = JobState::from_squeue_output(&output.stdout);
            debug!("Job {} state: {}", job_id, state);
            Ok(state)
        }
        Err(ClientError::Transport { stderr, .. }) if stderr.contains(PURGED_JOB_MARKER) => {
            debug!("Job {} is no longer known to the controller", job_id);
            Ok(JobState::Finished)
        }
        Err(e) => Err(e),
    }
}

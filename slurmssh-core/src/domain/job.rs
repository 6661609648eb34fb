//! Job domain types

use serde::{Deserialize, Serialize};
use std::fmt;

use super::target::ClusterTarget;

/// Outcome of a successful `sbatch` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub job_id: String,
}

/// Everything needed to find a submitted job again
///
/// Owned by the caller once submission returns. It is serializable so a
/// handle printed by one process can be used by another to re-attach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: String,
    pub target: ClusterTarget,
    pub remote_root: String,
}

impl JobHandle {
    pub fn new(
        job_id: impl Into<String>,
        target: ClusterTarget,
        remote_root: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            target,
            remote_root: remote_root.into(),
        }
    }
}

/// Job state as reported by the workload manager
///
/// `Finished` means the job is no longer listed in the queue at all, so its
/// precise outcome is unknown to us.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Configuring,
    Running,
    Completing,
    Suspended,
    Requeued,
    Completed,
    Cancelled,
    Failed,
    TimedOut,
    NodeFail,
    Preempted,
    BootFail,
    Deadline,
    OutOfMemory,
    Finished,
    Other(String),
}

impl JobState {
    /// Parses a single state word such as `RUNNING` or `CANCELLED by 1001`
    pub fn parse(word: &str) -> Self {
        let word = word.split_whitespace().next().unwrap_or("").trim_end_matches('+');

        match word.to_ascii_uppercase().as_str() {
            "" => JobState::Finished,
            "PENDING" | "PD" => JobState::Pending,
            "CONFIGURING" | "CF" => JobState::Configuring,
            "RUNNING" | "R" => JobState::Running,
            "COMPLETING" | "CG" => JobState::Completing,
            "SUSPENDED" | "S" => JobState::Suspended,
            "REQUEUED" | "RQ" => JobState::Requeued,
            "COMPLETED" | "CD" => JobState::Completed,
            "CANCELLED" | "CA" => JobState::Cancelled,
            "FAILED" | "F" => JobState::Failed,
            "TIMEOUT" | "TO" => JobState::TimedOut,
            "NODE_FAIL" | "NF" => JobState::NodeFail,
            "PREEMPTED" | "PR" => JobState::Preempted,
            "BOOT_FAIL" | "BF" => JobState::BootFail,
            "DEADLINE" | "DL" => JobState::Deadline,
            "OUT_OF_MEMORY" | "OOM" => JobState::OutOfMemory,
            other => JobState::Other(other.to_string()),
        }
    }

    /// Reduces `squeue` output (one state per line) to a single state
    ///
    /// Job arrays list one line per task. The job counts as active while any
    /// task is active; otherwise the first reported state wins. No lines at
    /// all means the job has left the queue.
    pub fn from_squeue_output(output: &str) -> Self {
        let states: Vec<JobState> = output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(JobState::parse)
            .collect();

        if let Some(active) = states.iter().find(|s| !s.is_terminal()) {
            return active.clone();
        }

        states.into_iter().next().unwrap_or(JobState::Finished)
    }

    /// Whether the job will not produce further output
    ///
    /// Unrecognized states are treated as active so that streaming errs on
    /// the side of continuing.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed
                | JobState::Cancelled
                | JobState::Failed
                | JobState::TimedOut
                | JobState::NodeFail
                | JobState::Preempted
                | JobState::BootFail
                | JobState::Deadline
                | JobState::OutOfMemory
                | JobState::Finished
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "PENDING",
            JobState::Configuring => "CONFIGURING",
            JobState::Running => "RUNNING",
            JobState::Completing => "COMPLETING",
            JobState::Suspended => "SUSPENDED",
            JobState::Requeued => "REQUEUED",
            JobState::Completed => "COMPLETED",
            JobState::Cancelled => "CANCELLED",
            JobState::Failed => "FAILED",
            JobState::TimedOut => "TIMEOUT",
            JobState::NodeFail => "NODE_FAIL",
            JobState::Preempted => "PREEMPTED",
            JobState::BootFail => "BOOT_FAIL",
            JobState::Deadline => "DEADLINE",
            JobState::OutOfMemory => "OUT_OF_MEMORY",
            JobState::Finished => "FINISHED",
            JobState::Other(other) => other,
        };
        f.write_str(s)
    }
}

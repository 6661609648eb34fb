//! Log domain types

use serde::{Deserialize, Serialize};

/// A line of job output relayed from the cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub source: LogSource,
    pub text: String,
    pub received_at: chrono::DateTime<chrono::Utc>,
}

/// Which of the job's output files a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogSource {
    Stdout,
    Stderr,
}

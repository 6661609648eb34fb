//! Error types for the slurmssh client

use slurmssh_core::DomainError;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the cluster
#[derive(Debug, Error)]
pub enum ClientError {
    /// A remote or sync command failed, could not be started, or timed out
    #[error("`{command}` failed ({}): {stderr}", describe_exit(.exit_code))]
    Transport {
        /// The command line that was run
        command: String,
        /// Exit code, absent when the process never exited on its own
        exit_code: Option<i32>,
        /// Captured standard error, verbatim
        stderr: String,
    },

    /// `sbatch` succeeded but its output did not contain a job id
    #[error("unexpected sbatch output: {output:?}")]
    SubmissionParse {
        /// Raw standard output of the submission command
        output: String,
    },

    /// Log streaming hit the consecutive poll-failure limit
    #[error("log streaming stopped after {failures} consecutive failed polls: {last_error}")]
    Stream {
        /// Number of consecutive failed rounds
        failures: u32,
        /// Message of the last failure
        last_error: String,
    },

    /// Caller-supplied input was rejected before anything ran
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

fn describe_exit(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code".to_string(),
    }
}

impl ClientError {
    /// Create a transport error
    pub fn transport(
        command: impl Into<String>,
        exit_code: Option<i32>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::Transport {
            command: command.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// Check if this error came from the transport layer
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Check if this error is an unparseable submission
    pub fn is_submission_parse(&self) -> bool {
        matches!(self, Self::SubmissionParse { .. })
    }

    /// Check if this error ended a log stream
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream { .. })
    }

    /// Exit code of the failed command, if any
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Transport { exit_code, .. } => *exit_code,
            _ => None,
        }
    }
}

impl From<DomainError> for ClientError {
    fn from(err: DomainError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

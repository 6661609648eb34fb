//! Validation errors for domain types

use thiserror::Error;

/// Errors raised while constructing or validating domain values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Target string was not of the form `user@host`
    #[error("invalid target '{0}': expected <user>@<host>")]
    InvalidTarget(String),

    /// Exclude pattern was empty or whitespace
    #[error("exclude pattern at position {0} is empty")]
    EmptyExclude(usize),

    /// Project name cannot be used as a remote directory name
    #[error("invalid project name '{0}'")]
    InvalidProject(String),

    /// Log file template is missing the job id placeholder
    #[error("log template '{0}' must contain {{job_id}}")]
    InvalidLogTemplate(String),

    /// Stream options out of range
    #[error("invalid stream options: {0}")]
    InvalidOptions(String),
}

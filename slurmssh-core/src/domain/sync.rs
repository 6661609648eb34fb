//! File synchronization description

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::DomainError;

/// Patterns skipped on every sync unless the caller opts out
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".git/",
    "__pycache__/",
    "*.pyc",
    ".DS_Store",
    ".vscode/",
    ".idea/",
    ".venv/",
    "target/",
];

/// What to copy, where to, and what to leave behind
///
/// Exclude patterns are handed to rsync verbatim and in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSpec {
    pub local_root: PathBuf,
    pub remote_root: String,
    pub exclude_patterns: Vec<String>,
}

impl SyncSpec {
    /// Builds a spec, prepending the default excludes when requested
    pub fn new(
        local_root: impl Into<PathBuf>,
        remote_root: impl Into<String>,
        excludes: &[String],
        use_default_excludes: bool,
    ) -> Result<Self, DomainError> {
        let mut exclude_patterns: Vec<String> = if use_default_excludes {
            DEFAULT_EXCLUDES.iter().map(|p| p.to_string()).collect()
        } else {
            Vec::new()
        };

        for (idx, pattern) in excludes.iter().enumerate() {
            if pattern.trim().is_empty() {
                return Err(DomainError::EmptyExclude(idx));
            }
            exclude_patterns.push(pattern.clone());
        }

        Ok(Self {
            local_root: local_root.into(),
            remote_root: remote_root.into(),
            exclude_patterns,
        })
    }
}

//! Cluster target

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

/// Remote login node and the account used to reach it
///
/// Immutable once constructed; clone it to share.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterTarget {
    host: String,
    username: String,
}

impl ClusterTarget {
    /// Creates a target after validating both halves
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Result<Self, DomainError> {
        let host = host.into();
        let username = username.into();

        let valid = |s: &str| !s.is_empty() && !s.contains('@') && !s.contains(char::is_whitespace);
        if !valid(&host) || !valid(&username) {
            return Err(DomainError::InvalidTarget(format!("{}@{}", username, host)));
        }

        Ok(Self { host, username })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// The `user@host` form understood by ssh and rsync
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }
}

impl FromStr for ClusterTarget {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (username, host) = s
            .split_once('@')
            .ok_or_else(|| DomainError::InvalidTarget(s.to_string()))?;

        Self::new(host, username).map_err(|_| DomainError::InvalidTarget(s.to_string()))
    }
}

impl fmt::Display for ClusterTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.username, self.host)
    }
}

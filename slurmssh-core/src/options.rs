//! Log streaming options

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::DomainError;

/// Polling cadence and failure tolerance for log tailing
///
/// Sensible values depend on how busy the login node is and on how quickly
/// the scheduler purges finished jobs, so all of them are tunable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOptions {
    /// Pause between poll rounds
    pub poll_interval: Duration,

    /// Consecutive failed rounds tolerated before the stream gives up
    pub max_consecutive_failures: u32,

    /// Query the job state every this many rounds
    pub status_every: u32,

    /// Lines buffered between the poller and a slow consumer
    pub channel_capacity: usize,
}

impl StreamOptions {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_consecutive_failures(mut self, max: u32) -> Self {
        self.max_consecutive_failures = max;
        self
    }

    pub fn with_status_every(mut self, rounds: u32) -> Self {
        self.status_every = rounds;
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.poll_interval.is_zero() {
            return Err(DomainError::InvalidOptions(
                "poll_interval must be greater than 0".to_string(),
            ));
        }

        if self.max_consecutive_failures == 0 {
            return Err(DomainError::InvalidOptions(
                "max_consecutive_failures must be at least 1".to_string(),
            ));
        }

        if self.status_every == 0 {
            return Err(DomainError::InvalidOptions(
                "status_every must be at least 1".to_string(),
            ));
        }

        if self.channel_capacity == 0 {
            return Err(DomainError::InvalidOptions(
                "channel_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_consecutive_failures: 5,
            status_every: 1,
            channel_capacity: 256,
        }
    }
}

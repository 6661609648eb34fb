//! slurmssh Core
//!
//! Core types shared by the slurmssh library and command-line tool.
//!
//! This crate contains:
//! - Domain types: cluster targets, job handles, job states, log lines
//! - Remote layout: where the project and its log files live on the cluster
//! - Stream options: polling cadence and failure tolerance for log tailing
//! - Shell helpers: quoting values interpolated into remote commands
//!
//! Nothing in here performs I/O.

pub mod domain;
pub mod error;
pub mod layout;
pub mod options;
pub mod shell;

pub use domain::job::{JobHandle, JobState, SubmissionResult};
pub use domain::log::{LogLine, LogSource};
pub use domain::sync::{DEFAULT_EXCLUDES, SyncSpec};
pub use domain::target::ClusterTarget;
pub use error::DomainError;
pub use layout::{LogPaths, RemoteLayout};
pub use options::StreamOptions;

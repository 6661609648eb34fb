//! Configuration module
//!
//! Collects the connection, layout and polling settings shared by all
//! commands. Values come from command-line flags or their `SLURMSSH_*`
//! environment variables.

use anyhow::{Context, Result};
use slurmssh_client::{ClientConfig, TransportConfig};
use slurmssh_core::{ClusterTarget, RemoteLayout, StreamOptions};
use std::path::PathBuf;
use std::time::Duration;

/// Value of `--stderr-log` that merges stderr into the stdout file
pub const NO_STDERR_LOG: &str = "none";

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Private key for ssh; ssh's defaults apply when unset
    pub identity_file: Option<PathBuf>,

    /// ssh port on the login node
    pub port: Option<u16>,

    /// Upper bound for every remote command
    pub command_timeout: Option<Duration>,

    /// ssh connection timeout
    pub connect_timeout: Duration,

    /// Remote directory holding one subdirectory per project
    pub base_dir: String,

    /// Output file name template, relative to the project directory
    pub stdout_log: String,

    /// Error file name template; `None` when stderr goes to the output file
    pub stderr_log: Option<String>,

    /// Pause between log polls
    pub poll_interval: Duration,

    /// Consecutive failed polls before giving up on the logs
    pub max_poll_failures: u32,
}

impl Config {
    /// Interprets `--stderr-log`, where `none` disables the separate file
    pub fn stderr_log_from_arg(value: &str) -> Option<String> {
        if value.trim().eq_ignore_ascii_case(NO_STDERR_LOG) {
            None
        } else {
            Some(value.to_string())
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            anyhow::bail!("connect timeout must be greater than 0");
        }

        if self.command_timeout.is_some_and(|t| t.is_zero()) {
            anyhow::bail!("command timeout must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll interval must be greater than 0");
        }

        if self.max_poll_failures == 0 {
            anyhow::bail!("max poll failures must be at least 1");
        }

        self.layout()?;

        Ok(())
    }

    /// Where projects and log files live on the cluster
    pub fn layout(&self) -> Result<RemoteLayout> {
        RemoteLayout::new(
            self.base_dir.clone(),
            self.stdout_log.clone(),
            self.stderr_log.clone(),
        )
        .context("Invalid remote layout")
    }

    pub fn client_config(&self, target: ClusterTarget) -> Result<ClientConfig> {
        let transport = TransportConfig {
            identity_file: self.identity_file.clone(),
            port: self.port,
            connect_timeout: Some(self.connect_timeout),
            command_timeout: self.command_timeout,
            ..TransportConfig::default()
        };

        Ok(ClientConfig {
            target,
            transport,
            layout: self.layout()?,
        })
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions::default()
            .with_poll_interval(self.poll_interval)
            .with_max_consecutive_failures(self.max_poll_failures)
    }
}

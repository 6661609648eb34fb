//! ssh / rsync transport
//!
//! Builds `ssh` and `rsync` command lines for a target and runs them as child
//! processes. Authentication is entirely delegated to ssh: `BatchMode=yes`
//! makes a missing key fail fast instead of prompting for a password.

use async_trait::async_trait;
use slurmssh_core::shell;
use slurmssh_core::{ClusterTarget, SyncSpec};
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{ClientError, Result};
use crate::transport::{ChunkSink, CommandOutput, Transport};

const CHUNK_SIZE: usize = 8 * 1024;

/// Settings for the ssh and rsync invocations
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// ssh executable
    pub ssh_program: String,

    /// rsync executable
    pub rsync_program: String,

    /// Private key passed with `-i`; ssh's own defaults apply when unset
    pub identity_file: Option<PathBuf>,

    /// Port passed with `-p`
    pub port: Option<u16>,

    /// ssh `ConnectTimeout`
    pub connect_timeout: Option<Duration>,

    /// Extra `-o` options, e.g. `StrictHostKeyChecking=accept-new`
    pub ssh_options: Vec<String>,

    /// Upper bound for any single command; unlimited when unset
    pub command_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            rsync_program: "rsync".to_string(),
            identity_file: None,
            port: None,
            connect_timeout: Some(Duration::from_secs(10)),
            ssh_options: Vec::new(),
            command_timeout: None,
        }
    }
}

/// Transport backed by the system's `ssh` and `rsync` binaries
#[derive(Debug, Clone, Default)]
pub struct SshTransport {
    config: TransportConfig,
}

impl SshTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Options shared by direct ssh calls and rsync's remote shell
    fn ssh_options(&self) -> Vec<String> {
        let mut args = vec!["-o".to_string(), "BatchMode=yes".to_string()];

        if let Some(timeout) = self.config.connect_timeout {
            args.push("-o".to_string());
            args.push(format!("ConnectTimeout={}", timeout.as_secs().max(1)));
        }

        if let Some(identity) = &self.config.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }

        if let Some(port) = self.config.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }

        for option in &self.config.ssh_options {
            args.push("-o".to_string());
            args.push(option.clone());
        }

        args
    }

    /// Arguments for `ssh` running `command` on `target`
    pub fn ssh_args(&self, target: &ClusterTarget, command: &str) -> Vec<String> {
        let mut args = self.ssh_options();
        args.push(target.destination());
        args.push(command.to_string());
        args
    }

    /// Arguments for `rsync` mirroring `spec` onto `target`
    ///
    /// `--delete` keeps the remote tree identical to the local one; excluded
    /// paths are left alone on both sides.
    pub fn rsync_args(&self, target: &ClusterTarget, spec: &SyncSpec) -> Vec<String> {
        let remote_shell = std::iter::once(self.config.ssh_program.clone())
            .chain(self.ssh_options())
            .map(|word| shell::quote(&word))
            .collect::<Vec<_>>()
            .join(" ");

        let mut args = vec![
            "-az".to_string(),
            "--delete".to_string(),
            "-e".to_string(),
            remote_shell,
        ];

        for pattern in &spec.exclude_patterns {
            args.push("--exclude".to_string());
            args.push(pattern.clone());
        }

        let local = spec.local_root.display().to_string();
        let local = match local.trim_end_matches('/') {
            "" if local.starts_with('/') => "/".to_string(),
            "" => "./".to_string(),
            trimmed => format!("{}/", trimmed),
        };
        args.push(local);
        args.push(format!(
            "{}:{}/",
            target.destination(),
            spec.remote_root.trim_end_matches('/')
        ));

        args
    }

    /// Applies the configured per-command timeout to `fut`
    async fn within_timeout<F, T>(&self, command_line: &str, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        match self.config.command_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                ClientError::transport(command_line, None, format!("timed out after {:?}", limit))
            }),
            None => Ok(fut.await),
        }
    }

    /// Runs a local program and buffers its output
    async fn run_captured(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let command_line = render_command(program, args);
        debug!("Running {}", command_line);

        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::null()).kill_on_drop(true);

        let output = self
            .within_timeout(&command_line, command.output())
            .await?
            .map_err(|e| {
                let reason = format!("failed to start {}: {}", program, e);
                ClientError::transport(&command_line, None, reason)
            })?;

        let result = CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !result.stderr.trim().is_empty() {
            debug!("{} stderr: {}", program, result.stderr.trim());
        }

        if !output.status.success() {
            return Err(ClientError::transport(
                command_line,
                output.status.code(),
                result.stderr.trim_end(),
            ));
        }

        Ok(result)
    }

    /// Runs a local program, relaying stdout to `sink` as it is produced
    async fn run_streaming(
        &self,
        program: &str,
        args: &[String],
        sink: &mut dyn ChunkSink,
    ) -> Result<u64> {
        let command_line = render_command(program, args);
        debug!("Streaming {}", command_line);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                let reason = format!("failed to start {}: {}", program, e);
                ClientError::transport(&command_line, None, reason)
            })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClientError::transport(&command_line, None, "stdout was not captured"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ClientError::transport(&command_line, None, "stderr was not captured"))?;

        // Drain stderr alongside stdout so a chatty remote cannot stall on a full pipe
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        let relay = async {
            let mut buf = vec![0u8; CHUNK_SIZE];
            let mut relayed = 0u64;

            loop {
                let n = stdout.read(&mut buf).await.map_err(|e| {
                    let reason = format!("failed to read output: {}", e);
                    ClientError::transport(&command_line, None, reason)
                })?;
                if n == 0 {
                    break;
                }

                relayed += n as u64;
                if sink.write_chunk(&buf[..n]).await.is_break() {
                    return Ok((relayed, None));
                }
            }

            let status = child.wait().await.map_err(|e| {
                let reason = format!("failed to wait for {}: {}", program, e);
                ClientError::transport(&command_line, None, reason)
            })?;
            Ok::<_, ClientError>((relayed, Some(status)))
        };

        let (relayed, status) = self.within_timeout(&command_line, relay).await??;

        let Some(status) = status else {
            debug!("Consumer stopped reading, abandoning {}", command_line);
            stderr_task.abort();
            return Ok(relayed);
        };

        let stderr = stderr_task.await.unwrap_or_default();
        if !status.success() {
            return Err(ClientError::transport(
                command_line,
                status.code(),
                String::from_utf8_lossy(&stderr).trim_end(),
            ));
        }

        Ok(relayed)
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn run_remote(&self, target: &ClusterTarget, command: &str) -> Result<CommandOutput> {
        let args = self.ssh_args(target, command);
        self.run_captured(&self.config.ssh_program, &args).await
    }

    async fn run_remote_streaming(
        &self,
        target: &ClusterTarget,
        command: &str,
        sink: &mut dyn ChunkSink,
    ) -> Result<u64> {
        let args = self.ssh_args(target, command);
        self.run_streaming(&self.config.ssh_program, &args, sink).await
    }

    async fn sync(&self, target: &ClusterTarget, spec: &SyncSpec) -> Result<CommandOutput> {
        let args = self.rsync_args(target, spec);
        self.run_captured(&self.config.rsync_program, &args).await
    }
}

/// Human-readable command line used in logs and error messages
fn render_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .map(shell::quote)
        .collect::<Vec<_>>()
        .join(" ")
}

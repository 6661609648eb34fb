//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod logs;
mod status;
mod submit;

pub use submit::SubmitArgs;

use anyhow::{Context, Result};
use clap::Subcommand;
use slurmssh_client::SlurmClient;
use slurmssh_core::ClusterTarget;
use std::path::PathBuf;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Sync the current directory and submit a job script
    Submit(SubmitArgs),
    /// Follow the output of a submitted job
    Logs {
        /// Login node, as user@host
        target: String,

        /// Job ID printed by `submit`
        job_id: String,

        /// Remote project name; defaults to the current directory's name
        #[arg(long)]
        project: Option<String>,

        /// Prefix each line with the time it was received
        #[arg(short, long)]
        timestamps: bool,
    },
    /// Show the state of a job
    Status {
        /// Login node, as user@host
        target: String,

        /// Job ID printed by `submit`
        job_id: String,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Submit(args) => submit::handle_submit(args, config).await,
        Commands::Logs {
            target,
            job_id,
            project,
            timestamps,
        } => logs::handle_logs(&target, &job_id, project, timestamps, config).await,
        Commands::Status { target, job_id } => {
            status::handle_status(&target, &job_id, config).await
        }
    }
}

/// Builds a client for a `user@host` argument
fn connect(target: &str, config: &Config) -> Result<SlurmClient> {
    let target: ClusterTarget = target
        .parse()
        .with_context(|| format!("Invalid target '{}'", target))?;

    Ok(SlurmClient::new(config.client_config(target)?))
}

/// The project directory: the current working directory, symlinks resolved
fn project_root() -> Result<PathBuf> {
    std::env::current_dir()
        .and_then(|dir| dir.canonicalize())
        .context("Failed to determine the current directory")
}

/// Remote project name derived from the current directory
fn project_name() -> Result<String> {
    let root = project_root()?;
    root.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .with_context(|| {
            format!(
                "Cannot derive a project name from '{}'; pass --project",
                root.display()
            )
        })
}

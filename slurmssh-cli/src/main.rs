//! slurmssh CLI
//!
//! Syncs the current directory to a Slurm login node, submits a job script
//! and follows the job's output.

mod commands;
mod config;

use clap::Parser;
use colored::*;
use commands::{Commands, handle_command};
use config::Config;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "slurmssh")]
#[command(about = "Run Slurm batch jobs from your local checkout", long_about = None)]
struct Cli {
    /// ssh private key
    #[arg(long, global = true, env = "SLURMSSH_IDENTITY")]
    identity: Option<PathBuf>,

    /// ssh port
    #[arg(long, global = true, env = "SLURMSSH_PORT")]
    port: Option<u16>,

    /// Timeout in seconds for each remote command
    #[arg(long, global = true, env = "SLURMSSH_TIMEOUT")]
    timeout: Option<u64>,

    /// ssh connection timeout in seconds
    #[arg(long, global = true, env = "SLURMSSH_CONNECT_TIMEOUT", default_value_t = 10)]
    connect_timeout: u64,

    /// Remote directory holding the synced projects
    #[arg(long, global = true, env = "SLURMSSH_BASE_DIR", default_value = "slurmssh")]
    base_dir: String,

    /// Job output file name; must contain {job_id}
    #[arg(
        long,
        global = true,
        env = "SLURMSSH_STDOUT_LOG",
        default_value = "slurm-{job_id}.out"
    )]
    stdout_log: String,

    /// Job error file name; must contain {job_id}, or `none` to merge it into the output
    #[arg(
        long,
        global = true,
        env = "SLURMSSH_STDERR_LOG",
        default_value = "slurm-{job_id}.err"
    )]
    stderr_log: String,

    /// Seconds between log polls
    #[arg(long, global = true, env = "SLURMSSH_POLL_INTERVAL", default_value_t = 5)]
    poll_interval: u64,

    /// Consecutive failed log polls before giving up
    #[arg(long, global = true, env = "SLURMSSH_MAX_POLL_FAILURES", default_value_t = 5)]
    max_poll_failures: u32,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            identity_file: self.identity.clone(),
            port: self.port,
            command_timeout: self.timeout.map(Duration::from_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout),
            base_dir: self.base_dir.clone(),
            stdout_log: self.stdout_log.clone(),
            stderr_log: Config::stderr_log_from_arg(&self.stderr_log),
            poll_interval: Duration::from_secs(self.poll_interval),
            max_poll_failures: self.max_poll_failures,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so stdout only carries job ids and job output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slurmssh=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.config();
    tracing::debug!("Configuration: {:?}", config);

    let result = match config.validate() {
        Ok(()) => handle_command(cli.command, &config).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

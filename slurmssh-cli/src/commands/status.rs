//! Status command handler

use anyhow::{Context, Result};

use crate::commands::{connect, logs::colorize_state};
use crate::config::Config;

/// Handle the status command
pub async fn handle_status(target: &str, job_id: &str, config: &Config) -> Result<()> {
    let client = connect(target, config)?;
    let state = client
        .job_state(job_id)
        .await
        .with_context(|| format!("Failed to query job {}", job_id))?;

    println!("{}", colorize_state(&state));

    Ok(())
}

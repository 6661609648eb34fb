//! Logs command handler
//!
//! Relays a job's output to the terminal. Ctrl-C only detaches; the job
//! keeps running on the cluster.

use anyhow::{Context, Result};
use colored::*;
use slurmssh_client::{LogEvent, LogStream, SlurmClient};
use slurmssh_core::{JobHandle, JobState, LogLine, LogSource};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::commands::{connect, project_name};
use crate::config::Config;

/// Handle the logs command
pub async fn handle_logs(
    target: &str,
    job_id: &str,
    project: Option<String>,
    timestamps: bool,
    config: &Config,
) -> Result<()> {
    let project = match project {
        Some(project) => project,
        None => project_name()?,
    };

    let client = connect(target, config)?;
    let handle = client.handle_for(job_id, &project)?;

    follow(&client, &handle, config, timestamps).await
}

/// Streams a job's output until it finishes or the user presses Ctrl-C
pub async fn follow(
    client: &SlurmClient,
    handle: &JobHandle,
    config: &Config,
    timestamps: bool,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    eprintln!(
        "{}",
        format!("Following job {} (Ctrl-C to detach)", handle.job_id).dimmed()
    );

    let stream = client.stream(handle, config.stream_options(), cancel.clone())?;
    let outcome = relay(stream, timestamps).await;
    ctrl_c.abort();

    let finished = outcome.with_context(|| {
        format!(
            "Lost the output of job {}; the job itself was not affected",
            handle.job_id
        )
    })?;

    match finished {
        Some(state) => {
            eprintln!(
                "{} Job {} ended: {}",
                "■".cyan(),
                handle.job_id,
                colorize_state(&state)
            );
        }
        None if cancel.is_cancelled() => {
            eprintln!(
                "{}",
                format!(
                    "Detached from job {}; it keeps running on {}",
                    handle.job_id, handle.target
                )
                .yellow()
            );
        }
        None => {}
    }

    Ok(())
}

/// Prints every line and returns the final state, if the job finished
async fn relay(
    mut stream: LogStream,
    timestamps: bool,
) -> slurmssh_client::Result<Option<JobState>> {
    while let Some(event) = stream.next().await {
        match event? {
            LogEvent::Line(line) => print_line(&line, timestamps),
            LogEvent::Finished(state) => return Ok(Some(state)),
        }
    }

    Ok(None)
}

fn print_line(line: &LogLine, timestamps: bool) {
    let text = format_line(line, timestamps);
    match line.source {
        LogSource::Stdout => println!("{}", text),
        LogSource::Stderr => eprintln!("{}", text),
    }
}

fn format_line(line: &LogLine, timestamps: bool) -> String {
    if !timestamps {
        return line.text.clone();
    }

    format!(
        "{} {}",
        line.received_at.format("%H:%M:%S").to_string().dimmed(),
        line.text
    )
}

pub(super) fn colorize_state(state: &JobState) -> ColoredString {
    let text = state.to_string();
    match state {
        JobState::Completed | JobState::Finished => text.green(),
        JobState::Cancelled | JobState::Preempted => text.yellow(),
        s if s.is_terminal() => text.red(),
        _ => text.normal(),
    }
}

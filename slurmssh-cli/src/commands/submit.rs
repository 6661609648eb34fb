//! Submit command handler

use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use slurmssh_client::SubmitRequest;
use std::path::{Path, PathBuf};

use crate::commands::{connect, logs, project_root};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Login node, as user@host
    pub target: String,

    /// Job script to hand to sbatch, inside the current directory
    pub descriptor: PathBuf,

    /// Extra rsync exclude patterns; takes several values and may be repeated
    #[arg(long = "exclude", value_name = "PATTERN", num_args = 1..)]
    pub excludes: Vec<String>,

    /// Sync everything except the --exclude patterns
    #[arg(long)]
    pub no_default_excludes: bool,

    /// Remote project name; defaults to the current directory's name
    #[arg(long)]
    pub project: Option<String>,

    /// Option for sbatch itself, e.g. --sbatch-arg=--partition=gpu (repeatable)
    #[arg(long = "sbatch-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub sbatch_args: Vec<String>,

    /// Follow the job's output after submitting
    #[arg(short, long)]
    pub follow: bool,

    /// Print the job handle as JSON instead of the bare job ID
    #[arg(long)]
    pub json: bool,

    /// Arguments passed through to the job script
    #[arg(last = true)]
    pub script_args: Vec<String>,
}

/// Handle the submit command
pub async fn handle_submit(args: SubmitArgs, config: &Config) -> Result<()> {
    let local_root = project_root()?;
    let descriptor = resolve_descriptor(&local_root, &args.descriptor)?;
    let client = connect(&args.target, config)?;

    let mut request = SubmitRequest::new(&local_root, descriptor)
        .with_excludes(args.excludes)
        .with_sbatch_args(args.sbatch_args)
        .with_script_args(args.script_args);
    if args.no_default_excludes {
        request = request.without_default_excludes();
    }
    if let Some(project) = args.project {
        request = request.with_project(project);
    }

    eprintln!(
        "{} Syncing {} to {}",
        "▸".cyan(),
        local_root.display(),
        client.target()
    );

    let handle = client
        .submit(&request)
        .await
        .context("Job submission failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&handle)?);
    } else {
        eprintln!(
            "{} Submitted job {} in {}",
            "✓".green(),
            handle.job_id.bold(),
            handle.remote_root.dimmed()
        );
        println!("{}", handle.job_id);
    }

    if args.follow {
        logs::follow(&client, &handle, config, false).await?;
    }

    Ok(())
}

/// Checks that the job script exists locally and makes its path absolute
fn resolve_descriptor(local_root: &Path, descriptor: &Path) -> Result<PathBuf> {
    let path = local_root.join(descriptor);
    if !path.is_file() {
        anyhow::bail!("Job script '{}' not found", descriptor.display());
    }

    path.canonicalize()
        .with_context(|| format!("Failed to resolve job script '{}'", descriptor.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Commands;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: Commands,
    }

    fn parse(args: &[&str]) -> SubmitArgs {
        let mut argv = vec!["slurmssh", "submit"];
        argv.extend_from_slice(args);
        match TestCli::parse_from(argv).command {
            Commands::Submit(args) => args,
            _ => panic!("expected submit command"),
        }
    }

    #[test]
    fn test_parse_submit_args() {
        let args = parse(&[
            "alice@login",
            "train.sbatch",
            "--exclude",
            "data/",
            "--exclude",
            "*.ckpt",
            "--sbatch-arg=--partition=gpu",
            "--sbatch-arg=--time=01:00:00",
            "--follow",
            "--",
            "--epochs",
            "10",
        ]);

        assert_eq!(args.target, "alice@login");
        assert_eq!(args.descriptor, PathBuf::from("train.sbatch"));
        assert_eq!(args.excludes, vec!["data/", "*.ckpt"]);
        assert_eq!(args.sbatch_args, vec!["--partition=gpu", "--time=01:00:00"]);
        assert_eq!(args.script_args, vec!["--epochs", "10"]);
        assert!(args.follow);
        assert!(!args.json);
        assert!(!args.no_default_excludes);
    }

    #[test]
    fn test_exclude_takes_several_patterns() {
        let args = parse(&[
            "alice@login",
            "job.slurm",
            "--exclude",
            "data/",
            "*.log",
            "--exclude",
            "temp/",
            "--json",
        ]);

        assert_eq!(args.descriptor, PathBuf::from("job.slurm"));
        assert_eq!(args.excludes, vec!["data/", "*.log", "temp/"]);
        assert!(args.json);
    }

    #[test]
    fn test_missing_descriptor_rejected() {
        let root = std::env::temp_dir();
        let err = resolve_descriptor(&root, Path::new("definitely-not-here-1f3a.sbatch"))
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_existing_descriptor_resolved() {
        let root = std::env::temp_dir()
            .canonicalize()
            .unwrap()
            .join(format!("slurmssh-submit-{}", std::process::id()));
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("run.sbatch"), "#!/bin/bash\necho hi\n").unwrap();

        let resolved = resolve_descriptor(&root, Path::new("run.sbatch")).unwrap();
        assert_eq!(resolved, root.join("run.sbatch"));

        std::fs::remove_dir_all(&root).unwrap();
    }
}

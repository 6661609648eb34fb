//! Remote directory layout
//!
//! Decides where a project lands on the cluster and where the workload
//! manager writes a job's output files. Slurm's naming of those files depends
//! on site defaults and on `--output`/`--error` directives, so the templates
//! are configurable.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Placeholder replaced by the job id in log file templates
pub const JOB_ID_PLACEHOLDER: &str = "{job_id}";

/// Where projects and job logs live on the remote host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteLayout {
    /// Parent directory of all synced projects. Relative values are taken
    /// from the remote home directory.
    pub base_dir: String,

    /// Standard output file, relative to the project's remote root
    pub stdout_log: String,

    /// Standard error file; `None` when stderr is merged into stdout
    pub stderr_log: Option<String>,
}

/// Resolved remote paths of a job's output files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPaths {
    pub stdout: String,
    pub stderr: Option<String>,
}

impl RemoteLayout {
    pub fn new(
        base_dir: impl Into<String>,
        stdout_log: impl Into<String>,
        stderr_log: Option<String>,
    ) -> Result<Self, DomainError> {
        let layout = Self {
            base_dir: base_dir.into(),
            stdout_log: stdout_log.into(),
            stderr_log,
        };
        layout.validate()?;
        Ok(layout)
    }

    /// Checks the templates and base directory
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.base_dir.trim_matches('/').is_empty() {
            return Err(DomainError::InvalidOptions("base_dir cannot be empty".to_string()));
        }

        for template in std::iter::once(&self.stdout_log).chain(self.stderr_log.as_ref()) {
            if !template.contains(JOB_ID_PLACEHOLDER) {
                return Err(DomainError::InvalidLogTemplate(template.clone()));
            }
        }

        Ok(())
    }

    /// Remote root for a project, e.g. `~/slurmssh/<project>`
    ///
    /// Deterministic for a given project name; the `~` is resolved by the
    /// remote shell against the target user's home.
    pub fn remote_root(&self, project: &str) -> Result<String, DomainError> {
        if project.is_empty()
            || project == "."
            || project == ".."
            || project.contains('/')
            || project.contains(char::is_control)
        {
            return Err(DomainError::InvalidProject(project.to_string()));
        }

        let base = self.base_dir.trim_end_matches('/');
        if base.starts_with('/') || base == "~" || base.starts_with("~/") {
            Ok(format!("{}/{}", base, project))
        } else {
            Ok(format!("~/{}/{}", base, project))
        }
    }

    /// Log file locations for a job submitted from `remote_root`
    pub fn log_paths(&self, remote_root: &str, job_id: &str) -> LogPaths {
        let render = |template: &str| {
            format!(
                "{}/{}",
                remote_root.trim_end_matches('/'),
                template.replace(JOB_ID_PLACEHOLDER, job_id)
            )
        };

        LogPaths {
            stdout: render(&self.stdout_log),
            stderr: self.stderr_log.as_deref().map(render),
        }
    }
}

impl Default for RemoteLayout {
    fn default() -> Self {
        Self {
            base_dir: "slurmssh".to_string(),
            stdout_log: "slurm-{job_id}.out".to_string(),
            stderr_log: Some("slurm-{job_id}.err".to_string()),
        }
    }
}

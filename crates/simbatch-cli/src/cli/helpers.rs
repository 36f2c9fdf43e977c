use super::CliError;
use anyhow::Context;
use serde::Serialize;
use simbatch_core::common::constants::{JOB_ID_ENV, LOCAL_JOB_ID, TASK_ID_ENV};
use simbatch_core::common::{RunConfig, load_run_config, resolve_path};
use simbatch_core::domain::{JobIdentity, SimbatchError, SimbatchResult};
use simbatch_core::modules::paths::Particle;
use simbatch_core::modules::serialization::write_json_report;
use simbatch_core::modules::{DispatchReport, ProtectedPaths, StageStatus};
use std::path::{Path, PathBuf};

/// Command-line values that replace fields of the loaded run config.
#[derive(Debug, Default)]
pub(super) struct ConfigOverrides {
    pub(super) data_dir: Option<PathBuf>,
    pub(super) job_name: Option<String>,
    pub(super) jobs: Option<u32>,
    pub(super) partition: Option<String>,
    pub(super) setup: Option<String>,
    pub(super) particle: Option<String>,
}

#[derive(Debug, Clone)]
pub(super) struct CliContext {
    pub(super) working_dir: PathBuf,
    pub(super) config: RunConfig,
}

pub(super) fn current_working_dir() -> SimbatchResult<PathBuf> {
    std::env::current_dir().map_err(|source| {
        SimbatchError::io_system(
            "IO.CLI_CURRENT_DIR",
            format!("failed to read current working directory: {}", source),
        )
    })
}

pub(super) fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Loads, patches, path-resolves and validates the run config.
pub(super) fn load_cli_context(
    config_path: &Path,
    overrides: ConfigOverrides,
) -> Result<CliContext, CliError> {
    let working_dir = current_working_dir()?;
    let mut config = load_run_config(&resolve_path(&working_dir, config_path))?;

    if let Some(data_dir) = overrides.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(job_name) = overrides.job_name {
        config.job_name = job_name;
    }
    if let Some(jobs) = overrides.jobs {
        config.jobs = jobs;
    }
    if let Some(partition) = overrides.partition {
        config.partition = Some(partition);
    }
    if let Some(setup) = overrides.setup {
        config.setup = setup;
    }
    if let Some(particle) = overrides.particle {
        config.particle = Some(particle.parse::<Particle>()?);
    }

    let config = config.resolve_paths(&working_dir);
    config.validate()?;
    Ok(CliContext {
        working_dir,
        config,
    })
}

/// Configured protected entries plus the generator input trees.
pub(super) fn protected_paths(config: &RunConfig) -> SimbatchResult<ProtectedPaths> {
    Ok(ProtectedPaths::new(&config.protected_paths)?
        .with_dir(&config.pluto_root)
        .with_dir(&config.urqmd_root))
}

/// Job identity from the scheduler environment, with flags taking precedence.
/// A task index without any job id runs under the local job id.
pub(super) fn resolve_identity(
    job_id: Option<String>,
    task_id: Option<u32>,
) -> SimbatchResult<JobIdentity> {
    JobIdentity::from_env(|name| match name {
        JOB_ID_ENV => job_id
            .clone()
            .or_else(|| env_lookup(name))
            .or_else(|| task_id.map(|_| LOCAL_JOB_ID.to_string())),
        TASK_ID_ENV => task_id
            .map(|task| task.to_string())
            .or_else(|| env_lookup(name)),
        _ => env_lookup(name),
    })
}

pub(super) fn current_exe() -> Result<PathBuf, CliError> {
    let exe = std::env::current_exe().context("failed to locate the simbatch executable")?;
    Ok(exe)
}

/// Freezes the effective config next to the logs so every task reads the same values.
pub(super) fn write_effective_config(
    config: &RunConfig,
    suffix: &str,
) -> Result<PathBuf, CliError> {
    let path = config
        .log_dir
        .join(format!("{}.{}.json", config.job_name, suffix));
    write_json_report(&path, config)?;
    Ok(path)
}

pub(super) fn write_report<T: Serialize>(
    working_dir: &Path,
    path: Option<&Path>,
    report: &T,
) -> Result<(), CliError> {
    if let Some(path) = path {
        let path = resolve_path(working_dir, path);
        write_json_report(&path, report)?;
        println!("JSON report: {}", path.display());
    }
    Ok(())
}

pub(super) fn status_text(exit_code: Option<i32>) -> String {
    exit_code.map_or_else(
        || "terminated by signal".to_string(),
        |code| format!("exit code {}", code),
    )
}

pub(super) fn render_dispatch_summary(report: &DispatchReport) -> String {
    report
        .stages
        .iter()
        .map(|outcome| {
            let status = match &outcome.status {
                StageStatus::Succeeded => {
                    format!("ok ({:.1}s)", outcome.elapsed_seconds)
                }
                StageStatus::Failed { exit_code } => {
                    format!("FAILED ({})", status_text(*exit_code))
                }
                StageStatus::MissingInput { path } => {
                    format!("MISSING INPUT {}", path.display())
                }
                StageStatus::SpawnFailed { message } => format!("NOT STARTED ({})", message),
                StageStatus::Skipped => "skipped".to_string(),
            };
            format!("{:<16}{}", outcome.stage.as_str(), status)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

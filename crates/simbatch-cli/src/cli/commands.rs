use super::CliError;
use super::helpers::*;
use serde::Serialize;
use simbatch_core::common::RunConfig;
use simbatch_core::domain::{JobIdentity, ProcessSpec, SimbatchError};
use simbatch_core::modules::command::display_line;
use simbatch_core::modules::launch::{launch_detached, plan_local_launch, wait_all};
use simbatch_core::modules::paths::{FileSet, background_input_path, signal_input_path};
use simbatch_core::modules::pipeline::parse_stage_list;
use simbatch_core::modules::scheduler::{
    ArrayRange, SubmitRequest, parse_submitted_job_id, write_batch_script,
};
use simbatch_core::modules::workspace::ensure_directory;
use simbatch_core::modules::{
    DispatchReport, Dispatcher, DryRunRunner, FailurePolicy, MergeKind, ProcessRunner,
    StagePlan, SystemRunner, plan_job, plan_merge, prepare_job_workspace, reset_directory,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(clap::Args)]
pub(super) struct ConfigFlag {
    /// Run configuration (JSON)
    #[arg(short = 'c', long = "config", value_name = "JSON")]
    path: PathBuf,
}

#[derive(clap::Args)]
pub(super) struct SubmitArgs {
    #[command(flatten)]
    config: ConfigFlag,

    /// Output directory for per-task artifacts
    #[arg(short = 'd', long = "data")]
    data_dir: Option<PathBuf>,

    /// Scheduler job name
    #[arg(short = 'n', long = "name")]
    job_name: Option<String>,

    /// Number of array tasks
    #[arg(short = 'j', long)]
    jobs: Option<u32>,

    /// Delete and recreate the data and log directories first
    #[arg(short = 'r', long)]
    remove: bool,

    /// Limit on simultaneously running array tasks
    #[arg(long)]
    max_concurrent: Option<u32>,

    /// Scheduler partition
    #[arg(long)]
    partition: Option<String>,

    /// Write the batch script and print the sbatch command without submitting
    #[arg(long)]
    dry_run: bool,
}

#[derive(clap::Args)]
pub(super) struct JobArgs {
    #[command(flatten)]
    config: ConfigFlag,

    /// Output directory for per-task artifacts
    #[arg(value_name = "DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Geometry setup name
    #[arg(value_name = "SETUP")]
    setup: Option<String>,

    /// Signal category (omegaepem, omegadalitz, phi, inmed, qgp, rho0, urqmd)
    #[arg(value_name = "PARTICLE")]
    particle: Option<String>,

    /// Job id; defaults to SLURM_ARRAY_JOB_ID
    #[arg(long)]
    job_id: Option<String>,

    /// Task index; defaults to SLURM_ARRAY_TASK_ID
    #[arg(long)]
    task_id: Option<u32>,

    /// Comma-separated stages to run, replacing the configured list
    #[arg(long)]
    stages: Option<String>,

    /// Keep running later stages after a failure
    #[arg(long)]
    continue_on_failure: bool,

    /// Print the stage commands without touching the workspace
    #[arg(long)]
    dry_run: bool,

    /// JSON report output path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct LocalArgs {
    #[command(flatten)]
    config: ConfigFlag,

    /// Number of tasks
    #[arg(short = 'j', long)]
    jobs: Option<u32>,

    /// Output directory for per-task artifacts
    #[arg(short = 'd', long = "data")]
    data_dir: Option<PathBuf>,

    /// Wait for every task and fail if any of them failed
    #[arg(long)]
    wait: bool,
}

#[derive(clap::Args)]
pub(super) struct MergeArgs {
    #[command(flatten)]
    config: ConfigFlag,

    /// Number of tasks whose outputs are merged
    #[arg(short = 'j', long)]
    jobs: Option<u32>,

    /// Which per-task outputs to merge: qa or analysis
    #[arg(long, default_value = "qa")]
    kind: String,

    /// Directory holding the per-task outputs
    #[arg(short = 'd', long = "data")]
    data_dir: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct PathsArgs {
    #[command(flatten)]
    config: ConfigFlag,

    /// Task index
    #[arg(long)]
    task_id: u32,
}

pub(super) fn run_submit_command(args: SubmitArgs) -> Result<i32, CliError> {
    let context = load_cli_context(
        &args.config.path,
        ConfigOverrides {
            data_dir: args.data_dir,
            job_name: args.job_name,
            jobs: args.jobs,
            partition: args.partition,
            ..ConfigOverrides::default()
        },
    )?;
    let config = &context.config;
    let array = ArrayRange::new(config.jobs, args.max_concurrent)?;

    prepare_output_directories(config, args.remove)?;
    let frozen_config = write_effective_config(config, "submit")?;
    let job_command = ProcessSpec::new(current_exe()?.to_string_lossy().into_owned())
        .arg("job")
        .arg("--config")
        .arg(frozen_config.to_string_lossy().into_owned());
    let script = config.log_dir.join(format!("{}.sbatch", config.job_name));
    write_batch_script(&script, &job_command)?;

    let request = SubmitRequest {
        job_name: config.job_name.clone(),
        time_limit: config.time_limit,
        log_dir: config.log_dir.clone(),
        array,
        partition: config.partition.clone(),
        script,
    };
    let submit = request.to_process();
    let command_line = display_line(&submit);

    if args.dry_run {
        println!("{}", command_line);
        return Ok(0);
    }

    info!(
        tasks = array.task_count(),
        time_limit_seconds = config.time_limit.total_seconds(),
        "submitting array job"
    );
    let outcome = SystemRunner::default().run(&submit)?;
    if !outcome.success() {
        return Err(SimbatchError::external_tool_failure(
            "submit",
            &command_line,
            outcome.exit_code,
        )
        .into());
    }
    let stdout = outcome.stdout.unwrap_or_default();
    let job_id = parse_submitted_job_id(&stdout).ok_or_else(|| {
        SimbatchError::computation(
            "RUN.SUBMIT_OUTPUT",
            format!("could not read a job id from sbatch output '{}'", stdout.trim()),
        )
    })?;
    println!(
        "Submitted array job {} ({} tasks, logs in {}).",
        job_id,
        array.task_count(),
        config.log_dir.display()
    );
    Ok(0)
}

pub(super) fn run_job_command(args: JobArgs) -> Result<i32, CliError> {
    let context = load_cli_context(
        &args.config.path,
        ConfigOverrides {
            data_dir: args.data_dir,
            setup: args.setup,
            particle: args.particle,
            ..ConfigOverrides::default()
        },
    )?;
    let config = &context.config;
    let identity = resolve_identity(args.job_id, args.task_id)?;
    let stages = match &args.stages {
        Some(list) => parse_stage_list(list)?,
        None => config.stages.clone(),
    };
    let macros = config.macro_catalog(env_lookup)?;
    let policy = if args.continue_on_failure {
        FailurePolicy::ContinueOnFailure
    } else {
        FailurePolicy::HaltOnFirstFailure
    };
    info!(%identity, particle = ?config.particle, setup = %config.setup, "starting job");

    if args.dry_run {
        let work_dir = config.work_dir.join(identity.workspace_name());
        let plan = plan_job(config, &identity, &macros, &stages, &work_dir)?;
        let dispatcher = Dispatcher::new(DryRunRunner::default())
            .with_policy(policy)
            .verify_inputs(false);
        let report = dispatcher.execute(&plan);
        for line in dispatcher.runner().recorded() {
            println!("{}", line);
        }
        write_report(&context.working_dir, args.report.as_deref(), &report)?;
        return Ok(0);
    }

    let protected = protected_paths(config)?
        .with_dir(&config.data_dir)
        .with_dir(&config.log_dir);
    let workspace = prepare_job_workspace(&config.work_dir, &identity, &protected)?;
    info!(job = %workspace.identity(), path = %workspace.path().display(), "workspace ready");
    ensure_directory(&config.data_dir)?;
    let plan = plan_job(config, &identity, &macros, &stages, workspace.path())?;
    info!(stages = ?plan.stage_names(), "stage plan built");
    let runner = SystemRunner::new(config.environment_file.as_deref())?;
    let report = run_plan(Dispatcher::new(runner).with_policy(policy), &plan);

    write_report(&context.working_dir, args.report.as_deref(), &report)?;
    report.into_result()?;
    println!("Task {} finished.", identity);
    Ok(0)
}

pub(super) fn run_local_command(args: LocalArgs) -> Result<i32, CliError> {
    let context = load_cli_context(
        &args.config.path,
        ConfigOverrides {
            data_dir: args.data_dir,
            jobs: args.jobs,
            ..ConfigOverrides::default()
        },
    )?;
    let config = &context.config;

    prepare_output_directories(config, false)?;
    let frozen_config = write_effective_config(config, "local")?;
    let base_args = vec![
        "job".to_string(),
        "--config".to_string(),
        frozen_config.to_string_lossy().into_owned(),
    ];
    let exe = current_exe()?;
    let planned = plan_local_launch(&exe.to_string_lossy(), &base_args, config.jobs);
    let launched = launch_detached(&SystemRunner::default(), planned)?;
    println!("Launched {} local tasks.", launched.len());

    if !args.wait {
        return Ok(0);
    }

    let outcomes = wait_all(launched)?;
    let failed: Vec<_> = outcomes
        .iter()
        .filter(|(_, outcome)| !outcome.success())
        .collect();
    for (task_id, outcome) in &failed {
        eprintln!(
            "task {} failed with {}",
            task_id,
            status_text(outcome.exit_code)
        );
    }
    if !failed.is_empty() {
        return Err(SimbatchError::computation(
            "RUN.LOCAL_TASKS",
            format!("{} of {} local tasks failed", failed.len(), outcomes.len()),
        )
        .into());
    }
    println!("All {} local tasks finished.", outcomes.len());
    Ok(0)
}

pub(super) fn run_merge_command(args: MergeArgs) -> Result<i32, CliError> {
    let kind = args.kind.parse::<MergeKind>()?;
    let context = load_cli_context(
        &args.config.path,
        ConfigOverrides {
            data_dir: args.data_dir,
            jobs: args.jobs,
            ..ConfigOverrides::default()
        },
    )?;
    let config = &context.config;
    let plan = plan_merge(&config.data_dir, kind, config.jobs, &config.data_dir)?;
    let runner = SystemRunner::new(config.environment_file.as_deref())?;
    run_plan(Dispatcher::new(runner), &plan).into_result()?;
    println!("Merged output: {}", kind.merged_path(&config.data_dir).display());
    Ok(0)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskPaths {
    signal_input: Option<PathBuf>,
    background_input: PathBuf,
    #[serde(flatten)]
    outputs: FileSet,
}

pub(super) fn run_paths_command(args: PathsArgs) -> Result<i32, CliError> {
    let context = load_cli_context(&args.config.path, ConfigOverrides::default())?;
    let config = &context.config;
    let task = JobIdentity::local(args.task_id)?.task_id();
    let roots = config.generator_roots();
    let signal_input = match config.particle {
        Some(particle) => signal_input_path(
            &roots,
            config.input_convention,
            config.system,
            config.energy,
            particle,
            task,
        ),
        None => None,
    };
    let paths = TaskPaths {
        signal_input,
        background_input: background_input_path(&roots, config.system, config.energy, task),
        outputs: FileSet::for_task(&config.data_dir, task),
    };
    let json = serde_json::to_string_pretty(&paths).map_err(|source| {
        SimbatchError::internal("SYS.SERIALIZE", format!("failed to render paths: {}", source))
    })?;
    println!("{}", json);
    Ok(0)
}

fn run_plan<R: ProcessRunner>(dispatcher: Dispatcher<R>, plan: &StagePlan) -> DispatchReport {
    let report = dispatcher.execute(plan);
    info!(
        executed = ?report.executed(),
        passed = report.passed(),
        "dispatch finished"
    );
    println!("{}", render_dispatch_summary(&report));
    report
}

/// Data and log directories are only emptied on explicit request.
fn prepare_output_directories(config: &RunConfig, remove: bool) -> Result<(), CliError> {
    let protected = protected_paths(config)?;
    for dir in [&config.data_dir, &config.log_dir] {
        if remove {
            reset_directory(dir, &protected)?;
        } else {
            if dir.is_dir() {
                warn_if_not_empty(dir);
            }
            ensure_directory(dir)?;
        }
    }
    Ok(())
}

fn warn_if_not_empty(dir: &Path) {
    let occupied = std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false);
    if occupied {
        warn!(path = %dir.display(), "directory is not empty; pass -r to reset it");
    }
}

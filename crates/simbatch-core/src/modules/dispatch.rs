use super::command::display_line;
use super::pipeline::StagePlan;
use super::traits::ProcessRunner;
use crate::common::constants::ENV_SHELL;
use crate::domain::{ProcessOutcome, ProcessSpec, SimbatchError, SimbatchResult, Stage};
use serde::Serialize;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;
use tracing::{debug, error, info, warn};

// `$0` is the environment file, `$@` the wrapped command.
const SOURCE_AND_EXEC: &str = "source \"$0\" && exec \"$@\"";

/// Runs processes on the host with inherited stdio, optionally after
/// sourcing an environment file in a `bash` wrapper.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    environment_file: Option<PathBuf>,
}

impl SystemRunner {
    pub fn new(environment_file: Option<&Path>) -> SimbatchResult<Self> {
        if let Some(file) = environment_file {
            if !file.is_file() {
                return Err(SimbatchError::input_validation(
                    "INPUT.ENVIRONMENT_FILE",
                    format!("environment file '{}' does not exist", file.display()),
                ));
            }
        }
        Ok(Self {
            environment_file: environment_file.map(Path::to_path_buf),
        })
    }

    pub fn command_for(&self, spec: &ProcessSpec) -> Command {
        let mut command = match &self.environment_file {
            Some(file) => {
                let mut command = Command::new(ENV_SHELL);
                command
                    .arg("-c")
                    .arg(SOURCE_AND_EXEC)
                    .arg(file)
                    .arg(&spec.program);
                command
            }
            None => Command::new(&spec.program),
        };
        command.args(&spec.args);
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }
        command
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, spec: &ProcessSpec) -> SimbatchResult<ProcessOutcome> {
        let mut command = self.command_for(spec);
        let spawn_error = |source: std::io::Error| {
            SimbatchError::io_system(
                "IO.SPAWN",
                format!("failed to execute '{}': {}", spec.program, source),
            )
        };

        if spec.capture_stdout {
            let output = command
                .stdin(Stdio::null())
                .stderr(Stdio::inherit())
                .output()
                .map_err(spawn_error)?;
            return Ok(ProcessOutcome {
                exit_code: output.status.code(),
                stdout: Some(String::from_utf8_lossy(&output.stdout).into_owned()),
            });
        }

        let status = command.status().map_err(spawn_error)?;
        Ok(ProcessOutcome {
            exit_code: status.code(),
            stdout: None,
        })
    }
}

/// Records command lines instead of running them.
#[derive(Debug, Default)]
pub struct DryRunRunner {
    recorded: RefCell<Vec<String>>,
}

impl DryRunRunner {
    pub fn recorded(&self) -> Vec<String> {
        self.recorded.borrow().clone()
    }
}

impl ProcessRunner for DryRunRunner {
    fn run(&self, spec: &ProcessSpec) -> SimbatchResult<ProcessOutcome> {
        let line = display_line(spec);
        info!(command = %line, "dry run");
        self.recorded.borrow_mut().push(line);
        Ok(ProcessOutcome::exited(0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    #[default]
    HaltOnFirstFailure,
    ContinueOnFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StageStatus {
    Succeeded,
    Failed { exit_code: Option<i32> },
    MissingInput { path: PathBuf },
    SpawnFailed { message: String },
    Skipped,
}

impl StageStatus {
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Succeeded | Self::Skipped)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutcome {
    pub stage: Stage,
    pub command_line: String,
    #[serde(flatten)]
    pub status: StageStatus,
    pub elapsed_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DispatchReport {
    pub stages: Vec<StageOutcome>,
}

impl DispatchReport {
    pub fn passed(&self) -> bool {
        self.stages.iter().all(|outcome| !outcome.status.is_failure())
    }

    pub fn first_failure(&self) -> Option<&StageOutcome> {
        self.stages.iter().find(|outcome| outcome.status.is_failure())
    }

    pub fn executed(&self) -> Vec<Stage> {
        self.stages
            .iter()
            .filter(|outcome| outcome.status != StageStatus::Skipped)
            .map(|outcome| outcome.stage)
            .collect()
    }

    /// The first failure as an error naming stage, command and exit status.
    pub fn failure_error(&self) -> Option<SimbatchError> {
        self.first_failure().map(|outcome| match &outcome.status {
            StageStatus::Failed { exit_code } => SimbatchError::external_tool_failure(
                outcome.stage,
                &outcome.command_line,
                *exit_code,
            ),
            StageStatus::MissingInput { path } => {
                SimbatchError::missing_upstream_artifact(outcome.stage, path)
            }
            StageStatus::SpawnFailed { message } => {
                SimbatchError::io_system("IO.SPAWN", format!("stage {}: {}", outcome.stage, message))
            }
            StageStatus::Succeeded | StageStatus::Skipped => {
                SimbatchError::internal("SYS.DISPATCH", "non-failing stage reported as failure")
            }
        })
    }

    pub fn into_result(self) -> SimbatchResult<Self> {
        match self.failure_error() {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }
}

/// Runs a stage plan in order and checks every exit status.
pub struct Dispatcher<R> {
    runner: R,
    policy: FailurePolicy,
    verify_inputs: bool,
}

impl<R> Dispatcher<R>
where
    R: ProcessRunner,
{
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            policy: FailurePolicy::default(),
            verify_inputs: true,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Input checks need real artifacts, so dry runs turn them off.
    pub fn verify_inputs(mut self, verify: bool) -> Self {
        self.verify_inputs = verify;
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn execute(&self, plan: &StagePlan) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut halted = false;

        for planned in &plan.stages {
            let command_line = planned.command_line();
            if halted {
                warn!(stage = %planned.stage, "skipped after earlier failure");
                report.stages.push(StageOutcome {
                    stage: planned.stage,
                    command_line,
                    status: StageStatus::Skipped,
                    elapsed_seconds: 0.0,
                });
                continue;
            }

            let started = Instant::now();
            let status = self.run_stage(planned.stage, &planned.process, &planned.inputs);
            let elapsed_seconds = started.elapsed().as_secs_f64();

            if status.is_failure() {
                error!(stage = %planned.stage, ?status, "stage failed");
                halted = self.policy == FailurePolicy::HaltOnFirstFailure;
            } else {
                info!(stage = %planned.stage, elapsed_seconds, "stage finished");
            }
            report.stages.push(StageOutcome {
                stage: planned.stage,
                command_line,
                status,
                elapsed_seconds,
            });
        }

        report
    }

    fn run_stage(&self, stage: Stage, process: &ProcessSpec, inputs: &[PathBuf]) -> StageStatus {
        if self.verify_inputs {
            if let Some(missing) = inputs.iter().find(|input| !input.exists()) {
                return StageStatus::MissingInput {
                    path: missing.clone(),
                };
            }
        }

        info!(%stage, "starting stage");
        debug!(command = %display_line(process), "dispatching");
        match self.runner.run(process) {
            Ok(outcome) if outcome.success() => StageStatus::Succeeded,
            Ok(outcome) => StageStatus::Failed {
                exit_code: outcome.exit_code,
            },
            Err(error) => StageStatus::SpawnFailed {
                message: error.message().to_string(),
            },
        }
    }
}

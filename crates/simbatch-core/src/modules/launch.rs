//! Local stand-in for an array job: one detached child per task index.

use super::dispatch::SystemRunner;
use crate::domain::{ProcessOutcome, ProcessSpec, SimbatchError, SimbatchResult};
use std::process::Child;
use tracing::info;

#[derive(Debug)]
pub struct LaunchedTask {
    pub task_id: u32,
    pub child: Child,
}

/// `<exe> <base_args...> --job-id local --task-id <i>` for `i` in `1..=jobs`.
pub fn plan_local_launch(exe: &str, base_args: &[String], jobs: u32) -> Vec<(u32, ProcessSpec)> {
    (1..=jobs)
        .map(|task_id| {
            let spec = ProcessSpec::new(exe)
                .args(base_args.iter().cloned())
                .args(["--job-id", crate::common::constants::LOCAL_JOB_ID])
                .arg("--task-id")
                .arg(task_id.to_string());
            (task_id, spec)
        })
        .collect()
}

/// Spawns every task without waiting for any of them.
pub fn launch_detached(
    runner: &SystemRunner,
    planned: Vec<(u32, ProcessSpec)>,
) -> SimbatchResult<Vec<LaunchedTask>> {
    planned
        .into_iter()
        .map(|(task_id, spec)| {
            let child = runner.command_for(&spec).spawn().map_err(|source| {
                SimbatchError::io_system(
                    "IO.SPAWN",
                    format!("failed to launch task {} ('{}'): {}", task_id, spec.program, source),
                )
            })?;
            info!(task_id, pid = child.id(), "launched local task");
            Ok(LaunchedTask { task_id, child })
        })
        .collect()
}

/// Joins every launched task, in launch order.
pub fn wait_all(tasks: Vec<LaunchedTask>) -> SimbatchResult<Vec<(u32, ProcessOutcome)>> {
    tasks
        .into_iter()
        .map(|mut task| {
            let status = task.child.wait().map_err(|source| {
                SimbatchError::io_system(
                    "IO.WAIT",
                    format!("failed to wait for task {}: {}", task.task_id, source),
                )
            })?;
            Ok((
                task.task_id,
                ProcessOutcome {
                    exit_code: status.code(),
                    stdout: None,
                },
            ))
        })
        .collect()
}

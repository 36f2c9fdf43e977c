//! SLURM array-job submission.

use super::command::shell_quote;
use crate::common::constants::SUBMIT_TOOL;
use crate::domain::{ProcessSpec, SimbatchError, SimbatchResult};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeLimitError {
    #[error("expected [D-]HH:MM:SS, got '{0}'")]
    Format(String),
    #[error("{field} value {value} is out of range in '{input}'")]
    Range {
        field: &'static str,
        value: u32,
        input: String,
    },
}

impl From<TimeLimitError> for SimbatchError {
    fn from(error: TimeLimitError) -> Self {
        SimbatchError::input_validation("INPUT.TIME_LIMIT", error.to_string())
    }
}

/// Wall-clock limit of one array element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeLimit {
    days: u32,
    hours: u32,
    minutes: u32,
    seconds: u32,
}

impl TimeLimit {
    pub const fn from_hours(hours: u32) -> Self {
        Self {
            days: hours / 24,
            hours: hours % 24,
            minutes: 0,
            seconds: 0,
        }
    }

    pub const fn total_seconds(self) -> u64 {
        (self.days as u64) * 86_400
            + (self.hours as u64) * 3_600
            + (self.minutes as u64) * 60
            + self.seconds as u64
    }
}

impl FromStr for TimeLimit {
    type Err = TimeLimitError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let format_error = || TimeLimitError::Format(input.to_string());
        let (days, clock) = match input.split_once('-') {
            Some((days, clock)) => (days.parse::<u32>().map_err(|_| format_error())?, clock),
            None => (0, input),
        };

        let fields = clock.split(':').collect::<Vec<_>>();
        if fields.len() != 3 || fields.iter().any(|field| field.len() != 2) {
            return Err(format_error());
        }
        let parse = |field: &str| field.parse::<u32>().map_err(|_| format_error());
        let (hours, minutes, seconds) = (parse(fields[0])?, parse(fields[1])?, parse(fields[2])?);

        for (field, value, limit) in [("hours", hours, 24), ("minutes", minutes, 60), ("seconds", seconds, 60)] {
            if value >= limit {
                return Err(TimeLimitError::Range {
                    field,
                    value,
                    input: input.to_string(),
                });
            }
        }

        Ok(Self {
            days,
            hours,
            minutes,
            seconds,
        })
    }
}

impl TryFrom<String> for TimeLimit {
    type Error = TimeLimitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeLimit> for String {
    fn from(value: TimeLimit) -> Self {
        value.to_string()
    }
}

impl Display for TimeLimit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.days > 0 {
            write!(f, "{}-", self.days)?;
        }
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

/// `first-last[%max_concurrent]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayRange {
    first: u32,
    last: u32,
    max_concurrent: Option<u32>,
}

impl ArrayRange {
    pub fn new(task_count: u32, max_concurrent: Option<u32>) -> SimbatchResult<Self> {
        if task_count == 0 {
            return Err(SimbatchError::input_validation(
                "INPUT.ARRAY_SIZE",
                "array job needs at least one task",
            ));
        }
        if max_concurrent == Some(0) {
            return Err(SimbatchError::input_validation(
                "INPUT.ARRAY_SIZE",
                "max concurrent tasks must be at least 1",
            ));
        }
        Ok(Self {
            first: 1,
            last: task_count,
            max_concurrent,
        })
    }

    pub const fn task_count(self) -> u32 {
        self.last - self.first + 1
    }
}

impl Display for ArrayRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.first, self.last)?;
        if let Some(limit) = self.max_concurrent {
            write!(f, "%{}", limit)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub job_name: String,
    pub time_limit: TimeLimit,
    pub log_dir: PathBuf,
    pub array: ArrayRange,
    pub partition: Option<String>,
    pub script: PathBuf,
}

impl SubmitRequest {
    /// Log templates use `%A` (array job id) and `%a` (task index).
    pub fn output_template(&self) -> PathBuf {
        self.log_dir.join(format!("{}.%A_%a.out", self.job_name))
    }

    pub fn error_template(&self) -> PathBuf {
        self.log_dir.join(format!("{}.%A_%a.err", self.job_name))
    }

    pub fn to_process(&self) -> ProcessSpec {
        let mut spec = ProcessSpec::new(SUBMIT_TOOL)
            .arg(format!("--job-name={}", self.job_name))
            .arg(format!("--time={}", self.time_limit))
            .arg(format!("--output={}", self.output_template().display()))
            .arg(format!("--error={}", self.error_template().display()))
            .arg(format!("--array={}", self.array));
        if let Some(partition) = &self.partition {
            spec = spec.arg(format!("--partition={}", partition));
        }
        spec.arg(self.script.to_string_lossy().into_owned())
            .capture_stdout()
    }
}

/// Extracts the id from `Submitted batch job <id>`.
pub fn parse_submitted_job_id(stdout: &str) -> Option<String> {
    stdout.lines().find_map(|line| {
        line.trim()
            .strip_prefix("Submitted batch job")
            .map(str::trim)
            .filter(|id| !id.is_empty() && id.chars().all(|ch| ch.is_ascii_digit()))
            .map(str::to_string)
    })
}

pub fn render_batch_script(job_command: &ProcessSpec) -> String {
    let mut line = vec![shell_quote(&job_command.program)];
    line.extend(job_command.args.iter().map(|arg| shell_quote(arg)));
    format!("#!/bin/bash\nset -euo pipefail\nexec {}\n", line.join(" "))
}

pub fn write_batch_script(path: &Path, job_command: &ProcessSpec) -> SimbatchResult<()> {
    fs::write(path, render_batch_script(job_command)).map_err(|source| {
        SimbatchError::io_system(
            "IO.BATCH_SCRIPT",
            format!("failed to write batch script '{}': {}", path.display(), source),
        )
    })?;
    set_executable(path)
}

#[cfg(unix)]
fn set_executable(path: &Path) -> SimbatchResult<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|source| {
        SimbatchError::io_system(
            "IO.BATCH_SCRIPT",
            format!("failed to mark '{}' executable: {}", path.display(), source),
        )
    })
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> SimbatchResult<()> {
    Ok(())
}

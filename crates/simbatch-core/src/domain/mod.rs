pub mod errors;

pub use errors::{ErrorCategory, SimbatchError, SimbatchResult};

use crate::common::constants::{JOB_ID_ENV, LOCAL_JOB_ID, TASK_ID_ENV};
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Transport,
    Digitization,
    Reconstruction,
    Qa,
    Analysis,
    Merge,
}

impl Stage {
    /// Canonical pipeline order.
    pub const ALL: [Stage; 6] = [
        Stage::Transport,
        Stage::Digitization,
        Stage::Reconstruction,
        Stage::Qa,
        Stage::Analysis,
        Stage::Merge,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "TRANSPORT",
            Self::Digitization => "DIGITIZATION",
            Self::Reconstruction => "RECONSTRUCTION",
            Self::Qa => "QA",
            Self::Analysis => "ANALYSIS",
            Self::Merge => "MERGE",
        }
    }

    pub const fn key(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Digitization => "digitization",
            Self::Reconstruction => "reconstruction",
            Self::Qa => "qa",
            Self::Analysis => "analysis",
            Self::Merge => "merge",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

impl FromStr for Stage {
    type Err = SimbatchError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        match token.trim().to_ascii_lowercase().as_str() {
            "transport" | "tra" => Ok(Self::Transport),
            "digitization" | "digi" => Ok(Self::Digitization),
            "reconstruction" | "reco" => Ok(Self::Reconstruction),
            "qa" => Ok(Self::Qa),
            "analysis" | "ana" => Ok(Self::Analysis),
            "merge" => Ok(Self::Merge),
            other => Err(SimbatchError::unknown_category(
                "stage",
                other,
                &Stage::ALL.map(Stage::key),
            )),
        }
    }
}

impl<'de> serde::Deserialize<'de> for Stage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        token.parse().map_err(serde::de::Error::custom)
    }
}

/// Scheduler job id plus array task index; namespaces one job's workspace and outputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JobIdentity {
    job_id: String,
    task_id: u32,
}

impl JobIdentity {
    pub fn new(job_id: impl Into<String>, task_id: u32) -> SimbatchResult<Self> {
        let job_id = job_id.into();
        let trimmed = job_id.trim();
        if trimmed.is_empty()
            || trimmed == "."
            || trimmed == ".."
            || trimmed.contains(['/', '\\'])
        {
            return Err(SimbatchError::input_validation(
                "INPUT.JOB_ID",
                format!("job id '{}' cannot namespace a workspace", job_id),
            ));
        }
        if task_id == 0 {
            return Err(SimbatchError::input_validation(
                "INPUT.TASK_ID",
                "task index must be at least 1",
            ));
        }
        Ok(Self {
            job_id: trimmed.to_string(),
            task_id,
        })
    }

    pub fn local(index: u32) -> SimbatchResult<Self> {
        Self::new(LOCAL_JOB_ID, index)
    }

    /// Reads the scheduler-assigned ids through `lookup` (normally `std::env::var`).
    pub fn from_env<F>(lookup: F) -> SimbatchResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let job_id = lookup(JOB_ID_ENV).ok_or_else(|| {
            SimbatchError::input_validation(
                "INPUT.JOB_ID",
                format!("environment variable {} is not set", JOB_ID_ENV),
            )
        })?;
        let raw_task = lookup(TASK_ID_ENV).ok_or_else(|| {
            SimbatchError::input_validation(
                "INPUT.TASK_ID",
                format!("environment variable {} is not set", TASK_ID_ENV),
            )
        })?;
        let task_id = raw_task.trim().parse::<u32>().map_err(|source| {
            SimbatchError::input_validation(
                "INPUT.TASK_ID",
                format!("{}='{}' is not a task index: {}", TASK_ID_ENV, raw_task, source),
            )
        })?;
        Self::new(job_id, task_id)
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub const fn task_id(&self) -> u32 {
        self.task_id
    }

    pub fn workspace_name(&self) -> String {
        format!("{}_{}", self.job_id, self.task_id)
    }
}

impl Display for JobIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.job_id, self.task_id)
    }
}

/// One child-process invocation as a structured argument list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_dir: Option<PathBuf>,
    #[serde(skip)]
    pub capture_stdout: bool,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            capture_stdout: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn capture_stdout(mut self) -> Self {
        self.capture_stdout = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutcome {
    /// `None` when the child was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Option<String>,
}

impl ProcessOutcome {
    pub fn exited(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            stdout: None,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

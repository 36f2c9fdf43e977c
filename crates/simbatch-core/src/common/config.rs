//! Run configuration of one production.
//!
//! Loaded once from a JSON file at process entry, optionally patched by
//! command-line overrides, then passed by reference to every component.

use super::constants::{
    DEFAULT_INTERPRETER, DEFAULT_MACRO_DIR, DEFAULT_PLUTO_ROOT, DEFAULT_TIME_LIMIT_HOURS,
    DEFAULT_URQMD_ROOT, WORKFLOW_ROOT_ENV,
};
use crate::domain::{SimbatchError, SimbatchResult, Stage};
use crate::modules::command::MacroCatalog;
use crate::modules::paths::{
    CollisionEnergy, CollisionSystem, GeneratorRoots, InputConvention, Particle,
};
use crate::modules::scheduler::TimeLimit;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct RunConfig {
    pub job_name: String,
    pub events: u32,
    pub setup: String,
    pub system: CollisionSystem,
    pub energy: CollisionEnergy,
    pub particle: Option<Particle>,
    /// Transport seed; derived from the task index when absent.
    pub seed: Option<u64>,
    pub input_convention: InputConvention,
    pub event_builder: String,
    pub use_mc: bool,
    pub monitor: bool,
    pub stages: Vec<Stage>,
    pub jobs: u32,
    pub time_limit: TimeLimit,
    pub partition: Option<String>,
    pub interpreter: String,
    pub workflow_root: Option<PathBuf>,
    pub macro_dir: PathBuf,
    pub environment_file: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub work_dir: PathBuf,
    pub log_dir: PathBuf,
    pub pluto_root: PathBuf,
    pub urqmd_root: PathBuf,
    pub protected_paths: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            job_name: "simbatch".to_string(),
            events: 1000,
            setup: "sis100_electron".to_string(),
            system: CollisionSystem::AuAu,
            energy: CollisionEnergy::Gev8,
            particle: None,
            seed: None,
            input_convention: InputConvention::New,
            event_builder: "Ideal".to_string(),
            use_mc: true,
            monitor: false,
            stages: Vec::new(),
            jobs: 1,
            time_limit: TimeLimit::from_hours(DEFAULT_TIME_LIMIT_HOURS),
            partition: None,
            interpreter: DEFAULT_INTERPRETER.to_string(),
            workflow_root: None,
            macro_dir: PathBuf::from(DEFAULT_MACRO_DIR),
            environment_file: None,
            data_dir: PathBuf::from("data"),
            work_dir: PathBuf::from("workdir"),
            log_dir: PathBuf::from("log"),
            pluto_root: PathBuf::from(DEFAULT_PLUTO_ROOT),
            urqmd_root: PathBuf::from(DEFAULT_URQMD_ROOT),
            protected_paths: Vec::new(),
        }
    }
}

impl RunConfig {
    pub fn particle(&self) -> SimbatchResult<Particle> {
        self.particle.ok_or_else(|| {
            SimbatchError::input_validation(
                "INPUT.PARTICLE",
                "no particle selected; set \"particle\" in the config or pass it on the command line",
            )
        })
    }

    /// The transport macro takes a signed seed, so larger values are rejected.
    pub fn seed_for_task(&self, task_id: u32) -> SimbatchResult<i64> {
        match self.seed {
            Some(seed) => i64::try_from(seed).map_err(|_| {
                SimbatchError::input_validation(
                    "INPUT.SEED",
                    format!("seed {} exceeds the largest signed 64-bit value", seed),
                )
            }),
            None => Ok(i64::from(task_id)),
        }
    }

    pub fn generator_roots(&self) -> GeneratorRoots {
        GeneratorRoots::new(&self.pluto_root, &self.urqmd_root)
    }

    /// The configured root, else the workflow root from `lookup(VMCWORKDIR)`.
    pub fn workflow_root<F>(&self, lookup: F) -> SimbatchResult<PathBuf>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = &self.workflow_root {
            return Ok(root.clone());
        }
        lookup(WORKFLOW_ROOT_ENV)
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| {
                SimbatchError::input_validation(
                    "INPUT.WORKFLOW_ROOT",
                    format!(
                        "workflow root is not configured and {} is not set",
                        WORKFLOW_ROOT_ENV
                    ),
                )
            })
    }

    pub fn macro_catalog<F>(&self, lookup: F) -> SimbatchResult<MacroCatalog>
    where
        F: Fn(&str) -> Option<String>,
    {
        let root = self.workflow_root(lookup)?;
        Ok(MacroCatalog::new(resolve_path(&root, &self.macro_dir)))
    }

    pub fn validate(&self) -> SimbatchResult<()> {
        if self.events == 0 {
            return Err(SimbatchError::input_validation(
                "INPUT.EVENTS",
                "event count must be at least 1",
            ));
        }
        if self.jobs == 0 {
            return Err(SimbatchError::input_validation(
                "INPUT.ARRAY_SIZE",
                "job count must be at least 1",
            ));
        }
        if self.job_name.trim().is_empty() || self.job_name.contains(['/', '\\']) {
            return Err(SimbatchError::input_validation(
                "INPUT.JOB_NAME",
                format!("job name '{}' cannot name log files", self.job_name),
            ));
        }
        if self.setup.trim().is_empty() {
            return Err(SimbatchError::input_validation(
                "INPUT.SETUP",
                "geometry setup name is empty",
            ));
        }
        self.seed_for_task(1)?;
        Ok(())
    }

    /// Anchors every relative path at `working_dir`.
    pub fn resolve_paths(mut self, working_dir: &Path) -> Self {
        self.data_dir = resolve_path(working_dir, &self.data_dir);
        self.work_dir = resolve_path(working_dir, &self.work_dir);
        self.log_dir = resolve_path(working_dir, &self.log_dir);
        self.pluto_root = resolve_path(working_dir, &self.pluto_root);
        self.urqmd_root = resolve_path(working_dir, &self.urqmd_root);
        self.workflow_root = self
            .workflow_root
            .map(|root| resolve_path(working_dir, &root));
        self.environment_file = self
            .environment_file
            .map(|file| resolve_path(working_dir, &file));
        self
    }
}

pub fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

pub fn load_run_config(path: &Path) -> SimbatchResult<RunConfig> {
    let content = fs::read_to_string(path).map_err(|source| {
        SimbatchError::io_system(
            "IO.CONFIG_READ",
            format!("failed to read run config '{}': {}", path.display(), source),
        )
    })?;
    serde_json::from_str::<RunConfig>(&content).map_err(|source| {
        SimbatchError::input_validation(
            "INPUT.CONFIG_PARSE",
            format!("failed to parse run config '{}': {}", path.display(), source),
        )
    })
}

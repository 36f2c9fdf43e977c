//! Names and defaults shared by the scheduler, the path builder and the CLI.

pub const JOB_ID_ENV: &str = "SLURM_ARRAY_JOB_ID";
pub const TASK_ID_ENV: &str = "SLURM_ARRAY_TASK_ID";
pub const WORKFLOW_ROOT_ENV: &str = "VMCWORKDIR";
pub const LOG_FILTER_ENV: &str = "SIMBATCH_LOG";

pub const LOCAL_JOB_ID: &str = "local";

pub const DEFAULT_INTERPRETER: &str = "root";
pub const INTERPRETER_FLAGS: [&str; 3] = ["-l", "-b", "-q"];
pub const MERGE_TOOL: &str = "hadd";
pub const SUBMIT_TOOL: &str = "sbatch";
pub const ENV_SHELL: &str = "bash";

pub const DEFAULT_MACRO_DIR: &str = "macro/rich/run";
pub const DEFAULT_PLUTO_ROOT: &str = "/lustre/cbm/prod/gen/pluto";
pub const DEFAULT_URQMD_ROOT: &str = "/lustre/cbm/prod/gen/urqmd";
pub const DEFAULT_TIME_LIMIT_HOURS: u32 = 8;

pub mod command;
pub mod dispatch;
pub mod launch;
pub mod paths;
pub mod pipeline;
pub mod scheduler;
pub mod serialization;
pub mod workspace;

mod traits;

pub use dispatch::{DispatchReport, Dispatcher, DryRunRunner, FailurePolicy, StageStatus, SystemRunner};
pub use pipeline::{MergeKind, PlannedStage, StagePlan, plan_job, plan_merge};
pub use traits::ProcessRunner;
pub use workspace::{ProtectedPaths, Workspace, prepare_job_workspace, reset_directory};

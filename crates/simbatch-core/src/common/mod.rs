pub mod config;
pub mod constants;

pub use config::{RunConfig, load_run_config, resolve_path};

mod commands;
mod helpers;

use clap::Parser;
use simbatch_core::common::constants::LOG_FILTER_ENV;
use simbatch_core::domain::SimbatchError;
use tracing_subscriber::EnvFilter;

pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().collect();

    match parse_and_dispatch(args) {
        Ok(code) => code,
        Err(error) => {
            let diagnostic = error.as_simbatch_error();
            eprintln!("{}", diagnostic.diagnostic_line());
            if let Some(summary_line) = diagnostic.fatal_exit_line() {
                eprintln!("{}", summary_line);
            }
            diagnostic.exit_code()
        }
    }
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => {
            init_logging(cli.verbose);
            dispatch_parsed(cli.command)
        }
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    // Keep a subscriber that is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "simbatch",
    version,
    about = "Prepare, submit and run detector-simulation batch jobs"
)]
struct Cli {
    /// Log at debug level unless SIMBATCH_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Prepare output directories and submit a SLURM array job
    Submit(commands::SubmitArgs),
    /// Run the stage chain of one array task
    Job(commands::JobArgs),
    /// Launch every task as a local background process
    Local(commands::LocalArgs),
    /// Merge per-task QA or analysis outputs with hadd
    Merge(commands::MergeArgs),
    /// Print the input and output files of one task as JSON
    Paths(commands::PathsArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Submit(args) => commands::run_submit_command(args),
        CliCommand::Job(args) => commands::run_job_command(args),
        CliCommand::Local(args) => commands::run_local_command(args),
        CliCommand::Merge(args) => commands::run_merge_command(args),
        CliCommand::Paths(args) => commands::run_paths_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Compute(SimbatchError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<SimbatchError> for CliError {
    fn from(error: SimbatchError) -> Self {
        Self::Compute(error)
    }
}

impl CliError {
    fn as_simbatch_error(&self) -> SimbatchError {
        match self {
            Self::Usage(message) => {
                SimbatchError::input_validation("INPUT.CLI_USAGE", message.clone())
            }
            Self::Compute(error) => error.clone(),
            Self::Internal(error) => SimbatchError::internal("SYS.CLI", format!("{error:#}")),
        }
    }
}

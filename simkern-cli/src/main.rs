//! Simkern CLI - Command-line interface
//!
//! Runs the built-in demonstration scenarios against the simulation kernel
//! and inspects the model catalogs.

mod commands;
mod scenarios;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use simkern_core::SimkernError;
use simkern_core::tracing_setup::{CliLogLevel, init_tracing};

/// Exit status when the configuration is rejected before any simulation.
const CONFIGURATION_EXIT_CODE: u8 = 2;

#[derive(Parser)]
#[command(name = "simkern")]
#[command(about = "Discrete-event simulator of distributed platforms")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,

    /// Console log level (RUST_LOG takes precedence)
    #[arg(long, value_enum, default_value_t = CliLogLevel::Warn, global = true)]
    log_level: CliLogLevel,

    /// Directory receiving the trace log of the last run
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(error) = init_tracing(cli.log_level.as_tracing_level(), cli.logs_dir.as_deref()) {
        eprintln!("Warning: {error}");
    }

    match commands::handle_command(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {error:#}");
            let configuration = error
                .downcast_ref::<SimkernError>()
                .is_some_and(SimkernError::is_configuration_error);
            if configuration {
                ExitCode::from(CONFIGURATION_EXIT_CODE)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

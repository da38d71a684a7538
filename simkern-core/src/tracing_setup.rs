//! Tracing setup for simkern programs
//!
//! Console output follows the user's level (or `RUST_LOG`), while every event
//! down to `trace` is written to `logs/simkern-last-run.log` so a run's clock
//! advances and action completions can be inspected afterwards.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File name of the per-run trace log, overwritten on every run.
pub const LOG_FILE_NAME: &str = "simkern-last-run.log";

/// Errors installing the global subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TracingSetupError {
    #[error("Cannot prepare log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("A global tracing subscriber is already installed")]
    AlreadyInstalled,
}

/// Installs the console + file subscriber and returns the log file path.
///
/// `logs_dir` defaults to `./logs`.
///
/// # Errors
///
/// - `TracingSetupError::LogFile` - Directory or file cannot be created
/// - `TracingSetupError::AlreadyInstalled` - Another subscriber owns the process
pub fn init_tracing(
    console_level: Level,
    logs_dir: Option<&Path>,
) -> Result<PathBuf, TracingSetupError> {
    let logs_path = logs_dir.unwrap_or_else(|| Path::new("logs"));
    let log_file_path = logs_path.join(LOG_FILE_NAME);

    let log_file = create_dir_all(logs_path)
        .and_then(|()| File::create(&log_file_path))
        .map_err(|source| TracingSetupError::LogFile {
            path: log_file_path.clone(),
            source,
        })?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.to_string()));

    let console_layer = fmt::layer()
        .with_target(true)
        .without_time()
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(EnvFilter::new("trace"));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|_| TracingSetupError::AlreadyInstalled)?;

    tracing::info!(
        "Tracing initialized: console={}, trace_file={}",
        console_level,
        log_file_path.display()
    );

    Ok(log_file_path)
}

/// Console verbosity selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Only failed actors and fatal diagnostics
    Error,
    /// Also deadlocks and version warnings
    #[default]
    Warn,
    /// Also platform creation and run summaries
    Info,
    /// Also every clock advance and action completion
    Debug,
    Trace,
}

impl CliLogLevel {
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parses_like_the_command_line() {
        use clap::ValueEnum;

        assert_eq!(CliLogLevel::from_str("debug", false), Ok(CliLogLevel::Debug));
        assert_eq!(CliLogLevel::from_str("TRACE", true), Ok(CliLogLevel::Trace));
        assert!(CliLogLevel::from_str("verbose", true).is_err());
        assert_eq!(CliLogLevel::value_variants().len(), 5);
    }

    #[test]
    fn test_level_mapping() {
        assert_eq!(CliLogLevel::Debug.as_tracing_level(), Level::DEBUG);
        assert_eq!(CliLogLevel::default().as_tracing_level(), Level::WARN);
    }

    #[test]
    fn test_init_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("nested").join("logs");

        // Installation may race with other tests in this process; the file is
        // created either way.
        let _ = init_tracing(Level::WARN, Some(&logs));

        assert!(logs.join(LOG_FILE_NAME).exists());
    }
}

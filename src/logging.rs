//! Logging setup for the binary.
//!
//! Console output goes to stderr so stdout stays free for the run summary;
//! an optional log file receives the same events without colors through a
//! background writer thread. `RUST_LOG` overrides the configured level when
//! set.

use crate::error::{ConfigError, ConfigResult};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// How the subscriber is built.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base level (trace, debug, info, warn, error).
    pub level: String,
    /// Raise the level to at least `debug`.
    pub verbose: bool,
    /// Lower the level to `warn`.
    pub quiet: bool,
    /// Also append events to this file.
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            verbose: false,
            quiet: false,
            file: None,
        }
    }
}

impl LogConfig {
    /// Filter directive for this configuration.
    fn directive(&self) -> String {
        if self.verbose && self.level != "trace" {
            "debug".to_string()
        } else if self.quiet {
            "warn".to_string()
        } else {
            self.level.to_lowercase()
        }
    }

    fn filter(&self) -> ConfigResult<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(self.directive()).map_err(|e| ConfigError::InvalidValue {
            field: "log-level",
            reason: e.to_string(),
        })
    }
}

/// Open `path` for appending behind a non-blocking writer.
fn file_writer(path: &Path) -> ConfigResult<(NonBlocking, WorkerGuard)> {
    let handle = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ConfigError::InvalidValue {
            field: "log-file",
            reason: format!("{}: {}", path.display(), e),
        })?;
    Ok(tracing_appender::non_blocking(handle))
}

/// Install the global subscriber.
///
/// With a log file, the returned guard must be held until exit; dropping it
/// flushes whatever the writer thread has not written yet.
pub fn init(config: &LogConfig) -> ConfigResult<Option<WorkerGuard>> {
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(config.filter()?);

    let mut guard = None;
    let file = match &config.file {
        Some(path) => {
            let (writer, file_guard) = file_writer(path)?;
            guard = Some(file_guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(writer)
                    .with_filter(config.filter()?),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| ConfigError::InvalidValue {
            field: "log-level",
            reason: e.to_string(),
        })?;

    tracing::debug!(level = %config.directive(), file = ?config.file, "logging initialized");
    Ok(guard)
}

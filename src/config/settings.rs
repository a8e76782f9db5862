//! Settings file, paths and run configuration.
//!
//! Values resolve in three layers: command line over `settings.json` over
//! built-in defaults. [`RunConfig::resolve`] does the merge and validates
//! the result.

use crate::error::{ConfigError, ConfigResult};
use crate::output::OutputFormat;
use crate::scanner::ScanType;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Task-queue slots per worker when no capacity is configured.
pub const QUEUE_SLOTS_PER_WORKER: usize = 1024;

/// Application directory paths following the XDG Base Directory Specification.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Configuration directory (~/.config/portrunner)
    pub config_dir: PathBuf,
}

impl Paths {
    /// Locate the per-user directories. Nothing is created.
    pub fn new() -> ConfigResult<Self> {
        let project = ProjectDirs::from("com", "portrunner", "portrunner")
            .ok_or(ConfigError::DirectoryNotFound)?;
        Ok(Self {
            config_dir: project.config_dir().to_path_buf(),
        })
    }

    /// Get the path to the settings file.
    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join("settings.json")
    }
}

/// Defaults read from `settings.json`. Missing keys take built-in values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Per-probe timeout in milliseconds.
    pub timeout_ms: u64,
    /// Per-worker delay between probes in milliseconds.
    pub delay_ms: u64,
    /// Task queue capacity; `workers × 1024` when unset.
    pub queue: Option<usize>,
    /// Result file.
    pub output: PathBuf,
    /// Result file format.
    pub format: OutputFormat,
    /// Probe strategy.
    pub scan_type: ScanType,
    /// Ping hosts before probing their ports.
    pub ping: bool,
    /// Where an interrupted run saves its remaining targets.
    pub checkpoint: PathBuf,
    /// First source port used by raw SYN workers.
    pub source_port_base: u16,
    /// Probes per second across all workers, 0 for unlimited.
    pub rate: u32,
    /// Log level when none is given on the command line.
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: 1,
            timeout_ms: 100,
            delay_ms: 100,
            queue: None,
            output: PathBuf::from("results.csv"),
            format: OutputFormat::Csv,
            scan_type: ScanType::Connect,
            ping: true,
            checkpoint: PathBuf::from("checkpoint.json"),
            source_port_base: 10_000,
            rate: 0,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings.
    ///
    /// An explicit path must exist. The default location is optional: when
    /// it is missing (or there is no home directory) the defaults apply.
    pub fn load(explicit: Option<&Path>) -> ConfigResult<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        let file = match Paths::new() {
            Ok(paths) => paths.settings_file(),
            Err(e) => {
                debug!(error = %e, "no configuration directory, using defaults");
                return Ok(Self::default());
            }
        };
        if !file.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&file)
    }

    /// Load settings from a specific file.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        serde_json::from_str(&content).map_err(|e| {
            ConfigError::InvalidFormat(format!("{}: {}", path.display(), e))
        })
    }
}

/// Values given on the command line; `None` defers to the settings file.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub workers: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub delay_ms: Option<u64>,
    pub queue: Option<usize>,
    pub output: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub scan_type: Option<ScanType>,
    pub no_ping: bool,
    pub checkpoint: Option<PathBuf>,
    pub source_port_base: Option<u16>,
    pub rate: Option<u32>,
    pub dry_run: bool,
    pub progress: bool,
}

/// Fully resolved and validated settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub workers: usize,
    pub timeout: Duration,
    pub delay: Duration,
    pub queue_capacity: usize,
    pub output: PathBuf,
    pub format: OutputFormat,
    pub scan_type: ScanType,
    pub ping: bool,
    pub checkpoint: PathBuf,
    pub source_port_base: u16,
    pub rate: u32,
    pub dry_run: bool,
    pub progress: bool,
}

impl RunConfig {
    /// Merge command-line values over `settings` and validate.
    pub fn resolve(settings: &Settings, cli: &RunOverrides) -> ConfigResult<Self> {
        let workers = cli.workers.unwrap_or(settings.workers);
        if workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "workers",
                reason: "must be greater than 0".to_string(),
            });
        }

        let timeout_ms = cli.timeout_ms.unwrap_or(settings.timeout_ms);
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "timeout",
                reason: "must be greater than 0".to_string(),
            });
        }

        let queue_capacity = match cli.queue.or(settings.queue) {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    field: "queue",
                    reason: "must be greater than 0".to_string(),
                })
            }
            Some(capacity) => capacity,
            None => workers.saturating_mul(QUEUE_SLOTS_PER_WORKER),
        };

        let scan_type = cli.scan_type.unwrap_or(settings.scan_type);
        let source_port_base = cli.source_port_base.unwrap_or(settings.source_port_base);
        if scan_type == ScanType::Syn && !cli.dry_run {
            let last = usize::from(source_port_base) + workers - 1;
            if source_port_base == 0 || last > usize::from(u16::MAX) {
                return Err(ConfigError::InvalidValue {
                    field: "source-port-base",
                    reason: format!(
                        "{} workers starting at {} run past port 65535",
                        workers, source_port_base
                    ),
                });
            }
        }

        Ok(Self {
            workers,
            timeout: Duration::from_millis(timeout_ms),
            delay: Duration::from_millis(cli.delay_ms.unwrap_or(settings.delay_ms)),
            queue_capacity,
            output: cli.output.clone().unwrap_or_else(|| settings.output.clone()),
            format: cli.format.unwrap_or(settings.format),
            scan_type,
            ping: settings.ping && !cli.no_ping,
            checkpoint: cli
                .checkpoint
                .clone()
                .unwrap_or_else(|| settings.checkpoint.clone()),
            source_port_base,
            rate: cli.rate.unwrap_or(settings.rate),
            dry_run: cli.dry_run,
            progress: cli.progress,
        })
    }
}

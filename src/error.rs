//! Error types for portrunner.
//!
//! Uses `thiserror` for ergonomic error definitions. Each layer has its own
//! enum; [`CliError`] folds them together at the command boundary.

use crate::types::{PortError, TargetError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while performing a single probe or building a strategy.
///
/// Probe-time variants are never fatal: they are attached to a
/// [`ProbeResult`](crate::scanner::ProbeResult) and written out as a record.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("connection to {target} failed: {reason}")]
    ConnectionFailed { target: String, reason: String },

    #[error("connection timed out")]
    Timeout,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("connection reset")]
    ConnectionReset,

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("host unreachable")]
    HostUnreachable,

    #[error("invalid target address: {0}")]
    InvalidAddress(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("raw socket error: {0}")]
    RawSocketError(String),

    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ScanError {
    /// Whether this error belongs to the timeout class.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }
}

/// Result type alias for scan operations.
pub type ScanResult<T> = Result<T, ScanError>;

/// Errors in configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine configuration directory")]
    DirectoryNotFound,

    #[error("failed to read {path}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    #[error("invalid settings file: {0}")]
    InvalidFormat(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("missing required input: {0}")]
    MissingInput(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors loading or saving a checkpoint snapshot.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read checkpoint {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt checkpoint {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("failed to write checkpoint {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode checkpoint: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Result type alias for checkpoint operations.
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// Errors in the result sink.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to create output file {path}: {source}")]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write record: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to encode record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("reporter task failed: {0}")]
    Task(String),
}

/// Result type alias for reporter operations.
pub type ReportResult<T> = Result<T, ReportError>;

/// Errors that end a scan run after workers have started.
///
/// The engine still waits for in-flight probes and the reporter before
/// returning one of these.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("{0} task panicked or was aborted")]
    Task(&'static str),
}

/// Result type alias for engine runs.
pub type EngineResult<T> = Result<T, EngineError>;

/// Top-level error for CLI commands.
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("no targets to scan; check host reachability and inputs")]
    NoTargets,

    #[error("{0}")]
    Other(String),
}

/// Result type alias for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_class() {
        assert!(ScanError::Timeout.is_timeout());
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "deadline");
        assert!(ScanError::Io(io).is_timeout());
        assert!(!ScanError::ConnectionRefused.is_timeout());
    }

    #[test]
    fn test_error_display() {
        let err = ScanError::ConnectionFailed {
            target: "10.0.0.1:22".to_string(),
            reason: "reset".to_string(),
        };
        assert_eq!(err.to_string(), "connection to 10.0.0.1:22 failed: reset");
    }
}

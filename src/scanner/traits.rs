//! Probe strategy abstraction.
//!
//! Defines the common contract every probe strategy implements, plus the
//! outcome and result types that flow from workers to the reporter.

use crate::error::ScanError;
use crate::types::Target;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Classified outcome of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProbeOutcome {
    /// Handshake completed or SYN+ACK received.
    #[serde(rename = "OPEN")]
    Open,
    /// Connection refused, reset or unreachable; RST received.
    #[serde(rename = "CLOSED")]
    Closed,
    /// No answer before the deadline.
    #[serde(rename = "FILTERED")]
    Filtered,
    /// The probe itself could not be carried out.
    #[serde(rename = "ERROR")]
    Error,
    /// Dry run: nothing was sent.
    #[serde(rename = "DRYRUN")]
    DryRun,
}

impl ProbeOutcome {
    /// All outcomes, in reporting order.
    pub const ALL: [ProbeOutcome; 5] = [
        Self::Open,
        Self::Closed,
        Self::Filtered,
        Self::Error,
        Self::DryRun,
    ];

    /// Label used in output records.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
            Self::Filtered => "FILTERED",
            Self::Error => "ERROR",
            Self::DryRun => "DRYRUN",
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of probing one target.
///
/// Produced exactly once per dispatched target, by the worker that probed
/// it, and consumed exactly once by the reporter.
#[derive(Debug)]
pub struct ProbeResult {
    /// When the probe started.
    pub timestamp: DateTime<Utc>,
    /// What was probed.
    pub target: Target,
    /// Classified outcome.
    pub outcome: ProbeOutcome,
    /// Wall-clock time spent in the probe, measured on failure too.
    pub latency: Duration,
    /// Underlying failure, if any.
    pub error: Option<ScanError>,
}

impl ProbeResult {
    /// Create a new probe result with no error attached.
    pub fn new(
        target: Target,
        outcome: ProbeOutcome,
        timestamp: DateTime<Utc>,
        latency: Duration,
    ) -> Self {
        Self {
            timestamp,
            target,
            outcome,
            latency,
            error: None,
        }
    }

    /// Attach the underlying failure.
    pub fn with_error(mut self, error: ScanError) -> Self {
        self.error = Some(error);
        self
    }

    /// Latency in fractional milliseconds.
    pub fn latency_ms(&self) -> f64 {
        self.latency.as_secs_f64() * 1000.0
    }

    /// Check if the target answered as open.
    pub fn is_open(&self) -> bool {
        self.outcome == ProbeOutcome::Open
    }
}

/// Available probe strategies on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ScanType {
    /// TCP connect scan (default, no special privileges required).
    #[default]
    Connect,
    /// SYN scan over a raw socket (requires root/admin privileges).
    Syn,
}

impl fmt::Display for ScanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Syn => write!(f, "syn"),
        }
    }
}

/// Trait for probe strategy implementations.
///
/// Each worker owns its own instance; the strategy kind is chosen once at
/// startup and never changes during a run.
///
/// # Example
///
/// ```ignore
/// use portrunner::scanner::{Prober, ProbeResult};
/// use portrunner::types::Target;
///
/// async fn probe_one<P: Prober + ?Sized>(prober: &P, target: Target) -> ProbeResult {
///     prober.probe(target).await
/// }
/// ```
#[async_trait]
pub trait Prober: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Probe a single target. Never fails: every failure is classified into
    /// the returned result.
    async fn probe(&self, target: Target) -> ProbeResult;
}

/// A boxed prober for dynamic dispatch.
pub type BoxedProber = Box<dyn Prober>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(ProbeOutcome::Open.to_string(), "OPEN");
        assert_eq!(ProbeOutcome::DryRun.to_string(), "DRYRUN");
        assert_eq!(
            serde_json::to_string(&ProbeOutcome::Filtered).unwrap(),
            "\"FILTERED\""
        );
    }

    #[test]
    fn test_scan_type_settings_encoding() {
        assert_eq!(serde_json::to_string(&ScanType::Syn).unwrap(), "\"syn\"");
        let parsed: ScanType = serde_json::from_str("\"connect\"").unwrap();
        assert_eq!(parsed, ScanType::Connect);
        assert!(serde_json::from_str::<ScanType>("\"udp\"").is_err());
    }

    #[test]
    fn test_probe_result_latency() {
        let result = ProbeResult::new(
            Target::new("127.0.0.1", 80),
            ProbeOutcome::Closed,
            Utc::now(),
            Duration::from_micros(1500),
        )
        .with_error(ScanError::ConnectionRefused);

        assert!(!result.is_open());
        assert!((result.latency_ms() - 1.5).abs() < 1e-9);
        assert!(result.error.is_some());
    }
}

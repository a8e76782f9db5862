//! Dry-run probe: exercises enumeration and pacing without touching the network.

use crate::scanner::traits::{ProbeOutcome, ProbeResult, Prober};
use crate::types::Target;
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;

/// Prober that never sends anything and always reports `DRYRUN`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunScanner;

#[async_trait]
impl Prober for DryRunScanner {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn probe(&self, target: Target) -> ProbeResult {
        ProbeResult::new(target, ProbeOutcome::DryRun, Utc::now(), Duration::ZERO)
    }
}

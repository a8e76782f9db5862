//! The pipeline shared by `scan` and `resume`: enumerate, prefilter, probe.

use super::checks;
use crate::config::{RunConfig, Settings};
use crate::engine::{self, ScanJob};
use crate::error::{CliError, CliResult};
use crate::output::{self, Reporter};
use crate::scanner::{self, RateLimiter};
use crate::storage::CheckpointSnapshot;
use crate::types::{expand_targets, load_hosts, PortSpec, Target};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// State every command runs with.
#[derive(Debug, Clone)]
pub struct Context {
    /// Values from the settings file (or defaults).
    pub settings: Settings,
    pub verbose: bool,
    pub quiet: bool,
    /// Fired on Ctrl-C / SIGTERM.
    pub cancel: CancellationToken,
}

/// Build the target list from address and port specs.
///
/// Hosts are pinged first unless the prefilter is off or this is a dry run.
pub(super) async fn enumerate(
    ip: &str,
    port: &str,
    config: &RunConfig,
    cancel: &CancellationToken,
) -> CliResult<Vec<Target>> {
    let hosts = load_hosts(ip)?;
    let ports = PortSpec::load(port)?.to_ports();
    debug!(hosts = hosts.len(), ports = ports.len(), "inputs parsed");

    let hosts = if config.ping && !config.dry_run {
        prefilter(hosts, config, cancel).await
    } else {
        hosts
    };

    let targets = expand_targets(&hosts, &ports);
    debug!(targets = targets.len(), "target list built");
    Ok(targets)
}

async fn prefilter(hosts: Vec<String>, config: &RunConfig, cancel: &CancellationToken) -> Vec<String> {
    let method = scanner::detect_ping_method();
    let workers = config.workers.min(hosts.len()).max(1);
    info!(hosts = hosts.len(), workers, ?method, "pinging hosts");

    let pingers = (0..workers)
        .map(|id| scanner::create_pinger(method, id, config.timeout))
        .collect();
    engine::filter_reachable(hosts, pingers, cancel).await
}

/// Where a run's targets came from.
#[derive(Debug)]
pub(super) enum TargetSource {
    /// Freshly enumerated; the result file is truncated.
    Fresh(Vec<Target>),
    /// Loaded from a checkpoint; results are appended and the file is
    /// deleted once probing is certain to start.
    Checkpoint {
        path: PathBuf,
        snapshot: CheckpointSnapshot,
    },
}

impl TargetSource {
    fn is_empty(&self) -> bool {
        match self {
            Self::Fresh(targets) => targets.is_empty(),
            Self::Checkpoint { snapshot, .. } => snapshot.is_empty(),
        }
    }
}

/// Probe the targets of `source` and report.
///
/// Every start-up step that can fail runs before a resumed checkpoint is
/// deleted, so a failed start leaves it in place. Cancellation from here on
/// is handled by the engine, which writes a fresh checkpoint of whatever
/// it did not dispatch.
pub(super) async fn execute(ctx: &Context, config: RunConfig, source: TargetSource) -> CliResult<()> {
    if source.is_empty() {
        if ctx.cancel.is_cancelled() {
            warn!("interrupted before any target was enumerated");
            return Ok(());
        }
        return Err(CliError::NoTargets);
    }
    checks::warn_about_environment(&config, ctx.quiet);

    // Probers before the output file: a strategy that cannot start must not
    // truncate previous results.
    let probers = scanner::create_probers(
        config.scan_type,
        config.dry_run,
        config.workers,
        config.timeout,
        config.source_port_base,
    )?;

    let append = matches!(source, TargetSource::Checkpoint { .. });
    let mut reporter = Reporter::create(&config.output, config.format, append)?;

    let targets = match source {
        TargetSource::Fresh(targets) => targets,
        TargetSource::Checkpoint { path, snapshot } => {
            CheckpointSnapshot::discard(&path);
            snapshot.remaining
        }
    };
    if config.progress && !ctx.quiet {
        reporter = reporter.with_progress(targets.len() as u64);
    }

    if !ctx.quiet {
        output::print_run_header(targets.len(), config.workers, config.scan_type, config.dry_run);
    }
    info!(
        targets = targets.len(),
        workers = config.workers,
        scan_type = %config.scan_type,
        dry_run = config.dry_run,
        output = %config.output.display(),
        "starting scan"
    );

    let job = ScanJob {
        targets,
        probers,
        queue_capacity: config.queue_capacity,
        delay: config.delay,
        rate: RateLimiter::per_second(config.rate),
        checkpoint_path: config.checkpoint.clone(),
    };
    let report = engine::run_scan(job, reporter, ctx.cancel.clone()).await?;

    if !ctx.quiet {
        output::print_summary(&report, &config.output);
    }
    Ok(())
}

//! The probing engine.
//!
//! One run wires a producer, the bounded task queue, the worker pool and
//! the reporter together:
//!
//! ```text
//! targets -> producer -> task queue -> workers (one prober each) -> results -> reporter
//! ```
//!
//! Cancellation is a single shared token. When it fires the producer stops
//! and hands back what it had not enqueued, the queue is drained, and both
//! together become the checkpoint. Workers finish the probe they are on,
//! and the reporter writes every result that was produced before it stops.

pub mod prefilter;
pub mod queue;
pub mod worker;

pub use prefilter::filter_reachable;
pub use queue::{QueueError, QueueReceiver, QueueSender};
pub use worker::{spawn_pool, Worker, WorkerSettings};

use crate::error::{CheckpointResult, EngineError, EngineResult};
use crate::output::{ReportSummary, Reporter};
use crate::scanner::{BoxedProber, RateLimiter};
use crate::storage::CheckpointSnapshot;
use crate::types::Target;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Everything one run needs besides the reporter.
pub struct ScanJob {
    /// Targets to probe, in dispatch order.
    pub targets: Vec<Target>,
    /// One prober per worker.
    pub probers: Vec<BoxedProber>,
    /// Task queue bound.
    pub queue_capacity: usize,
    /// Per-worker pause after each probe.
    pub delay: Duration,
    /// Optional pool-wide rate cap.
    pub rate: Option<RateLimiter>,
    /// Where undispatched targets go on interrupt.
    pub checkpoint_path: PathBuf,
}

/// Outcome of a finished run.
#[derive(Debug)]
pub struct ScanReport {
    /// Records written, per outcome.
    pub summary: ReportSummary,
    /// Whether cancellation ended the run.
    pub interrupted: bool,
    /// Checkpoint written on interrupt, with the number of targets in it.
    pub checkpoint: Option<(PathBuf, usize)>,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// Run a scan to completion or until `cancel` fires.
///
/// The reporter must already be open (header written), so a bad output
/// path fails before any probe is sent. Even when the checkpoint cannot be
/// written this waits for the workers and the reporter before returning
/// the error.
pub async fn run_scan(
    job: ScanJob,
    reporter: Reporter,
    cancel: CancellationToken,
) -> EngineResult<ScanReport> {
    let start = Instant::now();
    info!(
        targets = job.targets.len(),
        workers = job.probers.len(),
        queue = job.queue_capacity,
        "scan started"
    );

    let (task_tx, task_rx) = queue::bounded(job.queue_capacity);
    let (result_tx, result_rx) = mpsc::channel(job.queue_capacity.max(1));
    let reporter = reporter.spawn(result_rx);

    let settings = WorkerSettings {
        delay: job.delay,
        rate: job.rate,
    };
    let handles = spawn_pool(job.probers, &task_rx, &result_tx, &settings, &cancel);
    drop(result_tx);

    let producer = tokio::spawn(produce(job.targets, task_tx, cancel.clone()));

    let pool = futures::future::join_all(handles);
    tokio::pin!(pool);
    let (interrupted, finished) = tokio::select! {
        biased;
        _ = cancel.cancelled() => (true, None),
        done = &mut pool => (false, Some(done)),
    };

    let mut checkpoint = Ok(None);
    if interrupted {
        info!("interrupt received, stopping target production");
        let mut pending = task_rx.drain().await;
        pending.extend(join_producer(producer).await);
        checkpoint = write_checkpoint(pending, &job.checkpoint_path);
    } else {
        // The pool only finishes early if the result sink went away.
        task_rx.close().await;
        let mut stranded = join_producer(producer).await;
        stranded.extend(task_rx.drain().await);
        if !stranded.is_empty() {
            warn!(count = stranded.len(), "targets left unprobed after workers stopped");
        }
    }

    let finished = match finished {
        Some(done) => done,
        None => pool.await,
    };
    let mut probed = 0usize;
    for handle in finished {
        match handle {
            Ok(count) => probed += count,
            Err(e) => error!(error = %e, "worker task failed"),
        }
    }

    let summary = match reporter.await {
        Ok(Ok(summary)) => summary,
        Ok(Err(e)) => {
            if let Err(cp) = &checkpoint {
                error!(error = %cp, "checkpoint also failed");
            }
            return Err(e.into());
        }
        Err(_) => return Err(EngineError::Task("reporter")),
    };
    let checkpoint = checkpoint?;

    let elapsed = start.elapsed();
    info!(
        probed,
        written = summary.total(),
        interrupted,
        elapsed_ms = elapsed.as_millis() as u64,
        "scan finished"
    );

    Ok(ScanReport {
        summary,
        interrupted,
        checkpoint: checkpoint.map(|len| (job.checkpoint_path, len)),
        elapsed,
    })
}

/// Feed `targets` into the queue; return whatever could not be enqueued.
async fn produce(
    targets: Vec<Target>,
    queue: QueueSender<Target>,
    cancel: CancellationToken,
) -> Vec<Target> {
    let mut targets = targets.into_iter();
    while let Some(target) = targets.next() {
        if let Err(e) = queue.send_until(target, &cancel).await {
            let mut rest = vec![e.into_inner()];
            rest.extend(targets);
            return rest;
        }
    }
    Vec::new()
}

async fn join_producer(producer: tokio::task::JoinHandle<Vec<Target>>) -> Vec<Target> {
    producer.await.unwrap_or_else(|e| {
        error!(error = %e, "producer task failed");
        Vec::new()
    })
}

fn write_checkpoint(pending: Vec<Target>, path: &Path) -> CheckpointResult<Option<usize>> {
    if pending.is_empty() {
        info!("no undispatched targets, no checkpoint written");
        return Ok(None);
    }
    let snapshot = CheckpointSnapshot::new(pending);
    snapshot.save(path)?;
    Ok(Some(snapshot.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputFormat;
    use crate::scanner::{DryRunScanner, ProbeOutcome, ProbeResult, Prober};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Dry-run prober that fires the cancellation token on its n-th probe.
    struct CancelOnProbe {
        nth: usize,
        seen: Arc<AtomicUsize>,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl Prober for CancelOnProbe {
        fn name(&self) -> &'static str {
            "cancel-on-probe"
        }

        async fn probe(&self, target: Target) -> ProbeResult {
            if self.seen.fetch_add(1, Ordering::SeqCst) + 1 == self.nth {
                self.cancel.cancel();
            }
            ProbeResult::new(target, ProbeOutcome::DryRun, Utc::now(), Duration::ZERO)
        }
    }

    fn targets(n: u16) -> Vec<Target> {
        (1..=n).map(|port| Target::new("192.0.2.7", port)).collect()
    }

    fn job(targets: Vec<Target>, probers: Vec<BoxedProber>, capacity: usize, dir: &TempDir) -> ScanJob {
        ScanJob {
            targets,
            probers,
            queue_capacity: capacity,
            delay: Duration::ZERO,
            rate: None,
            checkpoint_path: dir.path().join("checkpoint.json"),
        }
    }

    fn dry_run(workers: usize) -> Vec<BoxedProber> {
        (0..workers).map(|_| Box::new(DryRunScanner) as BoxedProber).collect()
    }

    fn cancel_on(nth: usize, cancel: &CancellationToken) -> Vec<BoxedProber> {
        vec![Box::new(CancelOnProbe {
            nth,
            seen: Arc::new(AtomicUsize::new(0)),
            cancel: cancel.clone(),
        })]
    }

    fn read_rows(path: &Path) -> Vec<(String, u16, String)> {
        let mut rdr = csv::Reader::from_path(path).unwrap();
        rdr.records()
            .map(|r| {
                let r = r.unwrap();
                (r[1].to_string(), r[2].parse().unwrap(), r[3].to_string())
            })
            .collect()
    }

    #[tokio::test]
    async fn test_dry_run_writes_every_target() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("results.csv");
        let reporter = Reporter::create(&output, OutputFormat::Csv, false).unwrap();

        let report = run_scan(job(targets(100), dry_run(3), 10, &dir), reporter, CancellationToken::new())
            .await
            .unwrap();

        assert!(!report.interrupted);
        assert!(report.checkpoint.is_none());
        assert_eq!(report.summary.count(ProbeOutcome::DryRun), 100);

        let rows = read_rows(&output);
        assert_eq!(rows.len(), 100);
        assert!(rows.iter().all(|(_, _, status)| status == "DRYRUN"));
        let ports: HashSet<u16> = rows.iter().map(|(_, port, _)| *port).collect();
        assert_eq!(ports.len(), 100);
        assert!(!dir.path().join("checkpoint.json").exists());
    }

    #[tokio::test]
    async fn test_interrupt_checkpoints_the_rest_and_resumes() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("results.csv");
        let cancel = CancellationToken::new();

        let reporter = Reporter::create(&output, OutputFormat::Csv, false).unwrap();
        let report = run_scan(job(targets(5), cancel_on(2, &cancel), 10, &dir), reporter, cancel)
            .await
            .unwrap();

        assert!(report.interrupted);
        assert_eq!(report.summary.total(), 2);
        let (path, saved) = report.checkpoint.expect("checkpoint written");
        assert_eq!(saved, 3);

        let snapshot = CheckpointSnapshot::load(&path).unwrap();
        CheckpointSnapshot::discard(&path);
        let first: HashSet<u16> = read_rows(&output).into_iter().map(|(_, p, _)| p).collect();
        let rest: HashSet<u16> = snapshot.remaining.iter().map(|t| t.port).collect();
        assert!(first.is_disjoint(&rest));

        let reporter = Reporter::create(&output, OutputFormat::Csv, true).unwrap();
        let resumed = run_scan(
            job(snapshot.remaining, dry_run(2), 10, &dir),
            reporter,
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(resumed.summary.total(), 3);

        let all: HashSet<u16> = read_rows(&output).into_iter().map(|(_, p, _)| p).collect();
        assert_eq!(all, (1..=5).collect());
    }

    #[tokio::test]
    async fn test_interrupt_with_more_targets_than_capacity() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("results.csv");
        let cancel = CancellationToken::new();

        let reporter = Reporter::create(&output, OutputFormat::Csv, false).unwrap();
        let report = run_scan(job(targets(50), cancel_on(5, &cancel), 2, &dir), reporter, cancel)
            .await
            .unwrap();

        let probed: Vec<u16> = read_rows(&output).into_iter().map(|(_, p, _)| p).collect();
        assert_eq!(probed.len(), 5);

        let (path, saved) = report.checkpoint.expect("checkpoint written");
        let snapshot = CheckpointSnapshot::load(&path).unwrap();
        assert_eq!(saved, 45);

        let mut seen: HashSet<u16> = probed.into_iter().collect();
        for target in &snapshot.remaining {
            assert!(seen.insert(target.port), "target {} both probed and saved", target);
        }
        assert_eq!(seen, (1..=50).collect());
    }

    #[tokio::test]
    async fn test_checkpoint_failure_still_drains_reporter() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("results.csv");
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let cancel = CancellationToken::new();

        let mut scan = job(targets(6), cancel_on(2, &cancel), 10, &dir);
        scan.checkpoint_path = blocker.join("checkpoint.json");
        let reporter = Reporter::create(&output, OutputFormat::Csv, false).unwrap();

        let err = run_scan(scan, reporter, cancel).await.unwrap_err();
        assert!(matches!(err, EngineError::Checkpoint(_)));
        assert_eq!(read_rows(&output).len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("results.jsonl");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let reporter = Reporter::create(&output, OutputFormat::Jsonl, false).unwrap();
        let report = run_scan(job(targets(8), dry_run(2), 4, &dir), reporter, cancel)
            .await
            .unwrap();

        assert!(report.interrupted);
        assert_eq!(report.summary.total(), 0);
        assert_eq!(report.checkpoint.map(|(_, n)| n), Some(8));
    }

    #[tokio::test]
    async fn test_producer_hands_back_unsent_targets() {
        let (tx, rx) = queue::bounded(3);
        let producer = tokio::spawn(produce(targets(10), tx, CancellationToken::new()));

        let first = rx.recv().await.unwrap();
        let buffered = rx.drain().await;
        let rest = producer.await.unwrap();

        let ports: Vec<u16> = std::iter::once(first)
            .chain(buffered)
            .chain(rest)
            .map(|t| t.port)
            .collect();
        assert_eq!(ports, (1..=10).collect::<Vec<_>>());
    }
}

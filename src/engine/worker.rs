//! Worker pool: each worker pulls targets, probes them and publishes results.

use crate::engine::queue::QueueReceiver;
use crate::scanner::{BoxedProber, ProbeResult, RateLimiter};
use crate::types::Target;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Settings shared by every worker in the pool.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Pause after each probe.
    pub delay: Duration,
    /// Optional cap across the whole pool.
    pub rate: Option<RateLimiter>,
}

/// One execution unit of the pool, bound to its own prober.
pub struct Worker {
    id: usize,
    prober: BoxedProber,
    tasks: QueueReceiver<Target>,
    results: mpsc::Sender<ProbeResult>,
    settings: WorkerSettings,
    cancel: CancellationToken,
}

impl Worker {
    pub fn new(
        id: usize,
        prober: BoxedProber,
        tasks: QueueReceiver<Target>,
        results: mpsc::Sender<ProbeResult>,
        settings: WorkerSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            prober,
            tasks,
            results,
            settings,
            cancel,
        }
    }

    /// Run until the queue is exhausted or cancellation is observed.
    ///
    /// The rate token is taken before a target is dequeued, so a worker
    /// waiting on the cap never holds a target it has not started. A probe
    /// that has started always completes and its result is published, even
    /// if cancellation arrives meanwhile. Returns the number of probes
    /// performed.
    pub async fn run(self) -> usize {
        let mut probed = 0usize;
        debug!(worker = self.id, prober = self.prober.name(), "worker started");

        loop {
            if let Some(rate) = &self.settings.rate {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    _ = rate.wait() => {}
                }
            }

            let target = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = self.tasks.recv() => match next {
                    Some(target) => target,
                    None => break,
                },
            };

            trace!(worker = self.id, target = %target, "probing");
            let result = self.prober.probe(target).await;
            probed += 1;

            if self.results.send(result).await.is_err() {
                warn!(worker = self.id, "result sink closed, stopping worker");
                break;
            }

            if !self.settings.delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.settings.delay) => {}
                }
            }
        }

        debug!(worker = self.id, probed, "worker stopped");
        probed
    }
}

/// Spawn one worker per prober; worker `i` gets `probers[i]`.
///
/// Each worker holds a clone of `results`; the channel closes once the
/// last worker exits and the caller has dropped its own sender.
pub fn spawn_pool(
    probers: Vec<BoxedProber>,
    tasks: &QueueReceiver<Target>,
    results: &mpsc::Sender<ProbeResult>,
    settings: &WorkerSettings,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<usize>> {
    probers
        .into_iter()
        .enumerate()
        .map(|(id, prober)| {
            let worker = Worker::new(
                id,
                prober,
                tasks.clone(),
                results.clone(),
                settings.clone(),
                cancel.clone(),
            );
            tokio::spawn(worker.run())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::queue;
    use crate::scanner::{DryRunScanner, ProbeOutcome, Prober};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Dry-run prober that counts probes begun after `cancel` fired.
    struct LateStartCounter {
        cancel: CancellationToken,
        late: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Prober for LateStartCounter {
        fn name(&self) -> &'static str {
            "late-start-counter"
        }

        async fn probe(&self, target: Target) -> ProbeResult {
            if self.cancel.is_cancelled() {
                self.late.fetch_add(1, Ordering::SeqCst);
            }
            ProbeResult::new(target, ProbeOutcome::DryRun, Utc::now(), Duration::ZERO)
        }
    }

    fn settings() -> WorkerSettings {
        WorkerSettings {
            delay: Duration::ZERO,
            rate: None,
        }
    }

    #[tokio::test]
    async fn test_pool_probes_every_target_once() {
        let (task_tx, task_rx) = queue::bounded(4);
        let (result_tx, mut result_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let probers: Vec<BoxedProber> = (0..3).map(|_| Box::new(DryRunScanner) as _).collect();
        let handles = spawn_pool(probers, &task_rx, &result_tx, &settings(), &cancel);
        drop(result_tx);

        let producer = tokio::spawn(async move {
            for port in 1..=20 {
                task_tx.send(Target::new("192.0.2.1", port)).await.unwrap();
            }
        });

        let mut ports = Vec::new();
        while let Some(result) = result_rx.recv().await {
            assert_eq!(result.outcome, ProbeOutcome::DryRun);
            ports.push(result.target.port);
        }
        producer.await.unwrap();

        let probed: usize = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|h| h.unwrap())
            .sum();
        ports.sort_unstable();
        assert_eq!(ports, (1..=20).collect::<Vec<_>>());
        assert_eq!(probed, 20);
    }

    #[tokio::test]
    async fn test_cancelled_worker_leaves_queue_untouched() {
        let (task_tx, task_rx) = queue::bounded(8);
        let (result_tx, mut result_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        for port in 1..=5 {
            task_tx.send(Target::new("192.0.2.1", port)).await.unwrap();
        }

        cancel.cancel();
        let handles = spawn_pool(
            vec![Box::new(DryRunScanner) as BoxedProber],
            &task_rx,
            &result_tx,
            &settings(),
            &cancel,
        );
        drop(result_tx);

        assert_eq!(handles.into_iter().next().unwrap().await.unwrap(), 0);
        assert!(result_rx.recv().await.is_none());
        assert_eq!(task_rx.drain().await.len(), 5);
    }

    #[tokio::test]
    async fn test_delay_is_interrupted_by_cancel() {
        let (task_tx, task_rx) = queue::bounded(2);
        let (result_tx, mut result_rx) = mpsc::channel(2);
        let cancel = CancellationToken::new();
        task_tx.send(Target::new("192.0.2.1", 1)).await.unwrap();

        let slow = WorkerSettings {
            delay: Duration::from_secs(3600),
            rate: None,
        };
        let handles = spawn_pool(
            vec![Box::new(DryRunScanner) as BoxedProber],
            &task_rx,
            &result_tx,
            &slow,
            &cancel,
        );
        drop(result_tx);

        assert!(result_rx.recv().await.is_some());
        cancel.cancel();
        assert_eq!(handles.into_iter().next().unwrap().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancel_releases_workers_waiting_on_rate_cap() {
        let (task_tx, task_rx) = queue::bounded(16);
        let (result_tx, mut result_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        for port in 1..=10 {
            task_tx.send(Target::new("192.0.2.1", port)).await.unwrap();
        }

        let late = Arc::new(AtomicUsize::new(0));
        let probers: Vec<BoxedProber> = (0..4)
            .map(|_| {
                Box::new(LateStartCounter {
                    cancel: cancel.clone(),
                    late: late.clone(),
                }) as BoxedProber
            })
            .collect();
        let capped = WorkerSettings {
            delay: Duration::ZERO,
            rate: RateLimiter::per_second(1),
        };
        let handles = spawn_pool(probers, &task_rx, &result_tx, &capped, &cancel);
        drop(result_tx);

        // One token up front; the other workers wait about a second each.
        assert!(result_rx.recv().await.is_some());
        cancel.cancel();

        let probed: usize = tokio::time::timeout(
            Duration::from_millis(500),
            futures::future::join_all(handles),
        )
        .await
        .expect("workers kept waiting on the rate cap after cancel")
        .into_iter()
        .map(|h| h.unwrap())
        .sum();

        assert_eq!(probed, 1);
        assert_eq!(late.load(Ordering::SeqCst), 0);
        assert_eq!(task_rx.drain().await.len(), 9);
    }
}

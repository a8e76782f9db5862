//! Reachability prefilter: ping every host once and keep the ones that answer.

use crate::engine::queue::{self, QueueReceiver};
use crate::scanner::BoxedPinger;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Queue slots per pinger.
const SLOTS_PER_PINGER: usize = 64;

/// Reduce `hosts` to those that answer a ping.
///
/// One worker per pinger; worker `i` owns `pingers[i]`. Order of the
/// result is not guaranteed. On cancellation the hosts confirmed so far
/// are returned.
pub async fn filter_reachable(
    hosts: Vec<String>,
    pingers: Vec<BoxedPinger>,
    cancel: &CancellationToken,
) -> Vec<String> {
    let total = hosts.len();
    if total == 0 || pingers.is_empty() {
        return Vec::new();
    }

    let (tx, rx) = queue::bounded(pingers.len() * SLOTS_PER_PINGER);
    let producer = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            for host in hosts {
                if tx.send_until(host, &cancel).await.is_err() {
                    break;
                }
            }
        })
    };

    let workers: Vec<_> = pingers
        .into_iter()
        .enumerate()
        .map(|(id, pinger)| tokio::spawn(ping_worker(id, pinger, rx.clone(), cancel.clone())))
        .collect();

    let mut reachable = Vec::new();
    for handle in futures::future::join_all(workers).await {
        match handle {
            Ok(found) => reachable.extend(found),
            Err(e) => debug!(error = %e, "ping worker failed"),
        }
    }
    if let Err(e) = producer.await {
        debug!(error = %e, "ping producer failed");
    }

    info!(total, reachable = reachable.len(), "prefilter finished");
    reachable
}

async fn ping_worker(
    id: usize,
    pinger: BoxedPinger,
    hosts: QueueReceiver<String>,
    cancel: CancellationToken,
) -> Vec<String> {
    let mut found = Vec::new();
    loop {
        let host = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = hosts.recv() => match next {
                Some(host) => host,
                None => break,
            },
        };

        if pinger.ping(&host).await {
            debug!(worker = id, host = %host, "host reachable");
            found.push(host);
        } else {
            debug!(worker = id, host = %host, "host unreachable");
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::Pinger;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakePinger {
        up: Arc<HashSet<String>>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Pinger for FakePinger {
        async fn ping(&self, host: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.up.contains(host)
        }
    }

    fn pingers(up: &[&str], n: usize, calls: &Arc<AtomicUsize>) -> Vec<BoxedPinger> {
        let up: Arc<HashSet<String>> = Arc::new(up.iter().map(|s| s.to_string()).collect());
        (0..n)
            .map(|_| {
                Box::new(FakePinger {
                    up: Arc::clone(&up),
                    calls: Arc::clone(calls),
                }) as BoxedPinger
            })
            .collect()
    }

    #[tokio::test]
    async fn test_returns_exactly_reachable_subset() {
        let hosts: Vec<String> = (1..=200).map(|i| format!("10.0.0.{}", i)).collect();
        let up = ["10.0.0.3", "10.0.0.77", "10.0.0.150", "example.test"];
        let calls = Arc::new(AtomicUsize::new(0));

        let cancel = CancellationToken::new();
        let mut found = filter_reachable(hosts, pingers(&up, 4, &calls), &cancel).await;
        found.sort();

        assert_eq!(found, vec!["10.0.0.150", "10.0.0.3", "10.0.0.77"]);
        assert_eq!(calls.load(Ordering::SeqCst), 200);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let hosts = vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()];
        let found = filter_reachable(hosts, pingers(&["10.0.0.1"], 2, &calls), &cancel).await;

        assert!(found.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let found = filter_reachable(Vec::new(), pingers(&[], 2, &calls), &cancel).await;
        assert!(found.is_empty());
    }
}

//! Bounded multi-producer/multi-consumer task queue.
//!
//! A thin layer over `tokio::sync::mpsc`: the single receiver is shared
//! behind an async mutex so any number of workers can dequeue, and the
//! channel bound is the only backpressure in the pipeline.
//!
//! End-of-stream is reached when every [`QueueSender`] is dropped or when
//! the queue is closed explicitly; consumers still get whatever was
//! buffered before that.

use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Why an item could not be enqueued. The item is handed back either way.
#[derive(Debug, PartialEq, Eq)]
pub enum QueueError<T> {
    /// The queue was closed.
    Closed(T),
    /// Cancellation was observed before space became available.
    Cancelled(T),
}

impl<T> QueueError<T> {
    /// Recover the item that was not enqueued.
    pub fn into_inner(self) -> T {
        match self {
            Self::Closed(item) | Self::Cancelled(item) => item,
        }
    }
}

impl<T> fmt::Display for QueueError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(_) => write!(f, "task queue closed"),
            Self::Cancelled(_) => write!(f, "enqueue cancelled"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for QueueError<T> {}

/// Create a queue holding at most `capacity` items.
///
/// A capacity of 0 is raised to 1.
pub fn bounded<T>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        QueueSender { tx },
        QueueReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Producer handle.
#[derive(Debug)]
pub struct QueueSender<T> {
    tx: mpsc::Sender<T>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> QueueSender<T> {
    /// Enqueue, waiting while the queue is full.
    pub async fn send(&self, item: T) -> Result<(), QueueError<T>> {
        self.tx
            .send(item)
            .await
            .map_err(|e| QueueError::Closed(e.0))
    }

    /// Enqueue unless `cancel` fires first.
    ///
    /// Space is reserved before the item is moved, so a cancelled or closed
    /// enqueue always returns the item to the caller.
    pub async fn send_until(&self, item: T, cancel: &CancellationToken) -> Result<(), QueueError<T>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(QueueError::Cancelled(item)),
            permit = self.tx.reserve() => match permit {
                Ok(permit) => {
                    permit.send(item);
                    Ok(())
                }
                Err(_) => Err(QueueError::Closed(item)),
            },
        }
    }
}

/// Consumer handle. Clones share the same underlying receiver.
#[derive(Debug)]
pub struct QueueReceiver<T> {
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for QueueReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: Arc::clone(&self.rx),
        }
    }
}

impl<T> QueueReceiver<T> {
    /// Dequeue the next item, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue is closed (or every sender is gone)
    /// and the buffer is empty. Cancel-safe: dropping the future loses
    /// nothing.
    pub async fn recv(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }

    /// Close the queue. Further enqueues fail; buffered items stay
    /// available. Calling it again has no effect.
    pub async fn close(&self) {
        self.rx.lock().await.close();
    }

    /// Close the queue and take everything still buffered, in FIFO order.
    pub async fn drain(&self) -> Vec<T> {
        let mut rx = self.rx.lock().await;
        rx.close();

        let mut items = Vec::new();
        while let Ok(item) = rx.try_recv() {
            items.push(item);
        }
        items
    }
}

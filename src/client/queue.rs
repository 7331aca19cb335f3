//! Bounded send queue with reject-new overflow

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Encoded frame waiting for transmission
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub data: Bytes,
    pub quality: u8,
    pub enqueued_at: Instant,
}

/// Result of waiting on the queue
#[derive(Debug)]
pub enum Pop {
    Item(QueueItem),
    /// Nothing arrived within the idle timeout
    Idle,
    /// The stop signal fired
    Stopped,
}

/// Fixed-capacity frame queue
///
/// A push onto a full queue fails immediately and hands the item back; older
/// items are never displaced.
pub struct FrameQueue {
    tx: mpsc::Sender<QueueItem>,
    rx: Mutex<mpsc::Receiver<QueueItem>>,
    capacity: usize,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);

        Self {
            tx,
            rx: Mutex::new(rx),
            capacity,
        }
    }

    /// Enqueue without waiting
    pub fn try_push(&self, item: QueueItem) -> Result<(), QueueItem> {
        self.tx.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(item) | mpsc::error::TrySendError::Closed(item) => item,
        })
    }

    /// Wait for the next item, the idle timeout or the stop signal
    pub async fn pop(&self, stop: &CancellationToken, idle: Duration) -> Pop {
        let mut rx = self.rx.lock().await;

        tokio::select! {
            biased;
            _ = stop.cancelled() => Pop::Stopped,
            item = rx.recv() => match item {
                Some(item) => Pop::Item(item),
                None => Pop::Stopped,
            },
            _ = tokio::time::sleep(idle) => Pop::Idle,
        }
    }

    /// Take every queued item without waiting
    pub async fn drain(&self) -> Vec<QueueItem> {
        let mut rx = self.rx.lock().await;
        let mut items = Vec::new();
        while let Ok(item) = rx.try_recv() {
            items.push(item);
        }
        items
    }

    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Occupied fraction of the capacity, 0.0 to 1.0
    pub fn utilization(&self) -> f64 {
        self.len() as f64 / self.capacity as f64
    }
}

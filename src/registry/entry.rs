//! Per-stream state
//!
//! A [`Stream`] owns the single-slot "latest frame" cell that one producer
//! overwrites and any number of viewers and one recorder read at their own
//! pace. The slot, the frame id and the counters live behind one per-stream
//! lock so a reader always sees a consistent `(frame, id)` pair.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::stats::{ProducerCounters, StreamStats, StreamSummary};

use super::error::RegistryError;
use super::frame::{Frame, StreamName};

/// Mutable part of a stream, guarded by the per-stream lock
#[derive(Debug)]
struct FrameSlot {
    frame: Option<Frame>,
    frame_id: u64,
    last_activity: Instant,
    total_frames: u64,
    bytes_received: u64,
    producer: ProducerCounters,
    closed_at: Option<DateTime<Utc>>,
}

/// Entry for a single stream in the registry
#[derive(Debug)]
pub struct Stream {
    name: StreamName,
    created_at: DateTime<Utc>,
    created_instant: Instant,
    slot: RwLock<FrameSlot>,
    viewer_count: AtomicU32,
    /// Tombstone, cancelled exactly once when the stream is deleted
    closed: CancellationToken,
}

impl Stream {
    pub(super) fn new(name: StreamName) -> Self {
        let now = Instant::now();

        Self {
            name,
            created_at: Utc::now(),
            created_instant: now,
            slot: RwLock::new(FrameSlot {
                frame: None,
                frame_id: 0,
                last_activity: now,
                total_frames: 0,
                bytes_received: 0,
                producer: ProducerCounters::default(),
                closed_at: None,
            }),
            viewer_count: AtomicU32::new(0),
            closed: CancellationToken::new(),
        }
    }

    pub fn name(&self) -> &StreamName {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Replace the slot with a new frame
    ///
    /// Returns the id assigned to the frame. Fails with `StreamClosed` once
    /// the stream has been tombstoned; the caller is expected to go back to
    /// the registry.
    pub(super) async fn accept_publish(
        &self,
        data: Bytes,
        producer: Option<ProducerCounters>,
    ) -> Result<u64, RegistryError> {
        let mut slot = self.slot.write().await;

        if slot.closed_at.is_some() {
            return Err(RegistryError::StreamClosed(self.name.to_string()));
        }

        slot.frame_id += 1;
        let id = slot.frame_id;

        slot.bytes_received += data.len() as u64;
        slot.total_frames += 1;
        slot.last_activity = Instant::now();
        if let Some(counters) = producer {
            slot.producer = counters;
        }
        slot.frame = Some(Frame {
            id,
            data,
            published_at: Utc::now(),
        });

        Ok(id)
    }

    /// Tombstone the stream
    ///
    /// Returns false if it was already closed.
    pub(super) async fn close(&self) -> bool {
        let mut slot = self.slot.write().await;
        self.close_locked(&mut slot)
    }

    /// Tombstone the stream only if it has been idle for at least `timeout`
    ///
    /// The inactivity check and the tombstone happen under the same write
    /// lock, so a concurrent publish either refreshes activity first (and the
    /// stream survives) or observes the tombstone.
    pub(super) async fn close_if_idle(&self, timeout: Duration) -> bool {
        let mut slot = self.slot.write().await;

        if slot.last_activity.elapsed() < timeout {
            return false;
        }
        self.close_locked(&mut slot)
    }

    fn close_locked(&self, slot: &mut FrameSlot) -> bool {
        if slot.closed_at.is_some() {
            return false;
        }
        slot.closed_at = Some(Utc::now());
        self.closed.cancel();
        true
    }

    /// Consistent snapshot of the latest frame, if any
    pub async fn snapshot(&self) -> Option<Frame> {
        self.slot.read().await.frame.clone()
    }

    /// Id of the latest accepted frame (0 before the first publish)
    pub async fn frame_id(&self) -> u64 {
        self.slot.read().await.frame_id
    }

    /// Time since the last accepted publish (or creation)
    pub async fn idle_for(&self) -> Duration {
        self.slot.read().await.last_activity.elapsed()
    }

    /// When the stream was tombstoned
    pub async fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.slot.read().await.closed_at
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the stream is deleted
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Token cancelled on deletion; children are handed to background actors
    pub(crate) fn close_token(&self) -> &CancellationToken {
        &self.closed
    }

    pub fn viewer_count(&self) -> u32 {
        self.viewer_count.load(Ordering::Relaxed)
    }

    pub(crate) fn add_viewer(&self) -> u32 {
        self.viewer_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn remove_viewer(&self) -> u32 {
        let prev = self
            .viewer_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or(0);
        prev.saturating_sub(1)
    }

    /// Listing row for this stream
    pub async fn summary(&self) -> StreamSummary {
        let slot = self.slot.read().await;

        StreamSummary {
            name: self.name.to_string(),
            created_at: self.created_at,
            uptime_seconds: self.created_instant.elapsed().as_secs_f64(),
            total_frames: slot.total_frames,
            viewer_count: self.viewer_count(),
            inactive_seconds: slot.last_activity.elapsed().as_secs_f64(),
        }
    }

    /// Detailed statistics for this stream
    pub async fn stats(&self) -> StreamStats {
        let slot = self.slot.read().await;

        StreamStats {
            name: self.name.to_string(),
            created_at: self.created_at,
            uptime_seconds: self.created_instant.elapsed().as_secs_f64(),
            last_frame_at: slot.frame.as_ref().map(|f| f.published_at),
            inactive_seconds: slot.last_activity.elapsed().as_secs_f64(),
            frame_id: slot.frame_id,
            total_frames: slot.total_frames,
            bytes_received: slot.bytes_received,
            last_frame_size: slot.frame.as_ref().map_or(0, Frame::size),
            has_current_frame: slot.frame.is_some(),
            viewer_count: self.viewer_count(),
            producer: slot.producer,
        }
    }
}

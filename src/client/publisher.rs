//! Adaptive frame publisher
//!
//! Admission runs on the caller's task: decide whether to skip, encode at the
//! current quality, then push onto the bounded queue without waiting. A
//! separate sender loop drains the queue one frame at a time, times each
//! transmission and feeds the measurement back into the rate controller.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use frame_relay::client::{LocalSender, PassthroughEncoder, Publisher, PublisherConfig};
//! use frame_relay::config::RelayConfig;
//! use frame_relay::server::RelayService;
//!
//! # async fn example() -> frame_relay::error::Result<()> {
//! let relay = Arc::new(RelayService::new(RelayConfig::default())?);
//! let publisher = Publisher::new(
//!     PublisherConfig::new("cam1"),
//!     Arc::new(LocalSender::new(relay)),
//!     Arc::new(PassthroughEncoder),
//! )?;
//!
//! publisher.start();
//! publisher.publish_frame(&Bytes::from_static(b"\xFF\xD8...\xFF\xD9"))?;
//! publisher.stop().await;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::ConfigValidationError;
use crate::stats::{ProducerCounters, PublisherStats};

use super::config::PublisherConfig;
use super::queue::{FrameQueue, Pop, QueueItem};
use super::rate::{QualityChange, RateController};
use super::transport::{EncodeError, FrameEncoder, FrameSender};

/// Longest pause after a failed send
const MAX_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// High-frequency events are logged once per this many occurrences
const LOG_EVERY: u64 = 10;

/// What happened to a frame handed to [`Publisher::publish_frame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Accepted into the send queue
    Sent,
    /// Intentionally skipped under queue pressure
    Skipped,
    /// Rejected because the queue was full
    Dropped,
}

#[derive(Debug, Default)]
struct Counters {
    total: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    skipped: AtomicU64,
}

impl Counters {
    fn producer(&self) -> ProducerCounters {
        ProducerCounters {
            dropped_frames: self.dropped.load(Ordering::Relaxed),
            skipped_frames: self.skipped.load(Ordering::Relaxed),
            failed_frames: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the admission path and the sender loop
struct Shared {
    config: PublisherConfig,
    queue: FrameQueue,
    rate: Mutex<RateController>,
    rng: Mutex<StdRng>,
    counters: Counters,
    running: AtomicBool,
    sender: Arc<dyn FrameSender>,
    encoder: Arc<dyn FrameEncoder>,
}

/// Adaptive publisher for one stream
pub struct Publisher {
    shared: Arc<Shared>,
    stop: Mutex<CancellationToken>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Publisher {
    pub fn new(
        config: PublisherConfig,
        sender: Arc<dyn FrameSender>,
        encoder: Arc<dyn FrameEncoder>,
    ) -> Result<Self, ConfigValidationError> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let rate = RateController::new(
            config.rate.clone(),
            config.base_quality,
            config.min_quality,
            config.adaptive,
        );

        tracing::info!(
            stream = %config.stream_name,
            quality = config.base_quality,
            max_fps = config.max_fps,
            adaptive = config.adaptive,
            max_queue = config.max_queue_size,
            "Publisher initialized"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                queue: FrameQueue::new(config.max_queue_size),
                rate: Mutex::new(rate),
                rng: Mutex::new(rng),
                counters: Counters::default(),
                running: AtomicBool::new(false),
                sender,
                encoder,
                config,
            }),
            stop: Mutex::new(CancellationToken::new()),
            worker: Mutex::new(None),
        })
    }

    /// Spawn the sender loop
    ///
    /// Does nothing if it is already running.
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|h| !h.is_finished()) {
            tracing::warn!(stream = %self.shared.config.stream_name, "Publisher already running");
            return;
        }

        let stop = CancellationToken::new();
        *self.stop.lock() = stop.clone();

        self.shared.running.store(true, Ordering::Release);
        *worker = Some(tokio::spawn(Arc::clone(&self.shared).run(stop)));
    }

    /// Signal the sender loop and wait up to `shutdown_timeout` for it to exit
    pub async fn stop(&self) {
        self.stop.lock().cancel();

        let Some(handle) = self.worker.lock().take() else {
            return;
        };

        match tokio::time::timeout(self.shared.config.shutdown_timeout, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.shared.running.store(false, Ordering::Release);
                tracing::error!(stream = %self.shared.config.stream_name, error = %e, "Publisher worker failed");
            }
            Err(_) => {
                tracing::warn!(
                    stream = %self.shared.config.stream_name,
                    timeout_secs = self.shared.config.shutdown_timeout.as_secs_f64(),
                    "Publisher worker did not stop in time"
                );
            }
        }
    }

    /// Admit one raw frame
    ///
    /// Never waits: the frame is either queued, skipped or dropped. An
    /// encoding failure counts as a failed frame.
    pub fn publish_frame(&self, raw: &Bytes) -> Result<PublishOutcome, EncodeError> {
        let shared = &self.shared;
        let utilization = shared.queue.utilization();

        let (probability, quality) = {
            let rate = shared.rate.lock();
            (rate.skip_probability(utilization), rate.quality())
        };

        if probability > 0.0 && shared.rng.lock().gen::<f64>() < probability {
            let skipped = shared.counters.skipped.fetch_add(1, Ordering::Relaxed) + 1;
            if skipped % LOG_EVERY == 0 {
                tracing::debug!(
                    stream = %shared.config.stream_name,
                    utilization_pct = utilization * 100.0,
                    skipped,
                    "Skipping frame"
                );
            }
            return Ok(PublishOutcome::Skipped);
        }

        let data = shared.encoder.encode(raw, quality).inspect_err(|e| {
            shared.counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(stream = %shared.config.stream_name, error = %e, "Failed to encode frame");
        })?;

        let item = QueueItem {
            data,
            quality,
            enqueued_at: Instant::now(),
        };

        if shared.queue.try_push(item).is_err() {
            let dropped = shared.counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped % LOG_EVERY == 0 {
                tracing::warn!(
                    stream = %shared.config.stream_name,
                    dropped,
                    "Frame queue full, dropping frames"
                );
            }
            return Ok(PublishOutcome::Dropped);
        }

        Ok(PublishOutcome::Sent)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.shared.config
    }

    /// Current publisher statistics
    pub fn stats(&self) -> PublisherStats {
        let shared = &self.shared;
        let utilization = shared.queue.utilization();
        let rate = shared.rate.lock();
        let counters = shared.counters.producer();

        PublisherStats {
            stream_name: shared.config.stream_name.clone(),
            total_frames: shared.counters.total.load(Ordering::Relaxed),
            failed_frames: counters.failed_frames,
            dropped_frames: counters.dropped_frames,
            skipped_frames: counters.skipped_frames,
            queue_size: shared.queue.len(),
            queue_max: shared.queue.capacity(),
            queue_utilization_pct: (utilization * 1000.0).round() / 10.0,
            current_quality: rate.quality(),
            base_quality: rate.base_quality(),
            skip_probability: rate.skip_probability(utilization),
            avg_send_time_ms: rate
                .avg_send_time()
                .map_or(0.0, |d| (d.as_secs_f64() * 10_000.0).round() / 10.0),
            is_running: self.is_running(),
        }
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.stop.lock().cancel();
    }
}

impl Shared {
    async fn run(self: Arc<Self>, stop: CancellationToken) {
        let name = self.config.stream_name.as_str();
        let frame_interval = self.config.frame_interval();
        let mut last_sent: Option<Instant> = None;

        tracing::info!(stream = %name, "Publisher worker started");

        loop {
            let item = match self.queue.pop(&stop, self.config.idle_reset).await {
                Pop::Item(item) => item,
                Pop::Idle => {
                    if self.rate.lock().reset_quality() {
                        tracing::debug!(stream = %name, "Sender idle, quality reset to base");
                    }
                    continue;
                }
                Pop::Stopped => break,
            };

            if let (Some(interval), Some(last)) = (frame_interval, last_sent) {
                tokio::time::sleep_until(last + interval).await;
            }

            if self.transmit(item).await {
                last_sent = Some(Instant::now());
            } else if self.queue.len() < self.queue.capacity() / 2 {
                let pause = self.config.retry_delay.min(MAX_RETRY_PAUSE);
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => {}
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }

        if self.config.drain_on_stop {
            let pending = self.queue.drain().await;
            if !pending.is_empty() {
                tracing::debug!(stream = %name, frames = pending.len(), "Draining queued frames");
            }
            for item in pending {
                self.transmit(item).await;
            }
        }

        self.running.store(false, Ordering::Release);

        let counters = self.counters.producer();
        tracing::info!(
            stream = %name,
            total = self.counters.total.load(Ordering::Relaxed),
            failed = counters.failed_frames,
            dropped = counters.dropped_frames,
            skipped = counters.skipped_frames,
            "Publisher worker stopped"
        );
    }

    /// Send one item and feed the timing back; returns true on success
    async fn transmit(&self, item: QueueItem) -> bool {
        let name = self.config.stream_name.as_str();
        let counters = self.counters.producer();

        let started = Instant::now();
        let result = self.sender.send(name, item.data, counters).await;
        let elapsed = started.elapsed();

        let (change, avg_send) = {
            let mut rate = self.rate.lock();
            (rate.observe(elapsed), rate.avg_send_time())
        };
        if let Some(change) = change {
            match change {
                QualityChange::Lowered { from, to } => tracing::info!(
                    stream = %name,
                    from,
                    to,
                    avg_send_ms = avg_send.map_or(0, |d| d.as_millis() as u64),
                    "Reducing quality"
                ),
                QualityChange::Raised { from, to } => {
                    tracing::info!(stream = %name, from, to, "Increasing quality")
                }
            }
        }

        match result {
            Ok(()) => {
                self.counters.total.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(
                    stream = %name,
                    quality = item.quality,
                    queued_ms = item.enqueued_at.elapsed().as_millis() as u64,
                    send_ms = elapsed.as_millis() as u64,
                    "Frame sent"
                );
                true
            }
            Err(e) => {
                let failed = self.counters.failed.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(stream = %name, error = %e, failed, "Failed to send frame");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;
    use crate::client::transport::{PassthroughEncoder, TransportError};

    /// Sender that records calls and optionally fails or stalls
    #[derive(Default)]
    struct MockSender {
        sent: AtomicUsize,
        fail: AtomicBool,
        delay: Option<Duration>,
        last_counters: Mutex<Option<ProducerCounters>>,
    }

    #[async_trait]
    impl FrameSender for MockSender {
        async fn send(
            &self,
            _stream_name: &str,
            _frame: Bytes,
            counters: ProducerCounters,
        ) -> Result<(), TransportError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            *self.last_counters.lock() = Some(counters);
            if self.fail.load(Ordering::Relaxed) {
                return Err(TransportError::Unavailable("down".into()));
            }
            self.sent.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    struct FailingEncoder;

    impl FrameEncoder for FailingEncoder {
        fn encode(&self, _raw: &Bytes, _quality: u8) -> Result<Bytes, EncodeError> {
            Err(EncodeError::Failed("bad pixels".into()))
        }
    }

    fn frame() -> Bytes {
        Bytes::from_static(b"\xFF\xD8frame\xFF\xD9")
    }

    fn publisher(config: PublisherConfig, sender: Arc<MockSender>) -> Publisher {
        Publisher::new(config, sender, Arc::new(PassthroughEncoder)).unwrap()
    }

    #[tokio::test]
    async fn test_queue_overflow_drops_exactly() {
        let sender = Arc::new(MockSender::default());
        let config = PublisherConfig::new("cam1")
            .max_queue_size(10)
            .adaptive(false);
        let publisher = publisher(config, sender);

        let outcomes: Vec<_> = (0..20)
            .map(|_| publisher.publish_frame(&frame()).unwrap())
            .collect();

        let sent = outcomes.iter().filter(|o| **o == PublishOutcome::Sent).count();
        assert_eq!(sent, 10);
        assert!(outcomes[10..].iter().all(|o| *o == PublishOutcome::Dropped));

        let stats = publisher.stats();
        assert_eq!(stats.queue_size, 10);
        assert_eq!(stats.dropped_frames, 10);
        assert_eq!(stats.skipped_frames, 0);
        assert_eq!(stats.queue_utilization_pct, 100.0);
        assert!(!stats.is_running);
    }

    #[tokio::test]
    async fn test_adaptive_skips_under_pressure() {
        let sender = Arc::new(MockSender::default());
        let config = PublisherConfig::new("cam1").max_queue_size(10).seed(7);
        let publisher = publisher(config, sender);

        for _ in 0..100 {
            publisher.publish_frame(&frame()).unwrap();
        }

        let stats = publisher.stats();
        // Nothing is skipped until utilization passes 70%
        assert!(stats.queue_size >= 8);
        assert!(stats.skipped_frames > 0);
        assert_eq!(
            stats.queue_size as u64 + stats.skipped_frames + stats.dropped_frames,
            100
        );
        assert!(stats.skip_probability > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sender_loop_delivers_and_counts() {
        let sender = Arc::new(MockSender::default());
        let config = PublisherConfig::new("cam1").max_fps(0);
        let publisher = publisher(config, Arc::clone(&sender));
        publisher.start();
        assert!(publisher.is_running());

        for _ in 0..5 {
            assert_eq!(publisher.publish_frame(&frame()).unwrap(), PublishOutcome::Sent);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        publisher.stop().await;
        assert!(!publisher.is_running());
        assert_eq!(sender.sent.load(Ordering::Relaxed), 5);

        let stats = publisher.stats();
        assert_eq!(stats.total_frames, 5);
        assert_eq!(stats.queue_size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_counted_not_retried() {
        let sender = Arc::new(MockSender::default());
        sender.fail.store(true, Ordering::Relaxed);
        let config = PublisherConfig::new("cam1").max_fps(0);
        let publisher = publisher(config, Arc::clone(&sender));
        publisher.start();

        for _ in 0..3 {
            publisher.publish_frame(&frame()).unwrap();
        }
        // Each failure pauses at most 1s
        tokio::time::sleep(Duration::from_secs(5)).await;
        publisher.stop().await;

        let stats = publisher.stats();
        assert_eq!(stats.failed_frames, 3);
        assert_eq!(stats.total_frames, 0);
        assert_eq!(stats.queue_size, 0);

        // The failure count travels with the next send
        let counters = sender.last_counters.lock().unwrap();
        assert_eq!(counters.failed_frames, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_cap_paces_sender() {
        let sender = Arc::new(MockSender::default());
        let config = PublisherConfig::new("cam1").max_fps(10);
        let publisher = publisher(config, Arc::clone(&sender));
        publisher.start();

        for _ in 0..10 {
            publisher.publish_frame(&frame()).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(450)).await;

        // First frame immediately, then one every 100ms
        let sent = sender.sent.load(Ordering::Relaxed);
        assert!((4..=6).contains(&sent), "sent {sent}");
        publisher.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_on_stop() {
        let sender = Arc::new(MockSender::default());
        let config = PublisherConfig::new("cam1").max_fps(0).drain_on_stop(true);
        let publisher = publisher(config, Arc::clone(&sender));

        for _ in 0..4 {
            publisher.publish_frame(&frame()).unwrap();
        }
        publisher.start();
        publisher.stop().await;

        assert_eq!(sender.sent.load(Ordering::Relaxed), 4);
        assert_eq!(publisher.stats().queue_size, 0);
    }

    #[tokio::test]
    async fn test_encode_failure_counts_failed() {
        let publisher = Publisher::new(
            PublisherConfig::new("cam1"),
            Arc::new(MockSender::default()),
            Arc::new(FailingEncoder),
        )
        .unwrap();

        assert!(publisher.publish_frame(&frame()).is_err());
        let stats = publisher.stats();
        assert_eq!(stats.failed_frames, 1);
        assert_eq!(stats.queue_size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_sender_lowers_quality() {
        let sender = Arc::new(MockSender {
            delay: Some(Duration::from_millis(600)),
            ..Default::default()
        });
        let mut config = PublisherConfig::new("cam1").max_fps(0).max_queue_size(100);
        config.rate.adjust_every = 5;
        let publisher = publisher(config, Arc::clone(&sender));
        publisher.start();

        for _ in 0..20 {
            publisher.publish_frame(&frame()).unwrap();
        }
        tokio::time::sleep(Duration::from_secs(7)).await;

        let stats = publisher.stats();
        assert!(stats.current_quality < stats.base_quality);
        assert!(stats.current_quality >= 50);
        assert!(stats.avg_send_time_ms >= 600.0);

        publisher.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sender_restores_base_quality() {
        let sender = Arc::new(MockSender {
            delay: Some(Duration::from_millis(600)),
            ..Default::default()
        });
        let mut config = PublisherConfig::new("cam1").max_fps(0);
        config.rate.adjust_every = 5;
        let publisher = publisher(config, Arc::clone(&sender));
        publisher.start();

        for _ in 0..6 {
            publisher.publish_frame(&frame()).unwrap();
        }

        // Five slow sends lower quality once
        tokio::time::sleep(Duration::from_millis(3300)).await;
        assert_eq!(publisher.stats().current_quality, 80);

        // Last send ends at 3.6s, then the queue stays empty past idle_reset
        tokio::time::sleep(Duration::from_millis(2700)).await;
        let stats = publisher.stats();
        assert_eq!(stats.queue_size, 0);
        assert_eq!(stats.current_quality, stats.base_quality);

        publisher.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_sender_loop() {
        let sender = Arc::new(MockSender::default());
        let publisher = publisher(PublisherConfig::new("cam1"), Arc::clone(&sender));
        publisher.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(Arc::strong_count(&sender), 2);

        drop(publisher);
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(Arc::strong_count(&sender), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Publisher::new(
            PublisherConfig::new("cam1").max_queue_size(0),
            Arc::new(MockSender::default()),
            Arc::new(PassthroughEncoder),
        );
        assert!(result.is_err());
    }
}

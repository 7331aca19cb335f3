//! Publisher end-to-end tests against an in-process relay

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use frame_relay::client::{
    FrameSender, LocalSender, PassthroughEncoder, PublishOutcome, Publisher, PublisherConfig,
    TransportError,
};
use frame_relay::stats::ProducerCounters;
use frame_relay::{RelayConfig, RelayService};

/// Local sender limited to a fixed transmission time per frame
struct ThrottledSender {
    inner: LocalSender,
    per_frame: Duration,
}

#[async_trait]
impl FrameSender for ThrottledSender {
    async fn send(
        &self,
        stream_name: &str,
        frame: Bytes,
        counters: ProducerCounters,
    ) -> Result<(), TransportError> {
        tokio::time::sleep(self.per_frame).await;
        self.inner.send(stream_name, frame, counters).await
    }
}

fn relay() -> Arc<RelayService> {
    Arc::new(RelayService::new(RelayConfig::default().disable_recording()).unwrap())
}

fn jpeg() -> Bytes {
    Bytes::from_static(b"\xFF\xD8camera-frame\xFF\xD9")
}

#[tokio::test(start_paused = true)]
async fn burst_into_slow_link_is_bounded_and_accounted() {
    let relay = relay();
    let sender = Arc::new(ThrottledSender {
        inner: LocalSender::new(Arc::clone(&relay)),
        per_frame: Duration::from_millis(100),
    });
    let config = PublisherConfig::new("cam1").max_queue_size(15).seed(42);
    let publisher = Publisher::new(config, sender, Arc::new(PassthroughEncoder)).unwrap();
    publisher.start();

    // 40 frames within one second
    for _ in 0..40 {
        publisher.publish_frame(&jpeg()).unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    publisher.stop().await;

    let stats = publisher.stats();
    let lost = stats.skipped_frames + stats.dropped_frames;

    assert_eq!(
        stats.total_frames + stats.failed_frames + stats.queue_size as u64 + lost,
        40
    );
    assert!((9..=11).contains(&stats.total_frames), "sent {}", stats.total_frames);
    assert!(lost >= 14, "lost {lost}");
    assert!(stats.queue_size <= 15);
    assert_eq!(stats.failed_frames, 0);

    let relayed = relay.get_stats("cam1").await.unwrap();
    assert_eq!(relayed.total_frames, stats.total_frames);
    assert!(relayed.producer.dropped_frames <= stats.dropped_frames);
    assert!(relayed.producer.skipped_frames <= stats.skipped_frames);
}

#[tokio::test]
async fn blocked_sender_overflows_without_deadlock() {
    let relay = relay();
    let config = PublisherConfig::new("cam1")
        .max_queue_size(10)
        .adaptive(false);
    let publisher = Publisher::new(
        config,
        Arc::new(LocalSender::new(Arc::clone(&relay))),
        Arc::new(PassthroughEncoder),
    )
    .unwrap();

    // Sender loop never started
    let outcomes: Vec<_> = (0..20)
        .map(|_| publisher.publish_frame(&jpeg()).unwrap())
        .collect();

    assert_eq!(
        outcomes.iter().filter(|o| **o == PublishOutcome::Sent).count(),
        10
    );
    let stats = publisher.stats();
    assert_eq!(stats.queue_size, 10);
    assert_eq!(stats.dropped_frames, 10);

    // Once the loop runs, the queued frames reach the relay
    publisher.start();
    tokio::time::timeout(Duration::from_secs(5), async {
        while publisher.stats().total_frames < 10 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    publisher.stop().await;

    let relayed = relay.get_stats("cam1").await.unwrap();
    assert_eq!(relayed.total_frames, 10);
    assert_eq!(relayed.producer.dropped_frames, 10);
}

#[tokio::test(start_paused = true)]
async fn rejected_frames_count_as_failed() {
    let relay = Arc::new(
        RelayService::new(
            RelayConfig::default()
                .disable_recording()
                .max_concurrent(1),
        )
        .unwrap(),
    );
    relay.publish("other", jpeg(), None).await.unwrap();

    let publisher = Publisher::new(
        PublisherConfig::new("cam1").max_fps(0),
        Arc::new(LocalSender::new(Arc::clone(&relay))),
        Arc::new(PassthroughEncoder),
    )
    .unwrap();
    publisher.start();

    for _ in 0..3 {
        publisher.publish_frame(&jpeg()).unwrap();
    }
    tokio::time::sleep(Duration::from_secs(5)).await;
    publisher.stop().await;

    let stats = publisher.stats();
    assert_eq!(stats.failed_frames, 3);
    assert_eq!(stats.total_frames, 0);
    assert!(!relay.registry().stream_exists("cam1").await);
}

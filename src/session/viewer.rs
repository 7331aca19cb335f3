//! Per-subscriber viewer feed
//!
//! A [`ViewerFeed`] samples its stream's latest-frame slot at a capped
//! cadence and yields a frame only when its id moved past the last one this
//! feed emitted. There is no per-viewer buffer: a slow viewer simply sees
//! fewer frames.

use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use futures::Stream as FuturesStream;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::registry::{Frame, Stream};

/// Multipart boundary used by [`mjpeg_part`]
pub const MJPEG_BOUNDARY: &str = "frame";

/// Subscriber loop over one stream
pub struct ViewerFeed {
    stream: Arc<Stream>,
    last_id: u64,
    interval: Duration,
    next_poll: Option<Instant>,
    /// Child of the stream's tombstone; also cancelled by an explicit detach
    stop: CancellationToken,
}

impl ViewerFeed {
    /// Attach a new viewer to `stream`
    pub fn attach(stream: Arc<Stream>, interval: Duration) -> Self {
        let viewers = stream.add_viewer();
        let stop = stream.close_token().child_token();

        tracing::info!(
            stream = %stream.name(),
            viewers,
            poll_ms = interval.as_millis() as u64,
            "Viewer attached"
        );

        Self {
            stream,
            last_id: 0,
            interval,
            next_poll: None,
            stop,
        }
    }

    /// Handle that detaches this feed at its next loop boundary
    pub fn detach_handle(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Id of the last frame this feed emitted
    pub fn last_id(&self) -> u64 {
        self.last_id
    }

    pub fn stream(&self) -> &Arc<Stream> {
        &self.stream
    }

    /// Wait for the next frame newer than the last one emitted
    ///
    /// Returns `None` once the stream is deleted or the feed is detached.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        loop {
            if let Some(at) = self.next_poll {
                tokio::select! {
                    biased;
                    _ = self.stop.cancelled() => return None,
                    _ = tokio::time::sleep_until(at) => {}
                }
            }
            if self.stop.is_cancelled() {
                return None;
            }
            self.next_poll = Some(Instant::now() + self.interval);

            if let Some(frame) = self.stream.snapshot().await {
                if frame.id > self.last_id {
                    self.last_id = frame.id;
                    return Some(frame);
                }
            }
        }
    }

    /// Turn the feed into a lazy, non-restartable frame stream
    pub fn into_stream(self) -> impl FuturesStream<Item = Frame> + Send {
        futures::stream::unfold(self, |mut feed| async move {
            let frame = feed.next_frame().await?;
            Some((frame, feed))
        })
    }
}

impl Drop for ViewerFeed {
    fn drop(&mut self) {
        let remaining = self.stream.remove_viewer();
        tracing::info!(
            stream = %self.stream.name(),
            remaining,
            last_id = self.last_id,
            "Viewer detached"
        );
    }
}

/// Wrap a frame as one part of a `multipart/x-mixed-replace` MJPEG response
pub fn mjpeg_part(frame: &Frame) -> Bytes {
    let header = format!("--{MJPEG_BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n");
    let mut buf = BytesMut::with_capacity(header.len() + frame.data.len() + 2);
    buf.put_slice(header.as_bytes());
    buf.put_slice(&frame.data);
    buf.put_slice(b"\r\n");
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::registry::StreamRegistry;

    fn jpeg(n: u8) -> Bytes {
        Bytes::from(vec![0xFF, 0xD8, n, 0xFF, 0xD9])
    }

    #[tokio::test(start_paused = true)]
    async fn test_ids_strictly_increase_and_never_repeat() {
        let registry = Arc::new(StreamRegistry::new());
        let stream = registry.create_or_get("cam1").await.unwrap();
        let mut feed = ViewerFeed::attach(stream, Duration::from_millis(50));

        let producer = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                for i in 0..100u8 {
                    registry.publish("cam1", jpeg(i), None).await.unwrap();
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
        };

        let mut seen = Vec::new();
        while seen.len() < 15 {
            let frame = feed.next_frame().await.unwrap();
            seen.push(frame.id);
        }
        producer.await.unwrap();

        for pair in seen.windows(2) {
            assert!(pair[1] > pair[0], "ids not increasing: {seen:?}");
        }
        // Viewer is slower than the producer, so it must have skipped ids
        assert!(*seen.last().unwrap() > seen.len() as u64);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_producer_yields_nothing_new() {
        let registry = StreamRegistry::new();
        registry.publish("cam1", jpeg(1), None).await.unwrap();
        let stream = registry.get("cam1").await.unwrap();
        let mut feed = ViewerFeed::attach(stream, Duration::from_millis(20));

        assert_eq!(feed.next_frame().await.unwrap().id, 1);

        let next = tokio::time::timeout(Duration::from_secs(1), feed.next_frame()).await;
        assert!(next.is_err(), "no new frame should be emitted");
        assert_eq!(feed.last_id(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_emission_rate_is_capped() {
        let registry = Arc::new(StreamRegistry::new());
        let stream = registry.create_or_get("cam1").await.unwrap();
        let feed = ViewerFeed::attach(stream, Duration::from_millis(100));

        let producer = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                for i in 0..100u8 {
                    registry.publish("cam1", jpeg(i), None).await.unwrap();
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                registry.delete("cam1").await.unwrap();
            })
        };

        let frames: Vec<Frame> = feed.into_stream().collect().await;
        producer.await.unwrap();

        // ~1s of publishing sampled every 100ms
        assert!(frames.len() <= 12, "emitted {} frames", frames.len());
        assert!(frames.len() >= 5, "emitted {} frames", frames.len());
    }

    #[tokio::test]
    async fn test_feed_ends_on_delete_and_releases_viewer() {
        let registry = StreamRegistry::new();
        let stream = registry.create_or_get("cam1").await.unwrap();
        let mut feed = ViewerFeed::attach(Arc::clone(&stream), Duration::from_millis(5));
        assert_eq!(stream.viewer_count(), 1);

        registry.delete("cam1").await.unwrap();
        assert!(feed.next_frame().await.is_none());

        drop(feed);
        assert_eq!(stream.viewer_count(), 0);
    }

    #[tokio::test]
    async fn test_detach_handle_stops_feed() {
        let registry = StreamRegistry::new();
        let stream = registry.create_or_get("cam1").await.unwrap();
        let mut feed = ViewerFeed::attach(Arc::clone(&stream), Duration::from_millis(5));

        feed.detach_handle().cancel();
        assert!(feed.next_frame().await.is_none());
        // Detaching one viewer leaves the stream alive
        assert!(!stream.is_closed());
    }

    #[tokio::test]
    async fn test_viewer_count_tracks_attach_and_drop() {
        let registry = StreamRegistry::new();
        let stream = registry.create_or_get("cam1").await.unwrap();

        let a = ViewerFeed::attach(Arc::clone(&stream), Duration::from_millis(5));
        let b = ViewerFeed::attach(Arc::clone(&stream), Duration::from_millis(5));
        assert_eq!(stream.viewer_count(), 2);

        drop(a);
        assert_eq!(stream.viewer_count(), 1);
        drop(b);
        assert_eq!(stream.viewer_count(), 0);
    }

    #[test]
    fn test_mjpeg_part() {
        let frame = Frame {
            id: 1,
            data: Bytes::from_static(b"JPG"),
            published_at: chrono::Utc::now(),
        };

        let part = mjpeg_part(&frame);
        assert_eq!(
            &part[..],
            b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPG\r\n"
        );
    }
}

//! Relay service
//!
//! Wires the registry, the recorders and the cleanup sweeps together and
//! exposes the operations a transport layer (HTTP, gRPC, in-process) maps its
//! requests onto.

use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream as FuturesStream, StreamExt};
use serde::Serialize;

use crate::cleanup::CleanupManager;
use crate::config::RelayConfig;
use crate::error::Result;
use crate::recording::{RecordingMetadata, RecordingService};
use crate::registry::{RegistryError, StreamRegistry};
use crate::session::{mjpeg_part, ViewerFeed};
use crate::stats::{HealthReport, ProducerCounters, StreamStats, StreamSummary};

/// Reply to an accepted publish
#[derive(Debug, Clone, Serialize)]
pub struct PublishAck {
    pub stream: String,
    pub frame_id: u64,
    pub frame_size: usize,
}

/// The relay's boundary operations and lifecycle
pub struct RelayService {
    config: RelayConfig,
    registry: Arc<StreamRegistry>,
    recordings: Arc<RecordingService>,
    cleanup: Arc<CleanupManager>,
}

impl RelayService {
    /// Build a relay from a validated configuration
    pub fn new(config: RelayConfig) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(StreamRegistry::with_config(config.registry_config()));
        let recordings = Arc::new(RecordingService::new(config.recording.clone()));
        let cleanup = Arc::new(CleanupManager::new(
            Arc::clone(&registry),
            Arc::clone(&recordings),
            &config,
        )?);

        Ok(Self {
            config,
            registry,
            recordings,
            cleanup,
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    pub fn recordings(&self) -> &Arc<RecordingService> {
        &self.recordings
    }

    pub fn cleanup(&self) -> &Arc<CleanupManager> {
        &self.cleanup
    }

    /// Start the background sweeps
    pub fn start(&self) {
        self.cleanup.start();
        tracing::info!(
            max_streams = self.config.streams.max_concurrent,
            recording = self.config.recording.enabled,
            "Relay started"
        );
    }

    /// Stop the sweeps, close every stream and finalize every recording
    pub async fn shutdown(&self) -> Vec<RecordingMetadata> {
        self.cleanup.stop().await;
        let closed = self.registry.close_all().await;
        let recordings = self.recordings.stop_all().await;

        tracing::info!(
            streams = closed,
            recordings = recordings.len(),
            "Relay shut down"
        );
        recordings
    }

    /// Publish a frame, creating the stream (and its recorder) on first use
    pub async fn publish(
        &self,
        name: &str,
        data: Bytes,
        producer: Option<ProducerCounters>,
    ) -> std::result::Result<PublishAck, RegistryError> {
        let receipt = self.registry.publish(name, data, producer).await.inspect_err(|e| {
            tracing::warn!(stream = %name, error = %e, "Publish rejected");
        })?;

        if receipt.created {
            tracing::info!(stream = %name, "Auto-created stream");
            if self.recordings.start(Arc::clone(&receipt.stream)) {
                tracing::debug!(stream = %name, "Recording attached");
            }
        }

        Ok(PublishAck {
            stream: receipt.stream.name().to_string(),
            frame_id: receipt.frame_id,
            frame_size: receipt.frame_size,
        })
    }

    /// Attach a viewer to a live stream
    ///
    /// The feed ends when the viewer detaches or the stream is deleted.
    pub async fn subscribe(&self, name: &str) -> std::result::Result<ViewerFeed, RegistryError> {
        let stream = self.registry.get(name).await?;
        Ok(ViewerFeed::attach(
            stream,
            self.registry.config().viewer_poll_interval,
        ))
    }

    /// Attach a viewer and render its frames as `multipart/x-mixed-replace` parts
    pub async fn subscribe_mjpeg(
        &self,
        name: &str,
    ) -> std::result::Result<impl FuturesStream<Item = Bytes> + Send, RegistryError> {
        let feed = self.subscribe(name).await?;
        Ok(feed.into_stream().map(|frame| mjpeg_part(&frame)))
    }

    /// Summaries of all live streams
    pub async fn list_streams(&self) -> Vec<StreamSummary> {
        self.registry.list().await
    }

    /// Detailed statistics for one stream
    pub async fn get_stats(&self, name: &str) -> std::result::Result<StreamStats, RegistryError> {
        self.registry.stats(name).await
    }

    /// Delete a stream and wait for its recording to be finalized
    pub async fn delete_stream(
        &self,
        name: &str,
    ) -> std::result::Result<Option<RecordingMetadata>, RegistryError> {
        let stream = self.registry.delete(name).await?;
        Ok(self.recordings.stop_stream(&stream).await)
    }

    /// Relay-wide health summary
    pub async fn health(&self) -> HealthReport {
        HealthReport {
            status: "healthy",
            active_streams: self.registry.stream_count().await,
            max_streams: self.config.streams.max_concurrent,
            recording_enabled: self.recordings.is_enabled(),
            active_recordings: self.recordings.active_recordings(),
            config: self.config.effective(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::registry::ErrorKind;

    fn relay() -> RelayService {
        RelayService::new(RelayConfig::default().disable_recording()).unwrap()
    }

    fn frame() -> Bytes {
        Bytes::from_static(b"\xFF\xD8jpeg\xFF\xD9")
    }

    #[tokio::test]
    async fn test_publish_ack() {
        let relay = relay();
        let ack = relay.publish("cam1", frame(), None).await.unwrap();
        assert_eq!(ack.stream, "cam1");
        assert_eq!(ack.frame_id, 1);
        assert_eq!(ack.frame_size, 8);
    }

    #[tokio::test]
    async fn test_error_kinds_at_boundary() {
        let relay = RelayService::new(RelayConfig::default().disable_recording().max_concurrent(1))
            .unwrap();

        let err = relay.publish("../etc", frame(), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        relay.publish("a", frame(), None).await.unwrap();
        let err = relay.publish("b", frame(), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Capacity);

        assert_eq!(
            relay.subscribe("b").await.err().map(|e| e.kind()),
            Some(ErrorKind::NotFound)
        );
        assert_eq!(
            relay.get_stats("b").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            relay.delete_stream("b").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_mjpeg_subscription() {
        let relay = relay();
        relay.publish("cam1", frame(), None).await.unwrap();

        let parts = relay.subscribe_mjpeg("cam1").await.unwrap();
        tokio::pin!(parts);
        let part = tokio::time::timeout(Duration::from_secs(1), parts.next())
            .await
            .unwrap()
            .unwrap();
        assert!(part.starts_with(b"--frame\r\n"));
    }

    #[tokio::test]
    async fn test_health() {
        let relay = relay();
        relay.publish("cam1", frame(), None).await.unwrap();

        let health = relay.health().await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.active_streams, 1);
        assert_eq!(health.max_streams, 50);
        assert!(!health.recording_enabled);
        assert_eq!(health.config.timeout_seconds, 300);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = RelayConfig::default();
        config.cleanup.schedule_time = "noon".to_string();
        assert!(RelayService::new(config).is_err());
    }

    #[tokio::test]
    async fn test_shutdown_closes_streams() {
        let relay = relay();
        relay.start();
        let mut feed = {
            relay.publish("cam1", frame(), None).await.unwrap();
            relay.subscribe("cam1").await.unwrap()
        };
        assert_eq!(feed.next_frame().await.unwrap().id, 1);

        relay.shutdown().await;
        assert!(feed.next_frame().await.is_none());
        assert_eq!(relay.health().await.active_streams, 0);
        assert!(!relay.cleanup().is_running());
    }
}

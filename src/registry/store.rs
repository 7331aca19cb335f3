//! Stream registry implementation
//!
//! The central registry that owns every live stream. Creation happens on the
//! first publish to an unseen name; deletion tombstones the stream so its
//! viewers and recorder wind down on their own.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::RwLock;

use crate::stats::{ProducerCounters, StreamStats, StreamSummary};

use super::config::RegistryConfig;
use super::entry::Stream;
use super::error::RegistryError;
use super::frame::StreamName;

/// Result of an accepted publish
#[derive(Debug, Clone)]
pub struct PublishReceipt {
    /// Stream the frame landed in
    pub stream: Arc<Stream>,
    /// Id assigned to the frame
    pub frame_id: u64,
    /// Payload size in bytes
    pub frame_size: usize,
    /// Whether this publish created `stream`
    pub created: bool,
}

/// Central registry for all live streams
///
/// Thread-safe via `RwLock`. Lookups and publishes only take the map's read
/// lock; the write lock is held for creation and removal. Each stream has its
/// own lock, so traffic on one channel never blocks another.
pub struct StreamRegistry {
    /// Map of stream name to stream
    streams: RwLock<HashMap<String, Arc<Stream>>>,

    /// Configuration
    config: RegistryConfig,
}

impl StreamRegistry {
    /// Create a new stream registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new stream registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Validate a channel name against the configured bounds
    pub fn parse_name(&self, name: &str) -> Result<StreamName, RegistryError> {
        StreamName::parse_with_max_len(name, self.config.max_name_len)
    }

    /// Get the stream for `name`, creating it if it does not exist
    ///
    /// Concurrent calls for the same unseen name all observe the same
    /// instance.
    pub async fn create_or_get(&self, name: &str) -> Result<Arc<Stream>, RegistryError> {
        let name = self.parse_name(name)?;
        self.get_or_insert(&name).await.map(|(stream, _)| stream)
    }

    async fn get_or_insert(&self, name: &StreamName) -> Result<(Arc<Stream>, bool), RegistryError> {
        if let Some(stream) = self.streams.read().await.get(name.as_str()) {
            return Ok((Arc::clone(stream), false));
        }

        let mut streams = self.streams.write().await;

        // Another caller may have created it between the two locks
        if let Some(stream) = streams.get(name.as_str()) {
            return Ok((Arc::clone(stream), false));
        }

        if streams.len() >= self.config.max_streams {
            tracing::warn!(
                stream = %name,
                max_streams = self.config.max_streams,
                "Stream creation refused: capacity reached"
            );
            return Err(RegistryError::CapacityReached {
                max: self.config.max_streams,
            });
        }

        let stream = Arc::new(Stream::new(name.clone()));
        streams.insert(name.to_string(), Arc::clone(&stream));

        tracing::info!(
            stream = %name,
            active_streams = streams.len(),
            "Stream created"
        );

        Ok((stream, true))
    }

    /// Publish a frame, creating the stream on first use
    ///
    /// Validation happens before any state is touched. A publish that races a
    /// delete of the same name transparently lands in a freshly created
    /// stream.
    pub async fn publish(
        &self,
        name: &str,
        data: Bytes,
        producer: Option<ProducerCounters>,
    ) -> Result<PublishReceipt, RegistryError> {
        let name = self.parse_name(name)?;

        if data.is_empty() {
            return Err(RegistryError::EmptyFrame);
        }
        if data.len() > self.config.max_frame_size {
            return Err(RegistryError::FrameTooLarge {
                size: data.len(),
                max: self.config.max_frame_size,
            });
        }

        let frame_size = data.len();

        for attempt in 0..=self.config.publish_retries {
            let (stream, created) = self.get_or_insert(&name).await?;

            match stream.accept_publish(data.clone(), producer).await {
                Ok(frame_id) => {
                    tracing::trace!(stream = %name, frame_id, frame_size, "Frame published");
                    return Ok(PublishReceipt {
                        stream,
                        frame_id,
                        frame_size,
                        created,
                    });
                }
                Err(RegistryError::StreamClosed(_)) => {
                    tracing::debug!(
                        stream = %name,
                        attempt,
                        "Publish raced stream deletion, recreating"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(RegistryError::StreamClosed(name.to_string()))
    }

    /// Look up a live stream
    pub async fn get(&self, name: &str) -> Result<Arc<Stream>, RegistryError> {
        self.streams
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::StreamNotFound(name.to_string()))
    }

    /// Check if a stream exists
    pub async fn stream_exists(&self, name: &str) -> bool {
        self.streams.read().await.contains_key(name)
    }

    /// Summaries of all live streams, ordered by name
    pub async fn list(&self) -> Vec<StreamSummary> {
        let mut summaries = Vec::new();
        for stream in self.snapshot().await {
            summaries.push(stream.summary().await);
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Detailed statistics for one stream
    pub async fn stats(&self, name: &str) -> Result<StreamStats, RegistryError> {
        Ok(self.get(name).await?.stats().await)
    }

    /// Remove a stream and tombstone it
    ///
    /// Lookups either find the stream or get `StreamNotFound`; they never see
    /// a stream that has been tombstoned. Returns the removed stream.
    pub async fn delete(&self, name: &str) -> Result<Arc<Stream>, RegistryError> {
        let mut streams = self.streams.write().await;

        let stream = streams
            .remove(name)
            .ok_or_else(|| RegistryError::StreamNotFound(name.to_string()))?;
        stream.close().await;

        tracing::info!(
            stream = %name,
            viewers = stream.viewer_count(),
            active_streams = streams.len(),
            "Stream deleted"
        );

        Ok(stream)
    }

    /// Delete a stream only if it is still idle for at least `timeout`
    ///
    /// Returns the removed stream.
    pub async fn delete_if_idle(&self, name: &str, timeout: Duration) -> Option<Arc<Stream>> {
        let mut streams = self.streams.write().await;

        let stream = streams.get(name).cloned()?;
        if !stream.close_if_idle(timeout).await {
            return None;
        }
        streams.remove(name);

        tracing::info!(
            stream = %name,
            timeout_secs = timeout.as_secs(),
            active_streams = streams.len(),
            "Stream removed after inactivity"
        );

        Some(stream)
    }

    /// Names of streams idle for at least `timeout`
    ///
    /// The map lock is released before the streams are inspected.
    pub async fn idle_candidates(&self, timeout: Duration) -> Vec<String> {
        let mut names = Vec::new();
        for stream in self.snapshot().await {
            if stream.idle_for().await >= timeout {
                names.push(stream.name().to_string());
            }
        }
        names
    }

    /// Tombstone and remove every stream
    ///
    /// Returns the number of streams closed.
    pub async fn close_all(&self) -> usize {
        let drained: Vec<Arc<Stream>> = {
            let mut streams = self.streams.write().await;
            streams.drain().map(|(_, stream)| stream).collect()
        };

        for stream in &drained {
            stream.close().await;
        }

        if !drained.is_empty() {
            tracing::info!(closed = drained.len(), "All streams closed");
        }
        drained.len()
    }

    /// Get total number of streams
    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.len()
    }

    async fn snapshot(&self) -> Vec<Arc<Stream>> {
        self.streams.read().await.values().cloned().collect()
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

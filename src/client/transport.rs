//! Transport and encoding seams of the publisher
//!
//! The publisher only knows how to hand an encoded frame to a
//! [`FrameSender`] and raw frames to a [`FrameEncoder`]. Network transports
//! and image codecs live outside this crate; [`LocalSender`] and
//! [`PassthroughEncoder`] cover the in-process case.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::registry::{ErrorKind, RegistryError};
use crate::server::RelayService;
use crate::stats::ProducerCounters;

/// A single frame could not be delivered
///
/// Never fatal; the publisher counts it and moves on.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("frame rejected by relay ({kind:?}): {message}")]
    Rejected { kind: ErrorKind, message: String },

    #[error("relay unavailable: {0}")]
    Unavailable(String),
}

impl From<RegistryError> for TransportError {
    fn from(e: RegistryError) -> Self {
        TransportError::Rejected {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// Encoding of a raw frame failed
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("empty frame")]
    EmptyFrame,

    #[error("encoding failed: {0}")]
    Failed(String),
}

/// Delivers encoded frames to a relay
#[async_trait]
pub trait FrameSender: Send + Sync {
    /// Send one frame along with the producer's cumulative loss counters
    async fn send(
        &self,
        stream_name: &str,
        frame: Bytes,
        counters: ProducerCounters,
    ) -> Result<(), TransportError>;
}

/// Turns a raw captured frame into an encoded one at a given quality
pub trait FrameEncoder: Send + Sync {
    fn encode(&self, raw: &Bytes, quality: u8) -> Result<Bytes, EncodeError>;
}

/// Sender that publishes straight into an in-process relay
pub struct LocalSender {
    relay: Arc<RelayService>,
}

impl LocalSender {
    pub fn new(relay: Arc<RelayService>) -> Self {
        Self { relay }
    }
}

#[async_trait]
impl FrameSender for LocalSender {
    async fn send(
        &self,
        stream_name: &str,
        frame: Bytes,
        counters: ProducerCounters,
    ) -> Result<(), TransportError> {
        self.relay
            .publish(stream_name, frame, Some(counters))
            .await
            .map(|_| ())
            .map_err(TransportError::from)
    }
}

/// Encoder for frames that are captured already encoded (e.g. MJPEG cameras)
///
/// Quality is ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughEncoder;

impl FrameEncoder for PassthroughEncoder {
    fn encode(&self, raw: &Bytes, _quality: u8) -> Result<Bytes, EncodeError> {
        if raw.is_empty() {
            return Err(EncodeError::EmptyFrame);
        }
        Ok(raw.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;

    #[test]
    fn test_passthrough() {
        let raw = Bytes::from_static(b"JPEG");
        assert_eq!(PassthroughEncoder.encode(&raw, 10).unwrap(), raw);
        assert!(matches!(
            PassthroughEncoder.encode(&Bytes::new(), 10),
            Err(EncodeError::EmptyFrame)
        ));
    }

    #[tokio::test]
    async fn test_local_sender_publishes_with_counters() {
        let relay = Arc::new(RelayService::new(RelayConfig::default().disable_recording()).unwrap());
        let sender = LocalSender::new(Arc::clone(&relay));
        let counters = ProducerCounters {
            dropped_frames: 3,
            skipped_frames: 1,
            failed_frames: 0,
        };

        sender
            .send("cam1", Bytes::from_static(b"JPEG"), counters)
            .await
            .unwrap();

        let stats = relay.get_stats("cam1").await.unwrap();
        assert_eq!(stats.total_frames, 1);
        assert_eq!(stats.producer, counters);
    }

    #[tokio::test]
    async fn test_local_sender_maps_rejection() {
        let relay = Arc::new(RelayService::new(RelayConfig::default().disable_recording()).unwrap());
        let sender = LocalSender::new(relay);

        let result = sender
            .send("bad name", Bytes::from_static(b"JPEG"), ProducerCounters::default())
            .await;
        assert!(matches!(
            result,
            Err(TransportError::Rejected {
                kind: ErrorKind::Validation,
                ..
            })
        ));
    }
}

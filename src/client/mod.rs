//! Producer-side publishing
//!
//! Provides the adaptive publisher that sits between a frame source and the
//! relay:
//! - Bounded queue with reject-new overflow
//! - Probabilistic frame skipping under queue pressure
//! - Encoding quality driven by measured send latency

pub mod config;
pub mod publisher;
pub mod queue;
pub mod rate;
pub mod transport;

pub use config::{PublisherConfig, RateConfig};
pub use publisher::{PublishOutcome, Publisher};
pub use queue::{FrameQueue, Pop, QueueItem};
pub use rate::{skip_probability, QualityChange, RateController};
pub use transport::{
    EncodeError, FrameEncoder, FrameSender, LocalSender, PassthroughEncoder, TransportError,
};

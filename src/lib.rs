//! Live frame relay
//!
//! Distributes encoded frames from one producer per named channel to any
//! number of concurrent viewers, while recording the same channel to disk.
//!
//! # Features
//!
//! - Auto-created channels on first publish, bounded by a stream limit
//! - Single-slot "latest frame" fan-out: viewers and the recorder sample it at
//!   their own cadence and never queue
//! - Adaptive publisher with a bounded reject-new queue, probabilistic frame
//!   skipping and latency-driven quality control
//! - Inactivity eviction and daily retention sweeps
//!
//! # Example
//! ```no_run
//! use bytes::Bytes;
//! use frame_relay::{RelayConfig, RelayService};
//!
//! # async fn example() -> frame_relay::Result<()> {
//! let relay = RelayService::new(RelayConfig::load()?)?;
//! relay.start();
//!
//! relay.publish("cam1", Bytes::from_static(b"\xFF\xD8...\xFF\xD9"), None).await?;
//!
//! let mut feed = relay.subscribe("cam1").await?;
//! while let Some(frame) = feed.next_frame().await {
//!     println!("frame {} ({} bytes)", frame.id, frame.size());
//! }
//!
//! relay.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cleanup;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod recording;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use client::{Publisher, PublisherConfig};
pub use config::RelayConfig;
pub use error::{Error, Result};
pub use registry::{Frame, StreamRegistry};
pub use server::RelayService;

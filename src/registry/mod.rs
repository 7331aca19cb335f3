//! Stream registry for pub/sub routing
//!
//! The registry owns every live stream and routes frames from producers to
//! consumers. Each stream holds a single "latest frame" slot rather than a
//! queue: viewers and the recorder sample it at their own cadence and skip
//! whatever they missed.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<StreamRegistry>
//!                     ┌─────────────────────────┐
//!                     │ streams: HashMap<Name,  │
//!                     │   Arc<Stream {          │
//!                     │     slot: RwLock<..>,   │
//!                     │     closed: token,      │
//!                     │   }>                    │
//!                     │ >                       │
//!                     └───────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Producer]             [ViewerFeed]          [RecordingWriter]
//!    registry.publish()     poll snapshot()       poll snapshot()
//!         │                 every N ms            every 1/fps
//!         └──► slot = (frame, id + 1)
//! ```
//!
//! # Zero-Copy Design
//!
//! `bytes::Bytes` uses reference counting, so every consumer shares the same
//! allocation for a frame. Taking a snapshot clones the `Frame`, not the data.

pub mod config;
pub mod entry;
pub mod error;
pub mod frame;
pub mod store;

pub use config::RegistryConfig;
pub use entry::Stream;
pub use error::{ErrorKind, RegistryError};
pub use frame::{Frame, StreamName};
pub use store::{PublishReceipt, StreamRegistry};

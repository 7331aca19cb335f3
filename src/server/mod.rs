//! Relay server surface

pub mod service;

pub use service::{PublishAck, RelayService};

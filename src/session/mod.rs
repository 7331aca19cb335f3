//! Consumer-side sessions
//!
//! Each subscriber gets its own [`ViewerFeed`] over a shared stream.

pub mod viewer;

pub use viewer::{mjpeg_part, ViewerFeed, MJPEG_BOUNDARY};

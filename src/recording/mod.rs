//! Recording of live streams to disk
//!
//! Each stream gets one [`RecordingWriter`] that samples the same latest-frame
//! slot the viewers read, at its own cadence. The artifact store layout is
//!
//! ```text
//! {root}/{stream}/{stream}_{YYYYmmdd_HHMMSS_mmm}.{mjpeg|frames}
//! {root}/{stream}/{stream}_{YYYYmmdd_HHMMSS_mmm}.json
//! ```
//!
//! Like any viewer, a writer may miss ids published between two polls.

pub mod error;
pub mod metadata;
pub mod service;
pub mod writer;

pub use error::RecordingError;
pub use metadata::{ArtifactFormat, RecordingMetadata};
pub use service::RecordingService;
pub use writer::RecordingWriter;

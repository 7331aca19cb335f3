//! Registry error types
//!
//! Error types for stream registry operations.

use thiserror::Error;

/// Broad category of a registry failure, used by callers to pick a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Request rejected before any state was touched
    Validation,
    /// Unknown channel
    NotFound,
    /// Registry is full
    Capacity,
}

/// Error type for registry operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Channel name outside the allowed character set or length
    #[error("invalid stream name {0:?}: use alphanumeric, underscore or dash characters")]
    InvalidName(String),

    /// Zero-length frame payload
    #[error("empty frame data")]
    EmptyFrame,

    /// Frame larger than the configured maximum
    #[error("frame size {size} exceeds maximum ({max} bytes)")]
    FrameTooLarge { size: usize, max: usize },

    /// Stream not found
    #[error("stream not found: {0}")]
    StreamNotFound(String),

    /// Maximum concurrent streams reached
    #[error("maximum concurrent streams ({max}) reached")]
    CapacityReached { max: usize },

    /// Stream was deleted while the caller held it
    #[error("stream closed: {0}")]
    StreamClosed(String),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::InvalidName(_)
            | RegistryError::EmptyFrame
            | RegistryError::FrameTooLarge { .. } => ErrorKind::Validation,
            RegistryError::StreamNotFound(_) | RegistryError::StreamClosed(_) => {
                ErrorKind::NotFound
            }
            RegistryError::CapacityReached { .. } => ErrorKind::Capacity,
        }
    }
}

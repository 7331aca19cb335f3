//! Error types for the relay
//!
//! Each area has its own error enum; [`Error`] wraps them so top-level code
//! can use a single `Result`.

use thiserror::Error;

use crate::client::{EncodeError, TransportError};
use crate::config::ConfigValidationError;
use crate::recording::RecordingError;
use crate::registry::RegistryError;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("recording error: {0}")]
    Recording(#[from] RecordingError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigValidationError),

    #[error("logging setup failed: {0}")]
    Logging(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Registry category of this error, if it came from the registry
    pub fn registry_kind(&self) -> Option<crate::registry::ErrorKind> {
        match self {
            Error::Registry(e) => Some(e.kind()),
            _ => None,
        }
    }
}

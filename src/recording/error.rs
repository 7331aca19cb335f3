//! Recording error types

use std::path::PathBuf;

use thiserror::Error;

/// Failure while writing a recording artifact
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("failed to create recording directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write recording {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read recording {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode recording metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

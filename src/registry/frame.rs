//! Stream names and published frames
//!
//! This module defines the key type identifying a channel and the frame
//! value that is handed out to viewers and recorders.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::error::RegistryError;

/// Default upper bound on stream name length
pub const DEFAULT_MAX_NAME_LEN: usize = 64;

/// Validated channel name
///
/// Only ASCII alphanumerics, `_` and `-` are allowed, so a name can be used
/// verbatim as a directory and file name component by the recorder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamName(String);

impl StreamName {
    /// Parse a name with the default length bound
    pub fn parse(name: &str) -> Result<Self, RegistryError> {
        Self::parse_with_max_len(name, DEFAULT_MAX_NAME_LEN)
    }

    /// Parse a name, rejecting anything longer than `max_len` characters
    pub fn parse_with_max_len(name: &str, max_len: usize) -> Result<Self, RegistryError> {
        let valid = !name.is_empty()
            && name.len() <= max_len
            && name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');

        if valid {
            Ok(Self(name.to_string()))
        } else {
            Err(RegistryError::InvalidName(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StreamName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StreamName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An accepted frame as observed by consumers
///
/// Cheap to clone: the payload is a reference-counted `Bytes`.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Per-stream sequence number, strictly increasing
    pub id: u64,
    /// Encoded frame payload
    pub data: Bytes,
    /// Wall-clock time the frame was accepted
    pub published_at: DateTime<Utc>,
}

impl Frame {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

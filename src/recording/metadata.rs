//! Recording artifact format and sidecar metadata

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::RecordingError;

/// Magic bytes at the start of a framed container
pub const FRAMED_MAGIC: &[u8; 4] = b"FRMS";

/// Framed container version
pub const FRAMED_VERSION: u8 = 1;

/// On-disk layout of a recording, derived from the configured codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    /// Back-to-back JPEG images, playable as a raw MJPEG stream
    Mjpeg,
    /// Header, then per frame: id (u64 LE), length (u32 LE), payload
    Framed,
}

impl ArtifactFormat {
    pub fn from_codec(codec: &str) -> Self {
        if codec.eq_ignore_ascii_case("mjpeg") || codec.eq_ignore_ascii_case("mjpg") {
            ArtifactFormat::Mjpeg
        } else {
            ArtifactFormat::Framed
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ArtifactFormat::Mjpeg => "mjpeg",
            ArtifactFormat::Framed => "frames",
        }
    }

    /// Bytes written once when the artifact is opened
    pub fn header(self) -> Vec<u8> {
        match self {
            ArtifactFormat::Mjpeg => Vec::new(),
            ArtifactFormat::Framed => {
                let mut header = FRAMED_MAGIC.to_vec();
                header.push(FRAMED_VERSION);
                header
            }
        }
    }

    /// Bytes preceding a frame's payload
    pub fn frame_prefix(self, frame_id: u64, len: usize) -> Vec<u8> {
        match self {
            ArtifactFormat::Mjpeg => Vec::new(),
            ArtifactFormat::Framed => {
                let mut prefix = Vec::with_capacity(12);
                prefix.extend_from_slice(&frame_id.to_le_bytes());
                prefix.extend_from_slice(&(len as u32).to_le_bytes());
                prefix
            }
        }
    }
}

/// Sidecar record describing one recording session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    pub stream_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    /// Distinct frames written to the artifact
    pub total_frames: u64,
    pub average_fps: f64,
    pub target_fps: u32,
    pub codec: String,
    pub path: PathBuf,
}

impl RecordingMetadata {
    /// Build the final record for a session
    pub fn finalize(
        stream_name: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        total_frames: u64,
        target_fps: u32,
        codec: &str,
        path: PathBuf,
    ) -> Self {
        let duration_seconds = (end_time - start_time)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let average_fps = if duration_seconds > 0.0 {
            (total_frames as f64 / duration_seconds * 100.0).round() / 100.0
        } else {
            0.0
        };

        Self {
            stream_name: stream_name.to_string(),
            start_time,
            end_time,
            duration_seconds,
            total_frames,
            average_fps,
            target_fps,
            codec: codec.to_string(),
            path,
        }
    }

    /// Path of the sidecar for a media file
    pub fn sidecar_path(media_path: &Path) -> PathBuf {
        media_path.with_extension("json")
    }

    /// Persist the record next to its media file
    pub async fn write_sidecar(&self) -> Result<PathBuf, RecordingError> {
        let sidecar = Self::sidecar_path(&self.path);
        let json = serde_json::to_vec_pretty(self)?;

        tokio::fs::write(&sidecar, json)
            .await
            .map_err(|source| RecordingError::Write {
                path: sidecar.clone(),
                source,
            })?;

        Ok(sidecar)
    }

    /// Load a previously written sidecar
    pub async fn read_sidecar(path: &Path) -> Result<Self, RecordingError> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|source| RecordingError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(serde_json::from_slice(&data)?)
    }
}

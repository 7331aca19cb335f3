//! Per-stream recording loop
//!
//! A [`RecordingWriter`] is just another consumer of a stream's latest-frame
//! slot. It polls at the configured recording rate, appends every frame whose
//! id moved past the last one written, and finalizes a [`RecordingMetadata`]
//! when the stream is deleted or the writer is stopped.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::RecordingConfig;
use crate::registry::{Frame, Stream};

use super::error::RecordingError;
use super::metadata::{ArtifactFormat, RecordingMetadata};

/// Timestamp format used in artifact file names
const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

/// Open media file of a recording session
struct Artifact {
    file: BufWriter<File>,
    path: PathBuf,
}

/// Drains one stream into a durable artifact
pub struct RecordingWriter {
    stream: Arc<Stream>,
    root: PathBuf,
    codec: String,
    format: ArtifactFormat,
    fps: u32,
    poll_interval: Duration,
    stop: CancellationToken,
    artifact: Option<Artifact>,
    last_id: u64,
    frames_written: u64,
    start_time: DateTime<Utc>,
}

impl RecordingWriter {
    /// Create a writer for `stream`
    ///
    /// `stop` should be a child of the stream's tombstone so deletion also
    /// ends the writer.
    pub fn new(stream: Arc<Stream>, config: &RecordingConfig, stop: CancellationToken) -> Self {
        Self {
            stream,
            root: config.root_dir.clone(),
            codec: config.codec.clone(),
            format: ArtifactFormat::from_codec(&config.codec),
            fps: config.fps,
            poll_interval: config.poll_interval(),
            stop,
            artifact: None,
            last_id: 0,
            frames_written: 0,
            start_time: Utc::now(),
        }
    }

    /// Run until the stream is deleted, the writer is stopped or a write fails
    ///
    /// Returns the finalized metadata, or `None` if no frame was ever written.
    pub async fn run(mut self) -> Option<RecordingMetadata> {
        tracing::info!(
            stream = %self.stream.name(),
            codec = %self.codec,
            fps = self.fps,
            "Recording started"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut failed = false;
        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        tracing::warn!(
                            stream = %self.stream.name(),
                            error = %e,
                            "Recording write failed, stopping recorder"
                        );
                        failed = true;
                        break;
                    }
                }
            }
        }

        let deleted = self.stream.is_closed();

        // The last frame before the tombstone is still in the slot
        if deleted && !failed {
            if let Err(e) = self.poll_once().await {
                tracing::warn!(stream = %self.stream.name(), error = %e, "Final recording write failed");
            }
        }

        let end_time = if deleted {
            self.stream.closed_at().await.unwrap_or_else(Utc::now)
        } else {
            Utc::now()
        };

        self.finalize(end_time).await
    }

    /// Append the current frame if it is new
    async fn poll_once(&mut self) -> Result<(), RecordingError> {
        let Some(frame) = self.stream.snapshot().await else {
            return Ok(());
        };
        if frame.id <= self.last_id {
            return Ok(());
        }

        if self.artifact.is_none() {
            self.artifact = Some(self.open().await?);
        }
        if let Some(artifact) = self.artifact.as_mut() {
            Self::append(artifact, self.format, &frame).await?;
        }

        self.last_id = frame.id;
        self.frames_written += 1;
        Ok(())
    }

    async fn open(&self) -> Result<Artifact, RecordingError> {
        let name = self.stream.name().as_str();
        let dir = self.root.join(name);

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| RecordingError::CreateDir {
                path: dir.clone(),
                source,
            })?;

        let file_name = format!(
            "{}_{}.{}",
            name,
            Utc::now().format(FILE_TIMESTAMP_FORMAT),
            self.format.extension()
        );
        let path = dir.join(file_name);

        let write_err = |source| RecordingError::Write {
            path: path.clone(),
            source,
        };
        let mut file = BufWriter::new(File::create(&path).await.map_err(write_err)?);
        let header = self.format.header();
        if !header.is_empty() {
            file.write_all(&header).await.map_err(write_err)?;
        }

        tracing::debug!(stream = %name, path = %path.display(), "Recording artifact opened");

        Ok(Artifact { file, path })
    }

    async fn append(
        artifact: &mut Artifact,
        format: ArtifactFormat,
        frame: &Frame,
    ) -> Result<(), RecordingError> {
        let prefix = format.frame_prefix(frame.id, frame.size());

        let result = async {
            if !prefix.is_empty() {
                artifact.file.write_all(&prefix).await?;
            }
            artifact.file.write_all(&frame.data).await
        }
        .await;

        result.map_err(|source| RecordingError::Write {
            path: artifact.path.clone(),
            source,
        })
    }

    async fn finalize(mut self, end_time: DateTime<Utc>) -> Option<RecordingMetadata> {
        let Some(mut artifact) = self.artifact.take() else {
            tracing::info!(stream = %self.stream.name(), "Recording stopped without frames");
            return None;
        };

        if let Err(e) = artifact.file.flush().await {
            tracing::warn!(
                stream = %self.stream.name(),
                path = %artifact.path.display(),
                error = %e,
                "Failed to flush recording"
            );
        }
        drop(artifact.file);

        let metadata = RecordingMetadata::finalize(
            self.stream.name().as_str(),
            self.start_time,
            end_time,
            self.frames_written,
            self.fps,
            &self.codec,
            artifact.path,
        );

        if let Err(e) = metadata.write_sidecar().await {
            tracing::warn!(
                stream = %metadata.stream_name,
                error = %e,
                "Failed to write recording metadata"
            );
        }

        tracing::info!(
            stream = %metadata.stream_name,
            frames = metadata.total_frames,
            duration_secs = metadata.duration_seconds,
            average_fps = metadata.average_fps,
            path = %metadata.path.display(),
            "Recording finalized"
        );

        Some(metadata)
    }
}

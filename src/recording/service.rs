//! Recording supervisor
//!
//! Owns one [`RecordingWriter`] task per live stream. Writers end on their own
//! when their stream is tombstoned; explicit stops wait for the writer to
//! finalize its metadata.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::RecordingConfig;
use crate::registry::Stream;

use super::metadata::RecordingMetadata;
use super::writer::RecordingWriter;

struct Worker {
    stream: Arc<Stream>,
    stop: CancellationToken,
    handle: JoinHandle<Option<RecordingMetadata>>,
}

/// Starts and stops per-stream recorders
pub struct RecordingService {
    config: RecordingConfig,
    workers: Mutex<HashMap<String, Worker>>,
    /// Writers of deleted streams whose name has since been reused
    retired: Mutex<Vec<Worker>>,
}

impl RecordingService {
    pub fn new(config: RecordingConfig) -> Self {
        Self {
            config,
            workers: Mutex::new(HashMap::new()),
            retired: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Start recording `stream`
    ///
    /// Returns false when recording is disabled or this stream instance is
    /// already being recorded. A finished writer, or one still attached to a
    /// deleted predecessor of the same name, is replaced.
    pub fn start(&self, stream: Arc<Stream>) -> bool {
        if !self.config.enabled || stream.is_closed() {
            return false;
        }

        let mut workers = self.workers.lock();
        let name = stream.name().to_string();

        if let Some(existing) = workers.get(&name) {
            if Arc::ptr_eq(&existing.stream, &stream) && !existing.handle.is_finished() {
                return false;
            }
        }

        let stop = stream.close_token().child_token();
        let writer = RecordingWriter::new(Arc::clone(&stream), &self.config, stop.clone());
        let handle = tokio::spawn(writer.run());

        let replaced = workers.insert(
            name,
            Worker {
                stream,
                stop,
                handle,
            },
        );

        // The predecessor may still be finalizing; keep it claimable by stop_stream
        if let Some(old) = replaced {
            let mut retired = self.retired.lock();
            retired.retain(|w| !w.handle.is_finished());
            retired.push(old);
        }
        true
    }

    /// Stop the recorder for `name` and wait for its metadata
    pub async fn stop(&self, name: &str) -> Option<RecordingMetadata> {
        let worker = self.workers.lock().remove(name)?;
        Self::join(name, worker).await
    }

    /// Stop the recorder attached to this exact stream instance
    ///
    /// A recorder for a newer stream with the same name is left running.
    pub async fn stop_stream(&self, stream: &Arc<Stream>) -> Option<RecordingMetadata> {
        let name = stream.name().as_str();
        let worker = {
            let mut workers = self.workers.lock();
            match workers.get(name) {
                Some(w) if Arc::ptr_eq(&w.stream, stream) => workers.remove(name),
                _ => {
                    let mut retired = self.retired.lock();
                    retired
                        .iter()
                        .position(|w| Arc::ptr_eq(&w.stream, stream))
                        .map(|i| retired.swap_remove(i))
                }
            }
        }?;
        Self::join(name, worker).await
    }

    /// Stop every recorder, returning the finalized sessions
    pub async fn stop_all(&self) -> Vec<RecordingMetadata> {
        let mut workers: Vec<(String, Worker)> = self.workers.lock().drain().collect();
        workers.extend(
            self.retired
                .lock()
                .drain(..)
                .map(|w| (w.stream.name().to_string(), w)),
        );

        let mut finished = Vec::with_capacity(workers.len());
        for (name, worker) in workers {
            if let Some(metadata) = Self::join(&name, worker).await {
                finished.push(metadata);
            }
        }

        if !finished.is_empty() {
            tracing::info!(recordings = finished.len(), "All recordings stopped");
        }
        finished
    }

    /// Number of recorders still running
    ///
    /// Finished writers stay registered until stopped so their metadata can
    /// still be collected.
    pub fn active_recordings(&self) -> usize {
        let running = self
            .workers
            .lock()
            .values()
            .filter(|w| !w.handle.is_finished())
            .count();
        running
            + self
                .retired
                .lock()
                .iter()
                .filter(|w| !w.handle.is_finished())
                .count()
    }

    pub fn is_recording(&self, name: &str) -> bool {
        self.workers
            .lock()
            .get(name)
            .is_some_and(|w| !w.handle.is_finished())
    }

    async fn join(name: &str, worker: Worker) -> Option<RecordingMetadata> {
        worker.stop.cancel();
        match worker.handle.await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::error!(stream = %name, error = %e, "Recording task failed");
                None
            }
        }
    }
}

//! Background cleanup manager
//!
//! Runs two independent sweeps:
//!
//! - every `cleanup.interval_secs`, evict streams idle for at least
//!   `streams.timeout_secs`
//! - once a day at `cleanup.schedule_time` (local time), delete recording
//!   artifacts older than `recording.retention_days`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local, NaiveTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigValidationError, RelayConfig};
use crate::recording::RecordingService;
use crate::registry::StreamRegistry;

use super::retention::{sweep_expired, RetentionReport};
use super::schedule::until_next_run;

/// Last and next run times of both sweeps
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepTimes {
    pub last_inactivity_sweep: Option<DateTime<Utc>>,
    pub next_inactivity_sweep: Option<DateTime<Utc>>,
    pub last_retention_sweep: Option<DateTime<Utc>>,
    pub next_retention_sweep: Option<DateTime<Utc>>,
}

/// Result of a manual cleanup run
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub evicted: Vec<String>,
    pub retention: RetentionReport,
}

struct Tasks {
    stop: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Process-wide sweeper for idle streams and expired recordings
pub struct CleanupManager {
    registry: Arc<StreamRegistry>,
    recordings: Arc<RecordingService>,
    timeout: Duration,
    interval: Duration,
    retention: Duration,
    root: PathBuf,
    schedule_time: NaiveTime,
    times: Mutex<SweepTimes>,
    tasks: Mutex<Option<Tasks>>,
}

impl CleanupManager {
    pub fn new(
        registry: Arc<StreamRegistry>,
        recordings: Arc<RecordingService>,
        config: &RelayConfig,
    ) -> Result<Self, ConfigValidationError> {
        Ok(Self {
            registry,
            recordings,
            timeout: config.streams.timeout(),
            interval: config.cleanup.interval(),
            retention: config.recording.retention(),
            root: config.recording.root_dir.clone(),
            schedule_time: config.cleanup.schedule_time()?,
            times: Mutex::new(SweepTimes::default()),
            tasks: Mutex::new(None),
        })
    }

    /// Spawn both periodic sweeps
    pub fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        if tasks.is_some() {
            tracing::warn!("Cleanup manager already running");
            return;
        }

        self.schedule_inactivity();
        self.schedule_retention();

        let stop = CancellationToken::new();
        let handles = vec![
            tokio::spawn(Arc::clone(self).inactivity_loop(stop.clone())),
            tokio::spawn(Arc::clone(self).retention_loop(stop.clone())),
        ];
        *tasks = Some(Tasks { stop, handles });

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            timeout_secs = self.timeout.as_secs(),
            schedule_time = %self.schedule_time.format("%H:%M"),
            retention_days = self.retention.as_secs() / 86_400,
            "Cleanup manager started"
        );
    }

    /// Stop both sweeps and wait for them to exit
    pub async fn stop(&self) {
        let Some(tasks) = self.tasks.lock().take() else {
            return;
        };

        tasks.stop.cancel();
        for handle in tasks.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Cleanup task failed");
            }
        }

        let mut times = self.times.lock();
        times.next_inactivity_sweep = None;
        times.next_retention_sweep = None;

        tracing::info!("Cleanup manager stopped");
    }

    pub fn is_running(&self) -> bool {
        self.tasks.lock().is_some()
    }

    /// Run both sweeps immediately
    pub async fn run_now(&self) -> CleanupReport {
        tracing::info!("Manual cleanup triggered");
        let evicted = self.sweep_inactive().await;
        let retention = self.sweep_retention().await;
        tracing::info!(
            evicted = evicted.len(),
            files_deleted = retention.files_deleted,
            "Manual cleanup completed"
        );

        CleanupReport { evicted, retention }
    }

    /// Last and next run times of both sweeps
    pub fn next_runs(&self) -> SweepTimes {
        self.times.lock().clone()
    }

    /// Evict streams idle for at least the configured timeout
    ///
    /// Candidates are re-checked at delete time, so a stream that resumed
    /// publishing after the snapshot survives. Returns the evicted names.
    pub async fn sweep_inactive(&self) -> Vec<String> {
        let candidates = self.registry.idle_candidates(self.timeout).await;
        let mut evicted = Vec::new();

        for name in candidates {
            let Some(stream) = self.registry.delete_if_idle(&name, self.timeout).await else {
                tracing::debug!(stream = %name, "Stream resumed activity, kept");
                continue;
            };
            self.recordings.stop_stream(&stream).await;
            evicted.push(name);
        }

        if evicted.is_empty() {
            tracing::debug!("No inactive streams to clean up");
        } else {
            tracing::info!(count = evicted.len(), streams = ?evicted, "Cleaned up inactive streams");
        }

        self.times.lock().last_inactivity_sweep = Some(Utc::now());
        evicted
    }

    /// Delete recording artifacts past the retention horizon
    ///
    /// A retention of zero days keeps everything.
    pub async fn sweep_retention(&self) -> RetentionReport {
        let report = if self.retention.is_zero() {
            RetentionReport::default()
        } else {
            let root = self.root.clone();
            let retention = self.retention;
            tokio::task::spawn_blocking(move || sweep_expired(&root, retention, SystemTime::now()))
                .await
                .unwrap_or_else(|e| {
                    tracing::error!(error = %e, "Retention sweep panicked");
                    RetentionReport::default()
                })
        };

        self.times.lock().last_retention_sweep = Some(Utc::now());
        report
    }

    fn schedule_inactivity(&self) {
        self.times.lock().next_inactivity_sweep =
            chrono::Duration::from_std(self.interval).ok().map(|d| Utc::now() + d);
    }

    /// Record the next retention run and return the wait until it
    fn schedule_retention(&self) -> Duration {
        let now = Local::now();
        let wait = until_next_run(&now, self.schedule_time);
        let next = chrono::Duration::from_std(wait).ok().map(|d| (now + d).with_timezone(&Utc));
        self.times.lock().next_retention_sweep = next;

        if let Some(next) = next {
            tracing::debug!(next = %next, "Retention sweep scheduled");
        }
        wait
    }

    async fn inactivity_loop(self: Arc<Self>, stop: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            self.schedule_inactivity();

            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep_inactive().await;
                }
            }
        }
    }

    async fn retention_loop(self: Arc<Self>, stop: CancellationToken) {
        loop {
            let wait = self.schedule_retention();

            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(wait) => {
                    self.sweep_retention().await;
                }
            }
        }
    }
}

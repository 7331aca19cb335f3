//! Statistics reported by streams, publishers and the relay itself

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Cumulative loss counters kept by a producer
///
/// Sent alongside every transmitted frame so the relay can surface how much
/// the producer shed under pressure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProducerCounters {
    /// Frames refused by a full queue
    pub dropped_frames: u64,
    /// Frames skipped by the adaptive policy
    pub skipped_frames: u64,
    /// Frames that failed to encode or transmit
    pub failed_frames: u64,
}

/// One row of the stream listing
#[derive(Debug, Clone, Serialize)]
pub struct StreamSummary {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub uptime_seconds: f64,
    pub total_frames: u64,
    pub viewer_count: u32,
    pub inactive_seconds: f64,
}

/// Detailed statistics for a single stream
#[derive(Debug, Clone, Serialize)]
pub struct StreamStats {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub uptime_seconds: f64,
    pub last_frame_at: Option<DateTime<Utc>>,
    pub inactive_seconds: f64,
    /// Id of the frame currently in the slot (0 before the first publish)
    pub frame_id: u64,
    pub total_frames: u64,
    pub bytes_received: u64,
    pub last_frame_size: usize,
    pub has_current_frame: bool,
    pub viewer_count: u32,
    /// Latest counters reported by the producer
    pub producer: ProducerCounters,
}

/// Snapshot of a publisher's state
#[derive(Debug, Clone, Serialize)]
pub struct PublisherStats {
    pub stream_name: String,
    /// Frames transmitted successfully
    pub total_frames: u64,
    pub failed_frames: u64,
    pub dropped_frames: u64,
    pub skipped_frames: u64,
    pub queue_size: usize,
    pub queue_max: usize,
    pub queue_utilization_pct: f64,
    pub current_quality: u8,
    pub base_quality: u8,
    /// Skip probability at the current queue utilization
    pub skip_probability: f64,
    pub avg_send_time_ms: f64,
    pub is_running: bool,
}

impl PublisherStats {
    pub fn counters(&self) -> ProducerCounters {
        ProducerCounters {
            dropped_frames: self.dropped_frames,
            skipped_frames: self.skipped_frames,
            failed_frames: self.failed_frames,
        }
    }
}

/// Configuration values exposed by the health report
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub timeout_seconds: u64,
    pub max_concurrent: usize,
    pub queue_size: usize,
    pub viewer_poll_interval_ms: u64,
    pub max_frame_size_bytes: usize,
    pub recording_codec: String,
    pub recording_fps: u32,
    pub retention_days: u64,
    pub cleanup_interval_seconds: u64,
    pub cleanup_schedule_time: String,
}

/// Relay-wide health summary
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub active_streams: usize,
    pub max_streams: usize,
    pub recording_enabled: bool,
    pub active_recordings: usize,
    pub config: EffectiveConfig,
}

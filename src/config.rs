//! Relay configuration
//!
//! Every recognized option lives in [`RelayConfig`]. Values are layered, later
//! sources overriding earlier ones:
//!
//! 1. Built-in defaults
//! 2. A config file (`config/frame-relay.{toml,yaml,json}` or an explicit path)
//! 3. Environment variables prefixed with `RELAY__` (e.g. `RELAY__STREAMS__TIMEOUT_SECS`)
//! 4. The flat variables `STREAM_TIMEOUT_SECONDS`, `MAX_CONCURRENT_STREAMS`,
//!    `RECORDING_RETENTION_DAYS` and `LOG_LEVEL`

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::registry::RegistryConfig;
use crate::stats::EffectiveConfig;

/// Format accepted by `cleanup.schedule_time`
pub const SCHEDULE_TIME_FORMAT: &str = "%H:%M";

/// Flat environment variables and the keys they override
const FLAT_ENV_OVERRIDES: &[(&str, &str)] = &[
    ("STREAM_TIMEOUT_SECONDS", "streams.timeout_secs"),
    ("MAX_CONCURRENT_STREAMS", "streams.max_concurrent"),
    ("RECORDING_RETENTION_DAYS", "recording.retention_days"),
    ("LOG_LEVEL", "logging.level"),
];

/// Main configuration for the relay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Stream lifecycle and limits
    #[serde(default)]
    pub streams: StreamsConfig,

    /// Recording of live streams to disk
    #[serde(default)]
    pub recording: RecordingConfig,

    /// Background sweeps
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Stream lifecycle and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamsConfig {
    /// Inactivity timeout after which a stream is evicted
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum number of concurrent streams
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Capacity of a publisher's frame queue
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Pause between two slot reads by a viewer
    #[serde(default = "default_viewer_poll_interval_ms")]
    pub viewer_poll_interval_ms: u64,

    /// Largest accepted frame payload
    #[serde(default = "default_max_frame_size_bytes")]
    pub max_frame_size_bytes: usize,

    /// Longest accepted stream name
    #[serde(default = "default_max_name_len")]
    pub max_name_len: usize,
}

/// Recording configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Whether new streams are recorded
    #[serde(default = "default_recording_enabled")]
    pub enabled: bool,

    /// Codec identifier written to metadata; `mjpeg` selects raw MJPEG output
    #[serde(default = "default_codec")]
    pub codec: String,

    /// Recorder polling rate
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// Age after which artifacts are deleted
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,

    /// Root directory of the artifact store
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
}

/// Cleanup sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Interval between inactivity sweeps
    #[serde(default = "default_cleanup_interval_secs")]
    pub interval_secs: u64,

    /// Local time of day for the retention sweep, `HH:MM`
    #[serde(default = "default_schedule_time")]
    pub schedule_time: String,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

// Default value functions
fn default_timeout_secs() -> u64 {
    300
}
fn default_max_concurrent() -> usize {
    50
}
fn default_queue_size() -> usize {
    30
}
fn default_viewer_poll_interval_ms() -> u64 {
    33
}
fn default_max_frame_size_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_max_name_len() -> usize {
    crate::registry::frame::DEFAULT_MAX_NAME_LEN
}
fn default_recording_enabled() -> bool {
    true
}
fn default_codec() -> String {
    "mjpeg".to_string()
}
fn default_fps() -> u32 {
    30
}
fn default_retention_days() -> u64 {
    7
}
fn default_root_dir() -> PathBuf {
    PathBuf::from("recordings")
}
fn default_cleanup_interval_secs() -> u64 {
    60
}
fn default_schedule_time() -> String {
    "03:00".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_concurrent: default_max_concurrent(),
            queue_size: default_queue_size(),
            viewer_poll_interval_ms: default_viewer_poll_interval_ms(),
            max_frame_size_bytes: default_max_frame_size_bytes(),
            max_name_len: default_max_name_len(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enabled: default_recording_enabled(),
            codec: default_codec(),
            fps: default_fps(),
            retention_days: default_retention_days(),
            root_dir: default_root_dir(),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_cleanup_interval_secs(),
            schedule_time: default_schedule_time(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from the default file location and the process
    /// environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None, &std::env::vars().collect())
    }

    /// Load configuration from an optional explicit file and an environment
    /// map.
    pub fn load_from(path: Option<&Path>, env: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("config/frame-relay").required(false),
        };

        let mut builder = Config::builder().add_source(file).add_source(
            Environment::with_prefix("RELAY")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(Some(env.clone())),
        );

        for (var, key) in FLAT_ENV_OVERRIDES {
            if let Some(value) = env.get(*var) {
                builder = builder.set_override(*key, value.as_str())?;
            }
        }

        builder.build()?.try_deserialize()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let positive = [
            ("streams.timeout_secs", self.streams.timeout_secs),
            ("streams.max_concurrent", self.streams.max_concurrent as u64),
            ("streams.queue_size", self.streams.queue_size as u64),
            (
                "streams.viewer_poll_interval_ms",
                self.streams.viewer_poll_interval_ms,
            ),
            (
                "streams.max_frame_size_bytes",
                self.streams.max_frame_size_bytes as u64,
            ),
            ("streams.max_name_len", self.streams.max_name_len as u64),
            ("recording.fps", u64::from(self.recording.fps)),
            ("cleanup.interval_secs", self.cleanup.interval_secs),
        ];

        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigValidationError::InvalidValue {
                    field: field.to_string(),
                    message: "must be greater than 0".to_string(),
                });
            }
        }

        // Framed artifacts store each frame length as u32
        if self.streams.max_frame_size_bytes as u64 > u64::from(u32::MAX) {
            return Err(ConfigValidationError::InvalidValue {
                field: "streams.max_frame_size_bytes".to_string(),
                message: format!("must not exceed {} bytes", u32::MAX),
            });
        }

        if self.recording.codec.trim().is_empty() {
            return Err(ConfigValidationError::MissingField(
                "recording.codec".to_string(),
            ));
        }

        self.cleanup.schedule_time()?;

        Ok(())
    }

    /// Registry settings derived from this configuration
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            max_streams: self.streams.max_concurrent,
            max_frame_size: self.streams.max_frame_size_bytes,
            max_name_len: self.streams.max_name_len,
            viewer_poll_interval: self.streams.viewer_poll_interval(),
            ..RegistryConfig::default()
        }
    }

    /// Values reported by the health endpoint
    pub fn effective(&self) -> EffectiveConfig {
        EffectiveConfig {
            timeout_seconds: self.streams.timeout_secs,
            max_concurrent: self.streams.max_concurrent,
            queue_size: self.streams.queue_size,
            viewer_poll_interval_ms: self.streams.viewer_poll_interval_ms,
            max_frame_size_bytes: self.streams.max_frame_size_bytes,
            recording_codec: self.recording.codec.clone(),
            recording_fps: self.recording.fps,
            retention_days: self.recording.retention_days,
            cleanup_interval_seconds: self.cleanup.interval_secs,
            cleanup_schedule_time: self.cleanup.schedule_time.clone(),
        }
    }

    /// Set the inactivity timeout
    pub fn stream_timeout(mut self, timeout: Duration) -> Self {
        self.streams.timeout_secs = timeout.as_secs();
        self
    }

    /// Set maximum concurrent streams
    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.streams.max_concurrent = max;
        self
    }

    /// Set the viewer polling cadence
    pub fn viewer_poll_interval(mut self, interval: Duration) -> Self {
        self.streams.viewer_poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the artifact store root
    pub fn recording_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.recording.root_dir = root.into();
        self
    }

    /// Set the recorder polling rate
    pub fn recording_fps(mut self, fps: u32) -> Self {
        self.recording.fps = fps;
        self
    }

    /// Disable recording
    pub fn disable_recording(mut self) -> Self {
        self.recording.enabled = false;
        self
    }
}

impl StreamsConfig {
    /// Get the inactivity timeout as Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get the viewer polling cadence as Duration.
    pub fn viewer_poll_interval(&self) -> Duration {
        Duration::from_millis(self.viewer_poll_interval_ms)
    }
}

impl RecordingConfig {
    /// Get the recorder polling cadence as Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }

    /// Get the retention horizon as Duration.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days.saturating_mul(24 * 60 * 60))
    }
}

impl CleanupConfig {
    /// Get the inactivity sweep interval as Duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Parse the retention sweep time of day.
    pub fn schedule_time(&self) -> Result<NaiveTime, ConfigValidationError> {
        NaiveTime::parse_from_str(self.schedule_time.trim(), SCHEDULE_TIME_FORMAT).map_err(|e| {
            ConfigValidationError::InvalidValue {
                field: "cleanup.schedule_time".to_string(),
                message: format!("expected HH:MM, got {:?} ({e})", self.schedule_time),
            }
        })
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();

        assert_eq!(config.streams.timeout_secs, 300);
        assert_eq!(config.streams.max_concurrent, 50);
        assert_eq!(config.streams.queue_size, 30);
        assert!(config.recording.enabled);
        assert_eq!(config.recording.codec, "mjpeg");
        assert_eq!(config.recording.fps, 30);
        assert_eq!(config.recording.retention_days, 7);
        assert_eq!(config.cleanup.interval_secs, 60);
        assert_eq!(config.cleanup.schedule_time, "03:00");
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_without_sources_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.toml");
        std::fs::File::create(&path).unwrap();

        let config = RelayConfig::load_from(Some(&path), &HashMap::new()).unwrap();
        assert_eq!(config.streams.max_concurrent, 50);
        assert_eq!(config.recording.root_dir, PathBuf::from("recordings"));
    }

    #[test]
    fn test_file_then_env_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[streams]\ntimeout_secs = 120\nmax_concurrent = 5\n\n[recording]\nenabled = false\n"
        )
        .unwrap();

        let env = env(&[
            ("RELAY__STREAMS__MAX_CONCURRENT", "8"),
            ("RELAY__CLEANUP__SCHEDULE_TIME", "04:30"),
        ]);
        let config = RelayConfig::load_from(Some(&path), &env).unwrap();

        assert_eq!(config.streams.timeout_secs, 120);
        assert_eq!(config.streams.max_concurrent, 8);
        assert!(!config.recording.enabled);
        assert_eq!(config.cleanup.schedule_time, "04:30");
    }

    #[test]
    fn test_flat_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::File::create(&path).unwrap();

        let env = env(&[
            ("STREAM_TIMEOUT_SECONDS", "90"),
            ("MAX_CONCURRENT_STREAMS", "3"),
            ("RECORDING_RETENTION_DAYS", "1"),
            ("LOG_LEVEL", "debug"),
        ]);
        let config = RelayConfig::load_from(Some(&path), &env).unwrap();

        assert_eq!(config.streams.timeout_secs, 90);
        assert_eq!(config.streams.max_concurrent, 3);
        assert_eq!(config.recording.retention_days, 1);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_invalid_schedule_time() {
        let mut config = RelayConfig::default();
        config.cleanup.schedule_time = "25:99".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_zero_values_rejected() {
        let config = RelayConfig::default().max_concurrent(0);
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidValue { field, .. }) if field == "streams.max_concurrent"
        ));

        let mut config = RelayConfig::default();
        config.streams.queue_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_frame_limit_rejected() {
        let mut config = RelayConfig::default();
        config.streams.max_frame_size_bytes = u32::MAX as usize;
        assert!(config.validate().is_ok());

        config.streams.max_frame_size_bytes = u32::MAX as usize + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::InvalidValue { field, .. }) if field == "streams.max_frame_size_bytes"
        ));
    }

    #[test]
    fn test_huge_retention_saturates() {
        let mut env = HashMap::new();
        env.insert("RECORDING_RETENTION_DAYS".to_string(), i64::MAX.to_string());
        let config = RelayConfig::load_from(None, &env).unwrap();

        assert_eq!(config.recording.retention_days, i64::MAX as u64);
        assert_eq!(config.recording.retention(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_empty_codec_rejected() {
        let mut config = RelayConfig::default();
        config.recording.codec = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::MissingField(_))
        ));
    }

    #[test]
    fn test_derived_values() {
        let config = RelayConfig::default()
            .stream_timeout(Duration::from_secs(30))
            .max_concurrent(4)
            .viewer_poll_interval(Duration::from_millis(50))
            .recording_fps(10);

        let registry = config.registry_config();
        assert_eq!(registry.max_streams, 4);
        assert_eq!(registry.viewer_poll_interval, Duration::from_millis(50));
        assert_eq!(config.streams.timeout(), Duration::from_secs(30));
        assert_eq!(config.recording.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.recording.retention(), Duration::from_secs(7 * 86_400));
        assert_eq!(
            config.cleanup.schedule_time().unwrap(),
            NaiveTime::from_hms_opt(3, 0, 0).unwrap()
        );

        let effective = config.effective();
        assert_eq!(effective.timeout_seconds, 30);
        assert_eq!(effective.max_concurrent, 4);
    }
}

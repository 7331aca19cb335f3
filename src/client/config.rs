//! Publisher configuration

use std::time::Duration;

use crate::config::{ConfigValidationError, RelayConfig};

/// Quality adaptation tuning
#[derive(Debug, Clone)]
pub struct RateConfig {
    /// Number of trailing send durations averaged
    pub window: usize,

    /// Samples required before any adjustment
    pub min_samples: usize,

    /// Average above this lowers quality
    pub high_latency: Duration,

    /// Average below this raises quality
    pub low_latency: Duration,

    /// Quality change per adjustment
    pub step: u8,

    /// Measurements between two adjustments
    pub adjust_every: u32,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            window: 10,
            min_samples: 3,
            high_latency: Duration::from_millis(500),
            low_latency: Duration::from_millis(200),
            step: 5,
            adjust_every: 30,
        }
    }
}

/// Publisher configuration
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Channel the frames are published to
    pub stream_name: String,

    /// Starting (and maximum) encoding quality, 1-100
    pub base_quality: u8,

    /// Floor for adaptive quality
    pub min_quality: u8,

    /// Capacity of the send queue
    pub max_queue_size: usize,

    /// Transmission rate cap (0 = unlimited)
    pub max_fps: u32,

    /// Enable adaptive skipping and quality control
    pub adaptive: bool,

    /// Quality adaptation tuning
    pub rate: RateConfig,

    /// Pause after a failed send while the queue is below half full (capped at 1s)
    pub retry_delay: Duration,

    /// Quality snaps back to base after the queue stays empty this long
    pub idle_reset: Duration,

    /// How long `stop` waits for the sender loop
    pub shutdown_timeout: Duration,

    /// Send queued frames before the sender loop exits
    pub drain_on_stop: bool,

    /// Seed for the skip decision; random when unset
    pub seed: Option<u64>,
}

impl PublisherConfig {
    pub fn new(stream_name: impl Into<String>) -> Self {
        Self {
            stream_name: stream_name.into(),
            base_quality: 85,
            min_quality: 50,
            max_queue_size: 30,
            max_fps: 30,
            adaptive: true,
            rate: RateConfig::default(),
            retry_delay: Duration::from_secs(5),
            idle_reset: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(5),
            drain_on_stop: false,
            seed: None,
        }
    }

    /// Configuration using the relay's default queue size
    pub fn for_relay(stream_name: impl Into<String>, relay: &RelayConfig) -> Self {
        Self::new(stream_name).max_queue_size(relay.streams.queue_size)
    }

    pub fn quality(mut self, base: u8) -> Self {
        self.base_quality = base;
        self
    }

    pub fn min_quality(mut self, min: u8) -> Self {
        self.min_quality = min;
        self
    }

    pub fn max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    pub fn max_fps(mut self, fps: u32) -> Self {
        self.max_fps = fps;
        self
    }

    pub fn adaptive(mut self, enabled: bool) -> Self {
        self.adaptive = enabled;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn drain_on_stop(mut self, drain: bool) -> Self {
        self.drain_on_stop = drain;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Minimum spacing between two transmissions
    pub fn frame_interval(&self) -> Option<Duration> {
        (self.max_fps > 0).then(|| Duration::from_secs_f64(1.0 / f64::from(self.max_fps)))
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let invalid = |field: &str, message: &str| ConfigValidationError::InvalidValue {
            field: field.to_string(),
            message: message.to_string(),
        };

        if self.stream_name.is_empty() {
            return Err(ConfigValidationError::MissingField("stream_name".to_string()));
        }
        if self.max_queue_size == 0 {
            return Err(invalid("max_queue_size", "must be greater than 0"));
        }
        if !(1..=100).contains(&self.base_quality) {
            return Err(invalid("base_quality", "must be between 1 and 100"));
        }
        if self.min_quality == 0 || self.min_quality > self.base_quality {
            return Err(invalid("min_quality", "must be between 1 and base_quality"));
        }
        if self.rate.window == 0 || self.rate.adjust_every == 0 {
            return Err(invalid("rate", "window and adjust_every must be greater than 0"));
        }
        if self.rate.low_latency > self.rate.high_latency {
            return Err(invalid("rate", "low_latency must not exceed high_latency"));
        }
        Ok(())
    }
}

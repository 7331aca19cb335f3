//! Registry configuration

use std::time::Duration;

use super::frame::DEFAULT_MAX_NAME_LEN;

/// Configuration for the stream registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum number of live streams
    pub max_streams: usize,

    /// Maximum accepted frame payload in bytes
    pub max_frame_size: usize,

    /// Maximum stream name length
    pub max_name_len: usize,

    /// Pause between two slot reads by a viewer feed
    pub viewer_poll_interval: Duration,

    /// How often a publish retries after racing a delete
    pub publish_retries: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_streams: 50,
            max_frame_size: 10 * 1024 * 1024, // 10MB
            max_name_len: DEFAULT_MAX_NAME_LEN,
            viewer_poll_interval: Duration::from_millis(33),
            publish_retries: 2,
        }
    }
}

impl RegistryConfig {
    /// Set maximum concurrent streams
    pub fn max_streams(mut self, max: usize) -> Self {
        self.max_streams = max;
        self
    }

    /// Set maximum frame size
    pub fn max_frame_size(mut self, bytes: usize) -> Self {
        self.max_frame_size = bytes;
        self
    }

    /// Set viewer polling cadence
    pub fn viewer_poll_interval(mut self, interval: Duration) -> Self {
        self.viewer_poll_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();

        assert_eq!(config.max_streams, 50);
        assert_eq!(config.max_frame_size, 10 * 1024 * 1024);
        assert_eq!(config.max_name_len, 64);
        assert_eq!(config.viewer_poll_interval, Duration::from_millis(33));
    }

    #[test]
    fn test_builder_chaining() {
        let config = RegistryConfig::default()
            .max_streams(2)
            .max_frame_size(1024)
            .viewer_poll_interval(Duration::from_millis(5));

        assert_eq!(config.max_streams, 2);
        assert_eq!(config.max_frame_size, 1024);
        assert_eq!(config.viewer_poll_interval, Duration::from_millis(5));
    }
}

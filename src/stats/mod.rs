//! Statistics and health reporting

pub mod metrics;

pub use metrics::{
    EffectiveConfig, HealthReport, ProducerCounters, PublisherStats, StreamStats, StreamSummary,
};

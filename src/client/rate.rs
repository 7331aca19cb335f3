//! Adaptive rate control
//!
//! Two independent signals drive the publisher:
//! - skip probability reacts to local queue pressure
//! - encoding quality reacts to measured send latency
//!
//! Quality moves by a fixed step at most once per `adjust_every`
//! measurements, which keeps it from oscillating between the thresholds.

use std::collections::VecDeque;
use std::time::Duration;

use super::config::RateConfig;

/// Utilization at and below which no frame is skipped
pub const SKIP_THRESHOLD: f64 = 0.7;

/// Probability of skipping a frame at the given queue utilization
///
/// Zero up to 70% utilization, then linear up to 1.0 at a full queue.
pub fn skip_probability(utilization: f64) -> f64 {
    if utilization <= SKIP_THRESHOLD {
        0.0
    } else {
        ((utilization - SKIP_THRESHOLD) / (1.0 - SKIP_THRESHOLD)).min(1.0)
    }
}

/// Direction of a quality adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityChange {
    Lowered { from: u8, to: u8 },
    Raised { from: u8, to: u8 },
}

/// Latency-driven quality controller
#[derive(Debug)]
pub struct RateController {
    config: RateConfig,
    adaptive: bool,
    base_quality: u8,
    min_quality: u8,
    quality: u8,
    samples: VecDeque<Duration>,
    since_adjust: u32,
}

impl RateController {
    pub fn new(config: RateConfig, base_quality: u8, min_quality: u8, adaptive: bool) -> Self {
        let min_quality = min_quality.min(base_quality);

        Self {
            samples: VecDeque::with_capacity(config.window),
            config,
            adaptive,
            base_quality,
            min_quality,
            quality: base_quality,
            since_adjust: 0,
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn base_quality(&self) -> u8 {
        self.base_quality
    }

    /// Skip probability for the current queue utilization
    pub fn skip_probability(&self, utilization: f64) -> f64 {
        if self.adaptive {
            skip_probability(utilization)
        } else {
            0.0
        }
    }

    /// Mean of the trailing window
    pub fn avg_send_time(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        Some(total / self.samples.len() as u32)
    }

    /// Record one transmission duration
    ///
    /// Returns the quality change this measurement triggered, if any.
    pub fn observe(&mut self, elapsed: Duration) -> Option<QualityChange> {
        if self.samples.len() == self.config.window {
            self.samples.pop_front();
        }
        self.samples.push_back(elapsed);

        if !self.adaptive {
            return None;
        }

        self.since_adjust += 1;
        if self.since_adjust < self.config.adjust_every {
            return None;
        }
        self.since_adjust = 0;

        if self.samples.len() < self.config.min_samples {
            return None;
        }
        let avg = self.avg_send_time()?;
        let from = self.quality;

        if avg > self.config.high_latency && self.quality > self.min_quality {
            self.quality = self
                .quality
                .saturating_sub(self.config.step)
                .max(self.min_quality);
            Some(QualityChange::Lowered {
                from,
                to: self.quality,
            })
        } else if avg < self.config.low_latency && self.quality < self.base_quality {
            self.quality = self
                .quality
                .saturating_add(self.config.step)
                .min(self.base_quality);
            Some(QualityChange::Raised {
                from,
                to: self.quality,
            })
        } else {
            None
        }
    }

    /// Return to base quality after the sender went idle
    ///
    /// Returns true if quality changed.
    pub fn reset_quality(&mut self) -> bool {
        if !self.adaptive || self.quality == self.base_quality {
            return false;
        }
        self.quality = self.base_quality;
        self.since_adjust = 0;
        true
    }
}

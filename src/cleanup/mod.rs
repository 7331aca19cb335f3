//! Periodic reclamation of idle streams and expired recordings

pub mod manager;
pub mod retention;
pub mod schedule;

pub use manager::{CleanupManager, CleanupReport, SweepTimes};
pub use retention::{sweep_expired, RetentionReport};
pub use schedule::{next_daily_run, until_next_run};

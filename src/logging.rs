//! Tracing subscriber setup

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{Error, Result};

/// Filter directive for the configured level
///
/// Unknown levels fall back to `info`. Anything containing `=` or `,` is taken
/// as a full filter directive.
pub fn filter_directive(level: &str) -> String {
    let level = level.trim().to_lowercase();
    if level.contains('=') || level.contains(',') {
        return level;
    }
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" | "off" => level,
        "warning" => "warn".to_string(),
        _ => "info".to_string(),
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over `logging.level`.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter_directive(&config.level)))
        .map_err(|e| Error::Logging(e.to_string()))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
    };

    result.map_err(|e| Error::Logging(e.to_string()))
}

//! Frame relay process
//!
//! Run with: frame-relay [CONFIG_FILE]
//!
//! Without an argument, `config/frame-relay.{toml,yaml,json}` is used when
//! present. Every option can be overridden from the environment, e.g.
//! `RELAY__STREAMS__MAX_CONCURRENT=10` or `STREAM_TIMEOUT_SECONDS=120`.

use std::path::PathBuf;

use frame_relay::{logging, RelayConfig, RelayService, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = RelayConfig::load_from(config_path.as_deref(), &std::env::vars().collect())?;

    logging::init_tracing(&config.logging)?;

    tracing::info!(
        timeout_secs = config.streams.timeout_secs,
        max_streams = config.streams.max_concurrent,
        recording = config.recording.enabled,
        codec = %config.recording.codec,
        root = %config.recording.root_dir.display(),
        retention_days = config.recording.retention_days,
        "Starting frame relay"
    );

    let relay = RelayService::new(config)?;
    relay.start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    let recordings = relay.shutdown().await;
    for metadata in &recordings {
        tracing::info!(
            stream = %metadata.stream_name,
            frames = metadata.total_frames,
            path = %metadata.path.display(),
            "Recording saved"
        );
    }

    Ok(())
}

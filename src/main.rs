//! Tally Server
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - TALLY_HOST: Bind address (default: 0.0.0.0)
//! - TALLY_PORT: Port number (default: 8080)
//! - TALLY_DATA_FILE: Snapshot file (default: ./tally_data/events.bin)
//! - TALLY_FLUSH_INTERVAL_SECS: Seconds between flush checks (default: 10)
//! - RUST_LOG: Log level (default: info)

use std::path::PathBuf;
use std::time::Duration;
use tally::api::{run_server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let defaults = ServerConfig::default();

    let host = std::env::var("TALLY_HOST").unwrap_or(defaults.host);
    let port: u16 = std::env::var("TALLY_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(defaults.port);
    let data_file = std::env::var("TALLY_DATA_FILE")
        .map(PathBuf::from)
        .unwrap_or(defaults.data_file);
    let flush_interval = std::env::var("TALLY_FLUSH_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(defaults.flush_interval);

    let config = ServerConfig {
        host,
        port,
        data_file,
        flush_interval,
    };

    tracing::info!("Tally configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    tracing::info!("  Data file: {}", config.data_file.display());
    tracing::info!("  Flush interval: {:?}", config.flush_interval);

    run_server(config).await
}

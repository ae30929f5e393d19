//! Depth Engine Binary
//!
//! Polls order book depth from the configured venues, runs the analytics
//! pipeline and logs a periodic status digest until terminated.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin depth-engine
//! ```
//!
//! # Environment Variables
//!
//! All optional:
//! - `DEPTH_SYMBOLS`: comma-separated symbol list (default: `BTC-USD`)
//! - `DEPTH_VENUES`: comma-separated venue list (default: `binance,coinbase,kraken`)
//! - `DEPTH_POLL_INTERVAL_MS`: per-venue poll cadence (default: 2000)
//! - `DEPTH_LIMIT`: book depth requested from each venue (default: 50)
//! - `DEPTH_STATUS_LOG_INTERVAL_SECS`: status digest cadence (default: 30)
//! - `RUST_LOG`: log level (default: info)

use std::sync::Arc;

use depth_engine::adapters::{DepthHttpClient, build_adapter};
use depth_engine::config::EngineConfig;
use depth_engine::engine::DepthEngine;
use depth_engine::telemetry;
use depth_engine::zones;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init();

    tracing::info!("Starting depth engine");

    let config = EngineConfig::from_env()?;
    log_config(&config);

    let engine = Arc::new(DepthEngine::new(&config));
    register_venues(&engine, &config)?;
    engine.start();

    let status_handle = spawn_status_log(Arc::clone(&engine), &config);

    wait_for_shutdown_signal().await;

    engine.shutdown();
    status_handle.abort();

    tracing::info!("Depth engine stopped");
    Ok(())
}

fn log_config(config: &EngineConfig) {
    let venues: Vec<&str> = config.venues.iter().map(|v| v.id.as_str()).collect();
    tracing::info!(
        symbols = ?config.symbols,
        venues = ?venues,
        channel_capacity = config.channel_capacity,
        "Configuration loaded"
    );
}

/// Build one adapter per venue/symbol pair and register them.
fn register_venues(engine: &DepthEngine, config: &EngineConfig) -> anyhow::Result<()> {
    let client = DepthHttpClient::new(config.feed.fetch_timeout)?;

    for venue in &config.venues {
        let adapters = config
            .symbols
            .iter()
            .map(|symbol| build_adapter(venue, symbol, client.clone()))
            .collect();
        engine.add_venue(&venue.id, adapters, venue.poll_interval());
    }
    Ok(())
}

/// Periodic digest: per-venue connection state plus the latest depth
/// imbalance of every tracked book.
fn spawn_status_log(engine: Arc<DepthEngine>, config: &EngineConfig) -> tokio::task::JoinHandle<()> {
    let interval = config.status_log_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; skip it so the feed has data.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            for status in engine.all_statuses() {
                tracing::info!(
                    venue = %status.venue,
                    state = %status.state,
                    quality = status.quality.score(),
                    failures = status.quality.consecutive_errors,
                    "venue status"
                );

                for snapshot in engine.venue_data(&status.venue) {
                    let imbalance = zones::imbalance(&snapshot);
                    tracing::info!(
                        venue = %snapshot.venue,
                        symbol = %snapshot.symbol,
                        ratio = imbalance.ratio,
                        signal = %imbalance.signal,
                        zones = engine.pressure_zones(&snapshot.venue, &snapshot.symbol).len(),
                        "book digest"
                    );
                }
            }
        }
    })
}

/// Wait for SIGTERM or SIGINT.
///
/// # Panics
///
/// Panics if signal handlers cannot be installed; a process that cannot
/// respond to termination signals should fail at startup instead.
#[allow(clippy::expect_used)]
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}

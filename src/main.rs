//! Carbon gateway - sensor ingest and carbon-footprint aggregation service
//!
//! Ingests time-stamped sensor readings over HTTP, persists them to an
//! append-only record log, and serves minute/hour carbon-footprint summaries
//! from periodically refreshed aggregate snapshots.
//!
//! Module structure:
//! - `domain/` - Core types (Reading, Granularity, BucketSummary)
//! - `io/` - External interfaces (record log, HTTP API)
//! - `services/` - Aggregation engine (aggregator, cache, refresher)
//! - `infra/` - Infrastructure (Config, Errors, Metrics)

use carbon_gateway::infra::{Config, Metrics};
use carbon_gateway::io::start_http_server;
use carbon_gateway::services::{run_refresher, CarbonEngine};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Carbon gateway - sensor ingest and aggregation service
#[derive(Parser, Debug)]
#[command(name = "carbon-gateway", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full event visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), git_hash = env!("GIT_HASH"), "carbon-gateway starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    info!(
        config_file = %config.config_file(),
        site_id = %config.site_id(),
        http_port = %config.http_port(),
        log_file = %config.log_file(),
        min_valid_epoch = %config.min_valid_epoch(),
        refresh_interval_secs = %config.refresh_interval_secs(),
        metrics_interval_secs = %config.metrics_interval_secs(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Create shared components
    let metrics = Arc::new(Metrics::new());
    let engine = Arc::new(CarbonEngine::new(&config, metrics.clone()));

    // Start the periodic refresher
    let refresher_engine = engine.clone();
    let refresher_shutdown = shutdown_rx.clone();
    let refresh_interval = config.refresh_interval_secs();
    tokio::spawn(async move {
        run_refresher(refresher_engine, refresh_interval, refresher_shutdown).await;
    });

    // Start metrics reporter (lock-free reads with full summary)
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run the HTTP API - serves until shutdown
    start_http_server(
        config.http_bind_address().to_string(),
        config.http_port(),
        engine,
        config.site_id().to_string(),
        shutdown_rx,
    )
    .await?;

    info!("carbon-gateway shutdown complete");
    Ok(())
}

//! Periodic aggregate refresh task
//!
//! A single cooperative loop: sleep one interval, replay-and-fold, repeat.
//! Refresh is timer-driven, never triggered by ingest. A failed cycle is
//! logged and counted; the last published snapshots stay up and the next
//! tick tries again. Shutdown is signalled over a watch channel and never
//! drops a published snapshot.

use crate::services::engine::CarbonEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Run the refresh loop until shutdown is signalled.
pub async fn run_refresher(
    engine: Arc<CarbonEngine>,
    interval_secs: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    // First tick fires immediately; use it to warm the caches at startup
    info!(interval_secs = %interval_secs, "refresher_started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = engine.refresh() {
                    engine.metrics().record_refresh_failed();
                    error!(error = %e, "refresh_failed");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("refresher_shutdown");
                    return;
                }
            }
        }
    }
}

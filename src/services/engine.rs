//! Engine facade - wires the record log, aggregate caches, and metrics
//!
//! The ingest path (append), the query path (snapshot read), and the refresh
//! path (replay + fold) all go through here. Ingest and query never wait on
//! a refresh; refresh replays the log once and feeds both granularity
//! caches from the same pass.

use crate::domain::{Granularity, Reading, SensorPayload};
use crate::infra::{Config, EngineError, Metrics};
use crate::io::RecordLog;
use crate::services::cache::{AggregateCache, RefreshOutcome, Snapshot};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// The carbon-footprint aggregation engine
pub struct CarbonEngine {
    log: RecordLog,
    minute: AggregateCache,
    hour: AggregateCache,
    metrics: Arc<Metrics>,
}

impl CarbonEngine {
    pub fn new(config: &Config, metrics: Arc<Metrics>) -> Self {
        Self {
            log: RecordLog::new(config.log_file(), config.min_valid_epoch()),
            minute: AggregateCache::new(Granularity::Minute),
            hour: AggregateCache::new(Granularity::Hour),
            metrics,
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn log(&self) -> &RecordLog {
        &self.log
    }

    /// Ingest one sensor payload: normalize, validate, append.
    ///
    /// The reading becomes visible to queries within one refresh period.
    pub fn ingest(&self, payload: &SensorPayload) -> Result<(), EngineError> {
        let reading = Reading::from_payload(payload);
        match self.log.append(&reading) {
            Ok(()) => {
                self.metrics.record_ingested();
                Ok(())
            }
            Err(e) => {
                if matches!(e, EngineError::InvalidTimestamp(_)) {
                    self.metrics.record_rejected();
                    warn!(timestamp = %reading.timestamp, "reading_rejected");
                }
                Err(e)
            }
        }
    }

    /// Current snapshot for a granularity. Never blocks, never recomputes.
    pub fn query(&self, granularity: Granularity) -> Arc<Snapshot> {
        self.metrics.record_query();
        match granularity {
            Granularity::Minute => self.minute.query(),
            Granularity::Hour => self.hour.query(),
        }
    }

    /// Replay the log once and refresh both caches.
    ///
    /// A failure leaves the previously published snapshots untouched. The
    /// cache generations are captured before the replay so a reset landing
    /// mid-pass invalidates the replayed data instead of republishing it.
    pub fn refresh(&self) -> Result<(), EngineError> {
        let started = Instant::now();
        let minute_generation = self.minute.generation();
        let hour_generation = self.hour.generation();
        let readings = self
            .log
            .replay()
            .map_err(|e| EngineError::RefreshFailure(e.to_string()))?;

        let minute_outcome = self.minute.refresh(&readings, minute_generation);
        let hour_outcome = self.hour.refresh(&readings, hour_generation);

        if minute_outcome == RefreshOutcome::Skipped && hour_outcome == RefreshOutcome::Skipped {
            self.metrics.record_refresh_skipped();
            return Ok(());
        }

        if minute_outcome == RefreshOutcome::Refreshed || hour_outcome == RefreshOutcome::Refreshed
        {
            let duration_us = started.elapsed().as_micros() as u64;
            self.metrics.record_refresh(duration_us);
        }
        Ok(())
    }

    /// Clear the record log and both caches in lockstep.
    pub fn reset(&self) -> Result<(), EngineError> {
        self.log.reset()?;
        self.minute.reset();
        self.hour.reset();
        self.metrics.record_reset();
        info!("engine_reset");
        Ok(())
    }
}

//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention. All
//! counter updates are lock-free; reporting swaps the interval counters
//! atomically.
//!
//! NOTE: All atomics use Relaxed ordering intentionally—these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential bucket boundaries for refresh duration (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
pub const REFRESH_BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
pub const REFRESH_NUM_BUCKETS: usize = 11;

/// Compute bucket index for a duration value using binary search
#[inline]
fn bucket_index(duration_us: u64) -> usize {
    REFRESH_BUCKET_BOUNDS.partition_point(|&bound| bound < duration_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Lock-free metrics collector for the aggregation engine
///
/// Recording operations are lock-free; `report()` swaps the interval
/// counters to produce a consistent summary.
pub struct Metrics {
    /// Readings accepted into the record log (monotonic)
    ingested_total: AtomicU64,
    /// Readings rejected for an implausible timestamp (monotonic)
    rejected_total: AtomicU64,
    /// Payloads rejected for schema/type violations (monotonic)
    malformed_total: AtomicU64,
    /// Carbon-footprint queries served (monotonic)
    queries_total: AtomicU64,
    /// Completed refresh cycles (monotonic)
    refresh_total: AtomicU64,
    /// Refresh cycles that failed (monotonic)
    refresh_failed_total: AtomicU64,
    /// Refresh cycles skipped because one was already running (monotonic)
    refresh_skipped_total: AtomicU64,
    /// Bulk resets performed (monotonic)
    resets_total: AtomicU64,
    /// Readings ingested since last report (reset on report)
    ingested_since_report: AtomicU64,
    /// Refresh duration histogram buckets (cumulative)
    refresh_buckets: [AtomicU64; REFRESH_NUM_BUCKETS],
    /// Max refresh duration in microseconds (monotonic)
    refresh_max_us: AtomicU64,
    /// Last refresh duration in microseconds
    refresh_last_us: AtomicU64,
    /// When this collector was created (for rates)
    started: Instant,
    /// When the last report was taken
    last_report: parking_lot::Mutex<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            ingested_total: AtomicU64::new(0),
            rejected_total: AtomicU64::new(0),
            malformed_total: AtomicU64::new(0),
            queries_total: AtomicU64::new(0),
            refresh_total: AtomicU64::new(0),
            refresh_failed_total: AtomicU64::new(0),
            refresh_skipped_total: AtomicU64::new(0),
            resets_total: AtomicU64::new(0),
            ingested_since_report: AtomicU64::new(0),
            refresh_buckets: Default::default(),
            refresh_max_us: AtomicU64::new(0),
            refresh_last_us: AtomicU64::new(0),
            started: Instant::now(),
            last_report: parking_lot::Mutex::new(Instant::now()),
        }
    }

    pub fn record_ingested(&self) {
        self.ingested_total.fetch_add(1, Ordering::Relaxed);
        self.ingested_since_report.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_query(&self) {
        self.queries_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh(&self, duration_us: u64) {
        self.refresh_total.fetch_add(1, Ordering::Relaxed);
        self.refresh_buckets[bucket_index(duration_us)].fetch_add(1, Ordering::Relaxed);
        self.refresh_last_us.store(duration_us, Ordering::Relaxed);
        update_atomic_max(&self.refresh_max_us, duration_us);
    }

    pub fn record_refresh_failed(&self) {
        self.refresh_failed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh_skipped(&self) {
        self.refresh_skipped_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reset(&self) {
        self.resets_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ingested_total(&self) -> u64 {
        self.ingested_total.load(Ordering::Relaxed)
    }

    pub fn rejected_total(&self) -> u64 {
        self.rejected_total.load(Ordering::Relaxed)
    }

    pub fn refresh_total(&self) -> u64 {
        self.refresh_total.load(Ordering::Relaxed)
    }

    /// Produce a summary for logging and Prometheus exposition
    pub fn report(&self) -> MetricsSummary {
        let mut last_report = self.last_report.lock();
        let now = Instant::now();
        let interval_secs = now.duration_since(*last_report).as_secs_f64();
        *last_report = now;
        drop(last_report);

        let ingested_interval = self.ingested_since_report.swap(0, Ordering::Relaxed);
        let ingest_per_sec =
            if interval_secs > 0.0 { ingested_interval as f64 / interval_secs } else { 0.0 };

        let mut refresh_buckets = [0u64; REFRESH_NUM_BUCKETS];
        for (i, bucket) in self.refresh_buckets.iter().enumerate() {
            refresh_buckets[i] = bucket.load(Ordering::Relaxed);
        }

        MetricsSummary {
            uptime_secs: self.started.elapsed().as_secs(),
            ingested_total: self.ingested_total.load(Ordering::Relaxed),
            rejected_total: self.rejected_total.load(Ordering::Relaxed),
            malformed_total: self.malformed_total.load(Ordering::Relaxed),
            queries_total: self.queries_total.load(Ordering::Relaxed),
            refresh_total: self.refresh_total.load(Ordering::Relaxed),
            refresh_failed_total: self.refresh_failed_total.load(Ordering::Relaxed),
            refresh_skipped_total: self.refresh_skipped_total.load(Ordering::Relaxed),
            resets_total: self.resets_total.load(Ordering::Relaxed),
            ingest_per_sec,
            refresh_buckets,
            refresh_last_us: self.refresh_last_us.load(Ordering::Relaxed),
            refresh_max_us: self.refresh_max_us.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time summary of engine metrics
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub uptime_secs: u64,
    pub ingested_total: u64,
    pub rejected_total: u64,
    pub malformed_total: u64,
    pub queries_total: u64,
    pub refresh_total: u64,
    pub refresh_failed_total: u64,
    pub refresh_skipped_total: u64,
    pub resets_total: u64,
    pub ingest_per_sec: f64,
    pub refresh_buckets: [u64; REFRESH_NUM_BUCKETS],
    pub refresh_last_us: u64,
    pub refresh_max_us: u64,
}

impl MetricsSummary {
    /// Emit the summary as a single structured log line
    pub fn log(&self) {
        info!(
            uptime_secs = %self.uptime_secs,
            ingested = %self.ingested_total,
            rejected = %self.rejected_total,
            malformed = %self.malformed_total,
            queries = %self.queries_total,
            refreshes = %self.refresh_total,
            refresh_failed = %self.refresh_failed_total,
            refresh_skipped = %self.refresh_skipped_total,
            resets = %self.resets_total,
            ingest_per_sec = format!("{:.2}", self.ingest_per_sec),
            refresh_last_us = %self.refresh_last_us,
            refresh_max_us = %self.refresh_max_us,
            "metrics_summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.record_ingested();
        metrics.record_ingested();
        metrics.record_rejected();
        metrics.record_query();
        metrics.record_refresh(150);
        metrics.record_refresh(5000);
        metrics.record_refresh_skipped();

        let summary = metrics.report();
        assert_eq!(summary.ingested_total, 2);
        assert_eq!(summary.rejected_total, 1);
        assert_eq!(summary.queries_total, 1);
        assert_eq!(summary.refresh_total, 2);
        assert_eq!(summary.refresh_skipped_total, 1);
        assert_eq!(summary.refresh_last_us, 5000);
        assert_eq!(summary.refresh_max_us, 5000);
    }

    #[test]
    fn test_interval_counter_resets_on_report() {
        let metrics = Metrics::new();
        metrics.record_ingested();
        let _ = metrics.report();
        metrics.record_ingested();
        metrics.record_ingested();
        // Totals are monotonic even though the interval counter was swapped
        assert_eq!(metrics.ingested_total(), 3);
    }

    #[test]
    fn test_refresh_histogram_buckets() {
        let metrics = Metrics::new();
        metrics.record_refresh(50); // bucket 0 (<=100)
        metrics.record_refresh(150); // bucket 1 (<=200)
        metrics.record_refresh(100_000); // overflow bucket
        let summary = metrics.report();
        assert_eq!(summary.refresh_buckets[0], 1);
        assert_eq!(summary.refresh_buckets[1], 1);
        assert_eq!(summary.refresh_buckets[REFRESH_NUM_BUCKETS - 1], 1);
    }
}

//! Aggregate cache - the last published snapshot per granularity
//!
//! Readers get the current snapshot as a cheap `Arc` clone and never wait on
//! a refresh. Refreshes fold only the log tail appended since the last cycle
//! (falling back to a full rebuild if the log shrank underneath us) and swap
//! in a freshly built snapshot; the previous one stays valid for readers
//! already holding it.
//!
//! At most one refresh runs at a time: a refresh arriving while another is
//! in flight is skipped, not queued.

use crate::domain::{BucketSummary, Granularity, Reading};
use crate::services::aggregator::Aggregation;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Immutable, fully computed aggregate as of one refresh cycle
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub granularity: Granularity,
    /// Bucket summaries, ascending by bucket key
    pub buckets: Vec<BucketSummary>,
    /// Number of log entries this snapshot covers
    pub entries_folded: usize,
}

impl Snapshot {
    fn empty(granularity: Granularity) -> Self {
        Self { granularity, buckets: Vec::new(), entries_folded: 0 }
    }
}

/// Outcome of a refresh attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new snapshot was published
    Refreshed,
    /// Another refresh was already in flight; nothing happened
    Skipped,
    /// A reset landed after the input was replayed; the stale fold was
    /// discarded without publishing
    Stale,
}

/// Cached aggregate for one granularity, refreshed in the background
pub struct AggregateCache {
    granularity: Granularity,
    /// Incremental fold state; only the refresher touches it
    state: Mutex<Aggregation>,
    /// Entries folded into `state` so far
    entries_folded: Mutex<usize>,
    /// Published snapshot; swapped whole, never mutated in place
    snapshot: RwLock<Arc<Snapshot>>,
    /// True while a refresh is executing
    refreshing: AtomicBool,
    /// Bumped by every reset; refreshes carrying data replayed under an
    /// older generation are discarded instead of published
    generation: AtomicU64,
}

impl AggregateCache {
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            state: Mutex::new(Aggregation::new(granularity)),
            entries_folded: Mutex::new(0),
            snapshot: RwLock::new(Arc::new(Snapshot::empty(granularity))),
            refreshing: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// Current reset generation. Capture this before replaying the log and
    /// hand it to `refresh` so a reset in between invalidates the pass.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Return the current snapshot immediately. Never recomputes, never
    /// blocks on a refresh in progress.
    pub fn query(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    /// Fold the full replayed log into the cache and publish a new snapshot.
    ///
    /// `expected_generation` is the value of [`generation`](Self::generation)
    /// captured before `readings` was replayed. If a reset bumped the
    /// generation since then, `readings` predates the clear and publishing
    /// it would resurrect deleted data, so the pass is discarded.
    ///
    /// Only the tail beyond the last folded entry is actually re-read; if
    /// the log is shorter than what was folded (external truncation), the
    /// fold state is rebuilt from scratch so the snapshot matches the log.
    pub fn refresh(&self, readings: &[Reading], expected_generation: u64) -> RefreshOutcome {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return RefreshOutcome::Skipped;
        }

        let mut state = self.state.lock();
        let mut entries_folded = self.entries_folded.lock();

        if self.generation.load(Ordering::Acquire) != expected_generation {
            drop(entries_folded);
            drop(state);
            self.refreshing.store(false, Ordering::Release);
            debug!(granularity = %self.granularity.as_str(), "aggregate_cache_refresh_stale");
            return RefreshOutcome::Stale;
        }

        if readings.len() < *entries_folded {
            // Log shrank underneath us; start over
            *state = Aggregation::new(self.granularity);
            *entries_folded = 0;
        }
        state.fold(&readings[*entries_folded..]);
        *entries_folded = readings.len();

        let new_snapshot = Arc::new(Snapshot {
            granularity: self.granularity,
            buckets: state.summaries(),
            entries_folded: *entries_folded,
        });

        // Publish while still holding the state lock: reset bumps the
        // generation under the same lock, so a reset cannot slip between
        // the generation check and this swap.
        *self.snapshot.write() = new_snapshot;
        drop(entries_folded);
        drop(state);
        self.refreshing.store(false, Ordering::Release);

        debug!(granularity = %self.granularity.as_str(), "aggregate_cache_refreshed");
        RefreshOutcome::Refreshed
    }

    /// Clear the fold state and publish an empty snapshot. Any in-flight
    /// refresh that replayed its input before this point is invalidated.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let mut entries_folded = self.entries_folded.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        *state = Aggregation::new(self.granularity);
        *entries_folded = 0;
        *self.snapshot.write() = Arc::new(Snapshot::empty(self.granularity));
    }
}

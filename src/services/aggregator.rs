//! Pure aggregation fold - readings to sorted bucket summaries
//!
//! `Aggregation` is the fold state: a bucket map keyed by truncated
//! timestamp. It supports the full "recompute from scratch" pass and the
//! incremental path (folding only readings appended since the last refresh);
//! both produce bit-identical results because they run the same additions in
//! the same per-reading order.
//!
//! Sums accumulate in kilograms, the reading's native unit. No intermediate
//! rounding.

use crate::domain::{BucketSummary, Granularity, Reading};
use rustc_hash::FxHashMap;

/// Bucket fold state for one granularity
#[derive(Debug, Clone)]
pub struct Aggregation {
    granularity: Granularity,
    buckets: FxHashMap<i64, BucketSummary>,
}

impl Aggregation {
    pub fn new(granularity: Granularity) -> Self {
        Self { granularity, buckets: FxHashMap::default() }
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Fold a single reading into its bucket, creating the bucket with zero
    /// sums the first time its key is seen. Buckets are keyed purely by
    /// time truncation; an all-zero reading still creates its bucket.
    pub fn fold_reading(&mut self, reading: &Reading) {
        let key = self.granularity.truncate(reading.timestamp);
        let summary = self.buckets.entry(key).or_insert_with(|| BucketSummary::new(key));
        summary.shred_kg += reading.shred_kg;
        summary.heat_kg += reading.heat_kg;
        summary.mould_kg += reading.mould_kg;
    }

    /// Fold a batch of readings.
    pub fn fold<'a, I>(&mut self, readings: I)
    where
        I: IntoIterator<Item = &'a Reading>,
    {
        for reading in readings {
            self.fold_reading(reading);
        }
    }

    /// Number of distinct buckets seen so far.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Emit bucket summaries sorted ascending by bucket key
    /// (chronologically).
    pub fn summaries(&self) -> Vec<BucketSummary> {
        let mut out: Vec<BucketSummary> = self.buckets.values().copied().collect();
        out.sort_unstable_by_key(|summary| summary.bucket);
        out
    }
}

/// One-shot full recomputation over a reading sequence.
pub fn aggregate<'a, I>(readings: I, granularity: Granularity) -> Vec<BucketSummary>
where
    I: IntoIterator<Item = &'a Reading>,
{
    let mut agg = Aggregation::new(granularity);
    agg.fold(readings);
    agg.summaries()
}

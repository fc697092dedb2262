//! Time buckets and per-bucket CO2 summaries
//!
//! A bucket is a reading timestamp truncated to a granularity boundary.
//! Summaries accumulate in kilograms only; milligram conversion (x 1e6,
//! rounded to 6 decimals) happens at the serialization boundary so rounding
//! error never compounds across additions.

use chrono::{DateTime, Utc};
use serde::Serialize;

const KG_TO_MG: f64 = 1_000_000.0;

/// Bucket width selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    Minute,
    Hour,
}

impl Granularity {
    /// Bucket width in seconds.
    pub fn width_secs(&self) -> i64 {
        match self {
            Granularity::Minute => 60,
            Granularity::Hour => 3600,
        }
    }

    /// Truncate an epoch-seconds timestamp to this bucket's boundary.
    pub fn truncate(&self, timestamp: i64) -> i64 {
        timestamp - timestamp.rem_euclid(self.width_secs())
    }

    /// Dashboard label for a bucket key, UTC.
    ///
    /// Minute buckets render as `YYYY-MM-DD HH:MM`, hour buckets as
    /// `YYYY-MM-DD HH:00`.
    pub fn label(&self, bucket_key: i64) -> String {
        let dt: DateTime<Utc> = DateTime::from_timestamp(bucket_key, 0).unwrap_or_default();
        match self {
            Granularity::Minute => dt.format("%Y-%m-%d %H:%M").to_string(),
            Granularity::Hour => dt.format("%Y-%m-%d %H:00").to_string(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
        }
    }
}

/// Running CO2 sums for one time bucket, kilograms.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BucketSummary {
    /// Truncated epoch-seconds timestamp, the bucket key.
    pub bucket: i64,
    pub shred_kg: f64,
    pub heat_kg: f64,
    pub mould_kg: f64,
}

impl BucketSummary {
    pub fn new(bucket: i64) -> Self {
        Self { bucket, ..Default::default() }
    }

    /// Derived total; never accumulated separately so it cannot drift from
    /// its components.
    pub fn total_kg(&self) -> f64 {
        self.shred_kg + self.heat_kg + self.mould_kg
    }
}

/// One serialized row of a carbon-footprint query response.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BucketRow {
    pub bucket_label: String,
    pub shredding_carbon_mg: f64,
    pub heating_carbon_mg: f64,
    pub pressure_carbon_mg: f64,
    pub total_carbon_mg: f64,
}

/// Round to 6 decimal places. Applied only here, at the edge.
fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

impl BucketRow {
    /// Convert a kg summary to the milligram wire row.
    pub fn from_summary(summary: &BucketSummary, granularity: Granularity) -> Self {
        Self {
            bucket_label: granularity.label(summary.bucket),
            shredding_carbon_mg: round6(summary.shred_kg * KG_TO_MG),
            heating_carbon_mg: round6(summary.heat_kg * KG_TO_MG),
            pressure_carbon_mg: round6(summary.mould_kg * KG_TO_MG),
            total_carbon_mg: round6(summary.total_kg() * KG_TO_MG),
        }
    }
}

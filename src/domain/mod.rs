//! Domain models - core types for the carbon aggregation engine
//!
//! This module contains the canonical data types used throughout the system:
//! - `Reading` - one validated, normalized sensor record
//! - `SensorPayload` - the wire form pushed by sensor collectors
//! - `Granularity` - bucket width selector (minute or hour)
//! - `BucketSummary` - running CO2 sums for one time bucket

pub mod bucket;
pub mod reading;

// Re-export commonly used types at module level
pub use bucket::{BucketRow, BucketSummary, Granularity};
pub use reading::{normalize_epoch_seconds, Reading, SensorPayload};

//! Services - the aggregation engine
//!
//! This module contains the core aggregation logic:
//! - `aggregator` - Pure fold from readings to sorted bucket summaries
//! - `cache` - Atomically swapped aggregate snapshots per granularity
//! - `engine` - Facade wiring the record log, caches, and metrics
//! - `refresher` - Periodic background refresh task

pub mod aggregator;
pub mod cache;
pub mod engine;
pub mod refresher;

// Re-export commonly used types
pub use aggregator::{aggregate, Aggregation};
pub use cache::{AggregateCache, Snapshot};
pub use engine::CarbonEngine;
pub use refresher::run_refresher;

//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `record_log` - Append-only CSV persistence for sensor readings
//! - `http` - HTTP API (ingest, queries, reset, health, Prometheus metrics)

pub mod http;
pub mod record_log;

// Re-export commonly used types
pub use http::start_http_server;
pub use record_log::RecordLog;

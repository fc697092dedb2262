//! Engine error taxonomy
//!
//! Ingest and query errors are returned synchronously to the HTTP caller;
//! refresh failures stay inside the background task (logged and counted,
//! last good snapshot retained).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Timestamp below the configured minimum plausible epoch. The reading
    /// is rejected outright, never persisted or aggregated.
    #[error("timestamp {0} below minimum plausible epoch")]
    InvalidTimestamp(i64),

    /// Payload failed schema or type validation at ingest.
    #[error("malformed sensor payload: {0}")]
    MalformedInput(String),

    /// The record log could not be written or read.
    #[error("record log unavailable: {0}")]
    StorageUnavailable(#[from] std::io::Error),

    /// A background recomputation failed. Never surfaced to readers.
    #[error("aggregate refresh failed: {0}")]
    RefreshFailure(String),
}

impl EngineError {
    /// Whether the caller is at fault (maps to a 4xx response).
    pub fn is_client_error(&self) -> bool {
        matches!(self, EngineError::InvalidTimestamp(_) | EngineError::MalformedInput(_))
    }
}

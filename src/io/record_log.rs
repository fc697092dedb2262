//! Append-only record log - the source of truth for raw readings
//!
//! Readings are persisted as rows of a flat CSV file so external
//! collaborators (the serial capture script, spreadsheet users) can read and
//! append with no tooling. Entries are immutable once appended; the only
//! mutation the log supports is an explicit bulk reset.
//!
//! Concurrency: appends are serialized by a mutex and written as one
//! complete row per call, so a concurrent replay sees either the old or the
//! new entry, never a torn one. Replay takes no lock; a partially flushed
//! tail row simply fails to parse and is skipped.

use crate::domain::Reading;
use crate::infra::EngineError;
use parking_lot::Mutex;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Column order is a wire contract shared with the capture script.
pub const LOG_HEADER: &str = "time,current_A,temp_C,pressure,co2_shred,co2_heating,co2_mould,co2_total";

/// Append-only CSV log of sensor readings
pub struct RecordLog {
    path: PathBuf,
    min_valid_epoch: i64,
    /// Guards appends and resets; replay is lock-free
    write_lock: Mutex<()>,
}

impl RecordLog {
    pub fn new<P: AsRef<Path>>(path: P, min_valid_epoch: i64) -> Self {
        Self { path: path.as_ref().to_path_buf(), min_valid_epoch, write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn min_valid_epoch(&self) -> i64 {
        self.min_valid_epoch
    }

    /// Append a reading to the log.
    ///
    /// Rejects timestamps below the minimum plausible epoch with
    /// `InvalidTimestamp` - invalid readings are never stored, so replay
    /// needs no validation. The row (including the recomputed total) and its
    /// newline are written in a single call under the write lock.
    pub fn append(&self, reading: &Reading) -> Result<(), EngineError> {
        if reading.timestamp < self.min_valid_epoch {
            return Err(EngineError::InvalidTimestamp(reading.timestamp));
        }

        let row = format!(
            "{},{},{},{},{},{},{},{}\n",
            reading.timestamp,
            reading.current_a,
            reading.temp_c,
            reading.pressure,
            reading.shred_kg,
            reading.heat_kg,
            reading.mould_kg,
            reading.total_kg(),
        );

        let _guard = self.write_lock.lock();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let needs_header = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        if needs_header {
            writeln!(file, "{}", LOG_HEADER)?;
        }
        file.write_all(row.as_bytes())?;

        debug!(timestamp = %reading.timestamp, "reading_appended");
        Ok(())
    }

    /// Replay all stored readings in append order.
    ///
    /// Each call is a fresh pass over the file. Rows that fail to parse
    /// (externally appended garbage, or a tail row still being flushed by a
    /// concurrent writer) are skipped with a warning.
    pub fn replay(&self) -> Result<Vec<Reading>, std::io::Error> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut readings = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.is_empty() || line.starts_with("time") {
                continue;
            }
            match parse_row(line) {
                Some(reading) => readings.push(reading),
                None => {
                    warn!(line = %(line_no + 1), "record_log_row_skipped");
                }
            }
        }
        Ok(readings)
    }

    /// Clear the log back to its header row. Idempotent.
    pub fn reset(&self) -> Result<(), std::io::Error> {
        let _guard = self.write_lock.lock();
        fs::write(&self.path, format!("{}\n", LOG_HEADER))?;
        debug!(path = %self.path.display(), "record_log_reset");
        Ok(())
    }
}

/// Parse one CSV row in `LOG_HEADER` column order.
///
/// All eight columns must be present and parse: a row missing the trailing
/// total is a torn write, not a shorter-but-valid record. The stored total
/// is only checked for well-formedness; sums always recompute it from the
/// three components.
fn parse_row(line: &str) -> Option<Reading> {
    let mut fields = line.split(',');
    let timestamp = fields.next()?.trim().parse().ok()?;
    let current_a = fields.next()?.trim().parse().ok()?;
    let temp_c = fields.next()?.trim().parse().ok()?;
    let pressure = fields.next()?.trim().parse().ok()?;
    let shred_kg = fields.next()?.trim().parse().ok()?;
    let heat_kg = fields.next()?.trim().parse().ok()?;
    let mould_kg = fields.next()?.trim().parse().ok()?;
    let _total: f64 = fields.next()?.trim().parse().ok()?;
    Some(Reading { timestamp, current_a, temp_c, pressure, shred_kg, heat_kg, mould_kg })
}

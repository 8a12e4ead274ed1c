//! Error types for output writers.

use std::path::PathBuf;

use thiserror::Error;

use dirscan_core::ScanError;

/// Failure while writing an output artifact.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An unsigned value does not fit a signed INTEGER column.
    #[error("Value {value} for column {column} exceeds the INTEGER range")]
    OutOfRange { column: &'static str, value: u64 },

    /// The finished temporary file could not be moved into place.
    #[error("Failed to replace output file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl OutputError {
    /// Attach the artifact path and convert into a scan error.
    pub fn into_scan_error(self, target: impl Into<PathBuf>) -> ScanError {
        ScanError::output(target, self)
    }
}

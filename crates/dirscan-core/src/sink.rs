//! Destination for a finished scan document.

use crate::error::ScanError;
use crate::session::ScanDocument;

/// A writer the scanner hands the completed document to.
///
/// Sinks run after the last entry is collected and before checkpoint state
/// is discarded, so a failing sink leaves the scan resumable.
pub trait OutputSink: Send + Sync {
    /// Short description used in log messages.
    fn describe(&self) -> String;

    /// Persist the document.
    fn write(&self, document: &ScanDocument) -> Result<(), ScanError>;
}

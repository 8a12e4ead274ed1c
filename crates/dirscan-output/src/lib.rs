//! Output writers for dirscan.
//!
//! Every writer implements [`OutputSink`](dirscan_core::OutputSink) so the
//! scanner can hand a finished document to any combination of them:
//!
//! - [`JsonWriter`] emits the document as one JSON object, to stdout or
//!   atomically to a file.
//! - [`SqliteWriter`] appends the document to a normalized SQLite database.
//! - [`SchemaWriter`] writes a machine-readable description of that database.
//!
//! # Example
//!
//! ```no_run
//! use dirscan_output::{SchemaWriter, SqliteWriter, default_schema_path};
//! # fn run(doc: &dirscan_core::ScanDocument) -> Result<(), dirscan_output::OutputError> {
//! let db = std::path::Path::new("scan.db");
//! let scan_id = SqliteWriter::new(db).write_document(doc)?;
//! SchemaWriter::new(default_schema_path(db)).write_schema()?;
//! println!("stored scan {scan_id}");
//! # Ok(())
//! # }
//! ```

mod error;
mod json;
pub mod schema;
mod sqlite;

pub use error::OutputError;
pub use json::{JsonTarget, JsonWriter};
pub use schema::{SchemaDocument, SchemaWriter, default_schema_path, schema_description};
pub use sqlite::SqliteWriter;

//! Core types and traits for dirscan.
//!
//! This crate provides the data model shared by the scanner and the output
//! writers: per-entry metadata records, scan provenance, configuration, the
//! error taxonomy, and the [`OutputSink`] seam.

mod config;
mod entry;
mod error;
mod layout;
pub mod path_serde;
mod session;
mod sink;

pub use config::{
    DEFAULT_CHECKPOINT_DIR, DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_CHECKSUM_MAX_SIZE,
    DEFAULT_COMMAND_TIMEOUT_SECS, ScanConfig, ScanConfigBuilder,
};
pub use entry::{
    AclInfo, Checksums, Entry, ExtendedAttributes, FileKind, InodeInfo, Ownership, Permissions,
    StandardMetadata, Timestamps, format_size,
};
pub use error::{ScanError, ScanWarning, WarningKind};
pub use layout::{LayoutComponent, LayoutMetadata, StripeInfo};
pub use session::{DirectoryRecord, ScanDocument, ScanSession};
pub use sink::OutputSink;

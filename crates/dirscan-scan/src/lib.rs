//! Resumable metadata scanning engine for dirscan.
//!
//! # Overview
//!
//! `dirscan-scan` walks a directory tree, runs the metadata collectors on
//! every entry, and checkpoints its progress so an interrupted scan can pick
//! up where it stopped. Key pieces:
//!
//! - **Tree walker** built on jwalk, with sorted and depth-bounded output
//! - **Collectors** for stat attributes, checksums, Lustre layout, xattrs and ACLs
//! - **Checkpoint manager** with an append-only processed log and atomic snapshots
//! - **Progress updates** via broadcast channels
//!
//! # Example
//!
//! ```rust,no_run
//! use dirscan_scan::{ScanConfig, ScanOutcome, Scanner};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), dirscan_scan::ScanError> {
//! let mut config = ScanConfig::new("/path/to/scan");
//! config.recursive = true;
//!
//! let scanner = Scanner::new(config);
//! let cancel = CancellationToken::new();
//! if let ScanOutcome::Completed(doc) = scanner.run(&[], &cancel).await? {
//!     println!("Total files: {}", doc.scan_info.total_files);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Progress Monitoring
//!
//! ```rust,no_run
//! use dirscan_scan::{ScanConfig, Scanner};
//!
//! let scanner = Scanner::new(ScanConfig::new("/path/to/scan"));
//! let mut progress_rx = scanner.subscribe();
//!
//! tokio::spawn(async move {
//!     while let Ok(progress) = progress_rx.recv().await {
//!         println!("Scanned {}/{}", progress.processed, progress.total);
//!     }
//! });
//! ```

mod checkpoint;
pub mod collect;
mod progress;
mod scanner;
mod walker;

pub use checkpoint::{CheckpointManager, CheckpointState, Progress};
pub use collect::{CommandRunner, SystemCommandRunner};
pub use progress::ScanProgress;
pub use scanner::{ScanOutcome, Scanner};
pub use walker::{TreeWalker, WorkItem, WorkKind, WorkList};

// Re-export core types for convenience
pub use dirscan_core::path_serde;
pub use dirscan_core::{
    DirectoryRecord, Entry, OutputSink, ScanConfig, ScanDocument, ScanError, ScanSession,
    ScanWarning, WarningKind,
};

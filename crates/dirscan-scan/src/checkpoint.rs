//! Durable scan progress.
//!
//! State for one logical scan lives in its own directory:
//!
//! - `processed.log`: one JSON-encoded path per line, appended and synced as
//!   each entry is collected. Paths that are not UTF-8 are stored as hex so
//!   they decode to the same bytes.
//! - `partial.json`: the document collected so far.
//! - `progress.json`: counters and timing.
//!
//! Both snapshots are replaced atomically. Every path in `partial.json` has
//! already been appended to the log, so the log is always a superset of the
//! snapshot. On load the snapshot wins.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

use dirscan_core::path_serde::{DecodedPath, EncodedPath};
use dirscan_core::{ScanConfig, ScanDocument, ScanError};

const PROCESSED_LOG: &str = "processed.log";
const PARTIAL_FILE: &str = "partial.json";
const PROGRESS_FILE: &str = "progress.json";

/// Counters persisted next to the partial document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub total: u64,
    pub processed: u64,
    pub restart_count: u32,
    pub first_started: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub elapsed_seconds: f64,
}

impl Progress {
    /// Progress as of a document snapshot.
    pub fn of(document: &ScanDocument, total: u64) -> Self {
        Self {
            total,
            processed: document.entry_count() as u64,
            restart_count: document.scan_info.restart_count,
            first_started: document.scan_info.scan_time,
            last_update: Utc::now(),
            elapsed_seconds: document.scan_info.elapsed_seconds,
        }
    }
}

/// Lifecycle of the checkpoint for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointState {
    /// No prior state was found.
    Fresh,
    /// Prior state was loaded and reconciled.
    Resuming,
    /// Entries are being recorded.
    Active,
    /// The scan finished and state was removed.
    Completed,
    /// The scan stopped early; state is kept for the next run.
    Interrupted,
}

/// Owns the on-disk state of one logical scan.
#[derive(Debug)]
pub struct CheckpointManager {
    dir: PathBuf,
    state: CheckpointState,
    processed: HashSet<PathBuf>,
    log: Option<File>,
}

impl CheckpointManager {
    /// Manager for the scan identified by `key` (an absolute path).
    pub fn new(checkpoint_dir: &Path, key: &Path) -> Self {
        Self {
            dir: Self::state_dir(checkpoint_dir, key),
            state: CheckpointState::Fresh,
            processed: HashSet::new(),
            log: None,
        }
    }

    /// Stable identifier for a scan key: sanitized name plus a short hash.
    pub fn identifier(key: &Path) -> String {
        let hash = blake3::hash(key.as_os_str().as_encoded_bytes());
        let slug: String = key
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string())
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("{slug}-{}", &hash.to_hex()[..16])
    }

    /// Directory holding the state for `key`.
    pub fn state_dir(checkpoint_dir: &Path, key: &Path) -> PathBuf {
        checkpoint_dir.join(Self::identifier(key))
    }

    /// Remove the state for `key`. Absent state is not an error.
    ///
    /// Returns whether anything was removed.
    pub fn cleanup(checkpoint_dir: &Path, key: &Path) -> Result<bool, ScanError> {
        let dir = Self::state_dir(checkpoint_dir, key);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::info!(dir = %dir.display(), "removed checkpoint");
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(ScanError::checkpoint(dir, err)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state(&self) -> CheckpointState {
        self.state
    }

    /// Whether `path` was collected by an earlier run.
    pub fn is_processed(&self, path: &Path) -> bool {
        self.processed.contains(path)
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    /// Load prior state for this scan.
    ///
    /// Returns the partial document when resuming, with its restart count
    /// already incremented. A snapshot written for a different root,
    /// traversal mode or set of collectors is rejected.
    pub fn load(
        &mut self,
        root: &Path,
        config: &ScanConfig,
    ) -> Result<Option<ScanDocument>, ScanError> {
        let partial_path = self.dir.join(PARTIAL_FILE);
        let Some(mut document) = read_json::<ScanDocument>(&partial_path)? else {
            // A log without a snapshot holds nothing worth keeping.
            self.remove_file(PROCESSED_LOG)?;
            self.state = CheckpointState::Fresh;
            return Ok(None);
        };

        if !document.scan_info.is_compatible_with(root, config) {
            return Err(ScanError::CorruptCheckpoint {
                path: self.dir.clone(),
                message: format!(
                    "checkpoint was written for {} ({})",
                    document.scan_info.directory.display(),
                    document.scan_info.describe_settings(),
                ),
            });
        }

        let snapshot: HashSet<PathBuf> = document.paths().map(Path::to_path_buf).collect();
        let logged = self.read_log()?;
        let dropped = logged.iter().filter(|p| !snapshot.contains(*p)).count();
        if dropped > 0 {
            tracing::warn!(
                dropped,
                "processed log lists entries missing from the snapshot; collecting them again"
            );
        }
        self.processed = snapshot;
        self.compact_log()?;

        document.scan_info.restart_count += 1;
        self.state = CheckpointState::Resuming;
        tracing::info!(
            dir = %self.dir.display(),
            processed = self.processed.len(),
            restart_count = document.scan_info.restart_count,
            "resuming from checkpoint"
        );
        Ok(Some(document))
    }

    /// Open the log for appending. Creates the state directory.
    pub fn begin(&mut self) -> Result<(), ScanError> {
        fs::create_dir_all(&self.dir).map_err(|e| ScanError::checkpoint(&self.dir, e))?;
        let path = self.dir.join(PROCESSED_LOG);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ScanError::checkpoint(&path, e))?;
        self.log = Some(file);
        self.state = CheckpointState::Active;
        Ok(())
    }

    /// Durably record one collected path.
    pub fn record(&mut self, path: &Path) -> Result<(), ScanError> {
        let log_path = self.dir.join(PROCESSED_LOG);
        let Some(log) = self.log.as_mut() else {
            return Err(ScanError::checkpoint(
                log_path,
                std::io::Error::other("checkpoint log is not open"),
            ));
        };
        let mut line = serde_json::to_string(&EncodedPath(path))
            .map_err(|e| ScanError::checkpoint(&log_path, e.into()))?;
        line.push('\n');
        log.write_all(line.as_bytes())
            .and_then(|()| log.sync_data())
            .map_err(|e| ScanError::checkpoint(&log_path, e))?;
        self.processed.insert(path.to_path_buf());
        Ok(())
    }

    /// Atomically replace the partial document and progress counters.
    pub fn snapshot(&self, document: &ScanDocument, total: u64) -> Result<(), ScanError> {
        write_json_atomic(&self.dir, PARTIAL_FILE, document)?;
        write_json_atomic(&self.dir, PROGRESS_FILE, &Progress::of(document, total))?;
        tracing::debug!(processed = document.entry_count(), total, "checkpoint saved");
        Ok(())
    }

    /// Snapshot and keep the state for a later run.
    pub fn interrupt(&mut self, document: &ScanDocument, total: u64) -> Result<(), ScanError> {
        self.snapshot(document, total)?;
        self.log = None;
        self.state = CheckpointState::Interrupted;
        tracing::info!(dir = %self.dir.display(), "checkpoint preserved");
        Ok(())
    }

    /// Discard all state after a successful scan.
    pub fn complete(&mut self) -> Result<(), ScanError> {
        self.log = None;
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(ScanError::checkpoint(&self.dir, err)),
        }
        self.state = CheckpointState::Completed;
        Ok(())
    }

    /// Saved progress counters, if any.
    pub fn load_progress(&self) -> Result<Option<Progress>, ScanError> {
        read_json(&self.dir.join(PROGRESS_FILE))
    }

    fn read_log(&self) -> Result<Vec<PathBuf>, ScanError> {
        let path = self.dir.join(PROCESSED_LOG);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(ScanError::checkpoint(path, err)),
        };

        let mut paths = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| ScanError::checkpoint(&path, e))?;
            // A crash mid-append leaves a truncated last line.
            match serde_json::from_str::<DecodedPath>(&line) {
                Ok(DecodedPath(p)) => paths.push(p),
                Err(_) => tracing::warn!(line = %line, "ignoring unreadable checkpoint log line"),
            }
        }
        Ok(paths)
    }

    /// Rewrite the log so it lists exactly the processed set.
    fn compact_log(&self) -> Result<(), ScanError> {
        let mut sorted: Vec<&PathBuf> = self.processed.iter().collect();
        sorted.sort();
        let mut body = String::new();
        for path in sorted {
            let line = serde_json::to_string(&EncodedPath(path))
                .map_err(|e| ScanError::checkpoint(&self.dir, e.into()))?;
            body.push_str(&line);
            body.push('\n');
        }
        write_atomic(&self.dir, PROCESSED_LOG, body.as_bytes())
    }

    fn remove_file(&self, name: &str) -> Result<(), ScanError> {
        let path = self.dir.join(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ScanError::checkpoint(path, err)),
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ScanError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(ScanError::checkpoint(path, err)),
    };
    serde_json::from_reader(BufReader::new(file))
        .map(Some)
        .map_err(|e| ScanError::CorruptCheckpoint {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

fn write_json_atomic<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<(), ScanError> {
    let bytes = serde_json::to_vec(value).map_err(|e| ScanError::checkpoint(dir, e.into()))?;
    write_atomic(dir, name, &bytes)
}

/// Write to a temporary file in `dir`, sync it, then rename over `name`.
fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), ScanError> {
    fs::create_dir_all(dir).map_err(|e| ScanError::checkpoint(dir, e))?;
    let target = dir.join(name);
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ScanError::checkpoint(dir, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        writer
            .write_all(bytes)
            .and_then(|()| writer.flush())
            .map_err(|e| ScanError::checkpoint(&target, e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| ScanError::checkpoint(&target, e))?;
    tmp.persist(&target)
        .map_err(|e| ScanError::checkpoint(&target, e.error))?;
    Ok(())
}

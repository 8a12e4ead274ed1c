//! Scan provenance and the result document.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ScanConfig;
use crate::entry::Entry;
use crate::error::ScanWarning;

/// Provenance of one logical scan, carried across restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSession {
    /// Absolute path of the scanned directory.
    #[serde(with = "crate::path_serde")]
    pub directory: PathBuf,
    /// When the first run of this scan started.
    pub scan_time: DateTime<Utc>,
    /// When the scan finished; unset while in progress.
    #[serde(default)]
    pub scan_completed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub lustre_version: Option<String>,
    pub lustre_enabled: bool,
    #[serde(default = "enabled")]
    pub xattrs_enabled: bool,
    #[serde(default = "enabled")]
    pub acls_enabled: bool,
    #[serde(default = "enabled")]
    pub checksums_enabled: bool,
    pub recursive: bool,
    #[serde(default)]
    pub max_depth: Option<u32>,
    #[serde(default)]
    pub total_files: u64,
    #[serde(default)]
    pub total_directories: u64,
    /// Number of times this scan was resumed from a checkpoint.
    #[serde(default)]
    pub restart_count: u32,
    /// Wall-clock seconds spent scanning, summed over all runs.
    #[serde(default)]
    pub elapsed_seconds: f64,
    pub scanner_version: String,
    /// Directories that could not be enumerated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ScanWarning>,
}

impl ScanSession {
    /// Start a new session for a canonical root directory.
    pub fn new(directory: impl Into<PathBuf>, config: &ScanConfig) -> Self {
        Self {
            directory: directory.into(),
            scan_time: Utc::now(),
            scan_completed: None,
            hostname: None,
            lustre_version: None,
            lustre_enabled: config.collect_lustre,
            xattrs_enabled: config.collect_xattrs,
            acls_enabled: config.collect_acls,
            checksums_enabled: config.compute_checksums,
            recursive: config.recursive,
            max_depth: config.max_depth.filter(|_| config.recursive),
            total_files: 0,
            total_directories: 0,
            restart_count: 0,
            elapsed_seconds: 0.0,
            scanner_version: env!("CARGO_PKG_VERSION").to_string(),
            warnings: Vec::new(),
        }
    }

    /// Whether a stored session describes the same logical scan as `config`.
    ///
    /// Entries restored from a checkpoint are never collected again, so the
    /// collector toggles must match as well as the traversal.
    pub fn is_compatible_with(&self, directory: &Path, config: &ScanConfig) -> bool {
        self.directory == directory
            && self.recursive == config.recursive
            && self.max_depth == config.max_depth.filter(|_| config.recursive)
            && self.lustre_enabled == config.collect_lustre
            && self.xattrs_enabled == config.collect_xattrs
            && self.acls_enabled == config.collect_acls
            && self.checksums_enabled == config.compute_checksums
    }

    /// Traversal and collector settings, for messages about mismatches.
    pub fn describe_settings(&self) -> String {
        format!(
            "recursive: {}, max depth: {:?}, lustre: {}, xattrs: {}, acls: {}, checksums: {}",
            self.recursive,
            self.max_depth,
            self.lustre_enabled,
            self.xattrs_enabled,
            self.acls_enabled,
            self.checksums_enabled,
        )
    }
}

fn enabled() -> bool {
    true
}

/// A directory entry with per-directory aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryRecord {
    #[serde(flatten)]
    pub entry: Entry,
    /// Depth below the scan root (direct children of the root are depth 1).
    pub depth: u32,
    /// Files directly inside this directory.
    #[serde(default)]
    pub file_count: u64,
    /// Total size of the files directly inside this directory.
    #[serde(default)]
    pub total_size_bytes: u64,
    /// Directories directly inside this directory that were scanned.
    #[serde(default)]
    pub subdirectory_count: u64,
}

impl DirectoryRecord {
    /// Wrap an entry; aggregates are filled in at finalization.
    pub fn new(entry: Entry, depth: u32) -> Self {
        Self {
            entry,
            depth,
            file_count: 0,
            total_size_bytes: 0,
            subdirectory_count: 0,
        }
    }

    /// Absolute path of the directory.
    pub fn path(&self) -> &Path {
        self.entry.path()
    }
}

/// The complete result of a scan: `{ scan_info, directories?, files }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanDocument {
    pub scan_info: ScanSession,
    /// Present only for recursive scans.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directories: Option<Vec<DirectoryRecord>>,
    pub files: Vec<Entry>,
}

impl ScanDocument {
    /// Create an empty document for a session.
    pub fn new(scan_info: ScanSession) -> Self {
        let directories = scan_info.recursive.then(Vec::new);
        Self {
            scan_info,
            directories,
            files: Vec::new(),
        }
    }

    /// Append a file entry.
    pub fn push_file(&mut self, entry: Entry) {
        self.files.push(entry);
    }

    /// Append a directory record.
    pub fn push_directory(&mut self, record: DirectoryRecord) {
        self.directories.get_or_insert_with(Vec::new).push(record);
    }

    /// Directory records, empty for flat scans.
    pub fn directories(&self) -> &[DirectoryRecord] {
        self.directories.as_deref().unwrap_or_default()
    }

    /// Number of entries (files and directories) in the document.
    pub fn entry_count(&self) -> usize {
        self.files.len() + self.directories().len()
    }

    /// Paths of every entry in the document.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.directories()
            .iter()
            .map(DirectoryRecord::path)
            .chain(self.files.iter().map(Entry::path))
    }

    /// Order entries by their work-list position.
    pub fn sort_by_scan_order(&mut self) {
        self.files.sort_by_key(|e| e.scan_order);
        if let Some(dirs) = self.directories.as_mut() {
            dirs.sort_by_key(|d| d.entry.scan_order);
        }
    }

    /// Recompute per-directory aggregates and session totals.
    pub fn finalize_statistics(&mut self) {
        self.scan_info.total_files = self.files.len() as u64;
        self.scan_info.total_directories = self.directories().len() as u64;

        let Some(dirs) = self.directories.as_mut() else {
            return;
        };

        let mut files_by_parent: HashMap<&Path, (u64, u64)> = HashMap::new();
        for file in &self.files {
            if let Some(parent) = file.path().parent() {
                let slot = files_by_parent.entry(parent).or_default();
                slot.0 += 1;
                slot.1 += file.size();
            }
        }

        let mut subdirs_by_parent: HashMap<PathBuf, u64> = HashMap::new();
        for dir in dirs.iter() {
            if let Some(parent) = dir.path().parent() {
                *subdirs_by_parent.entry(parent.to_path_buf()).or_default() += 1;
            }
        }

        for dir in dirs.iter_mut() {
            let (count, size) = files_by_parent
                .get(dir.path())
                .copied()
                .unwrap_or_default();
            dir.file_count = count;
            dir.total_size_bytes = size;
            dir.subdirectory_count = subdirs_by_parent.get(dir.path()).copied().unwrap_or(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::StandardMetadata;

    fn file(order: u64, path: &str, size: u64) -> Entry {
        let mut meta = StandardMetadata::new(path);
        meta.set_size(size);
        Entry::new(order, meta)
    }

    fn dir(order: u64, path: &str, depth: u32) -> DirectoryRecord {
        DirectoryRecord::new(Entry::new(order, StandardMetadata::new(path)), depth)
    }

    #[test]
    fn test_flat_document_has_no_directories() {
        let session = ScanSession::new("/data", &ScanConfig::new("/data"));
        let doc = ScanDocument::new(session);
        assert!(doc.directories.is_none());

        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("directories").is_none());
        assert!(json.get("files").unwrap().as_array().unwrap().is_empty());
    }

    #[test]
    fn test_finalize_statistics() {
        let mut config = ScanConfig::new("/data");
        config.recursive = true;
        let mut doc = ScanDocument::new(ScanSession::new("/data", &config));

        doc.push_directory(dir(1, "/data/a", 1));
        doc.push_file(file(2, "/data/a/x.bin", 100));
        doc.push_file(file(3, "/data/a/y.bin", 50));
        doc.push_directory(dir(4, "/data/a/b", 2));
        doc.push_file(file(5, "/data/top.txt", 7));

        doc.finalize_statistics();

        assert_eq!(doc.scan_info.total_files, 3);
        assert_eq!(doc.scan_info.total_directories, 2);
        let a = &doc.directories()[0];
        assert_eq!(a.file_count, 2);
        assert_eq!(a.total_size_bytes, 150);
        assert_eq!(a.subdirectory_count, 1);
        assert_eq!(doc.directories()[1].file_count, 0);
    }

    #[test]
    fn test_sort_by_scan_order() {
        let session = ScanSession::new("/data", &ScanConfig::new("/data"));
        let mut doc = ScanDocument::new(session);
        doc.push_file(file(3, "/data/c", 1));
        doc.push_file(file(1, "/data/a", 1));
        doc.push_file(file(2, "/data/b", 1));

        doc.sort_by_scan_order();

        let orders: Vec<u64> = doc.files.iter().map(|e| e.scan_order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[test]
    fn test_directory_record_flattens_entry() {
        let record = dir(1, "/data/a", 1);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["scan_order"], 1);
        assert_eq!(json["standard_metadata"]["basename"], "a");
        assert_eq!(json["depth"], 1);

        let back: DirectoryRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_session_compatibility() {
        let mut config = ScanConfig::new("/data");
        config.recursive = true;
        config.max_depth = Some(1);
        let session = ScanSession::new("/data", &config);

        assert!(session.is_compatible_with(Path::new("/data"), &config));
        config.max_depth = Some(2);
        assert!(!session.is_compatible_with(Path::new("/data"), &config));
        assert!(!session.is_compatible_with(Path::new("/other"), &config));
    }

    #[test]
    fn test_collector_toggles_affect_compatibility() {
        let config = ScanConfig::new("/data");
        let session = ScanSession::new("/data", &config);
        let root = Path::new("/data");

        let toggles: [fn(&mut ScanConfig); 4] = [
            |c| c.collect_lustre = true,
            |c| c.collect_xattrs = false,
            |c| c.collect_acls = false,
            |c| c.compute_checksums = false,
        ];
        for toggle in toggles {
            let mut changed = config.clone();
            toggle(&mut changed);
            assert!(!session.is_compatible_with(root, &changed));
        }
        assert!(session.is_compatible_with(root, &config));
    }

    #[test]
    fn test_older_sessions_default_collectors_on() {
        let mut json = serde_json::to_value(ScanSession::new("/data", &ScanConfig::new("/data")))
            .unwrap();
        let object = json.as_object_mut().unwrap();
        object.remove("xattrs_enabled");
        object.remove("acls_enabled");
        object.remove("checksums_enabled");

        let session: ScanSession = serde_json::from_value(json).unwrap();
        assert!(session.xattrs_enabled && session.acls_enabled && session.checksums_enabled);
    }
}

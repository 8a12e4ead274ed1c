//! Deterministic tree enumeration built on jwalk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use jwalk::{Parallelism, WalkDir};

use dirscan_core::{ScanConfig, ScanError, ScanWarning};

/// What a work item describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkKind {
    /// Regular file or symlink (symlinks are never descended into).
    File,
    /// Directory below the root, reported for aggregate statistics.
    Directory,
}

/// One path to collect metadata for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub path: PathBuf,
    pub kind: WorkKind,
    /// Depth relative to the root; the root's children are depth 1.
    pub depth: u32,
}

/// The ordered output of a walk.
#[derive(Debug, Default)]
pub struct WorkList {
    pub items: Vec<WorkItem>,
    /// Subtrees that could not be enumerated.
    pub warnings: Vec<ScanWarning>,
}

impl WorkList {
    /// Number of file items.
    pub fn file_count(&self) -> usize {
        self.items.iter().filter(|i| i.kind == WorkKind::File).count()
    }

    /// Number of directory items.
    pub fn directory_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.kind == WorkKind::Directory)
            .count()
    }

    /// Paths in walk order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.items.iter().map(|i| i.path.as_path())
    }
}

/// Enumerates the entries of a scan root in a stable order.
///
/// Children are sorted by name at every level and yielded depth-first, so a
/// directory always precedes its contents.
#[derive(Debug, Clone)]
pub struct TreeWalker {
    root: PathBuf,
    recursive: bool,
    max_depth: Option<u32>,
    threads: usize,
}

impl TreeWalker {
    /// Create a walker for an absolute root.
    pub fn new(root: impl Into<PathBuf>, config: &ScanConfig) -> Self {
        Self {
            root: root.into(),
            recursive: config.recursive,
            max_depth: config.effective_max_depth(),
            threads: config.threads,
        }
    }

    /// Walk the tree.
    ///
    /// Failing to list the root itself is fatal; failing to list any
    /// directory beneath it is recorded as a warning and that subtree is
    /// skipped.
    pub fn walk(&self) -> Result<WorkList, ScanError> {
        std::fs::read_dir(&self.root).map_err(|e| ScanError::io(&self.root, e))?;

        let parallelism = match self.threads {
            0 => Parallelism::RayonDefaultPool {
                busy_timeout: Duration::from_millis(100),
            },
            n => Parallelism::RayonNewPool(n),
        };

        // Directories deeper than the bound are yielded but never read.
        let dir_limit = self.max_depth.map(|d| d as usize);
        let walker = WalkDir::new(&self.root)
            .parallelism(parallelism)
            .sort(true)
            .skip_hidden(false)
            .follow_links(false)
            .min_depth(1)
            .max_depth(dir_limit.map_or(usize::MAX, |d| d + 1));

        let mut list = WorkList::default();
        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    let warning = match err.io_error() {
                        Some(io) => ScanWarning::read_error(&path, io),
                        None => ScanWarning::new(
                            &path,
                            err.to_string(),
                            dirscan_core::WarningKind::ReadError,
                        ),
                    };
                    tracing::warn!(path = %path.display(), "skipping subtree: {}", warning.message);
                    list.warnings.push(warning);
                    continue;
                }
            };

            let depth = entry.depth();
            let file_type = entry.file_type();
            let item_kind = if file_type.is_dir() {
                let within = dir_limit.is_none_or(|limit| depth <= limit);
                (self.recursive && within).then_some(WorkKind::Directory)
            } else if file_type.is_file() || file_type.is_symlink() {
                Some(WorkKind::File)
            } else {
                tracing::debug!(path = %entry.path().display(), "skipping special file");
                None
            };

            if let Some(kind) = item_kind {
                list.items.push(WorkItem {
                    path: entry.path(),
                    kind,
                    depth: depth as u32,
                });
            }
        }

        tracing::debug!(
            root = %self.root.display(),
            files = list.file_count(),
            directories = list.directory_count(),
            warnings = list.warnings.len(),
            "walk complete"
        );
        Ok(list)
    }
}

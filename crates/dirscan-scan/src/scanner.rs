//! Resumable scan orchestration.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use dirscan_core::{
    DirectoryRecord, OutputSink, ScanConfig, ScanDocument, ScanError, ScanSession,
};

use crate::checkpoint::CheckpointManager;
use crate::collect::{CommandRunner, Collectors, SystemCommandRunner, lustre_version};
use crate::progress::{ProgressTracker, ScanProgress};
use crate::walker::{TreeWalker, WorkItem, WorkKind, WorkList};

/// How a scan run ended.
#[derive(Debug)]
pub enum ScanOutcome {
    /// Every entry was collected and handed to the sinks.
    Completed(ScanDocument),
    /// Cancellation was requested; state was kept for the next run.
    Interrupted {
        processed: u64,
        total: u64,
        /// Where the checkpoint lives, when checkpointing is enabled.
        checkpoint_dir: Option<PathBuf>,
    },
}

/// Drives a scan: walk, collect each entry, checkpoint, and emit.
pub struct Scanner<R = SystemCommandRunner> {
    config: ScanConfig,
    collectors: Collectors<R>,
    progress_tx: broadcast::Sender<ScanProgress>,
}

impl Scanner {
    /// Create a scanner that runs the real introspection tools.
    pub fn new(config: ScanConfig) -> Self {
        let runner = SystemCommandRunner::new(config.command_timeout());
        Self::with_runner(config, runner)
    }
}

impl<R: CommandRunner> Scanner<R> {
    /// Create a scanner with a custom command runner.
    pub fn with_runner(config: ScanConfig, runner: R) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            collectors: Collectors::new(runner, &config),
            config,
            progress_tx,
        }
    }

    /// Subscribe to scan progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn runner(&self) -> &R {
        self.collectors.runner()
    }

    /// Absolute key identifying this scan's checkpoint.
    pub fn checkpoint_key(&self) -> Result<PathBuf, ScanError> {
        let key = self.config.checkpoint_key_path();
        std::path::absolute(key).map_err(|e| ScanError::io(key, e))
    }

    /// Directory holding this scan's checkpoint state.
    pub fn checkpoint_dir(&self) -> Result<PathBuf, ScanError> {
        Ok(CheckpointManager::state_dir(
            &self.config.checkpoint_dir,
            &self.checkpoint_key()?,
        ))
    }

    /// Remove this scan's checkpoint state, if any.
    pub fn cleanup_checkpoint(&self) -> Result<bool, ScanError> {
        CheckpointManager::cleanup(&self.config.checkpoint_dir, &self.checkpoint_key()?)
    }

    /// Run the scan to completion or until `cancel` fires.
    ///
    /// Cancellation is honored between entries. On completion the document
    /// is written to every sink before checkpoint state is discarded, so a
    /// failing sink leaves the scan resumable.
    pub async fn run(
        &self,
        sinks: &[&dyn OutputSink],
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome, ScanError> {
        self.config.validate()?;
        let root = self
            .config
            .root
            .canonicalize()
            .map_err(|e| ScanError::io(&self.config.root, e))?;
        if !root.is_dir() {
            return Err(ScanError::NotADirectory { path: root });
        }

        let mut checkpoint = if self.config.checkpointing {
            Some(CheckpointManager::new(
                &self.config.checkpoint_dir,
                &self.checkpoint_key()?,
            ))
        } else {
            None
        };

        let resumed = match checkpoint.as_mut() {
            Some(manager) => manager.load(&root, &self.config)?,
            None => None,
        };
        let mut document = match resumed {
            Some(document) => document,
            None => ScanDocument::new(self.new_session(&root).await),
        };

        let WorkList { items, warnings } = self.walk(&root).await?;
        document.scan_info.warnings = warnings;

        // Positions are taken from the full list so they survive resumes.
        let pending: Vec<(u64, WorkItem)> = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| (i as u64 + 1, item))
            .filter(|(_, item)| {
                !checkpoint
                    .as_ref()
                    .is_some_and(|manager| manager.is_processed(&item.path))
            })
            .collect();

        let resumed_from = document.entry_count() as u64;
        let total = resumed_from + pending.len() as u64;
        let remaining = pending.len();
        let base_elapsed = document.scan_info.elapsed_seconds;
        let mut tracker = ProgressTracker::new(total, resumed_from);

        if let Some(manager) = checkpoint.as_mut() {
            manager.begin()?;
        }

        tracing::info!(
            root = %root.display(),
            total,
            resumed_from,
            restart_count = document.scan_info.restart_count,
            "starting scan"
        );
        let _ = self.progress_tx.send(tracker.snapshot());

        let mut since_snapshot = 0;
        for (i, (scan_order, item)) in pending.into_iter().enumerate() {
            if cancel.is_cancelled() {
                document.scan_info.elapsed_seconds =
                    base_elapsed + tracker.elapsed().as_secs_f64();
                let checkpoint_dir = match checkpoint.as_mut() {
                    Some(manager) => {
                        manager.interrupt(&document, total)?;
                        Some(manager.dir().to_path_buf())
                    }
                    None => None,
                };
                let processed = document.entry_count() as u64;
                tracing::info!(processed, total, "scan interrupted");
                return Ok(ScanOutcome::Interrupted {
                    processed,
                    total,
                    checkpoint_dir,
                });
            }

            tracing::debug!(path = %item.path.display(), scan_order, "collecting");
            let entry = self.collectors.collect(scan_order, &item.path).await;
            match item.kind {
                WorkKind::File => document.push_file(entry),
                WorkKind::Directory => {
                    document.push_directory(DirectoryRecord::new(entry, item.depth))
                }
            }

            if let Some(manager) = checkpoint.as_mut() {
                manager.record(&item.path)?;
                since_snapshot += 1;
                if since_snapshot >= self.config.checkpoint_interval || i + 1 == remaining {
                    document.scan_info.elapsed_seconds =
                        base_elapsed + tracker.elapsed().as_secs_f64();
                    manager.snapshot(&document, total)?;
                    since_snapshot = 0;
                }
            }

            tracker.record(item.path);
            let _ = self.progress_tx.send(tracker.snapshot());
        }

        document.finalize_statistics();
        document.sort_by_scan_order();
        document.scan_info.scan_completed = Some(Utc::now());
        document.scan_info.elapsed_seconds = base_elapsed + tracker.elapsed().as_secs_f64();

        for sink in sinks {
            tracing::info!(sink = %sink.describe(), "writing output");
            sink.write(&document)?;
        }

        if let Some(manager) = checkpoint.as_mut() {
            manager.complete()?;
        }

        tracing::info!(
            files = document.scan_info.total_files,
            directories = document.scan_info.total_directories,
            elapsed = document.scan_info.elapsed_seconds,
            "scan complete"
        );
        Ok(ScanOutcome::Completed(document))
    }

    async fn new_session(&self, root: &Path) -> ScanSession {
        let mut session = ScanSession::new(root, &self.config);
        session.hostname = hostname::get()
            .ok()
            .map(|h| h.to_string_lossy().into_owned());
        if self.config.collect_lustre {
            session.lustre_version = lustre_version(self.collectors.runner()).await;
        }
        session
    }

    async fn walk(&self, root: &Path) -> Result<WorkList, ScanError> {
        let walker = TreeWalker::new(root, &self.config);
        tokio::task::spawn_blocking(move || walker.walk())
            .await
            .map_err(|e| ScanError::Other {
                message: format!("walker task failed: {e}"),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::testing::ScriptedRunner;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("data");

        fs::create_dir_all(root.join("dir1/subdir")).unwrap();
        fs::create_dir(root.join("dir2")).unwrap();
        fs::write(root.join("file1.txt"), "hello").unwrap();
        fs::write(root.join("dir1/file2.txt"), "world world world").unwrap();
        fs::write(root.join("dir1/subdir/file3.txt"), "test").unwrap();
        fs::write(root.join("dir2/file4.txt"), "another file here").unwrap();

        temp
    }

    fn config_for(temp: &TempDir) -> ScanConfig {
        let mut config = ScanConfig::new(temp.path().join("data"));
        config.checkpoint_dir = temp.path().join("checkpoints");
        config
    }

    #[tokio::test]
    async fn test_flat_scan() {
        let temp = create_test_tree();
        let scanner = Scanner::with_runner(config_for(&temp), ScriptedRunner::default());

        let outcome = scanner.run(&[], &CancellationToken::new()).await.unwrap();

        let ScanOutcome::Completed(doc) = outcome else {
            panic!("scan did not complete");
        };
        assert_eq!(doc.files.len(), 1);
        assert!(doc.directories.is_none());
        assert_eq!(doc.scan_info.total_files, 1);
        assert!(doc.scan_info.scan_completed.is_some());
        assert!(!scanner.checkpoint_dir().unwrap().exists());
    }

    #[tokio::test]
    async fn test_recursive_scan_aggregates() {
        let temp = create_test_tree();
        let mut config = config_for(&temp);
        config.recursive = true;
        let scanner = Scanner::with_runner(config, ScriptedRunner::default());

        let ScanOutcome::Completed(doc) =
            scanner.run(&[], &CancellationToken::new()).await.unwrap()
        else {
            panic!("scan did not complete");
        };

        assert_eq!(doc.scan_info.total_files, 4);
        assert_eq!(doc.scan_info.total_directories, 3);
        let dir1 = doc
            .directories()
            .iter()
            .find(|d| d.path().ends_with("dir1"))
            .unwrap();
        assert_eq!(dir1.depth, 1);
        assert_eq!(dir1.file_count, 1);
        assert_eq!(dir1.total_size_bytes, 17);
        assert_eq!(dir1.subdirectory_count, 1);

        let orders: Vec<u64> = doc
            .directories()
            .iter()
            .map(|d| d.entry.scan_order)
            .chain(doc.files.iter().map(|f| f.scan_order))
            .collect();
        let mut sorted = orders.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (1..=7).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_keeps_checkpoint() {
        let temp = create_test_tree();
        let scanner = Scanner::with_runner(config_for(&temp), ScriptedRunner::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = scanner.run(&[], &cancel).await.unwrap();

        match outcome {
            ScanOutcome::Interrupted {
                processed,
                total,
                checkpoint_dir,
            } => {
                assert_eq!(processed, 0);
                assert_eq!(total, 1);
                assert!(checkpoint_dir.unwrap().join("partial.json").exists());
            }
            ScanOutcome::Completed(_) => panic!("expected interruption"),
        }
    }

    #[tokio::test]
    async fn test_not_a_directory() {
        let temp = create_test_tree();
        let mut config = config_for(&temp);
        config.root = temp.path().join("data/file1.txt");
        let scanner = Scanner::with_runner(config, ScriptedRunner::default());

        let result = scanner.run(&[], &CancellationToken::new()).await;
        assert!(matches!(result, Err(ScanError::NotADirectory { .. })));
    }

    #[tokio::test]
    async fn test_progress_is_broadcast() {
        let temp = create_test_tree();
        let scanner = Scanner::with_runner(config_for(&temp), ScriptedRunner::default());
        let mut rx = scanner.subscribe();

        scanner.run(&[], &CancellationToken::new()).await.unwrap();

        let mut last = None;
        while let Ok(progress) = rx.try_recv() {
            last = Some(progress);
        }
        let last = last.unwrap();
        assert_eq!(last.processed, 1);
        assert_eq!(last.total, 1);
        assert!(last.current_path.ends_with("file1.txt"));
    }

    #[tokio::test]
    async fn test_lustre_version_recorded() {
        let temp = create_test_tree();
        let mut config = config_for(&temp);
        config.collect_lustre = true;
        let runner = ScriptedRunner::default().respond("lfs --version", "lfs 2.15.4");
        let scanner = Scanner::with_runner(config, runner);

        let ScanOutcome::Completed(doc) =
            scanner.run(&[], &CancellationToken::new()).await.unwrap()
        else {
            panic!("scan did not complete");
        };
        assert_eq!(doc.scan_info.lustre_version.as_deref(), Some("lfs 2.15.4"));
        assert!(doc.scan_info.lustre_enabled);
    }
}

//! Scan progress reporting.

use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Progress information during a scan.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    /// Entries collected so far, including those restored from a checkpoint.
    pub processed: u64,
    /// Entries in the full work list.
    pub total: u64,
    /// Entries restored from a checkpoint at startup.
    pub resumed_from: u64,
    /// Path most recently collected.
    pub current_path: PathBuf,
    /// Time elapsed in this run.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Create initial progress state.
    pub fn new() -> Self {
        Self {
            processed: 0,
            total: 0,
            resumed_from: 0,
            current_path: PathBuf::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Entries collected per second in this run.
    pub fn entries_per_second(&self) -> f64 {
        let fresh = self.processed.saturating_sub(self.resumed_from);
        if self.elapsed.as_secs_f64() > 0.0 {
            fresh as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Completion as a fraction in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Internal progress tracker with timing.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    start_time: Instant,
    processed: u64,
    total: u64,
    resumed_from: u64,
    current_path: PathBuf,
}

impl ProgressTracker {
    pub fn new(total: u64, resumed_from: u64) -> Self {
        Self {
            start_time: Instant::now(),
            processed: resumed_from,
            total,
            resumed_from,
            current_path: PathBuf::new(),
        }
    }

    pub fn record(&mut self, path: PathBuf) {
        self.processed += 1;
        self.current_path = path;
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self) -> ScanProgress {
        ScanProgress {
            processed: self.processed,
            total: self.total,
            resumed_from: self.resumed_from,
            current_path: self.current_path.clone(),
            elapsed: self.start_time.elapsed(),
        }
    }
}

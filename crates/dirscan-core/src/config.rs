//! Scan configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Files larger than this are not checksummed (100 MiB).
pub const DEFAULT_CHECKSUM_MAX_SIZE: u64 = 100 * 1024 * 1024;

/// Number of processed entries between partial-result snapshots.
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 10;

/// Upper bound on a single external introspection command.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Directory holding per-scan checkpoint state.
pub const DEFAULT_CHECKPOINT_DIR: &str = ".dirscan_checkpoints";

/// Configuration for a scan.
///
/// Built once and handed to the scanner; nothing reads configuration from
/// ambient state.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Root directory to scan.
    pub root: PathBuf,

    /// Descend into subdirectories.
    #[builder(default = "false")]
    #[serde(default)]
    pub recursive: bool,

    /// Maximum directory depth to descend into (None = unlimited).
    ///
    /// The root is depth 0; only meaningful when `recursive` is set.
    #[builder(default)]
    #[serde(default)]
    pub max_depth: Option<u32>,

    /// Probe Lustre layout metadata with `lfs`.
    #[builder(default = "false")]
    #[serde(default)]
    pub collect_lustre: bool,

    /// Probe extended attributes with `getfattr`.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub collect_xattrs: bool,

    /// Probe POSIX ACLs with `getfacl`.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub collect_acls: bool,

    /// Compute content checksums for small regular files.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub compute_checksums: bool,

    /// Largest file size that still gets checksummed.
    #[builder(default = "DEFAULT_CHECKSUM_MAX_SIZE")]
    #[serde(default = "default_checksum_max_size")]
    pub checksum_max_size: u64,

    /// Persist progress so an interrupted scan can resume.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub checkpointing: bool,

    /// Directory under which checkpoint state is kept.
    #[builder(default = "PathBuf::from(DEFAULT_CHECKPOINT_DIR)")]
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,

    /// Output target the checkpoint identifier is derived from.
    ///
    /// Falls back to the root directory when unset.
    #[builder(default)]
    #[serde(default)]
    pub checkpoint_key: Option<PathBuf>,

    /// Entries processed between snapshots.
    #[builder(default = "DEFAULT_CHECKPOINT_INTERVAL")]
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,

    /// Timeout for each external command, in seconds.
    #[builder(default = "DEFAULT_COMMAND_TIMEOUT_SECS")]
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Number of threads for directory enumeration (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,
}

fn default_true() -> bool {
    true
}

fn default_checksum_max_size() -> u64 {
    DEFAULT_CHECKSUM_MAX_SIZE
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CHECKPOINT_DIR)
}

fn default_checkpoint_interval() -> usize {
    DEFAULT_CHECKPOINT_INTERVAL
}

fn default_command_timeout_secs() -> u64 {
    DEFAULT_COMMAND_TIMEOUT_SECS
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref root) = self.root {
            if root.as_os_str().is_empty() {
                return Err("Root path cannot be empty".to_string());
            }
        } else {
            return Err("Root path is required".to_string());
        }
        if self.checkpoint_interval == Some(0) {
            return Err("Checkpoint interval must be at least 1".to_string());
        }
        if self.command_timeout_secs == Some(0) {
            return Err("Command timeout must be at least 1 second".to_string());
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Create a flat, checkpointed config for scanning a path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            recursive: false,
            max_depth: None,
            collect_lustre: false,
            collect_xattrs: true,
            collect_acls: true,
            compute_checksums: true,
            checksum_max_size: DEFAULT_CHECKSUM_MAX_SIZE,
            checkpointing: true,
            checkpoint_dir: PathBuf::from(DEFAULT_CHECKPOINT_DIR),
            checkpoint_key: None,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            threads: 0,
        }
    }

    /// Reject settings the scanner cannot run with.
    ///
    /// Struct literals and deserialized configs bypass the builder's checks.
    pub fn validate(&self) -> Result<(), ScanError> {
        let invalid = |message: &str| {
            Err(ScanError::InvalidConfig {
                message: message.to_string(),
            })
        };
        if self.root.as_os_str().is_empty() {
            return invalid("root path cannot be empty");
        }
        if self.checkpoint_interval == 0 {
            return invalid("checkpoint interval must be at least 1");
        }
        if self.command_timeout_secs == 0 {
            return invalid("command timeout must be at least 1 second");
        }
        Ok(())
    }

    /// Timeout applied to each external command.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Path the checkpoint identifier is derived from.
    pub fn checkpoint_key_path(&self) -> &Path {
        self.checkpoint_key.as_deref().unwrap_or(&self.root)
    }

    /// Effective depth bound for the walk.
    ///
    /// Flat scans behave like a recursive scan bounded at the root.
    pub fn effective_max_depth(&self) -> Option<u32> {
        if self.recursive { self.max_depth } else { Some(0) }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

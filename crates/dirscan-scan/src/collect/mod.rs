//! Metadata collectors.
//!
//! Each collector is independent and best-effort. The standard collector
//! always produces a record (possibly carrying an error); the optional ones
//! produce `None` when their tool is unavailable or reports nothing.

mod acl;
mod command;
mod layout;
mod owner;
mod standard;
mod xattr;

use std::path::Path;
use std::sync::Arc;

use dirscan_core::{Entry, ScanConfig, StandardMetadata};

pub use acl::collect_acl;
pub use command::{CommandRunner, SystemCommandRunner};
pub use layout::{collect_layout, lustre_version};
pub use owner::OwnerResolver;
pub use standard::{StandardOptions, collect_standard, compute_checksums};
pub use xattr::collect_xattrs;

/// The full collector suite for one scan.
#[derive(Debug)]
pub struct Collectors<R> {
    runner: R,
    owners: Arc<OwnerResolver>,
    standard: StandardOptions,
    lustre: bool,
    xattrs: bool,
    acls: bool,
}

impl<R: CommandRunner> Collectors<R> {
    pub fn new(runner: R, config: &ScanConfig) -> Self {
        Self {
            runner,
            owners: Arc::new(OwnerResolver::new()),
            standard: StandardOptions {
                compute_checksums: config.compute_checksums,
                checksum_max_size: config.checksum_max_size,
            },
            lustre: config.collect_lustre,
            xattrs: config.collect_xattrs,
            acls: config.collect_acls,
        }
    }

    /// The runner used for external probes.
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run every enabled collector for one path and assemble the entry.
    ///
    /// Standard attributes are read on the blocking pool while the external
    /// probes run alongside.
    pub async fn collect(&self, scan_order: u64, path: &Path) -> Entry {
        let standard = {
            let path = path.to_path_buf();
            let owners = Arc::clone(&self.owners);
            let options = self.standard;
            tokio::task::spawn_blocking(move || collect_standard(&path, options, &owners))
        };
        let layout = async {
            if self.lustre {
                collect_layout(&self.runner, path).await
            } else {
                None
            }
        };
        let xattrs = async {
            if self.xattrs {
                collect_xattrs(&self.runner, path).await
            } else {
                None
            }
        };
        let acl = async {
            if self.acls {
                collect_acl(&self.runner, path).await
            } else {
                None
            }
        };

        let (standard, lustre_metadata, extended_attributes, acl_info) =
            tokio::join!(standard, layout, xattrs, acl);

        let standard_metadata = standard.unwrap_or_else(|err| {
            StandardMetadata::failed(path, format!("collector task failed: {err}"))
        });

        Entry {
            scan_order,
            standard_metadata,
            lustre_metadata,
            extended_attributes,
            acl_info,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::ffi::OsStr;
    use std::sync::Mutex;

    use super::CommandRunner;

    /// Answers commands whose command line starts with a registered prefix.
    #[derive(Debug, Default)]
    pub struct ScriptedRunner {
        responses: Vec<(String, String)>,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        pub fn respond(mut self, prefix: &str, output: &str) -> Self {
            self.responses.push((prefix.to_string(), output.to_string()));
            self
        }
    }

    impl CommandRunner for ScriptedRunner {
        async fn run(&self, program: &str, args: &[&OsStr]) -> Option<String> {
            let mut line = program.to_string();
            for arg in args {
                line.push(' ');
                line.push_str(&arg.to_string_lossy());
            }
            self.calls.lock().unwrap().push(line.clone());
            self.responses
                .iter()
                .find(|(prefix, _)| line.starts_with(prefix.as_str()))
                .map(|(_, output)| output.clone())
        }
    }
}

//! dirscan - resumable filesystem metadata scanner.
//!
//! Usage:
//!   dirscan DIR                      Scan DIR, print the JSON document to stdout
//!   dirscan DIR -o scan.json         Write the document to a file
//!   dirscan DIR -r --db scan.db      Append a recursive scan to a database and
//!                                    print the document to stdout
//!   dirscan DIR -o scan.json --db scan.db
//!                                    Write both, nothing on stdout
//!   dirscan DIR -o scan.json --cleanup
//!                                    Remove checkpoint state for that scan
//!   dirscan --help                   Show help

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use color_eyre::Section;
use color_eyre::eyre::{Context, Report, Result};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use dirscan_core::{DEFAULT_CHECKPOINT_DIR, DEFAULT_CHECKPOINT_INTERVAL, OutputSink, format_size};
use dirscan_output::{JsonWriter, SchemaWriter, SqliteWriter, default_schema_path};
use dirscan_scan::{ScanConfig, ScanDocument, ScanError, ScanOutcome, Scanner};

/// Exit status for a scan stopped by the user.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(
    name = "dirscan",
    version,
    about = "Resumable filesystem metadata scanner",
    long_about = "dirscan records per-file metadata (attributes, ownership, checksums, \
                  extended attributes, ACLs and optionally Lustre layout) as a JSON \
                  document and/or an SQLite database.\n\n\
                  Interrupted scans resume from their checkpoint when the same command \
                  is run again."
)]
struct Cli {
    /// Directory to scan
    directory: PathBuf,

    /// Write the JSON document to this file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Append the scan to this SQLite database; the JSON document still goes
    /// to stdout unless --output is given
    #[arg(long)]
    db: Option<PathBuf>,

    /// Where to write the schema description (default: <db stem>_schema.json)
    #[arg(long, requires = "db")]
    schema: Option<PathBuf>,

    /// Indent the JSON document
    #[arg(long)]
    pretty: bool,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Maximum depth below the directory (requires --recursive)
    #[arg(long, requires = "recursive")]
    max_depth: Option<u32>,

    /// Collect Lustre layout metadata with lfs
    #[arg(long)]
    lustre: bool,

    /// Skip extended attributes
    #[arg(long)]
    no_xattr: bool,

    /// Skip POSIX ACLs
    #[arg(long)]
    no_acl: bool,

    /// Skip content checksums
    #[arg(long)]
    no_checksums: bool,

    /// Disable checkpointing
    #[arg(long)]
    no_checkpoint: bool,

    /// Remove checkpoint state for this scan and exit
    #[arg(long)]
    cleanup: bool,

    /// Directory holding checkpoint state
    #[arg(long, env = "DIRSCAN_CHECKPOINT_DIR", default_value = DEFAULT_CHECKPOINT_DIR)]
    checkpoint_dir: PathBuf,

    /// Entries processed between checkpoint snapshots
    #[arg(long, default_value_t = DEFAULT_CHECKPOINT_INTERVAL)]
    checkpoint_interval: usize,

    /// Timeout for each external command, in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Threads used to enumerate the tree (0 = automatic)
    #[arg(short = 'j', long, default_value = "0")]
    threads: usize,

    /// Suppress per-entry progress lines
    #[arg(short, long)]
    quiet: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn scan_config(&self) -> Result<ScanConfig> {
        let mut builder = ScanConfig::builder();
        builder
            .root(self.directory.clone())
            .recursive(self.recursive)
            .max_depth(self.max_depth)
            .collect_lustre(self.lustre)
            .collect_xattrs(!self.no_xattr)
            .collect_acls(!self.no_acl)
            .compute_checksums(!self.no_checksums)
            .checkpointing(!self.no_checkpoint)
            .checkpoint_dir(self.checkpoint_dir.clone())
            .checkpoint_key(self.output.clone().or_else(|| self.db.clone()))
            .checkpoint_interval(self.checkpoint_interval)
            .threads(self.threads);
        if let Some(secs) = self.timeout {
            builder.command_timeout_secs(secs);
        }
        builder.build().wrap_err("Invalid configuration")
    }

    fn sinks(&self) -> Vec<Box<dyn OutputSink>> {
        let mut sinks: Vec<Box<dyn OutputSink>> = Vec::new();
        let json = match &self.output {
            Some(path) => JsonWriter::to_file(path),
            None => JsonWriter::to_stdout(),
        };
        sinks.push(Box::new(json.pretty(self.pretty)));
        if let Some(db) = &self.db {
            sinks.push(Box::new(SqliteWriter::new(db)));
            let schema = self.schema.clone().unwrap_or_else(|| default_schema_path(db));
            sinks.push(Box::new(SchemaWriter::new(schema)));
        }
        sinks
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let scanner = Scanner::new(cli.scan_config()?);

    if cli.cleanup {
        let dir = scanner.checkpoint_dir()?;
        if scanner.cleanup_checkpoint()? {
            eprintln!("Removed checkpoint {}", dir.display());
        } else {
            eprintln!("No checkpoint at {}", dir.display());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, stopping after the current entry");
                cancel.cancel();
            }
        });
    }

    let progress = (!cli.quiet).then(|| {
        let mut rx = scanner.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(p) => {
                        let name = p
                            .current_path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        eprintln!(
                            "Scanning {}/{} ({:.0}%, {:.1}/s): {}",
                            p.processed,
                            p.total,
                            p.fraction() * 100.0,
                            p.entries_per_second(),
                            name
                        );
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    let sinks = cli.sinks();
    let sink_refs: Vec<&dyn OutputSink> = sinks.iter().map(|s| &**s).collect();
    let outcome = scanner.run(&sink_refs, &cancel).await;

    if let Some(handle) = progress {
        handle.abort();
    }

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            let saved = (!cli.no_checkpoint)
                .then(|| scanner.checkpoint_dir().ok())
                .flatten()
                .filter(|dir| dir.exists());
            return Err(failure_report(err, saved.as_deref()));
        }
    };

    match outcome {
        ScanOutcome::Completed(document) => {
            print_summary(&document);
            Ok(ExitCode::SUCCESS)
        }
        ScanOutcome::Interrupted {
            processed,
            total,
            checkpoint_dir,
        } => {
            eprintln!();
            eprintln!("Scan interrupted after {processed}/{total} entries.");
            match checkpoint_dir {
                Some(dir) => {
                    eprintln!("Progress saved to {}.", dir.display());
                    eprintln!("Run the same command again to resume.");
                }
                None => eprintln!("Checkpointing was disabled; progress was not saved."),
            }
            Ok(ExitCode::from(EXIT_INTERRUPTED))
        }
    }
}

/// Tell the user what happened to saved progress when a scan aborts.
fn failure_report(err: ScanError, saved: Option<&Path>) -> Report {
    let hint = saved.map(|dir| resume_hint(&err, dir));
    let report = Report::new(err).wrap_err("Scan failed");
    match hint {
        Some((note, suggestion)) => report.note(note).suggestion(suggestion),
        None => report,
    }
}

fn resume_hint(err: &ScanError, dir: &Path) -> (String, &'static str) {
    match err {
        ScanError::CorruptCheckpoint { .. } => (
            format!("Checkpoint state was left untouched in {}", dir.display()),
            "Run the same command with --cleanup to discard it, then scan again",
        ),
        _ => (
            format!("Progress is preserved in {}", dir.display()),
            "Fix the problem above, then re-run the same command to resume",
        ),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_summary(document: &ScanDocument) {
    let info = &document.scan_info;
    let bytes: u64 = document.files.iter().map(|f| f.size()).sum();

    eprintln!();
    eprintln!("{}", "─".repeat(60));
    eprintln!(" {}", info.directory.display());
    eprintln!(
        " {} files, {} directories, {}",
        info.total_files,
        info.total_directories,
        format_size(bytes)
    );
    eprintln!(" Scanned in {:.2}s", info.elapsed_seconds);
    if info.restart_count > 0 {
        eprintln!(" Resumed {} time(s)", info.restart_count);
    }
    eprintln!("{}", "─".repeat(60));

    if !info.warnings.is_empty() {
        eprintln!();
        eprintln!("{} warning(s) during scan", info.warnings.len());
        for warning in &info.warnings {
            eprintln!("   {}: {}", warning.path.display(), warning.message);
        }
    }
}

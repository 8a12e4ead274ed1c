//! JSON document writer.

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;

use dirscan_core::{OutputSink, ScanDocument, ScanError};

use crate::error::OutputError;

/// Where the document goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonTarget {
    Stdout,
    File(PathBuf),
}

/// Serializes the scan document as a single JSON object.
#[derive(Debug, Clone)]
pub struct JsonWriter {
    target: JsonTarget,
    pretty: bool,
}

impl JsonWriter {
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self {
            target: JsonTarget::File(path.into()),
            pretty: false,
        }
    }

    pub fn to_stdout() -> Self {
        Self {
            target: JsonTarget::Stdout,
            pretty: false,
        }
    }

    /// Indent the output.
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn target(&self) -> &JsonTarget {
        &self.target
    }

    pub fn write_document(&self, document: &ScanDocument) -> Result<(), OutputError> {
        match &self.target {
            JsonTarget::Stdout => {
                let stdout = io::stdout();
                let mut out = BufWriter::new(stdout.lock());
                encode(&mut out, document, self.pretty)?;
                out.flush()?;
            }
            JsonTarget::File(path) => {
                write_atomic(path, |out| encode(out, document, self.pretty))?;
                tracing::info!(
                    path = %path.display(),
                    entries = document.entry_count(),
                    "wrote JSON document"
                );
            }
        }
        Ok(())
    }
}

impl OutputSink for JsonWriter {
    fn describe(&self) -> String {
        match &self.target {
            JsonTarget::Stdout => "JSON on stdout".to_string(),
            JsonTarget::File(path) => format!("JSON document {}", path.display()),
        }
    }

    fn write(&self, document: &ScanDocument) -> Result<(), ScanError> {
        self.write_document(document).map_err(|e| {
            let target = match &self.target {
                JsonTarget::Stdout => PathBuf::from("-"),
                JsonTarget::File(path) => path.clone(),
            };
            e.into_scan_error(target)
        })
    }
}

fn encode<W: Write, T: Serialize>(out: &mut W, value: &T, pretty: bool) -> Result<(), OutputError> {
    if pretty {
        serde_json::to_writer_pretty(&mut *out, value)?;
    } else {
        serde_json::to_writer(&mut *out, value)?;
    }
    out.write_all(b"\n")?;
    Ok(())
}

/// Write `path` through a temporary file in the same directory, so a
/// reader sees either the old content or the complete new content.
pub(crate) fn write_atomic<F>(path: &Path, fill: F) -> Result<(), OutputError>
where
    F: FnOnce(&mut BufWriter<&mut NamedTempFile>) -> Result<(), OutputError>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut out = BufWriter::new(&mut tmp);
        fill(&mut out)?;
        out.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

//! Relational writer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rusqlite::types::Value;
use rusqlite::{Connection, Transaction, params_from_iter};

use dirscan_core::{
    DirectoryRecord, Entry, LayoutMetadata, OutputSink, ScanDocument, ScanError, ScanSession,
};

use crate::error::OutputError;
use crate::schema::{self, Child, Owner};

type Row = Vec<(&'static str, Value)>;

/// Appends scan documents to an SQLite database.
///
/// The schema is created on first use; each document becomes one
/// `scan_info` row and is written in a single transaction.
#[derive(Debug, Clone)]
pub struct SqliteWriter {
    path: PathBuf,
}

impl SqliteWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the database and make sure every table exists.
    pub fn open(&self) -> Result<Connection, OutputError> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(&schema::ddl())?;
        Ok(conn)
    }

    /// Insert a document, returning its `scan_info` id.
    pub fn write_document(&self, document: &ScanDocument) -> Result<i64, OutputError> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;

        let scan_id = insert(&tx, "scan_info", scan_info_row(&document.scan_info)?)?;

        // Directories arrive parents-first, so a parent's id is always known.
        let mut directory_ids: HashMap<&Path, i64> = HashMap::new();
        for dir in document.directories() {
            let parent_id = dir
                .path()
                .parent()
                .and_then(|p| directory_ids.get(p))
                .copied();
            let mut row = vec![
                ("scan_id", Value::from(scan_id)),
                ("parent_id", Value::from(parent_id)),
            ];
            row.extend(entry_row(&dir.entry)?);
            row.extend(directory_row(dir)?);
            let id = insert(&tx, "directories", row)?;
            insert_children(&tx, Owner::Directory, id, &dir.entry)?;
            directory_ids.insert(dir.path(), id);
        }

        for file in &document.files {
            let directory_id = file
                .path()
                .parent()
                .and_then(|p| directory_ids.get(p))
                .copied();
            let mut row = vec![
                ("scan_id", Value::from(scan_id)),
                ("directory_id", Value::from(directory_id)),
            ];
            row.extend(entry_row(file)?);
            let id = insert(&tx, "files", row)?;
            insert_children(&tx, Owner::File, id, file)?;
            if let Some(directory_id) = directory_id {
                insert(
                    &tx,
                    "directory_files",
                    vec![
                        ("directory_id", Value::from(directory_id)),
                        ("file_id", Value::from(id)),
                    ],
                )?;
            }
        }

        tx.commit()?;
        tracing::info!(
            path = %self.path.display(),
            scan_id,
            files = document.files.len(),
            directories = document.directories().len(),
            "wrote database"
        );
        Ok(scan_id)
    }
}

impl OutputSink for SqliteWriter {
    fn describe(&self) -> String {
        format!("SQLite database {}", self.path.display())
    }

    fn write(&self, document: &ScanDocument) -> Result<(), ScanError> {
        self.write_document(document)
            .map(|_| ())
            .map_err(|e| e.into_scan_error(&self.path))
    }
}

/// Insert one row and return its id.
fn insert(tx: &Transaction<'_>, table: &str, row: Row) -> Result<i64, OutputError> {
    let columns: Vec<&str> = row.iter().map(|(name, _)| *name).collect();
    let placeholders: Vec<String> = (1..=row.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    );
    let mut stmt = tx.prepare_cached(&sql)?;
    stmt.execute(params_from_iter(row.into_iter().map(|(_, value)| value)))?;
    Ok(tx.last_insert_rowid())
}

fn insert_children(
    tx: &Transaction<'_>,
    owner: Owner,
    owner_id: i64,
    entry: &Entry,
) -> Result<(), OutputError> {
    for child in Child::ALL {
        let Some(table) = child.table_name(owner) else {
            continue;
        };
        if let Some(values) = child_row(child, entry)? {
            let mut row = vec![(owner.key(), Value::from(owner_id))];
            row.extend(values);
            insert(tx, table, row)?;
        }
    }
    Ok(())
}

/// A counter for an INTEGER column. SQLite integers are signed 64-bit.
fn int(column: &'static str, value: u64) -> Result<Value, OutputError> {
    i64::try_from(value)
        .map(Value::Integer)
        .map_err(|_| OutputError::OutOfRange { column, value })
}

/// Identifiers that use the full unsigned range are stored as decimal text.
fn decimal(value: u64) -> Value {
    Value::Text(value.to_string())
}

fn text(v: Option<&str>) -> Value {
    v.map_or(Value::Null, |s| Value::Text(s.to_string()))
}

fn json<T: serde::Serialize>(v: Option<&T>) -> Result<Value, OutputError> {
    Ok(match v {
        Some(v) => Value::Text(serde_json::to_string(v)?),
        None => Value::Null,
    })
}

fn scan_info_row(info: &ScanSession) -> Result<Row, OutputError> {
    let warnings = (!info.warnings.is_empty()).then_some(&info.warnings);
    Ok(vec![
        ("directory", Value::Text(info.directory.to_string_lossy().into_owned())),
        ("scan_time", Value::Text(info.scan_time.to_rfc3339())),
        ("scan_completed", text(info.scan_completed.map(|t| t.to_rfc3339()).as_deref())),
        ("hostname", text(info.hostname.as_deref())),
        ("lustre_version", text(info.lustre_version.as_deref())),
        ("lustre_enabled", Value::from(info.lustre_enabled)),
        ("xattrs_enabled", Value::from(info.xattrs_enabled)),
        ("acls_enabled", Value::from(info.acls_enabled)),
        ("checksums_enabled", Value::from(info.checksums_enabled)),
        ("recursive", Value::from(info.recursive)),
        ("max_depth", Value::from(info.max_depth)),
        ("total_files", int("total_files", info.total_files)?),
        ("total_directories", int("total_directories", info.total_directories)?),
        ("restart_count", Value::from(info.restart_count)),
        ("elapsed_seconds", Value::Real(info.elapsed_seconds)),
        ("scanner_version", Value::Text(info.scanner_version.clone())),
        ("warnings", json(warnings)?),
    ])
}

fn entry_row(entry: &Entry) -> Result<Row, OutputError> {
    let meta = &entry.standard_metadata;
    let size = match meta.size_bytes {
        Some(size) => int("size_bytes", size)?,
        None => Value::Null,
    };
    Ok(vec![
        ("scan_order", int("scan_order", entry.scan_order)?),
        ("path", Value::Text(meta.path.to_string_lossy().into_owned())),
        ("basename", Value::Text(meta.basename.to_string())),
        ("size_bytes", size),
        ("size_human", text(meta.size_human.as_deref())),
        ("file_type", text(meta.file_type.map(|k| k.to_string()).as_deref())),
        ("symlink_target", text(meta.symlink_target.as_deref())),
        ("error_message", text(meta.error.as_deref())),
    ])
}

fn directory_row(dir: &DirectoryRecord) -> Result<Row, OutputError> {
    Ok(vec![
        ("depth", Value::from(dir.depth)),
        ("file_count", int("file_count", dir.file_count)?),
        ("total_size_bytes", int("total_size_bytes", dir.total_size_bytes)?),
        ("subdirectory_count", int("subdirectory_count", dir.subdirectory_count)?),
    ])
}

/// Column values for one child table, or `None` when the entry lacks it.
fn child_row(child: Child, entry: &Entry) -> Result<Option<Row>, OutputError> {
    let meta = &entry.standard_metadata;
    let row = match child {
        Child::Permissions => meta.permissions.as_ref().map(|p| {
            vec![
                ("octal", Value::Text(p.octal.clone())),
                ("symbolic", Value::Text(p.symbolic.clone())),
                ("user_readable", Value::from(p.user_readable)),
                ("user_writable", Value::from(p.user_writable)),
                ("user_executable", Value::from(p.user_executable)),
                ("group_readable", Value::from(p.group_readable)),
                ("group_writable", Value::from(p.group_writable)),
                ("group_executable", Value::from(p.group_executable)),
                ("other_readable", Value::from(p.other_readable)),
                ("other_writable", Value::from(p.other_writable)),
                ("other_executable", Value::from(p.other_executable)),
                ("setuid", Value::from(p.setuid)),
                ("setgid", Value::from(p.setgid)),
                ("sticky", Value::from(p.sticky)),
            ]
        }),
        Child::Ownership => meta.ownership.as_ref().map(|o| {
            vec![
                ("uid", Value::from(o.uid)),
                ("gid", Value::from(o.gid)),
                ("username", Value::Text(o.username.clone())),
                ("groupname", Value::Text(o.groupname.clone())),
            ]
        }),
        Child::Timestamps => meta.timestamps.as_ref().map(|t| {
            vec![
                ("access_time", Value::Real(t.access_time)),
                ("modify_time", Value::Real(t.modify_time)),
                ("change_time", Value::Real(t.change_time)),
                ("access_time_iso", Value::Text(t.access_time_iso.clone())),
                ("modify_time_iso", Value::Text(t.modify_time_iso.clone())),
                ("change_time_iso", Value::Text(t.change_time_iso.clone())),
            ]
        }),
        Child::Inodes => match meta.inode.as_ref() {
            Some(i) => Some(vec![
                ("inode_number", decimal(i.number)),
                ("device", decimal(i.device)),
                ("links", int("links", i.links)?),
            ]),
            None => None,
        },
        Child::Checksums => meta.checksums.as_ref().map(|c| {
            vec![
                ("md5", Value::Text(c.md5.clone())),
                ("sha1", Value::Text(c.sha1.clone())),
                ("sha256", Value::Text(c.sha256.clone())),
                ("blake3", Value::Text(c.blake3.clone())),
            ]
        }),
        Child::LustreMetadata => match entry.lustre_metadata.as_ref() {
            Some(layout) => Some(layout_row(layout)?),
            None => None,
        },
        Child::ExtendedAttributes => entry.extended_attributes.as_ref().map(|x| {
            vec![
                ("all_attributes", text(x.all_attributes.as_deref())),
                ("selinux", text(x.selinux.as_deref())),
            ]
        }),
        Child::AclInfo => entry
            .acl_info
            .as_ref()
            .map(|a| vec![("posix_acl", text(a.posix_acl.as_deref()))]),
    };
    Ok(row)
}

fn layout_row(layout: &LayoutMetadata) -> Result<Row, OutputError> {
    let stripe = layout.stripe_parsed.as_ref();
    Ok(vec![
        ("stripe_info_raw", text(layout.stripe_info_raw.as_deref())),
        ("stripe_count", Value::from(stripe.and_then(|s| s.stripe_count))),
        ("stripe_size", Value::from(stripe.and_then(|s| s.stripe_size))),
        ("stripe_offset", Value::from(stripe.and_then(|s| s.stripe_offset))),
        ("pool", text(stripe.and_then(|s| s.pool.as_deref()))),
        ("layout_raw", text(layout.layout_raw.as_deref())),
        ("layout_yaml", json(layout.layout_yaml.as_ref())?),
        ("ost_indices", json(layout.ost_indices.as_ref())?),
        ("fid", text(layout.fid.as_deref())),
        ("component_count", Value::from(layout.component_count)),
        ("components", json(layout.components.as_ref())?),
        ("filesystem_info", text(layout.filesystem_info.as_deref())),
        ("user_quota", text(layout.user_quota.as_deref())),
    ])
}

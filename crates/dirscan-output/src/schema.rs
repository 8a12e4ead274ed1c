//! The relational schema, defined once.
//!
//! Both the SQL DDL and the JSON schema description are generated from the
//! catalog below.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use strum::{AsRefStr, Display};

use dirscan_core::{OutputSink, ScanDocument, ScanError};

use crate::error::OutputError;
use crate::json::write_atomic;

/// Storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SqlType {
    Integer,
    Text,
    Real,
    Boolean,
}

/// One column of a table.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub primary_key: bool,
    pub not_null: bool,
    /// Table whose `id` this column points at.
    pub references: Option<&'static str>,
    pub description: &'static str,
}

impl Column {
    const fn new(name: &'static str, sql_type: SqlType, description: &'static str) -> Self {
        Self {
            name,
            sql_type,
            primary_key: false,
            not_null: false,
            references: None,
            description,
        }
    }

    const fn id(description: &'static str) -> Self {
        Self {
            primary_key: true,
            ..Self::new("id", SqlType::Integer, description)
        }
    }

    const fn foreign(name: &'static str, table: &'static str, description: &'static str) -> Self {
        Self {
            references: Some(table),
            ..Self::new(name, SqlType::Integer, description)
        }
    }

    const fn required(mut self) -> Self {
        self.not_null = true;
        self
    }

    fn ddl(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.sql_type);
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        sql
    }
}

/// One table of the schema.
#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub description: String,
    pub columns: Vec<Column>,
}

impl Table {
    /// `CREATE TABLE IF NOT EXISTS` statement for this table.
    pub fn create_sql(&self) -> String {
        let mut lines: Vec<String> = self.columns.iter().map(Column::ddl).collect();
        for column in &self.columns {
            if let Some(table) = column.references {
                lines.push(format!("FOREIGN KEY ({}) REFERENCES {table} (id)", column.name));
            }
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.name,
            lines.join(",\n    ")
        )
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }
}

/// Which kind of entry a child table hangs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    File,
    Directory,
}

impl Owner {
    /// Foreign-key column naming the owning row.
    pub fn key(self) -> &'static str {
        match self {
            Self::File => "file_id",
            Self::Directory => "directory_id",
        }
    }

    /// Table holding the owning rows.
    pub fn table(self) -> &'static str {
        match self {
            Self::File => "files",
            Self::Directory => "directories",
        }
    }
}

/// The one-to-one sub-records of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Child {
    Permissions,
    Ownership,
    Timestamps,
    Inodes,
    Checksums,
    LustreMetadata,
    ExtendedAttributes,
    AclInfo,
}

impl Child {
    pub const ALL: [Child; 8] = [
        Child::Permissions,
        Child::Ownership,
        Child::Timestamps,
        Child::Inodes,
        Child::Checksums,
        Child::LustreMetadata,
        Child::ExtendedAttributes,
        Child::AclInfo,
    ];

    /// Table name for this child under `owner`, or `None` when the owner
    /// never carries it (directories have no checksums).
    pub fn table_name(self, owner: Owner) -> Option<&'static str> {
        use Child::*;
        Some(match (self, owner) {
            (Permissions, Owner::File) => "file_permissions",
            (Ownership, Owner::File) => "file_ownership",
            (Timestamps, Owner::File) => "file_timestamps",
            (Inodes, Owner::File) => "file_inodes",
            (Checksums, Owner::File) => "file_checksums",
            (LustreMetadata, Owner::File) => "lustre_metadata",
            (ExtendedAttributes, Owner::File) => "extended_attributes",
            (AclInfo, Owner::File) => "acl_info",
            (Permissions, Owner::Directory) => "directory_permissions",
            (Ownership, Owner::Directory) => "directory_ownership",
            (Timestamps, Owner::Directory) => "directory_timestamps",
            (Inodes, Owner::Directory) => "directory_inodes",
            (Checksums, Owner::Directory) => return None,
            (LustreMetadata, Owner::Directory) => "directory_lustre_metadata",
            (ExtendedAttributes, Owner::Directory) => "directory_extended_attributes",
            (AclInfo, Owner::Directory) => "directory_acl_info",
        })
    }

    fn description(self) -> &'static str {
        match self {
            Self::Permissions => "Permission bits",
            Self::Ownership => "Owner and group",
            Self::Timestamps => "Access, modify and change times",
            Self::Inodes => "Inode identity",
            Self::Checksums => "Content digests",
            Self::LustreMetadata => "Lustre layout and placement",
            Self::ExtendedAttributes => "Extended attributes",
            Self::AclInfo => "POSIX access control list",
        }
    }

    fn columns(self) -> &'static [Column] {
        match self {
            Self::Permissions => PERMISSION_COLUMNS,
            Self::Ownership => OWNERSHIP_COLUMNS,
            Self::Timestamps => TIMESTAMP_COLUMNS,
            Self::Inodes => INODE_COLUMNS,
            Self::Checksums => CHECKSUM_COLUMNS,
            Self::LustreMetadata => LUSTRE_COLUMNS,
            Self::ExtendedAttributes => XATTR_COLUMNS,
            Self::AclInfo => ACL_COLUMNS,
        }
    }

    fn table(self, owner: Owner) -> Option<Table> {
        let name = self.table_name(owner)?;
        let mut columns = vec![
            Column::id("Row identifier"),
            Column::foreign(owner.key(), owner.table(), "Owning entry").required(),
        ];
        columns.extend_from_slice(self.columns());
        let kind = match owner {
            Owner::File => "file",
            Owner::Directory => "directory",
        };
        Some(Table {
            name: name.to_string(),
            description: format!("{} of each {kind}", self.description()),
            columns,
        })
    }
}

use SqlType::{Boolean, Integer, Real, Text};

const PERMISSION_COLUMNS: &[Column] = &[
    Column::new("octal", Text, "Octal permission bits, e.g. 644"),
    Column::new("symbolic", Text, "ls-style mode string, e.g. -rw-r--r--"),
    Column::new("user_readable", Boolean, "User read permission"),
    Column::new("user_writable", Boolean, "User write permission"),
    Column::new("user_executable", Boolean, "User execute permission"),
    Column::new("group_readable", Boolean, "Group read permission"),
    Column::new("group_writable", Boolean, "Group write permission"),
    Column::new("group_executable", Boolean, "Group execute permission"),
    Column::new("other_readable", Boolean, "Other read permission"),
    Column::new("other_writable", Boolean, "Other write permission"),
    Column::new("other_executable", Boolean, "Other execute permission"),
    Column::new("setuid", Boolean, "Set user ID bit"),
    Column::new("setgid", Boolean, "Set group ID bit"),
    Column::new("sticky", Boolean, "Sticky bit"),
];

const OWNERSHIP_COLUMNS: &[Column] = &[
    Column::new("uid", Integer, "User ID"),
    Column::new("gid", Integer, "Group ID"),
    Column::new("username", Text, "User name, or the numeric ID when unknown"),
    Column::new("groupname", Text, "Group name, or the numeric ID when unknown"),
];

const TIMESTAMP_COLUMNS: &[Column] = &[
    Column::new("access_time", Real, "Access time (Unix timestamp)"),
    Column::new("modify_time", Real, "Modify time (Unix timestamp)"),
    Column::new("change_time", Real, "Change time (Unix timestamp)"),
    Column::new("access_time_iso", Text, "Access time (RFC 3339, local)"),
    Column::new("modify_time_iso", Text, "Modify time (RFC 3339, local)"),
    Column::new("change_time_iso", Text, "Change time (RFC 3339, local)"),
];

const INODE_COLUMNS: &[Column] = &[
    Column::new("inode_number", Text, "Inode number (decimal; may exceed the INTEGER range)"),
    Column::new("device", Text, "Device ID (decimal; may exceed the INTEGER range)"),
    Column::new("links", Integer, "Number of hard links"),
];

const CHECKSUM_COLUMNS: &[Column] = &[
    Column::new("md5", Text, "MD5 digest (hex)"),
    Column::new("sha1", Text, "SHA-1 digest (hex)"),
    Column::new("sha256", Text, "SHA-256 digest (hex)"),
    Column::new("blake3", Text, "BLAKE3 digest (hex)"),
];

const LUSTRE_COLUMNS: &[Column] = &[
    Column::new("stripe_info_raw", Text, "Raw lfs getstripe -v output"),
    Column::new("stripe_count", Integer, "Number of stripes"),
    Column::new("stripe_size", Integer, "Stripe size in bytes"),
    Column::new("stripe_offset", Integer, "Index of the first OST"),
    Column::new("pool", Text, "OST pool name"),
    Column::new("layout_raw", Text, "Layout text that did not parse as YAML"),
    Column::new("layout_yaml", Text, "Parsed YAML layout (JSON encoded)"),
    Column::new("ost_indices", Text, "OST indices (JSON encoded array)"),
    Column::new("fid", Text, "Lustre file identifier"),
    Column::new("component_count", Integer, "Number of layout components"),
    Column::new("components", Text, "Per-component layout (JSON encoded)"),
    Column::new("filesystem_info", Text, "lfs df output for the containing filesystem"),
    Column::new("user_quota", Text, "Quota report for the scanning user"),
];

const XATTR_COLUMNS: &[Column] = &[
    Column::new("all_attributes", Text, "getfattr -d listing"),
    Column::new("selinux", Text, "SELinux security context"),
];

const ACL_COLUMNS: &[Column] = &[Column::new("posix_acl", Text, "getfacl listing")];

/// Entry columns shared by `files` and `directories`.
const ENTRY_COLUMNS: &[Column] = &[
    Column::new("scan_order", Integer, "1-based position in the scan's work list"),
    Column::new("path", Text, "Absolute path").required(),
    Column::new("basename", Text, "Final path component"),
    Column::new("size_bytes", Integer, "Size in bytes"),
    Column::new("size_human", Text, "Human-readable size"),
    Column::new(
        "file_type",
        Text,
        "regular, directory, symlink, block_device, character_device, fifo, socket or unknown",
    ),
    Column::new("symlink_target", Text, "Target of a symlink"),
    Column::new("error_message", Text, "Why metadata collection failed, if it did"),
];

/// Secondary indexes: (name, table, column).
pub const INDEXES: &[(&str, &str, &str)] = &[
    ("idx_files_path", "files", "path"),
    ("idx_files_scan_id", "files", "scan_id"),
    ("idx_directories_path", "directories", "path"),
];

/// Example queries shipped with the schema description.
pub const USAGE_EXAMPLES: &[(&str, &str)] = &[
    ("get_all_files_from_scan", "SELECT * FROM files WHERE scan_id = 1;"),
    (
        "get_large_files",
        "SELECT path, size_bytes, size_human FROM files WHERE size_bytes > 1000000 ORDER BY size_bytes DESC;",
    ),
    (
        "get_files_with_lustre_info",
        "SELECT f.path, l.stripe_count, l.stripe_size FROM files f JOIN lustre_metadata l ON f.id = l.file_id;",
    ),
    (
        "get_executable_files",
        "SELECT f.path FROM files f JOIN file_permissions p ON f.id = p.file_id WHERE p.user_executable = 1;",
    ),
    (
        "get_recent_files",
        "SELECT f.path, t.modify_time_iso FROM files f JOIN file_timestamps t ON f.id = t.file_id ORDER BY t.modify_time DESC LIMIT 10;",
    ),
    (
        "get_largest_directories",
        "SELECT path, file_count, total_size_bytes FROM directories ORDER BY total_size_bytes DESC LIMIT 10;",
    ),
    (
        "get_files_in_directory",
        "SELECT f.path FROM files f JOIN directory_files df ON f.id = df.file_id JOIN directories d ON d.id = df.directory_id WHERE d.path = '/path/to/dir';",
    ),
    (
        "get_duplicate_content",
        "SELECT c.sha256, COUNT(*) AS copies FROM file_checksums c GROUP BY c.sha256 HAVING copies > 1;",
    ),
];

/// Every table, in creation order.
pub fn catalog() -> Vec<Table> {
    let mut tables = vec![
        Table {
            name: "scan_info".to_string(),
            description: "One row per completed scan".to_string(),
            columns: vec![
                Column::id("Unique scan identifier"),
                Column::new("directory", Text, "Directory that was scanned").required(),
                Column::new("scan_time", Text, "When the first run of the scan started").required(),
                Column::new("scan_completed", Text, "When the scan finished"),
                Column::new("hostname", Text, "Host the scan ran on"),
                Column::new("lustre_version", Text, "Version of the Lustre tools"),
                Column::new("lustre_enabled", Boolean, "Whether layout metadata was collected"),
                Column::new("xattrs_enabled", Boolean, "Whether xattrs were collected"),
                Column::new("acls_enabled", Boolean, "Whether POSIX ACLs were collected"),
                Column::new("checksums_enabled", Boolean, "Whether content digests were computed"),
                Column::new("recursive", Boolean, "Whether subdirectories were scanned"),
                Column::new("max_depth", Integer, "Depth bound for recursive scans"),
                Column::new("total_files", Integer, "Number of files scanned"),
                Column::new("total_directories", Integer, "Number of directories scanned"),
                Column::new("restart_count", Integer, "Times the scan resumed from a checkpoint"),
                Column::new("elapsed_seconds", Real, "Scanning time summed over all runs"),
                Column::new("scanner_version", Text, "Version of dirscan"),
                Column::new("warnings", Text, "Unreadable directories (JSON encoded array)"),
            ],
        },
        entry_table(
            Owner::Directory,
            "Directories below the scanned root",
            vec![
                Column::foreign("scan_id", "scan_info", "Scan this row belongs to").required(),
                Column::foreign(
                    "parent_id",
                    "directories",
                    "Containing directory, NULL at depth 1",
                ),
            ],
            &[
                Column::new("depth", Integer, "Depth below the root (children of the root are 1)"),
                Column::new("file_count", Integer, "Files directly inside"),
                Column::new("total_size_bytes", Integer, "Total size of the files directly inside"),
                Column::new("subdirectory_count", Integer, "Directories directly inside"),
            ],
        ),
        entry_table(
            Owner::File,
            "Files and symlinks",
            vec![
                Column::foreign("scan_id", "scan_info", "Scan this row belongs to").required(),
                Column::foreign(
                    "directory_id",
                    "directories",
                    "Containing directory, NULL at the root",
                ),
            ],
            &[],
        ),
        Table {
            name: "directory_files".to_string(),
            description: "Which directory directly contains which file".to_string(),
            columns: vec![
                Column::id("Row identifier"),
                Column::foreign("directory_id", "directories", "Containing directory").required(),
                Column::foreign("file_id", "files", "Contained file").required(),
            ],
        },
    ];

    for owner in [Owner::File, Owner::Directory] {
        tables.extend(Child::ALL.iter().filter_map(|child| child.table(owner)));
    }
    tables
}

fn entry_table(owner: Owner, description: &str, keys: Vec<Column>, extra: &[Column]) -> Table {
    let mut columns = vec![Column::id("Unique entry identifier")];
    columns.extend(keys);
    columns.extend_from_slice(ENTRY_COLUMNS);
    columns.extend_from_slice(extra);
    Table {
        name: owner.table().to_string(),
        description: description.to_string(),
        columns,
    }
}

/// The complete DDL script: tables then indexes.
pub fn ddl() -> String {
    let mut script: Vec<String> = catalog().iter().map(Table::create_sql).collect();
    script.extend(
        INDEXES
            .iter()
            .map(|(name, table, column)| {
                format!("CREATE INDEX IF NOT EXISTS {name} ON {table} ({column})")
            }),
    );
    script.join(";\n") + ";\n"
}

#[derive(Debug, Serialize)]
struct ColumnDescription {
    #[serde(rename = "type")]
    sql_type: SqlType,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    primary_key: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    not_null: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    foreign_key: Option<String>,
    description: &'static str,
}

#[derive(Debug, Serialize)]
struct TableDescription {
    description: String,
    columns: BTreeMap<&'static str, ColumnDescription>,
}

#[derive(Debug, Serialize)]
struct IndexDescription {
    name: &'static str,
    table: &'static str,
    column: &'static str,
}

#[derive(Debug, Serialize)]
struct SchemaDescription {
    description: &'static str,
    version: &'static str,
    scanner_version: &'static str,
    created: String,
    tables: BTreeMap<String, TableDescription>,
    indexes: Vec<IndexDescription>,
    usage_examples: BTreeMap<&'static str, &'static str>,
}

/// The schema description artifact.
#[derive(Debug, Serialize)]
pub struct SchemaDocument {
    database_schema: SchemaDescription,
}

/// Version of the relational layout.
pub const SCHEMA_VERSION: &str = "2.0";

/// Describe every table, column, index and example query.
pub fn schema_description() -> SchemaDocument {
    let tables = catalog()
        .into_iter()
        .map(|table| {
            let columns = table
                .columns
                .into_iter()
                .map(|c| {
                    (
                        c.name,
                        ColumnDescription {
                            sql_type: c.sql_type,
                            primary_key: c.primary_key,
                            not_null: c.not_null,
                            foreign_key: c.references.map(|t| format!("{t}.id")),
                            description: c.description,
                        },
                    )
                })
                .collect();
            (
                table.name,
                TableDescription {
                    description: table.description,
                    columns,
                },
            )
        })
        .collect();

    SchemaDocument {
        database_schema: SchemaDescription {
            description: "SQLite schema for dirscan filesystem metadata",
            version: SCHEMA_VERSION,
            scanner_version: env!("CARGO_PKG_VERSION"),
            created: Local::now().to_rfc3339(),
            tables,
            indexes: INDEXES
                .iter()
                .map(|&(name, table, column)| IndexDescription { name, table, column })
                .collect(),
            usage_examples: USAGE_EXAMPLES.iter().copied().collect(),
        },
    }
}

/// Default location of the schema description next to a database file.
pub fn default_schema_path(db_path: &Path) -> PathBuf {
    let stem = db_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dirscan".to_string());
    db_path.with_file_name(format!("{stem}_schema.json"))
}

/// Writes the schema description artifact.
#[derive(Debug, Clone)]
pub struct SchemaWriter {
    path: PathBuf,
}

impl SchemaWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_schema(&self) -> Result<(), OutputError> {
        write_atomic(&self.path, |out| {
            serde_json::to_writer_pretty(&mut *out, &schema_description())?;
            out.write_all(b"\n")?;
            Ok(())
        })?;
        tracing::info!(path = %self.path.display(), "wrote schema description");
        Ok(())
    }
}

impl OutputSink for SchemaWriter {
    fn describe(&self) -> String {
        format!("schema description {}", self.path.display())
    }

    fn write(&self, _document: &ScanDocument) -> Result<(), ScanError> {
        self.write_schema()
            .map_err(|e| e.into_scan_error(&self.path))
    }
}

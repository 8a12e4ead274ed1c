use std::ffi::OsStr;
use std::fs;

use dirscan_core::{
    AclInfo, Checksums, DirectoryRecord, Entry, FileKind, LayoutComponent, LayoutMetadata,
    OutputSink, Permissions, ScanConfig, ScanDocument, ScanSession, StandardMetadata, StripeInfo,
};
use dirscan_output::schema::USAGE_EXAMPLES;
use dirscan_output::{
    JsonWriter, SchemaWriter, SqliteWriter, default_schema_path, schema_description,
};
use dirscan_scan::{CommandRunner, ScanOutcome, Scanner};
use rusqlite::Connection;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct AbsentRunner;

impl CommandRunner for AbsentRunner {
    async fn run(&self, _program: &str, _args: &[&OsStr]) -> Option<String> {
        None
    }
}

fn file_entry(order: u64, path: &str, size: u64) -> Entry {
    let mut meta = StandardMetadata::new(path);
    meta.set_size(size);
    meta.file_type = Some(FileKind::Regular);
    meta.permissions = Some(Permissions::from_mode(0o100_755));
    Entry::new(order, meta)
}

/// A recursive document with one directory and every kind of sub-record.
fn rich_document() -> ScanDocument {
    let mut config = ScanConfig::new("/lustre/project");
    config.recursive = true;
    config.collect_lustre = true;
    let mut doc = ScanDocument::new(ScanSession::new("/lustre/project", &config));

    let mut dir_meta = StandardMetadata::new("/lustre/project/run1");
    dir_meta.file_type = Some(FileKind::Directory);
    dir_meta.permissions = Some(Permissions::from_mode(0o040_750));
    doc.push_directory(DirectoryRecord::new(Entry::new(1, dir_meta), 1));

    let mut striped = file_entry(2, "/lustre/project/run1/out.h5", 4_000_000);
    striped.standard_metadata.checksums = Some(Checksums {
        md5: "m".to_string(),
        sha1: "s".to_string(),
        sha256: "same".to_string(),
        blake3: "b".to_string(),
    });
    striped.lustre_metadata = Some(LayoutMetadata {
        stripe_parsed: Some(StripeInfo {
            stripe_count: Some(4),
            stripe_size: Some(1_048_576),
            stripe_offset: Some(2),
            pool: Some("flash".to_string()),
        }),
        ost_indices: Some(vec![2, 3, 4, 5]),
        fid: Some("[0x200000401:0x1:0x0]".to_string()),
        component_count: Some(1),
        components: Some(vec![LayoutComponent {
            component_id: 1,
            info: "lcme_id: 1".to_string(),
        }]),
        ..Default::default()
    });
    striped.acl_info = Some(AclInfo {
        posix_acl: Some("user::rwx\nuser:alice:r--\n".to_string()),
    });
    doc.push_file(striped);

    let mut copy = file_entry(3, "/lustre/project/readme.txt", 12);
    copy.standard_metadata.checksums = Some(Checksums {
        md5: "m".to_string(),
        sha1: "s".to_string(),
        sha256: "same".to_string(),
        blake3: "b".to_string(),
    });
    doc.push_file(copy);

    doc.finalize_statistics();
    doc
}

fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |r| r.get(0)).unwrap()
}

#[test]
fn test_relational_layout() {
    let temp = TempDir::new().unwrap();
    let writer = SqliteWriter::new(temp.path().join("scan.db"));
    let scan_id = writer.write_document(&rich_document()).unwrap();

    let conn = writer.open().unwrap();
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM files"), 2);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM directories"), 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM file_permissions"), 2);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM directory_permissions"), 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM acl_info"), 1);

    // Only the nested file has a directory row to belong to.
    let (dir_path, file_path): (String, String) = conn
        .query_row(
            "SELECT d.path, f.path FROM directory_files df \
             JOIN directories d ON d.id = df.directory_id \
             JOIN files f ON f.id = df.file_id",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!(dir_path, "/lustre/project/run1");
    assert_eq!(file_path, "/lustre/project/run1/out.h5");

    let (file_count, total): (i64, i64) = conn
        .query_row(
            "SELECT file_count, total_size_bytes FROM directories WHERE scan_id = ?1",
            [scan_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .unwrap();
    assert_eq!((file_count, total), (1, 4_000_000));

    let (stripes, pool, osts, components): (i64, String, String, String) = conn
        .query_row(
            "SELECT l.stripe_count, l.pool, l.ost_indices, l.components \
             FROM lustre_metadata l JOIN files f ON f.id = l.file_id \
             WHERE f.basename = 'out.h5'",
            [],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .unwrap();
    assert_eq!(stripes, 4);
    assert_eq!(pool, "flash");
    assert_eq!(serde_json::from_str::<Vec<u32>>(&osts).unwrap(), vec![2, 3, 4, 5]);
    let components: Vec<LayoutComponent> = serde_json::from_str(&components).unwrap();
    assert_eq!(components[0].component_id, 1);

    let executable: bool = conn
        .query_row(
            "SELECT p.user_executable FROM file_permissions p \
             JOIN files f ON f.id = p.file_id WHERE f.basename = 'readme.txt'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert!(executable);
}

#[test]
fn test_usage_examples_run() {
    let temp = TempDir::new().unwrap();
    let writer = SqliteWriter::new(temp.path().join("scan.db"));
    writer.write_document(&rich_document()).unwrap();
    let conn = writer.open().unwrap();

    for (name, sql) in USAGE_EXAMPLES {
        let mut stmt = conn.prepare(sql).unwrap_or_else(|e| panic!("{name}: {e}"));
        let rows = stmt.query_map([], |_| Ok(())).unwrap().count();
        if *name == "get_duplicate_content" {
            assert_eq!(rows, 1);
        }
    }
}

#[test]
fn test_foreign_keys_enforced() {
    let temp = TempDir::new().unwrap();
    let writer = SqliteWriter::new(temp.path().join("scan.db"));
    let conn = writer.open().unwrap();

    let orphan = conn.execute(
        "INSERT INTO files (scan_id, path) VALUES (?1, ?2)",
        rusqlite::params![999, "/nowhere"],
    );
    assert!(orphan.is_err());
}

#[test]
fn test_schema_artifact_lists_every_table() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("scan.db");
    let writer = SchemaWriter::new(default_schema_path(&db));
    writer.write_schema().unwrap();

    assert_eq!(writer.path(), temp.path().join("scan_schema.json"));
    let text = fs::read_to_string(writer.path()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    let tables = value["database_schema"]["tables"].as_object().unwrap();

    let conn = SqliteWriter::new(&db).open().unwrap();
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
        .unwrap();
    let created: Vec<String> = stmt
        .query_map([], |r| r.get(0))
        .unwrap()
        .map(Result::unwrap)
        .collect();
    assert_eq!(created.len(), tables.len());
    for name in &created {
        assert!(tables.contains_key(name), "{name} missing from description");
    }

    let fid = &value["database_schema"]["tables"]["files"]["columns"]["scan_id"];
    assert_eq!(fid["foreign_key"], "scan_info.id");
    assert_eq!(fid["type"], "INTEGER");

    let in_memory = serde_json::to_value(schema_description()).unwrap();
    assert_eq!(
        in_memory["database_schema"]["tables"],
        value["database_schema"]["tables"]
    );
}

#[tokio::test]
async fn test_scan_to_every_sink() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("data");
    fs::create_dir_all(root.join("sub")).unwrap();
    fs::write(root.join("a.txt"), "alpha").unwrap();
    fs::write(root.join("sub/b.txt"), "bravo!").unwrap();

    let mut config = ScanConfig::new(&root);
    config.recursive = true;
    config.checkpoint_dir = temp.path().join("checkpoints");

    let out = temp.path().join("out");
    fs::create_dir(&out).unwrap();
    let json = JsonWriter::to_file(out.join("scan.json")).pretty(true);
    let db = SqliteWriter::new(out.join("scan.db"));
    let schema = SchemaWriter::new(default_schema_path(db.path()));
    let sinks: [&dyn OutputSink; 3] = [&json, &db, &schema];

    let scanner = Scanner::with_runner(config, AbsentRunner);
    let outcome = scanner.run(&sinks, &CancellationToken::new()).await.unwrap();
    let ScanOutcome::Completed(doc) = outcome else {
        panic!("scan was interrupted");
    };
    assert_eq!(doc.entry_count(), 3);

    let from_disk: ScanDocument =
        serde_json::from_str(&fs::read_to_string(out.join("scan.json")).unwrap()).unwrap();
    assert_eq!(from_disk.files.len(), 2);
    assert_eq!(from_disk.directories().len(), 1);
    assert!(from_disk.scan_info.scan_completed.is_some());

    let conn = db.open().unwrap();
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM scan_info"), 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM files"), 2);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM file_checksums"), 2);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM directory_files"), 1);
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM files WHERE directory_id IS NULL"), 1);
    assert!(out.join("scan_schema.json").exists());

    // Completed scans leave no checkpoint behind.
    assert!(!scanner.checkpoint_dir().unwrap().exists());
}

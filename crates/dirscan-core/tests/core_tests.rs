use dirscan_core::{
    AclInfo, Checksums, DirectoryRecord, Entry, ExtendedAttributes, FileKind, InodeInfo,
    LayoutMetadata, Ownership, Permissions, ScanConfig, ScanDocument, ScanSession,
    StandardMetadata, StripeInfo, Timestamps,
};
use std::path::Path;

fn regular_file(order: u64, path: &str, size: u64) -> Entry {
    let mut meta = StandardMetadata::new(path);
    meta.set_size(size);
    meta.file_type = Some(FileKind::Regular);
    meta.permissions = Some(Permissions::from_mode(0o100_644));
    meta.ownership = Some(Ownership::new(1000, 1000, Some("alice".into()), None));
    meta.timestamps = Some(Timestamps::from_epoch((1, 0), (2, 0), (3, 0)));
    meta.inode = Some(InodeInfo::new(42, 7, 1));
    Entry::new(order, meta)
}

#[test]
fn test_document_json_shape() {
    let config = ScanConfig::new("/data");
    let mut doc = ScanDocument::new(ScanSession::new("/data", &config));
    doc.push_file(regular_file(1, "/data/a.txt", 10));
    doc.finalize_statistics();

    let json = serde_json::to_value(&doc).unwrap();

    assert_eq!(json["scan_info"]["directory"], "/data");
    assert_eq!(json["scan_info"]["total_files"], 1);
    assert!(json.get("directories").is_none());

    let file = &json["files"][0];
    assert_eq!(file["scan_order"], 1);
    let std_meta = &file["standard_metadata"];
    assert_eq!(std_meta["type"], "regular");
    assert_eq!(std_meta["basename"], "a.txt");
    assert_eq!(std_meta["size_bytes"], 10);
    assert_eq!(std_meta["permissions"]["octal"], "644");
    assert_eq!(std_meta["ownership"]["username"], "alice");
    assert_eq!(std_meta["ownership"]["groupname"], "1000");
    assert_eq!(std_meta["inode"]["links"], 1);

    // Absent sub-records are omitted, not null
    assert!(file.get("lustre_metadata").is_none());
    assert!(file.get("acl_info").is_none());
    assert!(std_meta.get("checksums").is_none());
    assert!(std_meta.get("error").is_none());
}

#[test]
fn test_document_roundtrip_with_optional_records() {
    let mut config = ScanConfig::new("/lustre/proj");
    config.recursive = true;
    config.collect_lustre = true;
    let mut doc = ScanDocument::new(ScanSession::new("/lustre/proj", &config));

    let mut dir_entry = Entry::new(1, StandardMetadata::new("/lustre/proj/run1"));
    dir_entry.standard_metadata.file_type = Some(FileKind::Directory);
    doc.push_directory(DirectoryRecord::new(dir_entry, 1));

    let mut file = regular_file(2, "/lustre/proj/run1/out.h5", 2048);
    file.standard_metadata.checksums = Some(Checksums {
        md5: "d41d8cd98f00b204e9800998ecf8427e".into(),
        sha1: "da39a3ee5e6b4b0d3255bfef95601890afd80709".into(),
        sha256: "e3b0c44298fc1c149afbf4c8996fb924".into(),
        blake3: "af1349b9f5f9a1a6a0404dea36dcc949".into(),
    });
    file.lustre_metadata = Some(LayoutMetadata {
        stripe_parsed: Some(StripeInfo {
            stripe_count: Some(4),
            stripe_size: Some(1_048_576),
            stripe_offset: Some(0),
            pool: None,
        }),
        layout_yaml: Some(serde_json::json!({"lcm_entry_count": 2})),
        ost_indices: Some(vec![0, 1, 2, 3]),
        fid: Some("[0x200000401:0x2:0x0]".into()),
        ..Default::default()
    });
    file.extended_attributes = Some(ExtendedAttributes {
        all_attributes: Some("user.project=\"climate\"".into()),
        selinux: None,
    });
    file.acl_info = Some(AclInfo {
        posix_acl: Some("user::rw-\nuser:bob:r--\nmask::r--\n".into()),
    });
    doc.push_file(file);
    doc.finalize_statistics();

    let text = serde_json::to_string(&doc).unwrap();
    let back: ScanDocument = serde_json::from_str(&text).unwrap();

    assert_eq!(back, doc);
    assert_eq!(back.directories()[0].file_count, 1);
    assert_eq!(back.directories()[0].total_size_bytes, 2048);
    assert_eq!(back.files[0].lustre_metadata.as_ref().unwrap().stripe_count(), Some(4));
    assert!(back.files[0].acl_info.as_ref().unwrap().has_extended_entries());
}

#[test]
fn test_document_paths_include_directories_first() {
    let mut config = ScanConfig::new("/r");
    config.recursive = true;
    let mut doc = ScanDocument::new(ScanSession::new("/r", &config));
    doc.push_file(regular_file(2, "/r/sub/b.txt", 1));
    doc.push_directory(DirectoryRecord::new(
        Entry::new(1, StandardMetadata::new("/r/sub")),
        1,
    ));

    let paths: Vec<&Path> = doc.paths().collect();
    assert_eq!(paths, vec![Path::new("/r/sub"), Path::new("/r/sub/b.txt")]);
    assert_eq!(doc.entry_count(), 2);
}

#[test]
fn test_failed_entry_serializes_error() {
    let entry = Entry::new(1, StandardMetadata::failed("/data/x", "Permission denied"));
    let json = serde_json::to_value(&entry).unwrap();
    assert_eq!(json["standard_metadata"]["error"], "Permission denied");
    assert_eq!(json["standard_metadata"]["path"], "/data/x");
    assert!(json["standard_metadata"].get("type").is_none());
}

#[test]
fn test_config_deserialize_defaults() {
    let config: ScanConfig = serde_json::from_str(r#"{"root": "/data"}"#).unwrap();
    assert!(!config.recursive);
    assert!(config.collect_xattrs);
    assert!(config.collect_acls);
    assert!(config.compute_checksums);
    assert!(config.checkpointing);
    assert_eq!(config.checkpoint_interval, 10);
    assert_eq!(config.command_timeout_secs, 30);
    assert_eq!(config.checksum_max_size, 100 * 1024 * 1024);
}

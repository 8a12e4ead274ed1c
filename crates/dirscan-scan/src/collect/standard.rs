//! Standard attributes: lstat, ownership, and content digests.

use std::fs::File;
use std::io::Read;
use std::path::Path;

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use md5::Context as Md5Context;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use dirscan_core::{
    Checksums, FileKind, InodeInfo, Ownership, Permissions, StandardMetadata, Timestamps,
};

use super::owner::OwnerResolver;

const READ_CHUNK: usize = 64 * 1024;

/// Settings for the standard-attributes collector.
#[derive(Debug, Clone, Copy)]
pub struct StandardOptions {
    pub compute_checksums: bool,
    pub checksum_max_size: u64,
}

/// Collect standard attributes for `path` without following symlinks.
///
/// Never fails: an unreadable path yields a record carrying the error text.
pub fn collect_standard(
    path: &Path,
    options: StandardOptions,
    owners: &OwnerResolver,
) -> StandardMetadata {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(err) => {
            tracing::debug!(path = %path.display(), "stat failed: {err}");
            return StandardMetadata::failed(path, err.to_string());
        }
    };

    let mut meta = StandardMetadata::new(path);
    meta.set_size(metadata.len());
    fill_unix_attributes(&mut meta, &metadata, owners);

    if meta.file_type == Some(FileKind::Symlink) {
        match std::fs::read_link(path) {
            Ok(target) => meta.symlink_target = Some(target.to_string_lossy().into_owned()),
            Err(err) => meta.error = Some(format!("readlink: {err}")),
        }
    }

    let size = metadata.len();
    if options.compute_checksums
        && meta.is_regular()
        && size > 0
        && size <= options.checksum_max_size
    {
        match compute_checksums(path) {
            Ok(sums) => meta.checksums = Some(sums),
            Err(err) => {
                tracing::debug!(path = %path.display(), "checksum failed: {err}");
                meta.error = Some(format!("checksum: {err}"));
            }
        }
    }

    meta
}

#[cfg(unix)]
fn fill_unix_attributes(
    meta: &mut StandardMetadata,
    metadata: &std::fs::Metadata,
    owners: &OwnerResolver,
) {
    let mode = metadata.mode();
    meta.file_type = Some(FileKind::from_mode(mode));
    meta.permissions = Some(Permissions::from_mode(mode));

    let (uid, gid) = (metadata.uid(), metadata.gid());
    meta.ownership = Some(Ownership::new(
        uid,
        gid,
        owners.user_name(uid),
        owners.group_name(gid),
    ));

    meta.timestamps = Some(Timestamps::from_epoch(
        (metadata.atime(), metadata.atime_nsec()),
        (metadata.mtime(), metadata.mtime_nsec()),
        (metadata.ctime(), metadata.ctime_nsec()),
    ));
    meta.inode = Some(InodeInfo::new(metadata.ino(), metadata.dev(), metadata.nlink()));
}

#[cfg(not(unix))]
fn fill_unix_attributes(
    meta: &mut StandardMetadata,
    metadata: &std::fs::Metadata,
    _owners: &OwnerResolver,
) {
    let file_type = metadata.file_type();
    meta.file_type = Some(if file_type.is_symlink() {
        FileKind::Symlink
    } else if file_type.is_dir() {
        FileKind::Directory
    } else if file_type.is_file() {
        FileKind::Regular
    } else {
        FileKind::Unknown
    });
}

/// Hash the file contents once, feeding every digest from the same buffer.
pub fn compute_checksums(path: &Path) -> std::io::Result<Checksums> {
    let mut file = File::open(path)?;
    let mut md5 = Md5Context::new();
    let mut sha1 = Sha1::new();
    let mut sha256 = Sha256::new();
    let mut blake3 = blake3::Hasher::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        md5.consume(&buf[..n]);
        sha1.update(&buf[..n]);
        sha256.update(&buf[..n]);
        blake3.update(&buf[..n]);
    }

    Ok(Checksums {
        md5: format!("{:x}", md5.compute()),
        sha1: hex::encode(sha1.finalize()),
        sha256: hex::encode(sha256.finalize()),
        blake3: blake3.finalize().to_hex().to_string(),
    })
}

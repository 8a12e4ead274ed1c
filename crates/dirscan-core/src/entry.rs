//! Per-entry metadata records.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, SecondsFormat, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::layout::LayoutMetadata;

const S_IFMT: u32 = 0o170_000;
const S_IFSOCK: u32 = 0o140_000;
const S_IFLNK: u32 = 0o120_000;
const S_IFREG: u32 = 0o100_000;
const S_IFBLK: u32 = 0o060_000;
const S_IFDIR: u32 = 0o040_000;
const S_IFCHR: u32 = 0o020_000;
const S_IFIFO: u32 = 0o010_000;

const S_ISUID: u32 = 0o4000;
const S_ISGID: u32 = 0o2000;
const S_ISVTX: u32 = 0o1000;

/// Format a byte count in binary units.
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Type of filesystem object, classified from raw mode bits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    BlockDevice,
    CharacterDevice,
    Fifo,
    Socket,
    Unknown,
}

impl FileKind {
    /// Classify a raw `st_mode` value.
    pub fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFREG => Self::Regular,
            S_IFDIR => Self::Directory,
            S_IFLNK => Self::Symlink,
            S_IFBLK => Self::BlockDevice,
            S_IFCHR => Self::CharacterDevice,
            S_IFIFO => Self::Fifo,
            S_IFSOCK => Self::Socket,
            _ => Self::Unknown,
        }
    }

    /// Leading character of an `ls -l` style mode string.
    pub fn mode_char(self) -> char {
        match self {
            Self::Regular => '-',
            Self::Directory => 'd',
            Self::Symlink => 'l',
            Self::BlockDevice => 'b',
            Self::CharacterDevice => 'c',
            Self::Fifo => 'p',
            Self::Socket => 's',
            Self::Unknown => '?',
        }
    }
}

/// Permission bits in raw, symbolic and exploded form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    /// Low nine permission bits as three octal digits.
    pub octal: String,
    /// `ls -l` style representation, e.g. `-rwsr-xr-x`.
    pub symbolic: String,
    pub user_readable: bool,
    pub user_writable: bool,
    pub user_executable: bool,
    pub group_readable: bool,
    pub group_writable: bool,
    pub group_executable: bool,
    pub other_readable: bool,
    pub other_writable: bool,
    pub other_executable: bool,
    pub setuid: bool,
    pub setgid: bool,
    pub sticky: bool,
}

impl Permissions {
    /// Decode a raw `st_mode` value.
    pub fn from_mode(mode: u32) -> Self {
        let bit = |mask: u32| mode & mask != 0;
        Self {
            octal: format!("{:03o}", mode & 0o777),
            symbolic: symbolic_mode(mode),
            user_readable: bit(0o400),
            user_writable: bit(0o200),
            user_executable: bit(0o100),
            group_readable: bit(0o040),
            group_writable: bit(0o020),
            group_executable: bit(0o010),
            other_readable: bit(0o004),
            other_writable: bit(0o002),
            other_executable: bit(0o001),
            setuid: bit(S_ISUID),
            setgid: bit(S_ISGID),
            sticky: bit(S_ISVTX),
        }
    }
}

fn symbolic_mode(mode: u32) -> String {
    let mut out = String::with_capacity(10);
    out.push(FileKind::from_mode(mode).mode_char());

    let triplets = [
        (0o400, 0o200, 0o100, S_ISUID, 's'),
        (0o040, 0o020, 0o010, S_ISGID, 's'),
        (0o004, 0o002, 0o001, S_ISVTX, 't'),
    ];
    for (r, w, x, special, letter) in triplets {
        out.push(if mode & r != 0 { 'r' } else { '-' });
        out.push(if mode & w != 0 { 'w' } else { '-' });
        out.push(match (mode & x != 0, mode & special != 0) {
            (true, true) => letter,
            (false, true) => letter.to_ascii_uppercase(),
            (true, false) => 'x',
            (false, false) => '-',
        });
    }
    out
}

/// Owner and group, numeric and resolved.
///
/// Names fall back to the stringified numeric id when the local name
/// database has no entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
    pub username: String,
    pub groupname: String,
}

impl Ownership {
    /// Build ownership from ids and optional resolved names.
    pub fn new(uid: u32, gid: u32, username: Option<String>, groupname: Option<String>) -> Self {
        Self {
            uid,
            gid,
            username: username.unwrap_or_else(|| uid.to_string()),
            groupname: groupname.unwrap_or_else(|| gid.to_string()),
        }
    }
}

/// Access, modification and status-change times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timestamps {
    /// Seconds since the epoch, with sub-second precision.
    pub access_time: f64,
    pub modify_time: f64,
    pub change_time: f64,
    /// RFC 3339 in local time.
    pub access_time_iso: String,
    pub modify_time_iso: String,
    pub change_time_iso: String,
}

impl Timestamps {
    /// Build from `(seconds, nanoseconds)` pairs as reported by stat.
    pub fn from_epoch(accessed: (i64, i64), modified: (i64, i64), changed: (i64, i64)) -> Self {
        Self {
            access_time: epoch_seconds(accessed),
            modify_time: epoch_seconds(modified),
            change_time: epoch_seconds(changed),
            access_time_iso: epoch_to_iso(accessed),
            modify_time_iso: epoch_to_iso(modified),
            change_time_iso: epoch_to_iso(changed),
        }
    }
}

fn epoch_seconds((secs, nanos): (i64, i64)) -> f64 {
    secs as f64 + nanos as f64 / 1e9
}

fn epoch_to_iso((secs, nanos): (i64, i64)) -> String {
    let nanos = u32::try_from(nanos).unwrap_or(0);
    DateTime::<Utc>::from_timestamp(secs, nanos)
        .map(|utc| {
            utc.with_timezone(&Local)
                .to_rfc3339_opts(SecondsFormat::Micros, false)
        })
        .unwrap_or_default()
}

/// Inode identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InodeInfo {
    /// Inode number.
    pub number: u64,
    /// Device ID.
    pub device: u64,
    /// Hard link count.
    pub links: u64,
}

impl InodeInfo {
    /// Create new inode info.
    pub fn new(number: u64, device: u64, links: u64) -> Self {
        Self {
            number,
            device,
            links,
        }
    }
}

/// Content digests, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksums {
    pub md5: String,
    #[serde(default)]
    pub sha1: String,
    pub sha256: String,
    pub blake3: String,
}

/// Attributes gathered from stat and the name databases.
///
/// Every field but `path` and `basename` is optional: a failed stat still
/// yields a record carrying the error string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardMetadata {
    #[serde(with = "crate::path_serde")]
    pub path: PathBuf,
    pub basename: CompactString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_human: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<FileKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Permissions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership: Option<Ownership>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<Timestamps>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inode: Option<InodeInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symlink_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksums: Option<Checksums>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StandardMetadata {
    /// An empty record for a path; callers fill in what they obtain.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let basename = path
            .file_name()
            .map(|n| CompactString::new(n.to_string_lossy()))
            .unwrap_or_default();
        Self {
            path,
            basename,
            size_bytes: None,
            size_human: None,
            file_type: None,
            permissions: None,
            ownership: None,
            timestamps: None,
            inode: None,
            symlink_target: None,
            checksums: None,
            error: None,
        }
    }

    /// A record for a path whose attributes could not be read.
    pub fn failed(path: impl Into<PathBuf>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(path)
        }
    }

    /// Set the size and its human-readable rendering together.
    pub fn set_size(&mut self, bytes: u64) {
        self.size_bytes = Some(bytes);
        self.size_human = Some(format_size(bytes));
    }

    /// Whether this record describes a regular file.
    pub fn is_regular(&self) -> bool {
        self.file_type == Some(FileKind::Regular)
    }
}

/// Extended attribute listings as reported by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all_attributes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selinux: Option<String>,
}

impl ExtendedAttributes {
    /// True when no attribute listing was obtained.
    pub fn is_empty(&self) -> bool {
        self.all_attributes.is_none() && self.selinux.is_none()
    }
}

/// Access-control list text as reported by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posix_acl: Option<String>,
}

impl AclInfo {
    /// True when no ACL listing was obtained.
    pub fn is_empty(&self) -> bool {
        self.posix_acl.is_none()
    }

    /// Whether the listing holds entries beyond the owner/group/other bits.
    ///
    /// Named user or group entries and a mask entry mark an extended ACL.
    pub fn has_extended_entries(&self) -> bool {
        let Some(acl) = self.posix_acl.as_deref() else {
            return false;
        };
        acl.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .any(|line| {
                let line = line.strip_prefix("default:").unwrap_or(line);
                let mut fields = line.splitn(3, ':');
                match (fields.next(), fields.next()) {
                    (Some("mask"), _) => true,
                    (Some("user" | "group"), Some(name)) => !name.is_empty(),
                    _ => false,
                }
            })
    }
}

/// One scanned filesystem object and its aggregated metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// 1-based position in the deterministic work list.
    pub scan_order: u64,
    pub standard_metadata: StandardMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lustre_metadata: Option<LayoutMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_attributes: Option<ExtendedAttributes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl_info: Option<AclInfo>,
}

impl Entry {
    /// Create an entry with only standard metadata.
    pub fn new(scan_order: u64, standard_metadata: StandardMetadata) -> Self {
        Self {
            scan_order,
            standard_metadata,
            lustre_metadata: None,
            extended_attributes: None,
            acl_info: None,
        }
    }

    /// Absolute path of the entry.
    pub fn path(&self) -> &Path {
        &self.standard_metadata.path
    }

    /// Size in bytes, zero when unknown.
    pub fn size(&self) -> u64 {
        self.standard_metadata.size_bytes.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_kind_from_mode() {
        assert_eq!(FileKind::from_mode(0o100_644), FileKind::Regular);
        assert_eq!(FileKind::from_mode(0o040_755), FileKind::Directory);
        assert_eq!(FileKind::from_mode(0o120_777), FileKind::Symlink);
        assert_eq!(FileKind::from_mode(0o060_660), FileKind::BlockDevice);
        assert_eq!(FileKind::from_mode(0o020_620), FileKind::CharacterDevice);
        assert_eq!(FileKind::from_mode(0o010_644), FileKind::Fifo);
        assert_eq!(FileKind::from_mode(0o140_755), FileKind::Socket);
        assert_eq!(FileKind::from_mode(0o000_644), FileKind::Unknown);
    }

    #[test]
    fn test_file_kind_text() {
        assert_eq!(FileKind::CharacterDevice.to_string(), "character_device");
        assert_eq!(FileKind::Regular.as_ref(), "regular");
    }

    #[test]
    fn test_permissions_from_mode() {
        let perms = Permissions::from_mode(0o100_754);
        assert_eq!(perms.octal, "754");
        assert_eq!(perms.symbolic, "-rwxr-xr--");
        assert!(perms.user_executable);
        assert!(!perms.group_writable);
        assert!(perms.other_readable);
        assert!(!perms.other_executable);
        assert!(!perms.setuid);
    }

    #[test]
    fn test_permissions_special_bits() {
        assert_eq!(Permissions::from_mode(0o104_755).symbolic, "-rwsr-xr-x");
        assert_eq!(Permissions::from_mode(0o102_745).symbolic, "-rwxr-Sr-x");
        assert_eq!(Permissions::from_mode(0o041_777).symbolic, "drwxrwxrwt");

        let perms = Permissions::from_mode(0o041_776);
        assert_eq!(perms.symbolic, "drwxrwxrwT");
        assert!(perms.sticky);
    }

    #[test]
    fn test_ownership_numeric_fallback() {
        let owner = Ownership::new(4242, 77, None, Some("staff".to_string()));
        assert_eq!(owner.username, "4242");
        assert_eq!(owner.groupname, "staff");
    }

    #[test]
    fn test_timestamps_epoch_fraction() {
        let ts = Timestamps::from_epoch((10, 500_000_000), (20, 0), (30, 0));
        assert!((ts.access_time - 10.5).abs() < f64::EPSILON);
        assert_eq!(ts.modify_time, 20.0);
        assert!(!ts.change_time_iso.is_empty());
    }

    #[test]
    fn test_failed_metadata_keeps_path() {
        let meta = StandardMetadata::failed("/data/gone.txt", "No such file");
        assert_eq!(meta.basename.as_str(), "gone.txt");
        assert_eq!(meta.error.as_deref(), Some("No such file"));
        assert!(meta.size_bytes.is_none());
    }

    #[test]
    fn test_acl_extended_entries() {
        let base = AclInfo {
            posix_acl: Some("# file: a\n# owner: me\nuser::rw-\ngroup::r--\nother::r--\n".into()),
        };
        assert!(!base.has_extended_entries());

        let named = AclInfo {
            posix_acl: Some(
                "user::rw-\nuser:alice:r--\ngroup::r--\nmask::r--\nother::---\n".into(),
            ),
        };
        assert!(named.has_extended_entries());

        let default_named = AclInfo {
            posix_acl: Some("user::rwx\ndefault:group:ops:r-x\n".into()),
        };
        assert!(default_named.has_extended_entries());

        assert!(!AclInfo::default().has_extended_entries());
    }
}

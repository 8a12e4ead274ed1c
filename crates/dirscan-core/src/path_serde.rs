//! Lossless serde encoding for filesystem paths.
//!
//! Paths that are valid UTF-8 serialize as plain strings. Anything else
//! becomes `{"lossy": "...", "hex": "..."}`, where `hex` holds the raw
//! bytes and `lossy` is for human readers. Decoding restores the exact
//! original path, so paths survive a round trip through a checkpoint.
//!
//! Use with `#[serde(with = "dirscan_core::path_serde")]`.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Serialize)]
struct RawOut<'a> {
    lossy: Cow<'a, str>,
    hex: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Encoded {
    Text(String),
    Raw { hex: String },
}

pub fn serialize<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
    match path.to_str() {
        Some(text) => serializer.serialize_str(text),
        None => RawOut {
            lossy: path.to_string_lossy(),
            hex: hex::encode(raw_bytes(path)),
        }
        .serialize(serializer),
    }
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PathBuf, D::Error> {
    match Encoded::deserialize(deserializer)? {
        Encoded::Text(text) => Ok(PathBuf::from(text)),
        Encoded::Raw { hex } => {
            let bytes = hex::decode(&hex).map_err(D::Error::custom)?;
            Ok(from_raw_bytes(bytes))
        }
    }
}

/// A borrowed path that serializes losslessly, e.g. as one log line.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(transparent)]
pub struct EncodedPath<'a>(#[serde(with = "crate::path_serde")] pub &'a Path);

/// An owned path decoded from the lossless encoding.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct DecodedPath(#[serde(with = "crate::path_serde")] pub PathBuf);

#[cfg(unix)]
fn raw_bytes(path: &Path) -> &[u8] {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes()
}

#[cfg(not(unix))]
fn raw_bytes(path: &Path) -> &[u8] {
    path.as_os_str().as_encoded_bytes()
}

#[cfg(unix)]
fn from_raw_bytes(bytes: Vec<u8>) -> PathBuf {
    use std::os::unix::ffi::OsStringExt;
    PathBuf::from(std::ffi::OsString::from_vec(bytes))
}

// Only valid UTF-8 can be rebuilt safely from encoded bytes here.
#[cfg(not(unix))]
fn from_raw_bytes(bytes: Vec<u8>) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_path_is_a_plain_string() {
        let json = serde_json::to_string(&EncodedPath(Path::new("/data/ä.txt"))).unwrap();
        assert_eq!(json, "\"/data/ä.txt\"");

        let back: DecodedPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back.0, PathBuf::from("/data/ä.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_path_round_trips_exactly() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = Path::new(OsStr::from_bytes(b"/data/bad\xffname"));
        let json = serde_json::to_string(&EncodedPath(path)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["lossy"], "/data/bad\u{fffd}name");
        assert_eq!(value["hex"], hex::encode(b"/data/bad\xffname"));

        let back: DecodedPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back.0.as_os_str().as_bytes(), b"/data/bad\xffname");
    }

    #[test]
    fn test_bad_hex_is_rejected() {
        let result = serde_json::from_str::<DecodedPath>(r#"{"lossy": "x", "hex": "zz"}"#);
        assert!(result.is_err());
    }
}

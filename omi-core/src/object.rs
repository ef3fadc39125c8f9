//! Core data model for Omi
//!
//! Content-addressed blobs plus the records that reference them:
//! staged entries, commits and file versions.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;

/// On-disk text format for every timestamp column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// SHA-256 digest of a blob's exact bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hash the given content
    pub fn of(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Convert to hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hexadecimal string
    pub fn from_hex(hex_str: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(hex_str)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ContentHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Immutable file content, addressed by its hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub hash: ContentHash,
    pub data: Vec<u8>,
    pub size: u64,
}

impl Blob {
    /// Create a new blob, computing its hash and size
    pub fn new(data: Vec<u8>) -> Self {
        let hash = ContentHash::of(&data);
        let size = data.len() as u64;
        Self { hash, data, size }
    }
}

/// A path marked for inclusion in the next commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedEntry {
    pub path: String,
    /// Hash of the content at stage time
    pub hash: ContentHash,
    pub staged_at: NaiveDateTime,
}

/// Sequence number assigned by the commit ledger
pub type CommitId = i64;

/// A numbered snapshot event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: CommitId,
    pub message: String,
    pub timestamp: NaiveDateTime,
    pub author: String,
}

/// Binding of a path to a content hash within one commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVersion {
    pub id: i64,
    pub path: String,
    pub hash: ContentHash,
    pub timestamp: NaiveDateTime,
    pub commit_id: CommitId,
}

/// Current local time truncated to whole seconds, matching the stored format
pub fn now() -> NaiveDateTime {
    let local = chrono::Local::now().naive_local();
    local.with_nanosecond(0).unwrap_or(local)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_roundtrip() {
        let id = ContentHash::new([42u8; 32]);
        let parsed: ContentHash = id.to_hex().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_content_hash_known_value() {
        let hash = ContentHash::of(b"hello");
        assert_eq!(
            hash.to_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_content_hash_rejects_short_hex() {
        assert!(ContentHash::from_hex("abcd").is_err());
    }

    #[test]
    fn test_blob_size() {
        let blob = Blob::new(b"hello world".to_vec());
        assert_eq!(blob.size, 11);
        assert_eq!(blob.hash, ContentHash::of(b"hello world"));
    }

    #[test]
    fn test_now_has_no_subseconds() {
        let ts = now();
        assert_eq!(ts.format(TIMESTAMP_FORMAT).to_string().len(), 19);
        assert_eq!(ts.and_utc().timestamp_subsec_nanos(), 0);
    }
}

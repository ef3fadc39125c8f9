//! Storage layer for Omi
//!
//! A repository is a single SQLite file holding four tables: `blobs`
//! (the content store), `staging`, `commits` and `files` (the commit ledger).
//! This module owns the schema, the error type shared by the whole crate and
//! the deduplicating content store.

use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension, params};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::object::{Blob, ContentHash, TIMESTAMP_FORMAT};

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, OmiError>;

/// Errors that can occur in the repository engine and sync client
#[derive(Debug, thiserror::Error)]
pub enum OmiError {
    #[error("Configuration missing: {0}")]
    ConfigMissing(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Remote API is disabled in settings")]
    RemoteDisabled,

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Server returned status {status}: {reason}")]
    RemoteRejected { status: u16, reason: String },

    #[error("Repository storage corrupt: {0}")]
    StorageCorrupt(String),

    #[error("Blob not found: {0}")]
    NotFound(ContentHash),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

const TABLES: [&str; 4] = ["blobs", "files", "commits", "staging"];

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS blobs (
        hash TEXT PRIMARY KEY,
        data BLOB,
        size INTEGER
    );
    CREATE TABLE IF NOT EXISTS files (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        filename TEXT,
        hash TEXT,
        datetime TEXT,
        commit_id INTEGER,
        FOREIGN KEY(commit_id) REFERENCES commits(id)
    );
    CREATE TABLE IF NOT EXISTS commits (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        message TEXT,
        datetime TEXT,
        user TEXT
    );
    CREATE TABLE IF NOT EXISTS staging (
        filename TEXT PRIMARY KEY,
        hash TEXT,
        datetime TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_files_hash ON files(hash);
    CREATE INDEX IF NOT EXISTS idx_files_commit ON files(commit_id);
    CREATE INDEX IF NOT EXISTS idx_blobs_hash ON blobs(hash);
";

/// Create (or upgrade in place) the store file at `path`.
pub(crate) fn create_store_db(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

/// Open an existing store file, failing if it is absent or lacks the schema.
pub(crate) fn open_store_db(path: &Path) -> Result<Connection> {
    if !path.is_file() {
        return Err(OmiError::StorageCorrupt(format!(
            "store file {} not found (run `omi init`)",
            path.display()
        )));
    }
    let conn = Connection::open(path)?;
    verify_schema(&conn)?;
    Ok(conn)
}

/// Put `data` at `dest` only if it opens as a store.
///
/// The bytes go to a temporary file beside `dest` first and are renamed over
/// it after the check, so `dest` is untouched when anything fails.
pub(crate) fn install_store_file(dest: &Path, data: &[u8]) -> Result<()> {
    let dir = dest.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    drop(open_store_db(tmp.path())?);
    tmp.persist(dest).map_err(|e| OmiError::Io(e.error))?;
    tracing::debug!("installed {} bytes at {}", data.len(), dest.display());
    Ok(())
}

fn verify_schema(conn: &Connection) -> Result<()> {
    for table in TABLES {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [table],
                |r| r.get(0),
            )
            .map_err(|e| OmiError::StorageCorrupt(e.to_string()))?;
        if count == 0 {
            return Err(OmiError::StorageCorrupt(format!("missing table `{}`", table)));
        }
    }
    Ok(())
}

pub(crate) fn parse_hash(text: &str) -> Result<ContentHash> {
    ContentHash::from_hex(text)
        .map_err(|e| OmiError::StorageCorrupt(format!("bad hash {:?}: {}", text, e)))
}

pub(crate) fn parse_timestamp(text: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map_err(|e| OmiError::StorageCorrupt(format!("bad timestamp {:?}: {}", text, e)))
}

pub(crate) fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Result of a [`ContentStore::store`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutOutcome {
    pub hash: ContentHash,
    /// False when a blob with this hash already existed
    pub newly_stored: bool,
}

/// Append-only, deduplicating blob table.
///
/// Borrows a connection so it can run inside the commit transaction.
pub struct ContentStore<'c> {
    conn: &'c Connection,
}

impl<'c> ContentStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Store `data` unless identical content is already present.
    pub fn store(&self, data: &[u8]) -> Result<PutOutcome> {
        let hash = ContentHash::of(data);
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO blobs (hash, data, size) VALUES (?1, ?2, ?3)",
            params![hash.to_hex(), data, data.len() as i64],
        )?;
        if inserted > 0 {
            tracing::debug!("stored new blob {} ({} bytes)", hash, data.len());
        } else {
            tracing::debug!("blob {} already present", hash);
        }
        Ok(PutOutcome { hash, newly_stored: inserted > 0 })
    }

    pub fn put(&self, data: &[u8]) -> Result<ContentHash> {
        Ok(self.store(data)?.hash)
    }

    pub fn contains(&self, hash: &ContentHash) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM blobs WHERE hash=?1",
            [hash.to_hex()],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    /// Fetch a blob; its bytes must still hash to `hash`.
    pub fn get(&self, hash: &ContentHash) -> Result<Blob> {
        let data = self
            .conn
            .query_row("SELECT data FROM blobs WHERE hash=?1", [hash.to_hex()], |r| {
                r.get::<_, Vec<u8>>(0)
            })
            .optional()?
            .ok_or(OmiError::NotFound(*hash))?;
        let blob = Blob::new(data);
        if blob.hash != *hash {
            return Err(OmiError::StorageCorrupt(format!("blob {} fails its hash check", hash)));
        }
        Ok(blob)
    }

    /// Number of distinct blobs
    pub fn count(&self) -> Result<u64> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM blobs", [], |r| r.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_conn(tmp: &TempDir) -> Connection {
        create_store_db(&tmp.path().join("repo.omi")).unwrap()
    }

    #[test]
    fn test_install_store_file_replaces_valid_store() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("source.omi");
        ContentStore::new(&create_store_db(&source).unwrap()).put(b"payload").unwrap();
        let dest = tmp.path().join("repo.omi");
        std::fs::write(&dest, b"old").unwrap();

        let bytes = std::fs::read(&source).unwrap();
        install_store_file(&dest, &bytes).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), bytes);
        assert_eq!(ContentStore::new(&open_store_db(&dest).unwrap()).count().unwrap(), 1);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_install_store_file_rejects_non_store() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("repo.omi");
        ContentStore::new(&create_store_db(&dest).unwrap()).put(b"keep me").unwrap();
        let before = std::fs::read(&dest).unwrap();

        for junk in [&b"precious notes"[..], &b""[..]] {
            let err = install_store_file(&dest, junk).unwrap_err();
            assert!(matches!(err, OmiError::StorageCorrupt(_)), "got {:?}", err);
        }
        assert_eq!(std::fs::read(&dest).unwrap(), before);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_put_dedups_identical_content() {
        let tmp = TempDir::new().unwrap();
        let conn = store_conn(&tmp);
        let store = ContentStore::new(&conn);

        let first = store.store(b"same bytes").unwrap();
        let second = store.store(b"same bytes").unwrap();
        assert_eq!(first.hash, second.hash);
        assert!(first.newly_stored);
        assert!(!second.newly_stored);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_get_returns_exact_bytes() {
        let tmp = TempDir::new().unwrap();
        let conn = store_conn(&tmp);
        let store = ContentStore::new(&conn);

        let data = vec![0u8, 255, 10, 13, 0];
        let hash = store.put(&data).unwrap();
        assert!(store.contains(&hash).unwrap());
        let blob = store.get(&hash).unwrap();
        assert_eq!(blob.data, data);
        assert_eq!(blob.size, 5);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let conn = store_conn(&tmp);
        let store = ContentStore::new(&conn);

        let missing = ContentHash::of(b"never stored");
        assert!(!store.contains(&missing).unwrap());
        match store.get(&missing) {
            Err(OmiError::NotFound(h)) => assert_eq!(h, missing),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_get_detects_altered_bytes() {
        let tmp = TempDir::new().unwrap();
        let conn = store_conn(&tmp);
        let store = ContentStore::new(&conn);

        let hash = store.put(b"original").unwrap();
        conn.execute("UPDATE blobs SET data=?1 WHERE hash=?2", params![b"tampered".to_vec(), hash.to_hex()])
            .unwrap();
        assert!(matches!(store.get(&hash), Err(OmiError::StorageCorrupt(_))));
    }

    #[test]
    fn test_size_column_matches_length() {
        let tmp = TempDir::new().unwrap();
        let conn = store_conn(&tmp);
        let hash = ContentStore::new(&conn).put(b"12345").unwrap();
        let size: i64 = conn
            .query_row("SELECT size FROM blobs WHERE hash=?1", [hash.to_hex()], |r| r.get(0))
            .unwrap();
        assert_eq!(size, 5);
    }

    #[test]
    fn test_open_rejects_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = open_store_db(&tmp.path().join("nope.omi")).unwrap_err();
        assert!(matches!(err, OmiError::StorageCorrupt(_)));
    }

    #[test]
    fn test_open_rejects_foreign_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("junk.omi");
        std::fs::write(&path, b"this is not a database at all, just text padding").unwrap();
        let err = open_store_db(&path).unwrap_err();
        assert!(matches!(err, OmiError::StorageCorrupt(_)));
    }

    #[test]
    fn test_open_rejects_partial_schema() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("partial.omi");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE blobs (hash TEXT PRIMARY KEY, data BLOB, size INTEGER);")
            .unwrap();
        let err = open_store_db(&path).unwrap_err();
        assert!(err.to_string().contains("files"), "got: {}", err);
    }
}

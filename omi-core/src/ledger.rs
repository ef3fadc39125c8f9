//! Commit ledger: append-only `commits` and `files` tables.
//!
//! Ids come from SQLite `AUTOINCREMENT`, so they only grow and are never
//! reused by a visible commit. A rolled-back commit releases its id.

use chrono::NaiveDateTime;
use rusqlite::{Connection, params};

use crate::object::{Commit, CommitId, ContentHash, FileVersion};
use crate::storage::{Result, format_timestamp, parse_hash, parse_timestamp};

pub struct CommitLedger<'c> {
    conn: &'c Connection,
}

impl<'c> CommitLedger<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn append_commit(&self, message: &str, author: &str, timestamp: NaiveDateTime) -> Result<Commit> {
        self.conn.execute(
            "INSERT INTO commits (message, datetime, user) VALUES (?1, ?2, ?3)",
            params![message, format_timestamp(&timestamp), author],
        )?;
        Ok(Commit {
            id: self.conn.last_insert_rowid(),
            message: message.to_string(),
            timestamp,
            author: author.to_string(),
        })
    }

    pub fn append_file_version(
        &self,
        path: &str,
        hash: ContentHash,
        timestamp: NaiveDateTime,
        commit_id: CommitId,
    ) -> Result<FileVersion> {
        self.conn.execute(
            "INSERT INTO files (filename, hash, datetime, commit_id) VALUES (?1, ?2, ?3, ?4)",
            params![path, hash.to_hex(), format_timestamp(&timestamp), commit_id],
        )?;
        Ok(FileVersion {
            id: self.conn.last_insert_rowid(),
            path: path.to_string(),
            hash,
            timestamp,
            commit_id,
        })
    }

    /// Most recent `limit` commits, newest first
    pub fn recent(&self, limit: usize) -> Result<Vec<Commit>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, message, datetime, user FROM commits ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit as i64], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, message, datetime, author)| {
                Ok(Commit { id, message, timestamp: parse_timestamp(&datetime)?, author })
            })
            .collect()
    }

    pub fn files_in_commit(&self, commit_id: CommitId) -> Result<Vec<FileVersion>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, filename, hash, datetime FROM files WHERE commit_id=?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([commit_id], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, path, hash, datetime)| {
                Ok(FileVersion {
                    id,
                    path,
                    hash: parse_hash(&hash)?,
                    timestamp: parse_timestamp(&datetime)?,
                    commit_id,
                })
            })
            .collect()
    }

    pub fn commit_count(&self) -> Result<u64> {
        let n: i64 = self.conn.query_row("SELECT COUNT(*) FROM commits", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    pub fn file_version_count(&self) -> Result<u64> {
        let n: i64 = self.conn.query_row("SELECT COUNT(*) FROM files", [], |r| r.get(0))?;
        Ok(n as u64)
    }
}

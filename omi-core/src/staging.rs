//! Staging area: the set of paths pending for the next commit.
//!
//! Staging only records the path and a hash snapshot. File content reaches
//! the content store at commit time, when the file is read again.

use rusqlite::{Connection, params};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::object::{self, ContentHash, StagedEntry};
use crate::storage::{OmiError, Result, format_timestamp, parse_hash, parse_timestamp};

/// Read a staged path relative to the working directory.
///
/// Anything that is not a readable regular file is `FileNotFound`.
pub(crate) fn read_work_file(root: &Path, path: &str) -> Result<Vec<u8>> {
    let full = root.join(path);
    if !full.is_file() {
        return Err(OmiError::FileNotFound(full));
    }
    fs::read(&full).map_err(|_| OmiError::FileNotFound(full))
}

pub struct StagingArea<'c> {
    conn: &'c Connection,
    root: &'c Path,
}

impl<'c> StagingArea<'c> {
    pub fn new(conn: &'c Connection, root: &'c Path) -> Self {
        Self { conn, root }
    }

    /// Hash `path` and upsert its staging row. Last stage wins.
    pub fn stage(&self, path: &str) -> Result<StagedEntry> {
        let data = read_work_file(self.root, path)?;
        let entry = StagedEntry {
            path: path.to_string(),
            hash: ContentHash::of(&data),
            staged_at: object::now(),
        };
        self.conn.execute(
            "INSERT OR REPLACE INTO staging (filename, hash, datetime) VALUES (?1, ?2, ?3)",
            params![entry.path, entry.hash.to_hex(), format_timestamp(&entry.staged_at)],
        )?;
        tracing::debug!("staged {} ({})", entry.path, entry.hash);
        Ok(entry)
    }

    /// Stage every regular file directly under the working directory.
    ///
    /// Files that fail to stage are logged and skipped.
    pub fn stage_all(&self, exclude: &HashSet<String>) -> Result<Vec<StagedEntry>> {
        let mut names = Vec::new();
        for dirent in fs::read_dir(self.root)? {
            let dirent = dirent?;
            if !dirent.path().is_file() {
                continue;
            }
            let Ok(name) = dirent.file_name().into_string() else {
                tracing::warn!("skipping non UTF-8 file name {:?}", dirent.file_name());
                continue;
            };
            if !exclude.contains(&name) {
                names.push(name);
            }
        }
        names.sort();

        let mut staged = Vec::with_capacity(names.len());
        for name in names {
            match self.stage(&name) {
                Ok(entry) => staged.push(entry),
                Err(e) => tracing::warn!("skipping {}: {}", name, e),
            }
        }
        Ok(staged)
    }

    /// Staged entries ordered by path
    pub fn list(&self) -> Result<Vec<StagedEntry>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT filename, hash, datetime FROM staging ORDER BY filename")?;
        let rows = stmt
            .query_map([], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(path, hash, datetime)| {
                Ok(StagedEntry {
                    path,
                    hash: parse_hash(&hash)?,
                    staged_at: parse_timestamp(&datetime)?,
                })
            })
            .collect()
    }

    pub fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM staging", [])?;
        Ok(())
    }
}

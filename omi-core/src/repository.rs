//! Repository engine
//!
//! Owns the store connection and runs staging, commit and query operations
//! against the content store, staging area and commit ledger. A commit is a
//! single SQLite transaction: either every file version and the commit
//! record persist, or nothing does.

use rusqlite::Connection;
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::ledger::CommitLedger;
use crate::object::{self, Blob, Commit, CommitId, ContentHash, FileVersion, StagedEntry};
use crate::pointer::{DEFAULT_DB_NAME, RepositoryLocation};
use crate::staging::{StagingArea, read_work_file};
use crate::storage::{ContentStore, OmiError, Result, create_store_db, install_store_file, open_store_db};

/// How many commits `status` shows
pub const STATUS_RECENT_COMMITS: usize = 5;

/// One file written by a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommittedFile {
    pub path: String,
    pub hash: ContentHash,
    /// False when the content was already in the store
    pub newly_stored: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    pub commit_id: CommitId,
    pub files: Vec<CommittedFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryStatus {
    pub staged: Vec<StagedEntry>,
    pub recent_commits: Vec<Commit>,
    pub blob_count: u64,
    pub file_version_count: u64,
    pub commit_count: u64,
}

/// A local repository: a working directory plus its single-file store.
#[derive(Debug)]
pub struct Repository {
    location: RepositoryLocation,
    conn: Connection,
}

impl Repository {
    /// Create the store `db_name` in `root` and point `.omi` at it.
    ///
    /// Re-running on an existing store keeps its contents.
    pub fn init(root: &Path, db_name: &str) -> Result<Self> {
        let location = RepositoryLocation::new(root, db_name);
        location.write_pointer()?;
        let conn = create_store_db(&location.db_path())?;
        tracing::info!("initialized repository {}", location.db_path().display());
        Ok(Self { location, conn })
    }

    /// Open the repository named by the pointer record in `root`.
    pub fn open(root: &Path) -> Result<Self> {
        let location = RepositoryLocation::resolve(root)?;
        Self::open_at(location)
    }

    pub fn open_at(location: RepositoryLocation) -> Result<Self> {
        let conn = open_store_db(&location.db_path())?;
        Ok(Self { location, conn })
    }

    /// Copy an existing store file into `root` as the default store.
    ///
    /// The source must open as a store before anything in `root` changes.
    pub fn clone_local(root: &Path, source: &Path) -> Result<Self> {
        if !source.is_file() {
            return Err(OmiError::FileNotFound(source.to_path_buf()));
        }
        let location = RepositoryLocation::new(root, DEFAULT_DB_NAME);
        let dest = location.db_path();
        let same_file = match (source.canonicalize(), dest.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };
        if !same_file {
            install_store_file(&dest, &fs::read(source)?)?;
        }
        let repo = Self::open_at(location)?;
        repo.location.write_pointer()?;
        tracing::info!("cloned {} into {}", source.display(), dest.display());
        Ok(repo)
    }

    pub fn location(&self) -> &RepositoryLocation {
        &self.location
    }

    fn staging(&self) -> StagingArea<'_> {
        StagingArea::new(&self.conn, self.location.root())
    }

    /// Stage one file, given relative to the working directory.
    pub fn add(&self, path: &str) -> Result<StagedEntry> {
        self.staging().stage(path)
    }

    /// Stage every file in the working directory except the store itself.
    pub fn add_all(&self) -> Result<Vec<StagedEntry>> {
        self.staging().stage_all(&self.location.reserved_names())
    }

    pub fn staged(&self) -> Result<Vec<StagedEntry>> {
        self.staging().list()
    }

    /// Record every staged file under a new commit and clear staging.
    ///
    /// Staged files are read again here; a file that has become unreadable
    /// aborts the whole commit.
    pub fn commit(&mut self, message: &str, author: &str) -> Result<CommitReport> {
        let root = self.location.root();
        let tx = self.conn.transaction()?;

        let ledger = CommitLedger::new(&tx);
        let staging = StagingArea::new(&tx, root);
        let store = ContentStore::new(&tx);

        let commit = ledger.append_commit(message, author, object::now())?;
        let mut files = Vec::new();
        for entry in staging.list()? {
            let data = read_work_file(root, &entry.path)?;
            let outcome = store.store(&data)?;
            ledger.append_file_version(&entry.path, outcome.hash, entry.staged_at, commit.id)?;
            files.push(CommittedFile {
                path: entry.path,
                hash: outcome.hash,
                newly_stored: outcome.newly_stored,
            });
        }
        staging.clear()?;
        tx.commit()?;
        tracing::info!("commit #{} recorded {} file(s)", commit.id, files.len());
        Ok(CommitReport { commit_id: commit.id, files })
    }

    pub fn status(&self) -> Result<RepositoryStatus> {
        let ledger = CommitLedger::new(&self.conn);
        Ok(RepositoryStatus {
            staged: self.staged()?,
            recent_commits: ledger.recent(STATUS_RECENT_COMMITS)?,
            blob_count: ContentStore::new(&self.conn).count()?,
            file_version_count: ledger.file_version_count()?,
            commit_count: ledger.commit_count()?,
        })
    }

    /// Most recent `limit` commits, newest first
    pub fn log(&self, limit: usize) -> Result<Vec<Commit>> {
        CommitLedger::new(&self.conn).recent(limit)
    }

    pub fn files_in_commit(&self, commit_id: CommitId) -> Result<Vec<FileVersion>> {
        CommitLedger::new(&self.conn).files_in_commit(commit_id)
    }

    pub fn blob(&self, hash: &ContentHash) -> Result<Blob> {
        ContentStore::new(&self.conn).get(hash)
    }
}

/// Author recorded on commits: `$USER`, then `$USERNAME`, then "unknown".
pub fn default_author() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

//! The `.omi` pointer record naming the active store file.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::storage::Result;

pub const POINTER_FILE: &str = ".omi";
pub const DEFAULT_DB_NAME: &str = "repo.omi";

/// Where a repository lives: a working directory and its store file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLocation {
    root: PathBuf,
    db_name: String,
}

impl RepositoryLocation {
    pub fn new(root: impl Into<PathBuf>, db_name: impl Into<String>) -> Self {
        Self { root: root.into(), db_name: db_name.into() }
    }

    /// Read the pointer in `root`, falling back to [`DEFAULT_DB_NAME`].
    pub fn resolve(root: &Path) -> Result<Self> {
        let pointer = root.join(POINTER_FILE);
        let db_name = if pointer.is_file() {
            parse_pointer(&fs::read_to_string(&pointer)?)
        } else {
            None
        };
        Ok(Self::new(root, db_name.unwrap_or_else(|| DEFAULT_DB_NAME.to_string())))
    }

    pub fn write_pointer(&self) -> Result<()> {
        fs::write(self.pointer_path(), format!("OMI_DB=\"{}\"\n", self.db_name))?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join(&self.db_name)
    }

    pub fn pointer_path(&self) -> PathBuf {
        self.root.join(POINTER_FILE)
    }

    /// Names in the working directory that must never be staged.
    pub fn reserved_names(&self) -> HashSet<String> {
        let mut names: HashSet<String> = ["-journal", "-wal", "-shm"]
            .iter()
            .map(|suffix| format!("{}{}", self.db_name, suffix))
            .collect();
        names.insert(self.db_name.clone());
        names.insert(POINTER_FILE.to_string());
        names
    }
}

fn parse_pointer(text: &str) -> Option<String> {
    let start = text.find("OMI_DB=\"")? + "OMI_DB=\"".len();
    let len = text[start..].find('"')?;
    let name = &text[start..start + len];
    (!name.is_empty()).then(|| name.to_string())
}

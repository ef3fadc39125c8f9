//! Omi Core Library
//!
//! Core functionality for omi, a small single-file version-control tool:
//! - Object model (Blob, StagedEntry, Commit, FileVersion)
//! - SQLite store with a deduplicating content store
//! - Staging area and append-only commit ledger
//! - Repository engine (init, clone, add, commit, status, log)
//! - Settings and the local two-factor gate
//! - Remote sync over HTTP with an external-program fallback

pub mod auth;
pub mod config;
pub mod ledger;
pub mod object;
pub mod pointer;
pub mod repository;
pub mod staging;
pub mod storage;
pub mod sync;
pub mod transport;

pub use auth::{CredentialRegistry, OtpPrompt, TerminalPrompt, TwoFactorGate};
pub use config::{SETTINGS_FILE, Settings};
pub use object::{Blob, Commit, CommitId, ContentHash, FileVersion, StagedEntry};
pub use pointer::{DEFAULT_DB_NAME, POINTER_FILE, RepositoryLocation};
pub use repository::{CommitReport, CommittedFile, Repository, RepositoryStatus, default_author};
pub use storage::{ContentStore, OmiError, PutOutcome, Result};
pub use sync::SyncClient;
pub use transport::{
    CurlTransport, FallbackTransport, FormField, FormValue, HttpTransport, RemoteRequest,
    RemoteResponse, Transport,
};

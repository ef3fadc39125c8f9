//! Human-readable output for the `omi` commands

use omi_core::object::TIMESTAMP_FORMAT;
use omi_core::{Commit, CommittedFile, RepositoryStatus, StagedEntry};

pub fn staged_line(entry: &StagedEntry) -> String {
    format!("Staged: {} (hash: {})", entry.path, entry.hash)
}

pub fn blob_line(file: &CommittedFile) -> String {
    if file.newly_stored {
        format!("  Stored new blob: {} ({})", file.path, file.hash)
    } else {
        format!("  Blob already exists (deduplicated): {} ({})", file.path, file.hash)
    }
}

/// `id|datetime|user|message`
pub fn log_line(commit: &Commit) -> String {
    format!(
        "{}|{}|{}|{}",
        commit.id,
        commit.timestamp.format(TIMESTAMP_FORMAT),
        commit.author,
        commit.message
    )
}

pub fn status_text(status: &RepositoryStatus) -> String {
    let mut lines = vec!["=== Staged Files ===".to_string()];
    if status.staged.is_empty() {
        lines.push("(none)".to_string());
    }
    lines.extend(
        status.staged.iter().map(|e| format!("{}|{}", e.path, e.staged_at.format(TIMESTAMP_FORMAT))),
    );

    lines.push(String::new());
    lines.push("=== Recent Commits ===".to_string());
    lines.extend(status.recent_commits.iter().map(log_line));

    lines.push(String::new());
    lines.push("=== Repository Stats ===".to_string());
    lines.push(format!("Unique blobs: {}", status.blob_count));
    lines.push(format!("Total file versions: {}", status.file_version_count));
    lines.push(format!("Commits: {}", status.commit_count));

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

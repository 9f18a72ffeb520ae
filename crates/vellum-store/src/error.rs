//! Error types for storage operations.

use thiserror::Error;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur routing, writing, or replaying document
/// content.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// A partition could not be reached. Recoverable for content
    /// partitions via fallback to the metadata partition; fatal for the
    /// metadata partition itself.
    #[error("partition {partition} unreachable: {reason}")]
    PartitionUnreachable { partition: String, reason: String },

    /// A read or history request referenced a note with no partition
    /// assignment in the registry. Surfaced as not-found, never retried.
    #[error("note {note_id} has no partition assignment")]
    DocumentNotAssigned { note_id: String },

    /// A stored delta failed to decode or apply during replay.
    /// Data-integrity failure, never retried.
    #[error("version replay corrupted for note {note_id} at revision {revision}: {reason}")]
    VersionReplayCorrupted {
        note_id: String,
        revision: u64,
        reason: String,
    },

    /// The snapshot advanced under a writer between diff and commit.
    /// The write path retries with a fresh diff; this surfaces only
    /// when retries are exhausted.
    #[error("snapshot for note {note_id} changed concurrently (expected revision {expected})")]
    StaleRevision { note_id: String, expected: u64 },

    /// Partition assignment is write-once.
    #[error("partition assignment for note {note_id} is already set")]
    AssignmentImmutable { note_id: String },

    #[error("note {note_id} already exists")]
    DuplicateNote { note_id: String },

    /// A revision marker of the wrong kind for the backend, e.g. a
    /// commit id handed to the partition backend.
    #[error("revision marker {marker} not recognized by this backend")]
    UnsupportedMarker { marker: String },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("timestamp parse error: {0}")]
    Time(#[from] chrono::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote repository error: {0}")]
    Repo(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_corruption_names_the_revision() {
        let err = StoreError::VersionReplayCorrupted {
            note_id: "n1".into(),
            revision: 4,
            reason: "delta does not fit tree at $.content".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("n1"));
        assert!(msg.contains("revision 4"));
    }
}

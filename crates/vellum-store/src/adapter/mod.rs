//! The storage adapter contract.
//!
//! Everything above the storage engine talks to documents through
//! [`DocumentStore`], so the partition-routed version-log backend and
//! the remote-repository backend are interchangeable. The backend is
//! chosen once at startup and injected; call sites never branch on a
//! storage flag.

pub mod partition;
pub mod repo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::Result;

pub use partition::PartitionStore;
pub use repo::RepoStore;

/// Opaque reference to a stored document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentHandle {
    pub note_id: String,
    /// Repository backends keep content as a file; the path is fixed at
    /// creation.
    pub content_path: Option<String>,
}

impl DocumentHandle {
    pub fn for_note(note_id: impl Into<String>) -> Self {
        Self {
            note_id: note_id.into(),
            content_path: None,
        }
    }
}

/// Identifies a point in a document's history: a revision number for
/// the version-log backend, a commit id for the repository backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RevisionMarker {
    Revision(u64),
    Commit(String),
}

impl fmt::Display for RevisionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevisionMarker::Revision(n) => write!(f, "{n}"),
            RevisionMarker::Commit(sha) => f.write_str(sha),
        }
    }
}

/// One history entry. Backends naturally order their histories
/// differently (the log appends oldest-first, commit APIs list
/// newest-first), so consumers order by `ordinal`/`timestamp`, never by
/// stream position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub marker: RevisionMarker,
    /// Human-readable label: `Version N`, or the commit message.
    pub label: String,
    pub author: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Position in the document's history, 1 = oldest.
    pub ordinal: u64,
}

/// Metadata captured at document creation.
#[derive(Debug, Clone, Default)]
pub struct DocumentMetadata {
    /// Caller-supplied id; generated when absent.
    pub note_id: Option<String>,
    pub title: Option<String>,
    pub author_id: Option<String>,
}

/// Result of a save.
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub marker: RevisionMarker,
    /// Operation id recorded with the write, where the backend keeps
    /// one.
    pub op_id: Option<String>,
    pub time: DateTime<Utc>,
}

/// Uniform contract over document storage backends.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Register a document and persist its initial content.
    async fn create_document(
        &self,
        initial: &Value,
        metadata: DocumentMetadata,
    ) -> Result<DocumentHandle>;

    /// Persist a new state of the document, returning the marker of the
    /// resulting revision. Saving an unchanged tree is a no-op echoing
    /// the current marker.
    async fn save_content(
        &self,
        handle: &DocumentHandle,
        tree: &Value,
        author_id: Option<&str>,
        op_id: Option<&str>,
    ) -> Result<SaveOutcome>;

    /// The document's history as a lazy, finite stream, consumed once.
    /// Re-request to restart.
    fn list_history<'a>(&'a self, handle: &'a DocumentHandle)
        -> BoxStream<'a, Result<HistoryEntry>>;

    /// Content as of `marker`; the current content when `marker` is
    /// `None`.
    async fn fetch_at_revision(
        &self,
        handle: &DocumentHandle,
        marker: Option<&RevisionMarker>,
    ) -> Result<Value>;
}

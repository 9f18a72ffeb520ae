//! Request and response shapes for the document storage API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vellum_store::{HistoryEntry, RevisionMarker};

#[derive(Debug, Deserialize)]
pub struct CreateNoteRequest {
    /// Client-supplied note id; generated when absent.
    pub note_id: Option<String>,
    pub title: Option<String>,
    pub author_id: Option<String>,
    /// Initial document content; the empty tree when absent.
    pub content: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct CreateNoteResponse {
    pub note_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SaveContentRequest {
    pub content: Value,
    pub author_id: Option<String>,
    /// Client idempotency token; a retried operation lands on the
    /// revision it already produced.
    pub op_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SaveContentResponse {
    pub revision_marker: RevisionMarker,
    pub op_id: Option<String>,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub entries: Vec<HistoryEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ContentQuery {
    /// Revision number to reconstruct; current content when absent.
    pub revision: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ContentResponse {
    pub content: Value,
}

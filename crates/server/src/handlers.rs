//! HTTP handlers for the document storage API.

use axum::extract::{Path, Query, State};
use axum::Json;
use futures::TryStreamExt;
use tracing::info;
use vellum_core::empty_tree;
use vellum_store::{DocumentHandle, DocumentMetadata, RevisionMarker};

use crate::config::AppState;
use crate::error::Result;
use crate::models::{
    ContentQuery, ContentResponse, CreateNoteRequest, CreateNoteResponse, HistoryResponse,
    SaveContentRequest, SaveContentResponse,
};

/// POST /api/notes
pub async fn create_note(
    State(state): State<AppState>,
    Json(request): Json<CreateNoteRequest>,
) -> Result<Json<CreateNoteResponse>> {
    let initial = request.content.unwrap_or_else(empty_tree);
    let handle = state
        .store
        .create_document(
            &initial,
            DocumentMetadata {
                note_id: request.note_id,
                title: request.title,
                author_id: request.author_id,
            },
        )
        .await?;

    info!(note_id = %handle.note_id, "created note");
    Ok(Json(CreateNoteResponse {
        note_id: handle.note_id,
    }))
}

/// PUT /api/notes/{id}/content
pub async fn save_content(
    State(state): State<AppState>,
    Path(note_id): Path<String>,
    Json(request): Json<SaveContentRequest>,
) -> Result<Json<SaveContentResponse>> {
    let handle = DocumentHandle::for_note(note_id);
    let outcome = state
        .store
        .save_content(
            &handle,
            &request.content,
            request.author_id.as_deref(),
            request.op_id.as_deref(),
        )
        .await?;

    Ok(Json(SaveContentResponse {
        revision_marker: outcome.marker,
        op_id: outcome.op_id,
        time: outcome.time,
    }))
}

/// GET /api/notes/{id}/history
pub async fn list_history(
    State(state): State<AppState>,
    Path(note_id): Path<String>,
) -> Result<Json<HistoryResponse>> {
    let handle = DocumentHandle::for_note(note_id);
    let entries = state.store.list_history(&handle).try_collect().await?;
    Ok(Json(HistoryResponse { entries }))
}

/// GET /api/notes/{id}/content?revision=N
pub async fn fetch_content(
    State(state): State<AppState>,
    Path(note_id): Path<String>,
    Query(query): Query<ContentQuery>,
) -> Result<Json<ContentResponse>> {
    let handle = DocumentHandle::for_note(note_id);
    let marker = query.revision.map(RevisionMarker::Revision);
    let content = state
        .store
        .fetch_at_revision(&handle, marker.as_ref())
        .await?;
    Ok(Json(ContentResponse { content }))
}

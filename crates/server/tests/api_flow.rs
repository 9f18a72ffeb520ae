//! API flow against a tempdir-backed partitioned store.

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::tempdir;
use tower::ServiceExt;
use vellum_store::{PartitionStore, StoreConfig};

use server::config::AppState;

fn test_app(dir: &std::path::Path) -> Router {
    let store = PartitionStore::new(StoreConfig::with_base_dir(dir, &["c0", "c1"]));
    server::app(AppState::new(Arc::new(store)))
}

async fn request(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    let request = match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn save_history_and_point_in_time_fetch() {
    let dir = tempdir().unwrap();
    let app = test_app(dir.path());

    let (status, created) = request(
        &app,
        "POST",
        "/api/notes",
        Some(json!({"note_id": "n1", "title": "My note", "author_id": "u1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["note_id"], "n1");

    let (status, saved) = request(
        &app,
        "PUT",
        "/api/notes/n1/content",
        Some(json!({"content": {"title": "A"}, "author_id": "u1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saved["revision_marker"], json!(1));

    let (_, saved) = request(
        &app,
        "PUT",
        "/api/notes/n1/content",
        Some(json!({"content": {"title": "B"}, "author_id": "u1"})),
    )
    .await;
    assert_eq!(saved["revision_marker"], json!(2));

    let (status, at1) = request(&app, "GET", "/api/notes/n1/content?revision=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(at1["content"], json!({"title": "A"}));

    let (_, current) = request(&app, "GET", "/api/notes/n1/content", None).await;
    assert_eq!(current["content"], json!({"title": "B"}));

    let (_, at0) = request(&app, "GET", "/api/notes/n1/content?revision=0", None).await;
    assert_eq!(at0["content"], json!({}));

    let (status, history) = request(&app, "GET", "/api/notes/n1/history", None).await;
    assert_eq!(status, StatusCode::OK);
    let entries = history["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["label"], "Version 1");
    assert_eq!(entries[1]["ordinal"], 2);
}

#[tokio::test]
async fn missing_note_is_not_found() {
    let dir = tempdir().unwrap();
    let app = test_app(dir.path());

    let (status, body) = request(&app, "GET", "/api/notes/ghost/content", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("ghost"));
}

#[tokio::test]
async fn duplicate_note_id_conflicts() {
    let dir = tempdir().unwrap();
    let app = test_app(dir.path());

    let payload = json!({"note_id": "dup"});
    let (status, _) = request(&app, "POST", "/api/notes", Some(payload.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = request(&app, "POST", "/api/notes", Some(payload)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

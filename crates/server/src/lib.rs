//! Vellum document storage service.
//!
//! HTTP surface over the storage engine: note creation, incremental
//! saves, version history, and point-in-time content reconstruction.
//! The storage backend (partitioned version log, or remote repository)
//! is selected from configuration at startup and injected into the
//! handlers.

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;

use anyhow::Context;
use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

use config::{AppState, ServerConfig};
use vellum_store::{DocumentStore, PartitionStore, RepoStore, StorageBackend};

pub fn init_tracing() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Resolve the configured storage backend once, at startup.
pub fn build_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match config.backend {
        StorageBackend::Partitioned => Ok(Arc::new(PartitionStore::new(config.store.clone()))),
        StorageBackend::Repository => {
            let repo = config
                .repo
                .clone()
                .context("repository backend selected but repository config is missing")?;
            Ok(Arc::new(RepoStore::new(repo)?))
        }
    }
}

/// Assemble the API router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/notes", post(handlers::create_note))
        .route(
            "/api/notes/{id}/content",
            put(handlers::save_content).get(handlers::fetch_content),
        )
        .route("/api/notes/{id}/history", get(handlers::list_history))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the service until shutdown.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let store = build_store(&config)?;
    let state = AppState::new(store);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, backend = ?config.backend, "vellum server listening");

    axum::serve(listener, app(state)).await?;
    Ok(())
}

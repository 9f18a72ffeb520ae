//! Server configuration and shared application state.

use std::net::SocketAddr;
use std::sync::Arc;

use vellum_store::{DocumentStore, RepoConfig, StorageBackend, StoreConfig};

/// Configuration for the document storage service.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP listener to.
    pub bind_addr: SocketAddr,
    /// Which storage backend to run against.
    pub backend: StorageBackend,
    /// Partition topology for the partitioned backend.
    pub store: StoreConfig,
    /// Remote repository settings, required for the repository backend.
    pub repo: Option<RepoConfig>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let bind_addr = std::env::var("VELLUM_BIND_ADDR")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 4700)));
        Self {
            bind_addr,
            backend: StorageBackend::from_env(),
            store: StoreConfig::from_env(),
            repo: RepoConfig::from_env(),
        }
    }
}

/// App state shared across all handlers. The storage backend is chosen
/// once at startup and injected here; handlers never branch on it.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

//! Storage configuration.
//!
//! Partitions are named SQLite databases. Exactly one is the metadata
//! partition (it always holds the note registry); the rest hold
//! document content. Environment variables:
//!
//! - `VELLUM_META_PARTITION` — metadata database path
//! - `VELLUM_CONTENT_PARTITIONS` — comma-separated `name=path` pairs
//! - `VELLUM_STORAGE_BACKEND` — `partitioned` (default) or `repository`

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Reserved name of the metadata partition.
pub const METADATA_PARTITION: &str = "meta";

/// A named, independently reachable storage unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionAddress {
    pub name: String,
    pub addr: String,
}

impl PartitionAddress {
    pub fn new(name: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
        }
    }
}

/// Partition topology for the partitioned backend.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub metadata: PartitionAddress,
    pub content: Vec<PartitionAddress>,
}

impl StoreConfig {
    /// Topology rooted in a single directory: `meta.sqlite` plus one
    /// `<name>.sqlite` per content partition name.
    pub fn with_base_dir(dir: impl AsRef<Path>, content_names: &[&str]) -> Self {
        let dir = dir.as_ref();
        Self {
            metadata: PartitionAddress::new(
                METADATA_PARTITION,
                dir.join("meta.sqlite").to_string_lossy().into_owned(),
            ),
            content: content_names
                .iter()
                .map(|name| {
                    PartitionAddress::new(
                        *name,
                        dir.join(format!("{name}.sqlite"))
                            .to_string_lossy()
                            .into_owned(),
                    )
                })
                .collect(),
        }
    }

    /// Load topology from the environment, defaulting to a `vellum_data`
    /// directory with two content partitions.
    pub fn from_env() -> Self {
        let meta_addr = std::env::var("VELLUM_META_PARTITION")
            .unwrap_or_else(|_| "vellum_data/meta.sqlite".to_string());

        let content = match std::env::var("VELLUM_CONTENT_PARTITIONS") {
            Ok(spec) => spec
                .split(',')
                .filter_map(|pair| {
                    let (name, addr) = pair.split_once('=')?;
                    Some(PartitionAddress::new(name.trim(), addr.trim()))
                })
                .collect(),
            Err(_) => vec![
                PartitionAddress::new("c0", "vellum_data/c0.sqlite"),
                PartitionAddress::new("c1", "vellum_data/c1.sqlite"),
            ],
        };

        Self {
            metadata: PartitionAddress::new(METADATA_PARTITION, meta_addr),
            content,
        }
    }
}

/// Which storage backend the application runs against. Resolved once at
/// startup; the chosen adapter is injected where documents are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Partition-routed version-log storage (the default).
    Partitioned,
    /// Remote-repository storage: content as files, history as commits.
    Repository,
}

impl StorageBackend {
    pub fn from_env() -> Self {
        match std::env::var("VELLUM_STORAGE_BACKEND").as_deref() {
            Ok("repository") | Ok("github") => StorageBackend::Repository,
            _ => StorageBackend::Partitioned,
        }
    }
}

/// Remote repository backend settings.
#[derive(Debug, Clone)]
pub struct RepoConfig {
    /// API base, e.g. `https://api.github.com`.
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    pub token: String,
    pub branch: String,
}

impl RepoConfig {
    pub fn from_env() -> Option<Self> {
        Some(Self {
            api_base: std::env::var("VELLUM_REPO_API_BASE")
                .unwrap_or_else(|_| "https://api.github.com".to_string()),
            owner: std::env::var("VELLUM_REPO_OWNER").ok()?,
            repo: std::env::var("VELLUM_REPO_NAME").ok()?,
            token: std::env::var("VELLUM_REPO_TOKEN").ok()?,
            branch: std::env::var("VELLUM_REPO_BRANCH").unwrap_or_else(|_| "main".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_dir_topology_names_partitions() {
        let config = StoreConfig::with_base_dir("/tmp/vellum", &["c0", "c1"]);
        assert_eq!(config.metadata.name, METADATA_PARTITION);
        assert_eq!(config.content.len(), 2);
        assert!(config.content[0].addr.ends_with("c0.sqlite"));
    }
}

//! Partition routing and connection caching.
//!
//! Connections open lazily and stay cached for the life of the
//! process. A cache hit is probed before being handed out; a handle
//! that stopped answering is evicted and reopened. Content partition
//! failures fall back to the metadata partition; a metadata failure is
//! fatal since no further fallback target exists.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::partition::Partition;

pub struct PartitionRouter {
    config: StoreConfig,
    // One map lock covers lookup and connect, so concurrent first
    // connects to the same partition collapse into one.
    connections: Mutex<HashMap<String, Arc<Partition>>>,
}

impl PartitionRouter {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn metadata_name(&self) -> &str {
        &self.config.metadata.name
    }

    /// Deterministically pick a content partition for a new note. The
    /// metadata partition is reserved; it is only chosen when no
    /// content partitions are configured, and the caller must persist
    /// that choice so later lookups stay consistent.
    pub fn assign_partition(&self, note_id: &str) -> &str {
        if self.config.content.is_empty() {
            warn!("no content partitions configured, assigning metadata partition");
            return &self.config.metadata.name;
        }
        let index = assignment_hash(note_id) as usize % self.config.content.len();
        &self.config.content[index].name
    }

    /// Connection to the designated metadata partition. Failure here is
    /// unrecoverable.
    pub async fn metadata_connection(&self) -> Result<Arc<Partition>> {
        self.connection(&self.config.metadata.name).await
    }

    /// Connection to a content partition, falling back to the metadata
    /// partition when the named one does not answer. Callers that are
    /// persisting a first-time assignment must record the name of the
    /// partition actually returned.
    pub async fn content_connection(&self, name: &str) -> Result<Arc<Partition>> {
        if name == self.config.metadata.name {
            return self.metadata_connection().await;
        }
        match self.connection(name).await {
            Ok(partition) => Ok(partition),
            Err(err) => {
                warn!(
                    partition = name,
                    error = %err,
                    "content partition unreachable, falling back to metadata partition"
                );
                self.metadata_connection().await
            }
        }
    }

    /// Cached connection to `name`, establishing one if needed.
    pub async fn connection(&self, name: &str) -> Result<Arc<Partition>> {
        let mut connections = self.connections.lock().await;

        if let Some(partition) = connections.get(name) {
            if partition.probe().await.is_ok() {
                return Ok(partition.clone());
            }
            warn!(partition = name, "cached connection failed probe, reconnecting");
            connections.remove(name);
        }

        let addr = self
            .address_of(name)
            .ok_or_else(|| StoreError::PartitionUnreachable {
                partition: name.to_string(),
                reason: "unknown partition name".to_string(),
            })?;

        let partition = Arc::new(Partition::open(name, addr).await?);
        connections.insert(name.to_string(), partition.clone());
        info!(partition = name, "connected");
        Ok(partition)
    }

    fn address_of(&self, name: &str) -> Option<&str> {
        if name == self.config.metadata.name {
            return Some(&self.config.metadata.addr);
        }
        self.config
            .content
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.addr.as_str())
    }
}

/// 32-bit string hash used for partition assignment, kept stable so
/// existing assignments remain reproducible: `h = (h << 5) - h + c`
/// over the characters, in wrapping i32 arithmetic.
fn assignment_hash(note_id: &str) -> u32 {
    let mut hash: i32 = 0;
    for c in note_id.chars() {
        hash = hash
            .wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(c as i32);
    }
    hash.unsigned_abs()
}

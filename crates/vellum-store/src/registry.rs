//! Note registry: document metadata and the document-to-partition
//! assignment, held on the metadata partition. Assignment is
//! write-once; a note's content never migrates between partitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{Result, StoreError};
use crate::router::PartitionRouter;

/// A registered note. `partition` is `None` until the first content
/// write settles which partition actually answered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteRecord {
    pub note_id: String,
    pub partition: Option<String>,
    pub title: Option<String>,
    pub author_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct NoteRegistry {
    router: Arc<PartitionRouter>,
}

impl NoteRegistry {
    pub fn new(router: Arc<PartitionRouter>) -> Self {
        Self { router }
    }

    pub async fn create_note(&self, record: &NoteRecord) -> Result<()> {
        let meta = self.router.metadata_connection().await?;
        meta.insert_note(record).await
    }

    pub async fn note(&self, note_id: &str) -> Result<Option<NoteRecord>> {
        let meta = self.router.metadata_connection().await?;
        meta.note(note_id).await
    }

    /// Partition holding the note's content, or `None` when the note
    /// exists but has not been written yet.
    pub async fn partition_assignment(&self, note_id: &str) -> Result<Option<String>> {
        let record = self
            .note(note_id)
            .await?
            .ok_or_else(|| StoreError::DocumentNotAssigned {
                note_id: note_id.to_string(),
            })?;
        Ok(record.partition)
    }

    /// Record which partition answered the first write. Write-once:
    /// later calls with a different partition fail.
    pub async fn set_partition_assignment(&self, note_id: &str, partition: &str) -> Result<()> {
        let meta = self.router.metadata_connection().await?;
        meta.set_assignment(note_id, partition).await
    }
}

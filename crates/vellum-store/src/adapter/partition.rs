//! Partition-routed version-log backend: the [`DocumentStore`]
//! implementation backed by the partition router, note registry, and
//! version log.

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::BoxStream;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;
use vellum_core::DiffCodec;

use super::{DocumentHandle, DocumentMetadata, DocumentStore, HistoryEntry, RevisionMarker, SaveOutcome};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::registry::{NoteRecord, NoteRegistry};
use crate::router::PartitionRouter;
use crate::version_log::VersionLog;

pub struct PartitionStore {
    registry: NoteRegistry,
    log: VersionLog,
}

impl PartitionStore {
    pub fn new(config: StoreConfig) -> Self {
        Self::with_codec(config, DiffCodec::new())
    }

    /// Build the backend with a custom diff codec, e.g. a different
    /// node identity function.
    pub fn with_codec(config: StoreConfig, codec: DiffCodec) -> Self {
        let router = Arc::new(PartitionRouter::new(config));
        let registry = NoteRegistry::new(router.clone());
        let log = VersionLog::new(router, registry.clone(), codec);
        Self { registry, log }
    }

    pub fn registry(&self) -> &NoteRegistry {
        &self.registry
    }

    pub fn log(&self) -> &VersionLog {
        &self.log
    }
}

#[async_trait]
impl DocumentStore for PartitionStore {
    async fn create_document(
        &self,
        initial: &Value,
        metadata: DocumentMetadata,
    ) -> Result<DocumentHandle> {
        let note_id = metadata
            .note_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let record = NoteRecord {
            note_id: note_id.clone(),
            partition: None,
            title: metadata.title,
            author_id: metadata.author_id,
            created_at: Utc::now(),
        };
        self.registry.create_note(&record).await?;

        // The first save settles the partition assignment; an empty
        // initial tree still routes and records the assignment even
        // though nothing is written to the log.
        self.log
            .save_content(&note_id, initial, record.author_id.as_deref(), None)
            .await?;

        Ok(DocumentHandle::for_note(note_id))
    }

    async fn save_content(
        &self,
        handle: &DocumentHandle,
        tree: &Value,
        author_id: Option<&str>,
        op_id: Option<&str>,
    ) -> Result<SaveOutcome> {
        let receipt = self
            .log
            .save_content(&handle.note_id, tree, author_id, op_id)
            .await?;
        Ok(SaveOutcome {
            marker: RevisionMarker::Revision(receipt.revision),
            op_id: Some(receipt.op_id),
            time: receipt.time,
        })
    }

    fn list_history<'a>(
        &'a self,
        handle: &'a DocumentHandle,
    ) -> BoxStream<'a, Result<HistoryEntry>> {
        Box::pin(async_stream::try_stream! {
            let records = self.log.history(&handle.note_id).await?;
            for record in records {
                yield HistoryEntry {
                    marker: RevisionMarker::Revision(record.revision),
                    label: format!("Version {}", record.revision),
                    author: record.author_id,
                    timestamp: record.created_at,
                    ordinal: record.revision,
                };
            }
        })
    }

    async fn fetch_at_revision(
        &self,
        handle: &DocumentHandle,
        marker: Option<&RevisionMarker>,
    ) -> Result<Value> {
        match marker {
            None => self.log.current_content(&handle.note_id).await,
            Some(RevisionMarker::Revision(revision)) => {
                self.log
                    .content_at_revision(&handle.note_id, *revision)
                    .await
            }
            Some(other @ RevisionMarker::Commit(_)) => Err(StoreError::UnsupportedMarker {
                marker: other.to_string(),
            }),
        }
    }
}

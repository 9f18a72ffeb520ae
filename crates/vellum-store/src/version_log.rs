//! Per-note version log: the write path (diff against the current
//! snapshot, append, advance) and the read path (replay deltas forward
//! to any historical revision).

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;
use vellum_core::{canonical_json, empty_tree, Delta, DiffCodec};

use crate::error::{Result, StoreError};
use crate::partition::{NewVersionEntry, Partition, VersionRecord};
use crate::registry::NoteRegistry;
use crate::router::PartitionRouter;

/// Attempts at the commit CAS before a concurrent-writer loss is
/// surfaced to the caller.
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Outcome of a save: the operation id recorded on the entry (client
/// supplied or generated), the revision the note now sits at, and the
/// commit time. A no-op save echoes the current revision.
#[derive(Debug, Clone)]
pub struct SaveReceipt {
    pub op_id: String,
    pub revision: u64,
    pub time: DateTime<Utc>,
}

pub struct VersionLog {
    router: Arc<PartitionRouter>,
    registry: NoteRegistry,
    codec: DiffCodec,
}

impl VersionLog {
    pub fn new(router: Arc<PartitionRouter>, registry: NoteRegistry, codec: DiffCodec) -> Self {
        Self {
            router,
            registry,
            codec,
        }
    }

    /// Persist `incoming` as a new revision of the note.
    ///
    /// A structurally identical tree is a no-op: nothing is recorded
    /// and the current revision is echoed back. A supplied `op_id` that
    /// already sits in the log short-circuits to the revision it
    /// produced, making client retries idempotent.
    pub async fn save_content(
        &self,
        note_id: &str,
        incoming: &Value,
        author_id: Option<&str>,
        op_id: Option<&str>,
    ) -> Result<SaveReceipt> {
        let partition = self.partition_for_write(note_id).await?;

        if let Some(op) = op_id {
            if let Some((revision, created_at)) = partition.find_version_by_op(note_id, op).await? {
                debug!(note_id, op_id = op, revision, "duplicate operation, short-circuiting");
                return Ok(SaveReceipt {
                    op_id: op.to_string(),
                    revision,
                    time: created_at,
                });
            }
        }

        let mut attempt = 0;
        loop {
            attempt += 1;

            let snapshot = partition.load_snapshot(note_id).await?;
            let (current, current_revision) = match &snapshot {
                Some(s) => (s.content.clone(), s.revision),
                None => (empty_tree(), 0),
            };

            let Some(delta) = effective_delta(&self.codec, &current, incoming) else {
                return Ok(SaveReceipt {
                    op_id: op_id.unwrap_or("noop").to_string(),
                    revision: current_revision,
                    time: Utc::now(),
                });
            };

            let entry = NewVersionEntry {
                revision: current_revision + 1,
                delta,
                author_id: author_id.map(str::to_string),
                op_id: op_id
                    .map(str::to_string)
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
                created_at: Utc::now(),
            };

            match partition
                .commit_version(note_id, current_revision, &entry, incoming)
                .await
            {
                Ok(()) => {
                    debug!(note_id, revision = entry.revision, "committed version");
                    return Ok(SaveReceipt {
                        op_id: entry.op_id,
                        revision: entry.revision,
                        time: entry.created_at,
                    });
                }
                Err(StoreError::StaleRevision { .. }) if attempt < MAX_COMMIT_ATTEMPTS => {
                    warn!(
                        note_id,
                        attempt, "snapshot advanced under us, re-diffing against the new state"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Reconstruct the note as of `target_revision` by replaying stored
    /// deltas forward from the empty tree.
    ///
    /// Revision 0 is the state before the first save, not an error; a
    /// target beyond the stored history clamps to the current snapshot.
    pub async fn content_at_revision(&self, note_id: &str, target_revision: u64) -> Result<Value> {
        let partition = self.partition_for_read(note_id).await?;

        if target_revision == 0 {
            return Ok(empty_tree());
        }

        let stored = partition.version_count(note_id).await?;
        if target_revision > stored {
            debug!(
                note_id,
                target_revision, stored, "requested revision beyond history, returning snapshot"
            );
            return Ok(self.snapshot_or_empty(&partition, note_id).await?);
        }

        let mut tree = empty_tree();
        for (revision, raw) in partition.raw_deltas_upto(note_id, target_revision).await? {
            let delta: Delta =
                serde_json::from_str(&raw).map_err(|e| StoreError::VersionReplayCorrupted {
                    note_id: note_id.to_string(),
                    revision,
                    reason: e.to_string(),
                })?;
            tree = self
                .codec
                .patch(&tree, &delta)
                .map_err(|e| StoreError::VersionReplayCorrupted {
                    note_id: note_id.to_string(),
                    revision,
                    reason: e.to_string(),
                })?;
        }
        Ok(tree)
    }

    /// The current snapshot, read directly without replay.
    pub async fn current_content(&self, note_id: &str) -> Result<Value> {
        let partition = self.partition_for_read(note_id).await?;
        self.snapshot_or_empty(&partition, note_id).await
    }

    /// Recorded versions, oldest first.
    pub async fn history(&self, note_id: &str) -> Result<Vec<VersionRecord>> {
        let partition = self.partition_for_read(note_id).await?;
        partition.versions(note_id).await
    }

    async fn snapshot_or_empty(&self, partition: &Partition, note_id: &str) -> Result<Value> {
        Ok(partition
            .load_snapshot(note_id)
            .await?
            .map(|s| s.content)
            .unwrap_or_else(empty_tree))
    }

    /// Partition for a write, creating the assignment on the first
    /// write. Whichever partition actually answers is the one recorded,
    /// so the registry always reflects where content really lives.
    async fn partition_for_write(&self, note_id: &str) -> Result<Arc<Partition>> {
        match self.registry.partition_assignment(note_id).await? {
            Some(assigned) => self.router.content_connection(&assigned).await,
            None => {
                let hashed = self.router.assign_partition(note_id).to_string();
                let partition = self.router.content_connection(&hashed).await?;
                self.registry
                    .set_partition_assignment(note_id, partition.name())
                    .await?;
                Ok(partition)
            }
        }
    }

    /// Partition for a read. An unassigned note has no content
    /// anywhere; surfaced as not-found.
    async fn partition_for_read(&self, note_id: &str) -> Result<Arc<Partition>> {
        let assigned = self
            .registry
            .partition_assignment(note_id)
            .await?
            .ok_or_else(|| StoreError::DocumentNotAssigned {
                note_id: note_id.to_string(),
            })?;
        self.router.content_connection(&assigned).await
    }
}

/// The delta that will actually be recorded for a save.
///
/// When the structural differ reports no change but the canonical
/// serializations disagree, the trees are byte-different in a way the
/// differ cannot see; a full replacement is forced rather than silently
/// dropping the write.
fn effective_delta(codec: &DiffCodec, current: &Value, incoming: &Value) -> Option<Delta> {
    resolve_delta(codec.diff(current, incoming), current, incoming)
}

fn resolve_delta(structural: Option<Delta>, current: &Value, incoming: &Value) -> Option<Delta> {
    match structural {
        Some(delta) => Some(delta),
        None => {
            if canonical_json(current) != canonical_json(incoming) {
                warn!("differ reported no change but serialized forms differ, forcing replace");
                Some(Delta::Replace {
                    value: incoming.clone(),
                })
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn effective_delta_none_for_identical_trees() {
        let codec = DiffCodec::new();
        let tree = json!({"title": "A"});
        assert!(effective_delta(&codec, &tree, &tree).is_none());
    }

    #[test]
    fn effective_delta_reports_structural_change() {
        let codec = DiffCodec::new();
        let delta = effective_delta(&codec, &json!({"title": "A"}), &json!({"title": "B"}));
        assert!(delta.is_some());
        assert!(!delta.unwrap().is_replace());
    }

    #[test]
    fn divergent_serialization_forces_full_replace() {
        // Drive the defensive branch with a differ that (wrongly)
        // reported no change for byte-different trees.
        let before = json!({"title": "A"});
        let after = json!({"title": "B"});
        let forced = resolve_delta(None, &before, &after).unwrap();
        assert!(forced.is_replace());

        // No forcing when the trees really are identical.
        assert!(resolve_delta(None, &before, &before).is_none());
    }
}

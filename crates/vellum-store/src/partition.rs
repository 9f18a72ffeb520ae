//! A partition: one independently reachable SQLite database holding
//! note snapshots and version logs. The metadata partition additionally
//! holds the note registry table; the content schema exists everywhere
//! so the metadata partition can absorb content when no content
//! partitions are configured or one is unreachable.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use vellum_core::Delta;

use crate::error::{Result, StoreError};
use crate::registry::NoteRecord;

/// Materialized current state of a note on its partition.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub content: Value,
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
}

/// One recorded version, without its delta. History listings use this
/// shape; replay loads deltas separately.
#[derive(Debug, Clone)]
pub struct VersionRecord {
    pub revision: u64,
    pub op_id: String,
    pub author_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A version entry about to be committed.
#[derive(Debug)]
pub struct NewVersionEntry {
    pub revision: u64,
    pub delta: Delta,
    pub author_id: Option<String>,
    pub op_id: String,
    pub created_at: DateTime<Utc>,
}

/// Live connection to one partition.
#[derive(Debug, Clone)]
pub struct Partition {
    name: String,
    conn: Arc<Mutex<Connection>>,
}

impl Partition {
    /// Open (or create) the database at `addr` and bootstrap the
    /// schema. A malformed address or a failed open reports the
    /// partition as unreachable.
    pub async fn open(name: &str, addr: &str) -> Result<Self> {
        if addr.is_empty() || addr == "none" {
            return Err(StoreError::PartitionUnreachable {
                partition: name.to_string(),
                reason: format!("malformed address {addr:?}"),
            });
        }

        if let Some(parent) = Path::new(addr).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let conn = Connection::open(addr).map_err(|e| StoreError::PartitionUnreachable {
            partition: name.to_string(),
            reason: e.to_string(),
        })?;
        conn.pragma_update(None, "journal_mode", "wal")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS notes (
                note_id    TEXT PRIMARY KEY,
                partition  TEXT,
                title      TEXT,
                author_id  TEXT,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS note_snapshots (
                note_id    TEXT PRIMARY KEY,
                content    TEXT NOT NULL,
                revision   INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS note_versions (
                note_id    TEXT NOT NULL,
                revision   INTEGER NOT NULL,
                delta      TEXT NOT NULL,
                author_id  TEXT,
                op_id      TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (note_id, revision)
            );
            CREATE INDEX IF NOT EXISTS idx_note_versions_op
                ON note_versions (note_id, op_id);",
        )?;

        Ok(Self {
            name: name.to_string(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cheap liveness check for cached handles.
    pub async fn probe(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    pub async fn load_snapshot(&self, note_id: &str) -> Result<Option<Snapshot>> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT content, revision, updated_at FROM note_snapshots WHERE note_id = ?1",
                params![note_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((content, revision, updated_at)) => Ok(Some(Snapshot {
                content: serde_json::from_str(&content)?,
                revision: revision as u64,
                updated_at: parse_timestamp(&updated_at)?,
            })),
        }
    }

    /// Append a version entry and advance the snapshot in one
    /// transaction. The snapshot update is a compare-and-swap on the
    /// expected prior revision; a lost race surfaces as
    /// [`StoreError::StaleRevision`] and the caller re-diffs.
    pub async fn commit_version(
        &self,
        note_id: &str,
        expected_revision: u64,
        entry: &NewVersionEntry,
        content: &Value,
    ) -> Result<()> {
        let content_text = serde_json::to_string(content)?;
        let delta_text = serde_json::to_string(&entry.delta)?;
        let stamp = entry.created_at.to_rfc3339();

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let swapped = if expected_revision == 0 {
            // No snapshot row yet; a concurrent first writer loses the
            // insert race instead of the update race.
            tx.execute(
                "INSERT OR IGNORE INTO note_snapshots (note_id, content, revision, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![note_id, content_text, entry.revision as i64, stamp],
            )?
        } else {
            tx.execute(
                "UPDATE note_snapshots SET content = ?1, revision = ?2, updated_at = ?3
                 WHERE note_id = ?4 AND revision = ?5",
                params![
                    content_text,
                    entry.revision as i64,
                    stamp,
                    note_id,
                    expected_revision as i64
                ],
            )?
        };
        if swapped == 0 {
            return Err(StoreError::StaleRevision {
                note_id: note_id.to_string(),
                expected: expected_revision,
            });
        }

        let appended = tx.execute(
            "INSERT OR IGNORE INTO note_versions
                 (note_id, revision, delta, author_id, op_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                note_id,
                entry.revision as i64,
                delta_text,
                entry.author_id,
                entry.op_id,
                stamp
            ],
        )?;
        if appended == 0 {
            return Err(StoreError::StaleRevision {
                note_id: note_id.to_string(),
                expected: expected_revision,
            });
        }

        tx.commit()?;
        Ok(())
    }

    pub async fn version_count(&self, note_id: &str) -> Result<u64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM note_versions WHERE note_id = ?1",
            params![note_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Recorded versions for a note, oldest first, without deltas.
    pub async fn versions(&self, note_id: &str) -> Result<Vec<VersionRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT revision, op_id, author_id, created_at FROM note_versions
             WHERE note_id = ?1 ORDER BY revision ASC",
        )?;
        let rows = stmt.query_map(params![note_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (revision, op_id, author_id, created_at) = row?;
            records.push(VersionRecord {
                revision: revision as u64,
                op_id,
                author_id,
                created_at: parse_timestamp(&created_at)?,
            });
        }
        Ok(records)
    }

    /// Stored deltas for revisions `1..=upto`, in replay order. Deltas
    /// come back raw; the replaying caller decodes them so a corrupt
    /// entry can be attributed to its revision.
    pub async fn raw_deltas_upto(&self, note_id: &str, upto: u64) -> Result<Vec<(u64, String)>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT revision, delta FROM note_versions
             WHERE note_id = ?1 AND revision <= ?2 ORDER BY revision ASC",
        )?;
        let rows = stmt.query_map(params![note_id, upto as i64], |row| {
            Ok((row.get::<_, i64>(0)? as u64, row.get::<_, String>(1)?))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Revision previously committed under `op_id`, if any. Supports
    /// idempotent retries of the same client operation.
    pub async fn find_version_by_op(
        &self,
        note_id: &str,
        op_id: &str,
    ) -> Result<Option<(u64, DateTime<Utc>)>> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT revision, created_at FROM note_versions
                 WHERE note_id = ?1 AND op_id = ?2 LIMIT 1",
                params![note_id, op_id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        match row {
            None => Ok(None),
            Some((revision, created_at)) => {
                Ok(Some((revision as u64, parse_timestamp(&created_at)?)))
            }
        }
    }

    // Registry rows live on the metadata partition; these are only
    // called through the registry.

    pub(crate) async fn insert_note(&self, record: &NoteRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO notes (note_id, partition, title, author_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.note_id,
                record.partition,
                record.title,
                record.author_id,
                record.created_at.to_rfc3339()
            ],
        )?;
        if inserted == 0 {
            return Err(StoreError::DuplicateNote {
                note_id: record.note_id.clone(),
            });
        }
        Ok(())
    }

    pub(crate) async fn note(&self, note_id: &str) -> Result<Option<NoteRecord>> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT note_id, partition, title, author_id, created_at
                 FROM notes WHERE note_id = ?1",
                params![note_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;
        match row {
            None => Ok(None),
            Some((note_id, partition, title, author_id, created_at)) => Ok(Some(NoteRecord {
                note_id,
                partition,
                title,
                author_id,
                created_at: parse_timestamp(&created_at)?,
            })),
        }
    }

    pub(crate) async fn set_assignment(&self, note_id: &str, partition: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        let updated = conn.execute(
            "UPDATE notes SET partition = ?1 WHERE note_id = ?2 AND partition IS NULL",
            params![partition, note_id],
        )?;
        if updated == 1 {
            return Ok(());
        }

        let current: Option<Option<String>> = conn
            .query_row(
                "SELECT partition FROM notes WHERE note_id = ?1",
                params![note_id],
                |row| row.get(0),
            )
            .optional()?;
        match current {
            None => Err(StoreError::DocumentNotAssigned {
                note_id: note_id.to_string(),
            }),
            // Re-asserting the recorded assignment is harmless.
            Some(Some(existing)) if existing == partition => Ok(()),
            Some(_) => Err(StoreError::AssignmentImmutable {
                note_id: note_id.to_string(),
            }),
        }
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(revision: u64, op_id: &str) -> NewVersionEntry {
        NewVersionEntry {
            revision,
            delta: Delta::Replace { value: json!({"r": revision}) },
            author_id: Some("author-1".to_string()),
            op_id: op_id.to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn malformed_address_is_unreachable() {
        for addr in ["", "none"] {
            let err = Partition::open("c0", addr).await.unwrap_err();
            assert!(matches!(
                err,
                StoreError::PartitionUnreachable { ref partition, .. } if partition == "c0"
            ));
        }
    }

    #[tokio::test]
    async fn commit_advances_snapshot_and_log() {
        let dir = tempfile::tempdir().unwrap();
        let partition = Partition::open("c0", dir.path().join("c0.sqlite").to_str().unwrap())
            .await
            .unwrap();

        partition
            .commit_version("n1", 0, &entry(1, "op-1"), &json!({"r": 1}))
            .await
            .unwrap();
        partition
            .commit_version("n1", 1, &entry(2, "op-2"), &json!({"r": 2}))
            .await
            .unwrap();

        let snapshot = partition.load_snapshot("n1").await.unwrap().unwrap();
        assert_eq!(snapshot.revision, 2);
        assert_eq!(snapshot.content, json!({"r": 2}));
        assert_eq!(partition.version_count("n1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn stale_expected_revision_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let partition = Partition::open("c0", dir.path().join("c0.sqlite").to_str().unwrap())
            .await
            .unwrap();

        partition
            .commit_version("n1", 0, &entry(1, "op-1"), &json!({"r": 1}))
            .await
            .unwrap();

        // A writer that diffed against revision 0 must lose.
        let err = partition
            .commit_version("n1", 0, &entry(1, "op-late"), &json!({"late": true}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StaleRevision { expected: 0, .. }));

        let snapshot = partition.load_snapshot("n1").await.unwrap().unwrap();
        assert_eq!(snapshot.content, json!({"r": 1}));
        assert_eq!(partition.version_count("n1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn op_id_lookup_finds_committed_entry() {
        let dir = tempfile::tempdir().unwrap();
        let partition = Partition::open("c0", dir.path().join("c0.sqlite").to_str().unwrap())
            .await
            .unwrap();

        partition
            .commit_version("n1", 0, &entry(1, "op-abc"), &json!({"r": 1}))
            .await
            .unwrap();

        let (revision, _) = partition
            .find_version_by_op("n1", "op-abc")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(revision, 1);
        assert!(partition
            .find_version_by_op("n1", "op-unknown")
            .await
            .unwrap()
            .is_none());
    }
}

//! vellum-store: partition-routed, diff-versioned document storage.
//!
//! Documents are assigned to one of several independent SQLite
//! partitions; every save is recorded as a structural delta against the
//! previous state, and any historical revision can be reconstructed by
//! replaying deltas forward. A second backend keeps content as files in
//! a remote Git repository behind the same adapter contract.

pub mod adapter;
pub mod config;
pub mod error;
pub mod partition;
pub mod registry;
pub mod router;
pub mod version_log;

pub use adapter::{
    DocumentHandle, DocumentMetadata, DocumentStore, HistoryEntry, PartitionStore, RepoStore,
    RevisionMarker, SaveOutcome,
};
pub use config::{PartitionAddress, RepoConfig, StorageBackend, StoreConfig, METADATA_PARTITION};
pub use error::{Result, StoreError};
pub use partition::{Partition, Snapshot, VersionRecord};
pub use registry::{NoteRecord, NoteRegistry};
pub use router::PartitionRouter;
pub use version_log::{SaveReceipt, VersionLog};

//! Snapshot storage and the debounced persistence adapter.

mod memory;
mod persistence;

#[cfg(not(target_arch = "wasm32"))]
mod file;

#[cfg(target_arch = "wasm32")]
mod indexeddb;

pub use memory::MemoryStorage;
pub use persistence::{
    Clock, DebounceTimer, ManualClock, PersistenceAdapter, PlatformPersistenceAdapter,
    PlatformStorage, SaveOutcome, SystemClock, create_default_storage, create_persistence_adapter,
};

#[cfg(not(target_arch = "wasm32"))]
pub use file::FileStorage;

#[cfg(target_arch = "wasm32")]
pub use indexeddb::IndexedDbStorage;

use crate::crdt::EncodedState;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

#[cfg(not(target_arch = "wasm32"))]
use std::time::{SystemTime, UNIX_EPOCH};

#[cfg(target_arch = "wasm32")]
use web_time::{SystemTime, UNIX_EPOCH};

/// Default quiet period before a snapshot write, in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 1000;

/// Default number of snapshots kept per project.
pub const DEFAULT_MAX_SNAPSHOTS: usize = 20;

/// Default upper bound for the retry backoff after a failed write, in milliseconds.
pub const DEFAULT_MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Project not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Storage error: {0}")]
    Other(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed future for async operations (compatible with WASM).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// A stored snapshot of one project's graph document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub id: Uuid,
    pub project_id: String,
    pub state_vector: Vec<u8>,
    pub update: Vec<u8>,
    /// Milliseconds since the Unix epoch. Strictly increasing per project.
    pub created_at: u64,
}

impl SnapshotRecord {
    /// Build a record for `state`, stamped after `previous` (the project's latest record time).
    pub fn new(project_id: &str, state: &EncodedState, previous: Option<u64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: project_id.to_string(),
            state_vector: state.state_vector.clone(),
            update: state.update.clone(),
            created_at: next_timestamp(previous),
        }
    }
}

/// Serialized form of a snapshot shared by the file and IndexedDB backends.
/// Binary blobs are base64 encoded.
#[derive(Serialize, Deserialize)]
pub(crate) struct StoredSnapshot {
    id: Uuid,
    project_id: String,
    created_at: u64,
    state_vector: String,
    update: String,
}

impl StoredSnapshot {
    pub(crate) fn from_record(record: &SnapshotRecord) -> Self {
        Self {
            id: record.id,
            project_id: record.project_id.clone(),
            created_at: record.created_at,
            state_vector: STANDARD.encode(&record.state_vector),
            update: STANDARD.encode(&record.update),
        }
    }

    pub(crate) fn into_record(self) -> StorageResult<SnapshotRecord> {
        let decode = |field: &str, data: &str| {
            STANDARD
                .decode(data)
                .map_err(|e| StorageError::Serialization(format!("Invalid {} in snapshot {}: {}", field, self.id, e)))
        };
        Ok(SnapshotRecord {
            id: self.id,
            state_vector: decode("state_vector", &self.state_vector)?,
            update: decode("update", &self.update)?,
            project_id: self.project_id,
            created_at: self.created_at,
        })
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// A timestamp for a new record that sorts after `previous`.
fn next_timestamp(previous: Option<u64>) -> u64 {
    let now = now_millis();
    match previous {
        Some(prev) if prev >= now => prev + 1,
        _ => now,
    }
}

/// Trait for snapshot storage backends.
///
/// Records are ordered by `created_at`; the latest record is the one with
/// the greatest timestamp.
///
/// Note: On native platforms, implementations must be Send + Sync.
/// On WASM, these bounds are relaxed since it's single-threaded.
#[cfg(not(target_arch = "wasm32"))]
pub trait SnapshotStore: Send + Sync {
    /// Store a new snapshot for a project.
    fn save_snapshot(&self, project_id: &str, state: &EncodedState) -> BoxFuture<'_, StorageResult<SnapshotRecord>>;

    /// Update blob of the project's most recent snapshot, if any.
    fn load_latest_snapshot(&self, project_id: &str) -> BoxFuture<'_, StorageResult<Option<Vec<u8>>>>;

    /// All snapshots of a project, oldest first.
    fn list_snapshots(&self, project_id: &str) -> BoxFuture<'_, StorageResult<Vec<SnapshotRecord>>>;

    /// Delete all but the `keep` newest snapshots. Returns how many were removed.
    fn prune(&self, project_id: &str, keep: usize) -> BoxFuture<'_, StorageResult<usize>>;

    /// Delete every snapshot of a project.
    fn delete_project(&self, project_id: &str) -> BoxFuture<'_, StorageResult<()>>;
}

/// Trait for snapshot storage backends (WASM version without Send + Sync).
#[cfg(target_arch = "wasm32")]
pub trait SnapshotStore {
    /// Store a new snapshot for a project.
    fn save_snapshot(&self, project_id: &str, state: &EncodedState) -> BoxFuture<'_, StorageResult<SnapshotRecord>>;

    /// Update blob of the project's most recent snapshot, if any.
    fn load_latest_snapshot(&self, project_id: &str) -> BoxFuture<'_, StorageResult<Option<Vec<u8>>>>;

    /// All snapshots of a project, oldest first.
    fn list_snapshots(&self, project_id: &str) -> BoxFuture<'_, StorageResult<Vec<SnapshotRecord>>>;

    /// Delete all but the `keep` newest snapshots. Returns how many were removed.
    fn prune(&self, project_id: &str, keep: usize) -> BoxFuture<'_, StorageResult<usize>>;

    /// Delete every snapshot of a project.
    fn delete_project(&self, project_id: &str) -> BoxFuture<'_, StorageResult<()>>;
}

//! In-memory snapshot storage.

use super::{BoxFuture, SnapshotRecord, SnapshotStore, StorageError, StorageResult};
use crate::crdt::EncodedState;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// In-memory storage for testing and ephemeral use.
///
/// Writes can be made to fail on demand to exercise error paths.
#[derive(Default)]
pub struct MemoryStorage {
    projects: RwLock<HashMap<String, Vec<SnapshotRecord>>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

fn lock_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Other(format!("Lock error: {}", e))
}

impl MemoryStorage {
    /// Create a new empty memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `save_snapshot` calls fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful snapshot writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl SnapshotStore for MemoryStorage {
    fn save_snapshot(&self, project_id: &str, state: &EncodedState) -> BoxFuture<'_, StorageResult<SnapshotRecord>> {
        let project_id = project_id.to_string();
        let state = state.clone();
        Box::pin(async move {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::Io("Simulated write failure".to_string()));
            }
            let mut projects = self.projects.write().map_err(lock_error)?;
            let records = projects.entry(project_id.clone()).or_default();
            let record = SnapshotRecord::new(&project_id, &state, records.last().map(|r| r.created_at));
            records.push(record.clone());
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(record)
        })
    }

    fn load_latest_snapshot(&self, project_id: &str) -> BoxFuture<'_, StorageResult<Option<Vec<u8>>>> {
        let project_id = project_id.to_string();
        Box::pin(async move {
            let projects = self.projects.read().map_err(lock_error)?;
            Ok(projects
                .get(&project_id)
                .and_then(|records| records.iter().max_by_key(|r| r.created_at))
                .map(|r| r.update.clone()))
        })
    }

    fn list_snapshots(&self, project_id: &str) -> BoxFuture<'_, StorageResult<Vec<SnapshotRecord>>> {
        let project_id = project_id.to_string();
        Box::pin(async move {
            let projects = self.projects.read().map_err(lock_error)?;
            let mut records = projects.get(&project_id).cloned().unwrap_or_default();
            records.sort_by_key(|r| r.created_at);
            Ok(records)
        })
    }

    fn prune(&self, project_id: &str, keep: usize) -> BoxFuture<'_, StorageResult<usize>> {
        let project_id = project_id.to_string();
        Box::pin(async move {
            let mut projects = self.projects.write().map_err(lock_error)?;
            let Some(records) = projects.get_mut(&project_id) else {
                return Ok(0);
            };
            records.sort_by_key(|r| r.created_at);
            let excess = records.len().saturating_sub(keep);
            records.drain(..excess);
            Ok(excess)
        })
    }

    fn delete_project(&self, project_id: &str) -> BoxFuture<'_, StorageResult<()>> {
        let project_id = project_id.to_string();
        Box::pin(async move {
            let mut projects = self.projects.write().map_err(lock_error)?;
            projects.remove(&project_id);
            Ok(())
        })
    }
}

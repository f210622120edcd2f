//! IndexedDB snapshot storage for WebAssembly.
//!
//! Snapshots live in one object store keyed by snapshot id. Each value is a
//! JSON string carrying the project id, timestamp and base64 blobs.

use super::{BoxFuture, SnapshotRecord, SnapshotStore, StorageError, StorageResult, StoredSnapshot};
use crate::crdt::EncodedState;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{IdbDatabase, IdbObjectStore, IdbRequest, IdbTransactionMode};

const DB_NAME: &str = "studio-canvas";
const DB_VERSION: u32 = 1;
const STORE_NAME: &str = "snapshots";

/// IndexedDB-based snapshot storage for WebAssembly.
///
/// Not Send/Sync: IndexedDB handles are bound to the browser's main thread.
pub struct IndexedDbStorage {
    /// Cached database connection.
    db: Rc<RefCell<Option<IdbDatabase>>>,
}

impl IndexedDbStorage {
    /// Create a new IndexedDB storage. The database is opened lazily on first use.
    pub fn new() -> Self {
        Self {
            db: Rc::new(RefCell::new(None)),
        }
    }

    /// Open or create the database, returning a handle.
    async fn get_db(&self) -> StorageResult<IdbDatabase> {
        if let Some(db) = self.db.borrow().as_ref() {
            return Ok(db.clone());
        }

        let window = web_sys::window()
            .ok_or_else(|| StorageError::Other("No window object".to_string()))?;

        let idb_factory = window
            .indexed_db()
            .map_err(|e| StorageError::Other(format!("IndexedDB error: {:?}", e)))?
            .ok_or_else(|| StorageError::Other("IndexedDB not available".to_string()))?;

        let open_request = idb_factory
            .open_with_u32(DB_NAME, DB_VERSION)
            .map_err(|e| StorageError::Other(format!("Failed to open DB: {:?}", e)))?;

        let onupgrade = Closure::once(Box::new(move |event: web_sys::IdbVersionChangeEvent| {
            let Some(target) = event.target() else { return };
            let request: IdbRequest = target.unchecked_into();
            let Ok(result) = request.result() else { return };
            let db: IdbDatabase = result.unchecked_into();
            if !db.object_store_names().contains(STORE_NAME) {
                if let Err(e) = db.create_object_store(STORE_NAME) {
                    log::error!("Failed to create object store: {:?}", e);
                }
            }
        }) as Box<dyn FnOnce(_)>);

        open_request.set_onupgradeneeded(Some(onupgrade.as_ref().unchecked_ref()));
        onupgrade.forget();

        let db = await_idb_request::<IdbDatabase>(&open_request).await?;
        *self.db.borrow_mut() = Some(db.clone());
        Ok(db)
    }

    fn get_store(&self, db: &IdbDatabase, mode: IdbTransactionMode) -> StorageResult<IdbObjectStore> {
        let transaction = db
            .transaction_with_str_and_mode(STORE_NAME, mode)
            .map_err(|e| StorageError::Other(format!("Transaction error: {:?}", e)))?;

        transaction
            .object_store(STORE_NAME)
            .map_err(|e| StorageError::Other(format!("Store error: {:?}", e)))
    }

    /// All snapshots of a project, oldest first.
    async fn project_records(&self, project_id: &str) -> StorageResult<Vec<SnapshotRecord>> {
        let db = self.get_db().await?;
        let store = self.get_store(&db, IdbTransactionMode::Readonly)?;
        let request = store
            .get_all()
            .map_err(|e| StorageError::Other(format!("GetAll error: {:?}", e)))?;
        let values = await_idb_request::<js_sys::Array>(&request).await?;

        let mut records = Vec::new();
        for i in 0..values.length() {
            let Some(json) = values.get(i).as_string() else {
                continue;
            };
            let stored: StoredSnapshot = serde_json::from_str(&json)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            if stored.project_id == project_id {
                records.push(stored.into_record()?);
            }
        }
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn delete_records(&self, records: &[SnapshotRecord]) -> StorageResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let db = self.get_db().await?;
        let store = self.get_store(&db, IdbTransactionMode::Readwrite)?;
        for record in records {
            let request = store
                .delete(&JsValue::from_str(&record.id.to_string()))
                .map_err(|e| StorageError::Other(format!("Delete error: {:?}", e)))?;
            await_idb_request::<JsValue>(&request).await?;
        }
        Ok(())
    }
}

impl Default for IndexedDbStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore for IndexedDbStorage {
    fn save_snapshot(&self, project_id: &str, state: &EncodedState) -> BoxFuture<'_, StorageResult<SnapshotRecord>> {
        let project_id = project_id.to_string();
        let state = state.clone();

        Box::pin(async move {
            let previous = self.project_records(&project_id).await?.last().map(|r| r.created_at);
            let record = SnapshotRecord::new(&project_id, &state, previous);
            let json = serde_json::to_string(&StoredSnapshot::from_record(&record))
                .map_err(|e| StorageError::Serialization(e.to_string()))?;

            let db = self.get_db().await?;
            let store = self.get_store(&db, IdbTransactionMode::Readwrite)?;
            let request = store
                .put_with_key(&JsValue::from_str(&json), &JsValue::from_str(&record.id.to_string()))
                .map_err(|e| StorageError::Other(format!("Put error: {:?}", e)))?;
            await_idb_request::<JsValue>(&request).await?;
            Ok(record)
        })
    }

    fn load_latest_snapshot(&self, project_id: &str) -> BoxFuture<'_, StorageResult<Option<Vec<u8>>>> {
        let project_id = project_id.to_string();
        Box::pin(async move {
            Ok(self.project_records(&project_id).await?.pop().map(|r| r.update))
        })
    }

    fn list_snapshots(&self, project_id: &str) -> BoxFuture<'_, StorageResult<Vec<SnapshotRecord>>> {
        let project_id = project_id.to_string();
        Box::pin(async move { self.project_records(&project_id).await })
    }

    fn prune(&self, project_id: &str, keep: usize) -> BoxFuture<'_, StorageResult<usize>> {
        let project_id = project_id.to_string();
        Box::pin(async move {
            let records = self.project_records(&project_id).await?;
            let excess = records.len().saturating_sub(keep);
            self.delete_records(&records[..excess]).await?;
            Ok(excess)
        })
    }

    fn delete_project(&self, project_id: &str) -> BoxFuture<'_, StorageResult<()>> {
        let project_id = project_id.to_string();
        Box::pin(async move {
            let records = self.project_records(&project_id).await?;
            self.delete_records(&records).await
        })
    }
}

/// Await an IndexedDB request through a Promise.
async fn await_idb_request<T: JsCast>(request: &IdbRequest) -> StorageResult<T> {
    use wasm_bindgen_futures::JsFuture;

    let promise = js_sys::Promise::new(&mut |resolve, reject| {
        let onsuccess = Closure::once(Box::new(move |event: web_sys::Event| {
            let result = event
                .target()
                .map(|target| target.unchecked_into::<IdbRequest>())
                .and_then(|request| request.result().ok())
                .unwrap_or(JsValue::UNDEFINED);
            let _ = resolve.call1(&JsValue::NULL, &result);
        }) as Box<dyn FnOnce(_)>);

        let onerror = Closure::once(Box::new(move |_event: web_sys::Event| {
            let _ = reject.call1(&JsValue::NULL, &JsValue::from_str("IndexedDB request failed"));
        }) as Box<dyn FnOnce(_)>);

        request.set_onsuccess(Some(onsuccess.as_ref().unchecked_ref()));
        request.set_onerror(Some(onerror.as_ref().unchecked_ref()));

        onsuccess.forget();
        onerror.forget();
    });

    JsFuture::from(promise)
        .await
        .map_err(|e| StorageError::Other(format!("IndexedDB request failed: {:?}", e)))?
        .dyn_into::<T>()
        .map_err(|_| StorageError::Other("Type conversion failed".to_string()))
}

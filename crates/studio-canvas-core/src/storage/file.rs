//! File-based snapshot storage for native platforms.

use super::{BoxFuture, SnapshotRecord, SnapshotStore, StorageError, StorageResult, StoredSnapshot};
use crate::crdt::EncodedState;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

/// File-based storage for native platforms.
///
/// Each project gets a directory; each snapshot is one JSON file named
/// `<created_at>-<id>.json` inside it.
pub struct FileStorage {
    /// Base directory holding one subdirectory per project.
    base_path: PathBuf,
}

impl FileStorage {
    /// Create a new file storage with the given base directory.
    ///
    /// Creates the directory if it doesn't exist.
    pub fn new(base_path: PathBuf) -> StorageResult<Self> {
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                StorageError::Io(format!("Failed to create storage directory: {}", e))
            })?;
        }
        Ok(Self { base_path })
    }

    /// Create file storage in the default location.
    ///
    /// On Linux: `~/.local/share/studio-canvas/snapshots/`
    /// On Windows: `%LOCALAPPDATA%\studio-canvas\snapshots\`
    pub fn default_location() -> StorageResult<Self> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| StorageError::Io("Could not determine home directory".to_string()))?;

        Self::new(base.join("studio-canvas").join("snapshots"))
    }

    /// Get the base path.
    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    /// Directory for a project's snapshots.
    fn project_dir(&self, project_id: &str) -> PathBuf {
        self.base_path.join(encode_project_id(project_id))
    }
}

/// Directory name for a project id.
///
/// ASCII letters, digits, `-` and `_` are kept; every other byte becomes
/// `%XX`, so distinct ids never share a directory. The empty id maps to a
/// lone `%`, which no other id can produce.
fn encode_project_id(project_id: &str) -> String {
    if project_id.is_empty() {
        return "%".to_string();
    }
    let mut encoded = String::with_capacity(project_id.len());
    for byte in project_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(byte as char);
        } else {
            let _ = write!(encoded, "%{:02X}", byte);
        }
    }
    encoded
}

/// Parse one snapshot file.
fn read_record(path: &Path) -> StorageResult<SnapshotRecord> {
    let json = fs::read_to_string(path)
        .map_err(|e| StorageError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    let stored: StoredSnapshot = serde_json::from_str(&json)
        .map_err(|e| StorageError::Serialization(format!("Failed to parse {}: {}", path.display(), e)))?;
    stored.into_record()
}

/// Read every snapshot of `project_id` in its directory, oldest first.
///
/// Files that cannot be parsed, and records belonging to another project,
/// are skipped with a warning so one bad file never blocks the rest.
fn read_records(dir: &Path, project_id: &str) -> StorageResult<Vec<(PathBuf, SnapshotRecord)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(dir)
        .map_err(|e| StorageError::Io(format!("Failed to read {}: {}", dir.display(), e)))?;

    let mut records = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().map(|e| e != "json").unwrap_or(true) {
            continue;
        }
        match read_record(&path) {
            Ok(record) if record.project_id == project_id => records.push((path, record)),
            Ok(record) => {
                log::warn!(
                    "Skipping {}: belongs to project '{}', not '{}'",
                    path.display(),
                    record.project_id,
                    project_id
                );
            }
            Err(e) => log::warn!("Skipping unreadable snapshot: {}", e),
        }
    }
    records.sort_by_key(|(_, record)| record.created_at);
    Ok(records)
}

/// Write `contents` to a temporary sibling and rename it over `path`.
fn write_atomic(path: &Path, contents: &str) -> StorageResult<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    fs::write(&tmp_path, contents)
        .map_err(|e| StorageError::Io(format!("Failed to write {}: {}", tmp_path.display(), e)))?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        StorageError::Io(format!("Failed to move {} into place: {}", path.display(), e))
    })
}

impl SnapshotStore for FileStorage {
    fn save_snapshot(&self, project_id: &str, state: &EncodedState) -> BoxFuture<'_, StorageResult<SnapshotRecord>> {
        let dir = self.project_dir(project_id);
        let project_id = project_id.to_string();
        let state = state.clone();

        Box::pin(async move {
            fs::create_dir_all(&dir).map_err(|e| {
                StorageError::Io(format!("Failed to create {}: {}", dir.display(), e))
            })?;

            let previous = read_records(&dir, &project_id)?.last().map(|(_, r)| r.created_at);
            let record = SnapshotRecord::new(&project_id, &state, previous);
            let json = serde_json::to_string_pretty(&StoredSnapshot::from_record(&record))
                .map_err(|e| StorageError::Serialization(e.to_string()))?;

            let path = dir.join(format!("{:013}-{}.json", record.created_at, record.id));
            write_atomic(&path, &json)?;
            log::debug!("Wrote snapshot {}", path.display());
            Ok(record)
        })
    }

    fn load_latest_snapshot(&self, project_id: &str) -> BoxFuture<'_, StorageResult<Option<Vec<u8>>>> {
        let dir = self.project_dir(project_id);
        let project_id = project_id.to_string();
        Box::pin(async move {
            Ok(read_records(&dir, &project_id)?.pop().map(|(_, record)| record.update))
        })
    }

    fn list_snapshots(&self, project_id: &str) -> BoxFuture<'_, StorageResult<Vec<SnapshotRecord>>> {
        let dir = self.project_dir(project_id);
        let project_id = project_id.to_string();
        Box::pin(async move {
            Ok(read_records(&dir, &project_id)?.into_iter().map(|(_, record)| record).collect())
        })
    }

    fn prune(&self, project_id: &str, keep: usize) -> BoxFuture<'_, StorageResult<usize>> {
        let dir = self.project_dir(project_id);
        let project_id = project_id.to_string();
        Box::pin(async move {
            let records = read_records(&dir, &project_id)?;
            let excess = records.len().saturating_sub(keep);
            for (path, _) in &records[..excess] {
                fs::remove_file(path).map_err(|e| {
                    StorageError::Io(format!("Failed to delete {}: {}", path.display(), e))
                })?;
            }
            Ok(excess)
        })
    }

    fn delete_project(&self, project_id: &str) -> BoxFuture<'_, StorageResult<()>> {
        let dir = self.project_dir(project_id);
        Box::pin(async move {
            if dir.exists() {
                fs::remove_dir_all(&dir).map_err(|e| {
                    StorageError::Io(format!("Failed to delete {}: {}", dir.display(), e))
                })?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pollster::block_on;
    use tempfile::tempdir;

    fn state(byte: u8) -> EncodedState {
        EncodedState {
            state_vector: vec![byte, 0, 255],
            update: vec![byte; 16],
        }
    }

    #[test]
    fn test_file_storage_save_load() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();

        let record = block_on(storage.save_snapshot("project-1", &state(7))).unwrap();
        assert_eq!(record.project_id, "project-1");

        let latest = block_on(storage.load_latest_snapshot("project-1")).unwrap();
        assert_eq!(latest, Some(vec![7; 16]));

        let listed = block_on(storage.list_snapshots("project-1")).unwrap();
        assert_eq!(listed, vec![record]);
    }

    #[test]
    fn test_file_storage_latest_wins() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();

        for i in 1..=3 {
            block_on(storage.save_snapshot("p", &state(i))).unwrap();
        }
        let latest = block_on(storage.load_latest_snapshot("p")).unwrap();
        assert_eq!(latest, Some(vec![3; 16]));
    }

    #[test]
    fn test_file_storage_missing_project() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(block_on(storage.load_latest_snapshot("nonexistent")).unwrap(), None);
    }

    #[test]
    fn test_file_storage_prune() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();

        for i in 0..4 {
            block_on(storage.save_snapshot("p", &state(i))).unwrap();
        }
        assert_eq!(block_on(storage.prune("p", 1)).unwrap(), 3);

        let listed = block_on(storage.list_snapshots("p")).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].update, vec![3; 16]);
    }

    #[test]
    fn test_file_storage_delete_project() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();

        block_on(storage.save_snapshot("p", &state(1))).unwrap();
        block_on(storage.delete_project("p")).unwrap();
        assert!(block_on(storage.list_snapshots("p")).unwrap().is_empty());
        // Deleting again is fine
        block_on(storage.delete_project("p")).unwrap();
    }

    #[test]
    fn test_file_storage_encodes_id() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();

        block_on(storage.save_snapshot("../team/alpha:beta", &state(2))).unwrap();
        assert!(dir.path().join("%2E%2E%2Fteam%2Falpha%3Abeta").is_dir());

        let latest = block_on(storage.load_latest_snapshot("../team/alpha:beta")).unwrap();
        assert_eq!(latest, Some(vec![2; 16]));
    }

    #[test]
    fn test_similar_ids_do_not_collide() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();

        block_on(storage.save_snapshot("team/a", &state(1))).unwrap();
        block_on(storage.save_snapshot("team_a", &state(2))).unwrap();
        block_on(storage.save_snapshot("", &state(3))).unwrap();

        assert_eq!(block_on(storage.load_latest_snapshot("team/a")).unwrap(), Some(vec![1; 16]));
        assert_eq!(block_on(storage.load_latest_snapshot("team_a")).unwrap(), Some(vec![2; 16]));
        assert_eq!(block_on(storage.load_latest_snapshot("")).unwrap(), Some(vec![3; 16]));
        assert_eq!(block_on(storage.list_snapshots("team/a")).unwrap().len(), 1);

        block_on(storage.delete_project("team/a")).unwrap();
        assert_eq!(block_on(storage.load_latest_snapshot("team_a")).unwrap(), Some(vec![2; 16]));
    }

    #[test]
    fn test_encode_project_id() {
        assert_eq!(encode_project_id("project-1_A"), "project-1_A");
        assert_eq!(encode_project_id("team/a"), "team%2Fa");
        assert_eq!(encode_project_id("50%"), "50%25");
        assert_eq!(encode_project_id("é"), "%C3%A9");
        assert_eq!(encode_project_id(""), "%");
    }

    #[test]
    fn test_foreign_records_are_ignored() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();

        let other = block_on(storage.save_snapshot("other", &state(9))).unwrap();
        let source = dir
            .path()
            .join("other")
            .join(format!("{:013}-{}.json", other.created_at, other.id));
        let target_dir = dir.path().join("p");
        fs::create_dir_all(&target_dir).unwrap();
        fs::copy(&source, target_dir.join("9999999999999-copied.json")).unwrap();

        assert_eq!(block_on(storage.load_latest_snapshot("p")).unwrap(), None);
        block_on(storage.save_snapshot("p", &state(4))).unwrap();
        assert_eq!(block_on(storage.load_latest_snapshot("p")).unwrap(), Some(vec![4; 16]));
    }

    #[test]
    fn test_corrupt_snapshot_is_skipped() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();

        block_on(storage.save_snapshot("p", &state(5))).unwrap();
        let project_dir = dir.path().join("p");
        fs::write(project_dir.join("9999999999999-x.json"), "{\"id\":\"trunc").unwrap();
        fs::write(project_dir.join("0000000000001-bad.json"), "{not json").unwrap();

        assert_eq!(block_on(storage.load_latest_snapshot("p")).unwrap(), Some(vec![5; 16]));

        block_on(storage.save_snapshot("p", &state(6))).unwrap();
        assert_eq!(block_on(storage.load_latest_snapshot("p")).unwrap(), Some(vec![6; 16]));
        assert_eq!(block_on(storage.list_snapshots("p")).unwrap().len(), 2);

        // Pruning only counts readable snapshots and leaves the corrupt files alone
        assert_eq!(block_on(storage.prune("p", 1)).unwrap(), 1);
        assert!(project_dir.join("9999999999999-x.json").exists());
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();

        for i in 0..3 {
            block_on(storage.save_snapshot("p", &state(i))).unwrap();
        }
        let names: Vec<String> = fs::read_dir(dir.path().join("p"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 3);
        assert!(names.iter().all(|name| name.ends_with(".json")));
    }
}

//! File-based queue store for persistent queues.

use crate::backend::QueueStore;
use crate::error::{StorageError, StorageResult};
use crate::record::{PersistedQueue, RunnableRecord};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A file-based queue store.
///
/// Records are kept in a single versioned JSON document. Data survives
/// process restarts.
///
/// # Durability
///
/// Every mutation rewrites the document through a temporary file that is
/// synced and then renamed over the original, so a crash leaves either the
/// old or the new document, never a torn one.
///
/// # Ownership
///
/// The store holds an advisory exclusive lock on `<path>.lock` for its
/// lifetime. A second open of the same queue fails with
/// [`StorageError::Locked`].
///
/// # Example
///
/// ```no_run
/// use concord_storage::{FileQueueStore, QueueStore, RunnableRecord};
/// use serde_json::Value;
/// use std::path::Path;
///
/// let store = FileQueueStore::open(Path::new("pending.json")).unwrap();
/// store.append(RunnableRecord::new("op-1", "push", Value::Null)).unwrap();
/// ```
#[derive(Debug)]
pub struct FileQueueStore {
    path: PathBuf,
    temp_path: PathBuf,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
    /// Serializes read-modify-write cycles.
    write_guard: Mutex<()>,
}

impl FileQueueStore {
    /// Opens or creates a queue file at the given path.
    ///
    /// A missing file is initialized with an empty queue. An existing file
    /// is not validated until it is first read.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is held elsewhere or the file cannot be
    /// created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let lock_path = sibling(path, "lock");
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(path.to_path_buf()));
        }

        let store = Self {
            path: path.to_path_buf(),
            temp_path: sibling(path, "tmp"),
            _lock_file: lock_file,
            write_guard: Mutex::new(()),
        };

        if !path.exists() {
            tracing::debug!(path = %path.display(), "initializing empty queue file");
            store.write(Vec::new())?;
        }

        Ok(store)
    }

    /// Opens or creates a queue file, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot
    /// be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the queue document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> StorageResult<PersistedQueue> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PersistedQueue::default());
            }
            Err(e) => return Err(e.into()),
        };
        PersistedQueue::decode(&data)
    }

    fn write(&self, items: Vec<RunnableRecord>) -> StorageResult<()> {
        let encoded = PersistedQueue::new(items).encode()?;

        let mut temp = File::create(&self.temp_path)?;
        temp.write_all(&encoded)?;
        temp.sync_all()?;
        drop(temp);

        fs::rename(&self.temp_path, &self.path)?;
        Ok(())
    }
}

impl QueueStore for FileQueueStore {
    fn load_all(&self) -> StorageResult<Vec<RunnableRecord>> {
        let _guard = self.write_guard.lock();
        Ok(self.read()?.items)
    }

    fn append(&self, record: RunnableRecord) -> StorageResult<()> {
        let _guard = self.write_guard.lock();
        let mut items = self.read()?.items;
        items.push(record);
        self.write(items)
    }

    fn replace_all(&self, records: Vec<RunnableRecord>) -> StorageResult<()> {
        let _guard = self.write_guard.lock();
        self.write(records)
    }
}

fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn record(id: &str) -> RunnableRecord {
        RunnableRecord::new(id, "push", json!({ "id": id }))
    }

    #[test]
    fn file_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");

        let store = FileQueueStore::open(&path).unwrap();
        assert!(path.exists());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn file_append_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");

        let store = FileQueueStore::open(&path).unwrap();
        store.append(record("a")).unwrap();
        store.append(record("b")).unwrap();

        let records = store.load_all().unwrap();
        assert_eq!(records, vec![record("a"), record("b")]);
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");

        {
            let store = FileQueueStore::open(&path).unwrap();
            store.append(record("a")).unwrap();
        }

        {
            let store = FileQueueStore::open(&path).unwrap();
            assert_eq!(store.load_all().unwrap(), vec![record("a")]);
        }
    }

    #[test]
    fn file_remove_rewrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");

        let store = FileQueueStore::open(&path).unwrap();
        store.append(record("a")).unwrap();
        store.append(record("b")).unwrap();

        assert_eq!(store.remove("a").unwrap(), 1);
        assert_eq!(store.load_all().unwrap(), vec![record("b")]);
        assert!(!dir.path().join("queue.json.tmp").exists());
    }

    #[test]
    fn file_lock_prevents_second_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");

        let _store = FileQueueStore::open(&path).unwrap();
        let result = FileQueueStore::open(&path);
        assert!(matches!(result, Err(StorageError::Locked(_))));
    }

    #[test]
    fn file_lock_released_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");

        drop(FileQueueStore::open(&path).unwrap());
        assert!(FileQueueStore::open(&path).is_ok());
    }

    #[test]
    fn file_unsupported_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");
        fs::write(&path, br#"{"version":"0.1.0","items":[],"lastSaved":0}"#).unwrap();

        let store = FileQueueStore::open(&path).unwrap();
        let err = store.load_all().unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedMigration { .. }));
        assert!(store.append(record("a")).is_err());
    }

    #[test]
    fn file_malformed_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.json");
        fs::write(&path, b"{ truncated").unwrap();

        let store = FileQueueStore::open(&path).unwrap();
        assert!(matches!(store.load_all(), Err(StorageError::UnreadableStorage(_))));
    }

    #[test]
    fn file_create_with_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("queue.json");

        let store = FileQueueStore::open_with_create_dirs(&path).unwrap();
        assert_eq!(store.path(), path);
        assert!(path.exists());
    }
}

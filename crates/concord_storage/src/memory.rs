//! In-memory queue store for testing.

use crate::backend::QueueStore;
use crate::error::{StorageError, StorageResult};
use crate::record::RunnableRecord;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// An in-memory queue store.
///
/// This store keeps records in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral queues that don't need to survive a restart
///
/// Write failures can be injected with [`InMemoryQueueStore::set_fail_writes`]
/// to exercise storage-error paths.
///
/// # Example
///
/// ```rust
/// use concord_storage::{InMemoryQueueStore, QueueStore, RunnableRecord};
/// use serde_json::Value;
///
/// let store = InMemoryQueueStore::new();
/// store.append(RunnableRecord::new("a", "noop", Value::Null)).unwrap();
/// assert_eq!(store.remove("a").unwrap(), 1);
/// assert!(store.is_empty().unwrap());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryQueueStore {
    records: RwLock<Vec<RunnableRecord>>,
    fail_writes: AtomicBool,
}

impl InMemoryQueueStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with records.
    ///
    /// Useful for testing replay scenarios.
    #[must_use]
    pub fn with_records(records: Vec<RunnableRecord>) -> Self {
        Self {
            records: RwLock::new(records),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Returns a copy of all records.
    #[must_use]
    pub fn records(&self) -> Vec<RunnableRecord> {
        self.records.read().clone()
    }

    /// Makes every subsequent write fail with an I/O error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other(
                "injected write failure",
            )));
        }
        Ok(())
    }
}

impl QueueStore for InMemoryQueueStore {
    fn load_all(&self) -> StorageResult<Vec<RunnableRecord>> {
        Ok(self.records.read().clone())
    }

    fn append(&self, record: RunnableRecord) -> StorageResult<()> {
        self.check_writable()?;
        self.records.write().push(record);
        Ok(())
    }

    fn replace_all(&self, records: Vec<RunnableRecord>) -> StorageResult<()> {
        self.check_writable()?;
        *self.records.write() = records;
        Ok(())
    }
}

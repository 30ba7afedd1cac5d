//! Queue store trait definition.

use crate::error::StorageResult;
use crate::record::RunnableRecord;

/// A durable store of pending work-unit records.
///
/// Queue stores are **record stores**. They keep records in acceptance
/// order and never look inside a record's payload. Decoding records back
/// into runnable work is the scheduler's job.
///
/// # Invariants
///
/// - `append` is durable before it returns
/// - `load_all` returns records in the order they were appended
/// - `replace_all` atomically swaps the full record list
/// - Stores must be `Send + Sync`; the scheduler serializes access
///
/// # Implementors
///
/// - [`super::InMemoryQueueStore`] - For testing
/// - [`super::FileQueueStore`] - For persistent queues
pub trait QueueStore: Send + Sync {
    /// Reads every pending record.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The underlying document is malformed (`UnreadableStorage`)
    /// - The document version is not supported (`UnsupportedMigration`)
    /// - An I/O error occurs
    fn load_all(&self) -> StorageResult<Vec<RunnableRecord>>;

    /// Appends one record at the end of the queue.
    ///
    /// Records already present (including ones with unknown kinds) are
    /// preserved.
    ///
    /// # Errors
    ///
    /// Returns an error if the current document cannot be read or the new
    /// document cannot be written.
    fn append(&self, record: RunnableRecord) -> StorageResult<()>;

    /// Replaces the whole queue with `records`.
    ///
    /// # Errors
    ///
    /// Returns an error if the new document cannot be written.
    fn replace_all(&self, records: Vec<RunnableRecord>) -> StorageResult<()>;

    /// Removes every record with the given id.
    ///
    /// Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read or rewritten.
    fn remove(&self, id: &str) -> StorageResult<usize> {
        let records = self.load_all()?;
        let before = records.len();
        let kept: Vec<_> = records.into_iter().filter(|r| r.id != id).collect();
        let removed = before - kept.len();
        if removed > 0 {
            self.replace_all(kept)?;
        }
        Ok(removed)
    }

    /// Returns the number of pending records.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read.
    fn len(&self) -> StorageResult<usize> {
        Ok(self.load_all()?.len())
    }

    /// Returns true if there are no pending records.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}

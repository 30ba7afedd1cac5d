//! Durable storage of scheduled work units.

use crate::runnable::{Runnable, RunnableFactory};
use concord_storage::{QueueStore, StorageResult};
use std::sync::Arc;

/// Storage seen by the scheduler: units in, units out.
///
/// Calls are issued by the scheduler lane one at a time and run on Tokio's
/// blocking pool, so implementations may do synchronous file I/O.
pub trait SchedulerStorage: Send + Sync {
    /// Returns every pending unit that can be rebuilt.
    ///
    /// # Errors
    ///
    /// Format errors are fatal for the store instance.
    fn flush_all(&self) -> StorageResult<Vec<Arc<dyn Runnable>>>;

    /// Durably records a newly accepted unit.
    ///
    /// # Errors
    ///
    /// Returns a storage error on I/O failure.
    fn append(&self, runnable: &dyn Runnable) -> StorageResult<()>;

    /// Forgets a unit that reached a terminal outcome.
    ///
    /// # Errors
    ///
    /// Returns a storage error on I/O failure.
    fn remove(&self, runnable: &dyn Runnable) -> StorageResult<()>;
}

/// [`SchedulerStorage`] over a record-level [`QueueStore`].
///
/// Records are rebuilt into units with a [`RunnableFactory`]. Records the
/// factory does not recognise are skipped on read and compacted out of the
/// queue on the next removal.
pub struct RecordStorage<S, F> {
    store: S,
    factory: F,
}

impl<S: QueueStore, F: RunnableFactory> RecordStorage<S, F> {
    /// Creates a storage adapter.
    pub fn new(store: S, factory: F) -> Self {
        Self { store, factory }
    }

    /// Returns the underlying record store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the factory used on replay.
    pub fn factory(&self) -> &F {
        &self.factory
    }
}

impl<S: QueueStore, F: RunnableFactory> SchedulerStorage for RecordStorage<S, F> {
    fn flush_all(&self) -> StorageResult<Vec<Arc<dyn Runnable>>> {
        let records = self.store.load_all()?;
        let total = records.len();
        let units: Vec<_> = records
            .iter()
            .filter_map(|record| self.factory.make(record))
            .collect();

        if units.len() < total {
            tracing::warn!(
                dropped = total - units.len(),
                "skipping unrecognised queue records"
            );
        }
        Ok(units)
    }

    fn append(&self, runnable: &dyn Runnable) -> StorageResult<()> {
        self.store.append(runnable.representation())
    }

    fn remove(&self, runnable: &dyn Runnable) -> StorageResult<()> {
        let records = self.store.load_all()?;
        let kept: Vec<_> = records
            .into_iter()
            .filter(|r| r.id != runnable.id() && self.factory.recognizes(r))
            .collect();
        self.store.replace_all(kept)
    }
}

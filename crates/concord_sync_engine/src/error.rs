//! Error types for the sync engine.

use crate::content::ChangeType;
use concord_scheduler::{BoxError, SchedulerError};
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The engine went away while the operation was pending.
    #[error("sync engine is no longer running")]
    DeallocatedInstance,

    /// The entity was not registered within the lookup timeout.
    #[error("unknown entity: {id}")]
    UnknownEntity {
        /// The requested entity id.
        id: String,
    },

    /// The entity is registered with a different content type.
    #[error("entity {entity} holds {registered}, not {expected}")]
    ContentTypeMismatch {
        /// Entity id.
        entity: String,
        /// Content type requested by the caller.
        expected: &'static str,
        /// Content type the entity was registered with.
        registered: &'static str,
    },

    /// The local storage capability failed.
    #[error("local storage error: {0}")]
    LocalStorage(#[source] BoxError),

    /// The remote provider capability failed.
    #[error("remote provider error: {0}")]
    RemoteProvider(#[source] BoxError),

    /// A remote change did not carry the payload its type requires.
    #[error("malformed {change_type:?} change: missing payload")]
    MalformedChange {
        /// The change type that was missing its payload.
        change_type: ChangeType,
    },

    /// The scheduler rejected a remote write.
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// A task on the entity's runtime panicked or was cancelled.
    #[error("task failed: {0}")]
    TaskFailed(String),
}

impl SyncError {
    /// Wraps a local storage failure.
    pub fn local(source: impl Into<BoxError>) -> Self {
        Self::LocalStorage(source.into())
    }

    /// Wraps a remote provider failure.
    pub fn remote(source: impl Into<BoxError>) -> Self {
        Self::RemoteProvider(source.into())
    }

    /// Returns true if retrying the operation can help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::RemoteProvider(_) | SyncError::LocalStorage(_)
        )
    }
}

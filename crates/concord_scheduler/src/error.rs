//! Error types for the scheduler.

use concord_storage::StorageError;
use std::error::Error as StdError;
use thiserror::Error;

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Boxed error produced by a work unit.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors surfaced to callers of the scheduler.
///
/// Execution failures of scheduled units never show up here; they are
/// handled by the retry policy inside the scheduler.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The durable queue could not be read or written.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The scheduler stopped before the request was accepted.
    #[error("scheduler is no longer running")]
    DeallocatedInstance,

    /// A blocking storage call panicked or was cancelled.
    #[error("storage task failed: {0}")]
    StorageTask(String),
}

/// A failure reported by one run of a work unit.
#[derive(Error, Debug)]
pub enum RunError {
    /// A failure that may go away on its own (network down, timeout).
    #[error("transient failure: {0}")]
    Transient(String),

    /// A failure that will repeat on every attempt.
    #[error("fatal failure: {0}")]
    Fatal(String),

    /// An error from the unit's own stack.
    #[error("{message}")]
    Other {
        /// Display form of the error.
        message: String,
        /// Whether the unit believes a retry can help.
        retryable: bool,
        /// The underlying error.
        #[source]
        source: BoxError,
    },
}

impl RunError {
    /// Creates a transient failure.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    /// Creates a fatal failure.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    /// Wraps an arbitrary error.
    pub fn other(source: impl Into<BoxError>, retryable: bool) -> Self {
        let source = source.into();
        Self::Other {
            message: source.to_string(),
            retryable,
            source,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            RunError::Transient(_) => true,
            RunError::Fatal(_) => false,
            RunError::Other { retryable, .. } => *retryable,
        }
    }
}

//! # Concord Storage
//!
//! Durable stores for pending work-unit records.
//!
//! This crate is the lowest layer of Concord. A queue store keeps the
//! serialized representation of every deferred work unit that has been
//! accepted but has not yet reached a terminal outcome, so that the
//! scheduler can replay it after a crash or restart.
//!
//! ## Design Principles
//!
//! - Stores hold **opaque records** (`id`, `kind`, `payload`); they never
//!   interpret the payload
//! - Every mutation is durable before it returns
//! - Must be `Send + Sync` for use behind the scheduler lane
//! - Format errors are fatal for the store instance (no auto-repair)
//!
//! ## Available Stores
//!
//! - [`InMemoryQueueStore`] - For testing and ephemeral queues
//! - [`FileQueueStore`] - Versioned JSON file, atomic rewrites, advisory lock
//!
//! ## Example
//!
//! ```rust
//! use concord_storage::{InMemoryQueueStore, QueueStore, RunnableRecord};
//! use serde_json::json;
//!
//! let store = InMemoryQueueStore::new();
//! store.append(RunnableRecord::new("op-1", "push", json!({"n": 1}))).unwrap();
//! assert_eq!(store.load_all().unwrap().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod record;

pub use backend::QueueStore;
pub use error::{StorageError, StorageResult};
pub use file::FileQueueStore;
pub use memory::InMemoryQueueStore;
pub use record::{now_millis, PersistedQueue, RunnableRecord, STORAGE_VERSION};

//! # Concord Testkit
//!
//! Test utilities for Concord.
//!
//! This crate provides:
//! - An in-memory local storage and a scriptable remote provider
//! - Work-unit doubles (counting, flaky) and a replay registry for them
//! - Recording doubles for the scheduler's storage, retry and scheduling seams
//! - Fixtures: a sample content type and temporary queue files
//! - Property-based test generators using proptest
//! - Async wait helpers and `tracing` setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use concord_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn add_is_observed() {
//!     let local = Arc::new(MemoryLocalStorage::<Task>::new());
//!     let engine = SyncEngine::new(SyncConfig::default(), RecordingScheduler::new());
//!     engine.register(Entity::new("tasks", local.clone())).await.unwrap();
//!     engine.add(Task::new("t1", "write tests"), "tasks").await.unwrap();
//!     assert!(wait_until(DEFAULT_WAIT, || local.contents().len() == 1).await);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod harness;
pub mod local;
pub mod recording;
pub mod remote;
pub mod runnables;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::harness::*;
    pub use crate::local::*;
    pub use crate::recording::*;
    pub use crate::remote::*;
    pub use crate::runnables::*;
}

pub use fixtures::*;
pub use generators::*;
pub use harness::*;
pub use local::*;
pub use recording::*;
pub use remote::*;
pub use runnables::*;

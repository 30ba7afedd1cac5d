//! # Concord Scheduler
//!
//! Durable, batching, retry-aware scheduler for deferred work units.
//!
//! This crate provides:
//! - The [`Runnable`] work-unit abstraction and its durable record form
//! - [`RunnableRegistry`] for rebuilding units from persisted records
//! - [`PersistentScheduler`], which persists, batches, runs and retries units
//! - Pluggable retry policies ([`BackoffPolicy`] or any closure)
//!
//! ## Architecture
//!
//! The scheduler follows an **append → buffer → release → run → remove**
//! pipeline:
//! 1. A scheduled unit is appended to the durable queue
//! 2. It waits in a buffer until the batch is full or the window elapses
//! 3. Every unit of a released batch runs concurrently
//! 4. Failures are handed to the retry policy
//! 5. On success or give-up the unit is removed from the queue
//!
//! All queue mutations and buffer changes happen on a single task, so the
//! store never sees concurrent writers.
//!
//! ## Key Invariants
//!
//! - At-least-once execution: units may run again after a crash
//! - No unit runs before it is persisted
//! - Units persisted by a previous run are replayed at startup
//! - Batches of one scheduler never wait on each other

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod retry;
mod runnable;
mod scheduler;
mod storage;

pub use config::SchedulerConfig;
pub use error::{BoxError, RunError, SchedulerError, SchedulerResult};
pub use retry::{BackoffPolicy, RetryPolicy, RetryPolicyEvaluator};
pub use runnable::{Runnable, RunnableFactory, RunnableRegistry};
pub use scheduler::{Outcome, PersistentScheduler, RunnableScheduler, SchedulerStats};
pub use storage::{RecordStorage, SchedulerStorage};

//! Work-unit doubles.

use async_trait::async_trait;
use concord_scheduler::{RunError, Runnable, RunnableRegistry};
use concord_storage::RunnableRecord;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Type tag of [`CountingRunnable`].
pub const COUNTING_KIND: &str = "counting";

/// Type tag of [`FlakyRunnable`].
pub const FLAKY_KIND: &str = "flaky";

/// A unit that always succeeds and counts its runs.
pub struct CountingRunnable {
    id: String,
    runs: Arc<AtomicUsize>,
}

impl CountingRunnable {
    /// Creates a unit with its own counter.
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Self::with_counter(id, Arc::new(AtomicUsize::new(0)))
    }

    /// Creates a unit that shares `runs` with other units.
    pub fn with_counter(id: impl Into<String>, runs: Arc<AtomicUsize>) -> Arc<Self> {
        Arc::new(Self { id: id.into(), runs })
    }

    /// Number of runs.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Runnable for CountingRunnable {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self) -> Result<(), RunError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn representation(&self) -> RunnableRecord {
        RunnableRecord::new(self.id.clone(), COUNTING_KIND, serde_json::Value::Null)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FlakyPayload {
    failures: usize,
}

/// A unit that fails a fixed number of times, then succeeds.
///
/// Use `usize::MAX` failures for a unit that never succeeds.
pub struct FlakyRunnable {
    id: String,
    failures: usize,
    runs: Arc<AtomicUsize>,
}

impl FlakyRunnable {
    /// Creates a unit that fails `failures` times before succeeding.
    pub fn new(id: impl Into<String>, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            failures,
            runs: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Creates a unit that never succeeds.
    pub fn always_failing(id: impl Into<String>) -> Arc<Self> {
        Self::new(id, usize::MAX)
    }

    /// Number of runs.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Runnable for FlakyRunnable {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self) -> Result<(), RunError> {
        let previous = self.runs.fetch_add(1, Ordering::SeqCst);
        if previous < self.failures {
            Err(RunError::transient(format!("run {} failed", previous + 1)))
        } else {
            Ok(())
        }
    }

    fn representation(&self) -> RunnableRecord {
        let payload = serde_json::to_value(FlakyPayload {
            failures: self.failures,
        })
        .unwrap_or_default();
        RunnableRecord::new(self.id.clone(), FLAKY_KIND, payload)
    }
}

/// Returns a registry that rebuilds counting units sharing `runs`, and
/// flaky units with their original failure count.
pub fn test_registry(runs: Arc<AtomicUsize>) -> RunnableRegistry {
    let mut registry = RunnableRegistry::new();
    registry.register(COUNTING_KIND, move |record| {
        Some(CountingRunnable::with_counter(record.id.clone(), Arc::clone(&runs)) as Arc<dyn Runnable>)
    });
    registry.with_payload(FLAKY_KIND, |id, payload: FlakyPayload| {
        FlakyRunnable::new(id, payload.failures) as Arc<dyn Runnable>
    })
}

//! Recording doubles for the scheduler's seams.

use async_trait::async_trait;
use concord_scheduler::{
    RetryPolicy, RetryPolicyEvaluator, RunError, Runnable, RunnableScheduler, SchedulerError,
    SchedulerResult, SchedulerStorage,
};
use concord_storage::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A [`RunnableScheduler`] that only records what it is given.
#[derive(Default)]
pub struct RecordingScheduler {
    scheduled: Mutex<Vec<Arc<dyn Runnable>>>,
    reject: AtomicBool,
}

impl RecordingScheduler {
    /// Creates an empty recorder.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes every subsequent `schedule` fail.
    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Number of units scheduled.
    pub fn scheduled_count(&self) -> usize {
        self.scheduled.lock().len()
    }

    /// Ids of scheduled units, in order.
    pub fn scheduled_ids(&self) -> Vec<String> {
        self.scheduled.lock().iter().map(|u| u.id().to_string()).collect()
    }

    /// The scheduled units, in order.
    pub fn scheduled(&self) -> Vec<Arc<dyn Runnable>> {
        self.scheduled.lock().clone()
    }
}

#[async_trait]
impl RunnableScheduler for RecordingScheduler {
    async fn schedule(&self, runnable: Arc<dyn Runnable>) -> SchedulerResult<()> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(SchedulerError::DeallocatedInstance);
        }
        self.scheduled.lock().push(runnable);
        Ok(())
    }
}

/// One call made against a [`RecordingStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageEvent {
    /// A unit was appended.
    Append(String),
    /// A unit was removed.
    Remove(String),
}

/// A [`SchedulerStorage`] that keeps units in memory and logs every call.
#[derive(Default)]
pub struct RecordingStorage {
    units: Mutex<Vec<Arc<dyn Runnable>>>,
    events: Mutex<Vec<StorageEvent>>,
    fail_appends: AtomicBool,
    fail_removes: AtomicBool,
    append_delay: Mutex<Duration>,
}

impl RecordingStorage {
    /// Creates an empty storage.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates a storage pre-populated with `units`, as if left over from a
    /// previous run.
    pub fn with_units(units: Vec<Arc<dyn Runnable>>) -> Arc<Self> {
        Arc::new(Self {
            units: Mutex::new(units),
            ..Self::default()
        })
    }

    /// Makes every subsequent append fail.
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent remove fail.
    pub fn set_fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent append block its thread for `delay`, like a
    /// slow disk would.
    pub fn set_append_delay(&self, delay: Duration) {
        *self.append_delay.lock() = delay;
    }

    /// All calls, in order.
    pub fn events(&self) -> Vec<StorageEvent> {
        self.events.lock().clone()
    }

    /// Number of appends.
    pub fn append_count(&self) -> usize {
        self.count(|e| matches!(e, StorageEvent::Append(_)))
    }

    /// Number of removals.
    pub fn remove_count(&self) -> usize {
        self.count(|e| matches!(e, StorageEvent::Remove(_)))
    }

    /// Ids of units currently stored.
    pub fn stored_ids(&self) -> Vec<String> {
        self.units.lock().iter().map(|u| u.id().to_string()).collect()
    }

    fn count(&self, filter: impl Fn(&StorageEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| filter(e)).count()
    }
}

fn injected(operation: &str) -> StorageError {
    StorageError::Io(std::io::Error::other(format!("injected {operation} failure")))
}

impl SchedulerStorage for RecordingStorage {
    fn flush_all(&self) -> StorageResult<Vec<Arc<dyn Runnable>>> {
        Ok(self.units.lock().clone())
    }

    fn append(&self, runnable: &dyn Runnable) -> StorageResult<()> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(injected("append"));
        }
        let delay = *self.append_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.events
            .lock()
            .push(StorageEvent::Append(runnable.id().to_string()));
        Ok(())
    }

    fn remove(&self, runnable: &dyn Runnable) -> StorageResult<()> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(injected("remove"));
        }
        self.events
            .lock()
            .push(StorageEvent::Remove(runnable.id().to_string()));
        self.units.lock().retain(|u| u.id() != runnable.id());
        Ok(())
    }
}

/// A [`RetryPolicyEvaluator`] that answers with a fixed policy and records
/// every evaluation.
pub struct ScriptedRetryPolicy {
    policy: RetryPolicy,
    limit: Option<u32>,
    evaluations: Mutex<Vec<u32>>,
}

impl ScriptedRetryPolicy {
    /// Always answers `policy`.
    pub fn new(policy: RetryPolicy) -> Arc<Self> {
        Arc::new(Self {
            policy,
            limit: None,
            evaluations: Mutex::new(Vec::new()),
        })
    }

    /// Answers `policy` for attempts below `limit`, then gives up.
    pub fn until(policy: RetryPolicy, limit: u32) -> Arc<Self> {
        Arc::new(Self {
            policy,
            limit: Some(limit),
            evaluations: Mutex::new(Vec::new()),
        })
    }

    /// Number of evaluations.
    pub fn evaluation_count(&self) -> usize {
        self.evaluations.lock().len()
    }

    /// Attempt indices seen, in order.
    pub fn attempts(&self) -> Vec<u32> {
        self.evaluations.lock().clone()
    }
}

impl RetryPolicyEvaluator for ScriptedRetryPolicy {
    fn evaluate(&self, _error: &RunError, attempt: u32) -> RetryPolicy {
        self.evaluations.lock().push(attempt);
        match self.limit {
            Some(limit) if attempt >= limit => RetryPolicy::GiveUp,
            _ => self.policy,
        }
    }
}

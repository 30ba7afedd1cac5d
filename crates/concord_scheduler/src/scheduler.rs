//! Durable batching scheduler.
//!
//! A [`PersistentScheduler`] owns a single *lane*: one Tokio task that holds
//! the durable store and the batch buffer. Callers never touch either
//! directly; they send requests to the lane.
//!
//! ```text
//! schedule(unit) ──► lane: append ──► buffer ──(count | window)──► batch task
//!                         ▲                                             │
//!                         └────────── remove ◄── terminal outcome ◄─────┘
//! ```
//!
//! ## Key Invariants
//!
//! - A unit is appended to the store before it can run
//! - A unit is removed exactly once, and only after success or give-up
//! - Units of one batch run concurrently; batches run concurrently
//! - Persisted units are replayed when the scheduler starts
//! - Store calls run on Tokio's blocking pool; the lane awaits each one
//!   before deciding what to do next

use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, SchedulerResult};
use crate::retry::{RetryPolicy, RetryPolicyEvaluator};
use crate::runnable::Runnable;
use crate::storage::SchedulerStorage;
use async_trait::async_trait;
use concord_storage::StorageResult;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// Anything that accepts work units for deferred execution.
#[async_trait]
pub trait RunnableScheduler: Send + Sync {
    /// Hands `runnable` to the scheduler.
    ///
    /// Returns once the unit has been accepted; it does not wait for the
    /// unit to run.
    async fn schedule(&self, runnable: Arc<dyn Runnable>) -> SchedulerResult<()>;
}

/// Terminal outcome of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The unit ran successfully.
    Succeeded,
    /// The retry policy gave up on the unit.
    GaveUp,
}

/// Counters describing scheduler activity.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    /// Units accepted through `schedule`.
    pub accepted: u64,
    /// Units replayed from the store at startup.
    pub replayed: u64,
    /// Batches released for execution.
    pub batches_released: u64,
    /// Total run attempts.
    pub attempts: u64,
    /// Retries requested by the policy.
    pub retries: u64,
    /// Units that succeeded.
    pub succeeded: u64,
    /// Units that were given up.
    pub gave_up: u64,
    /// Terminal units whose removal from the store failed.
    pub removal_failures: u64,
}

impl SchedulerStats {
    /// Units accepted or replayed that have not reached a terminal outcome.
    pub fn outstanding(&self) -> u64 {
        (self.accepted + self.replayed).saturating_sub(self.succeeded + self.gave_up)
    }
}

struct ScheduleRequest {
    runnable: Arc<dyn Runnable>,
    accepted: oneshot::Sender<SchedulerResult<()>>,
}

struct Completion {
    runnable: Arc<dyn Runnable>,
    outcome: Outcome,
}

/// The durable scheduler.
///
/// # Example
///
/// ```rust,ignore
/// let storage = RecordStorage::new(FileQueueStore::open(path)?, registry);
/// let scheduler = PersistentScheduler::start(
///     SchedulerConfig::new(5, Duration::from_secs(2)),
///     Arc::new(storage),
///     Arc::new(BackoffPolicy::default()),
/// )
/// .await?;
/// scheduler.schedule(unit).await?;
/// ```
pub struct PersistentScheduler {
    config: SchedulerConfig,
    requests: mpsc::Sender<ScheduleRequest>,
    stats: Arc<RwLock<SchedulerStats>>,
}

impl PersistentScheduler {
    /// Starts a scheduler and replays every unit found in `storage`.
    ///
    /// Replayed units are not appended again; they go straight into the
    /// batch buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read. Format errors are fatal
    /// for the store instance.
    pub async fn start(
        config: SchedulerConfig,
        storage: Arc<dyn SchedulerStorage>,
        retry: Arc<dyn RetryPolicyEvaluator>,
    ) -> SchedulerResult<Self> {
        let replayed = on_blocking_pool(&storage, |storage| storage.flush_all()).await?;

        let (requests, requests_rx) = mpsc::channel(config.command_capacity);
        let (completions, completions_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(RwLock::new(SchedulerStats::default()));

        let mut lane = Lane {
            config: config.clone(),
            storage,
            executor: Executor {
                retry,
                stats: Arc::clone(&stats),
                permits: config.max_in_flight.map(|n| Arc::new(Semaphore::new(n))),
                completions,
            },
            requests: requests_rx,
            completions: completions_rx,
            buffer: Vec::new(),
            deadline: None,
            in_flight: 0,
            accepting: true,
        };

        if !replayed.is_empty() {
            info!(count = replayed.len(), "replaying persisted units");
            stats.write().replayed += replayed.len() as u64;
        }
        for runnable in replayed {
            lane.buffer(runnable);
        }

        tokio::spawn(lane.run());

        Ok(Self {
            config,
            requests,
            stats,
        })
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SchedulerStats {
        self.stats.read().clone()
    }

    /// Schedules `runnable`.
    ///
    /// Returns once the unit is durably stored. Execution failures are never
    /// reported here.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::Storage`] if the unit could not be persisted; the
    ///   unit will not run
    /// - [`SchedulerError::DeallocatedInstance`] if the lane has stopped
    pub async fn schedule(&self, runnable: Arc<dyn Runnable>) -> SchedulerResult<()> {
        let (accepted, accepted_rx) = oneshot::channel();
        self.requests
            .send(ScheduleRequest { runnable, accepted })
            .await
            .map_err(|_| SchedulerError::DeallocatedInstance)?;

        accepted_rx
            .await
            .map_err(|_| SchedulerError::DeallocatedInstance)?
    }
}

/// Runs a store call on the blocking pool so file I/O never stalls a
/// runtime worker.
async fn on_blocking_pool<T, F>(storage: &Arc<dyn SchedulerStorage>, call: F) -> SchedulerResult<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn SchedulerStorage) -> StorageResult<T> + Send + 'static,
{
    let storage = Arc::clone(storage);
    tokio::task::spawn_blocking(move || call(storage.as_ref()))
        .await
        .map_err(|e| SchedulerError::StorageTask(e.to_string()))?
        .map_err(SchedulerError::from)
}

#[async_trait]
impl RunnableScheduler for PersistentScheduler {
    async fn schedule(&self, runnable: Arc<dyn Runnable>) -> SchedulerResult<()> {
        PersistentScheduler::schedule(self, runnable).await
    }
}

/// The scheduler lane. Sole owner of the store and the buffer.
struct Lane {
    config: SchedulerConfig,
    storage: Arc<dyn SchedulerStorage>,
    executor: Executor,
    requests: mpsc::Receiver<ScheduleRequest>,
    completions: mpsc::UnboundedReceiver<Completion>,
    buffer: Vec<Arc<dyn Runnable>>,
    deadline: Option<Instant>,
    in_flight: usize,
    accepting: bool,
}

impl Lane {
    async fn run(mut self) {
        loop {
            let deadline = self.deadline;
            tokio::select! {
                request = self.requests.recv(), if self.accepting => match request {
                    Some(request) => self.accept(request).await,
                    None => {
                        // Handle dropped: release what is buffered, then drain.
                        self.accepting = false;
                        if !self.buffer.is_empty() {
                            self.release();
                        }
                    }
                },
                Some(completion) = self.completions.recv() => self.finish(completion).await,
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.release();
                }
            }

            if !self.accepting && self.in_flight == 0 && self.buffer.is_empty() {
                debug!("scheduler lane stopped");
                break;
            }
        }
    }

    async fn accept(&mut self, request: ScheduleRequest) {
        let ScheduleRequest { runnable, accepted } = request;

        let unit = Arc::clone(&runnable);
        let appended = on_blocking_pool(&self.storage, move |storage| storage.append(unit.as_ref())).await;
        match appended {
            Ok(()) => {
                debug!(unit = %runnable.id(), "unit accepted");
                self.executor.stats.write().accepted += 1;
                let _ = accepted.send(Ok(()));
                self.buffer(runnable);
            }
            Err(e) => {
                warn!(unit = %runnable.id(), error = %e, "failed to persist unit");
                let _ = accepted.send(Err(e));
            }
        }
    }

    fn buffer(&mut self, runnable: Arc<dyn Runnable>) {
        if self.buffer.is_empty() {
            self.deadline = Some(Instant::now() + self.config.buffer_period);
        }
        self.buffer.push(runnable);

        if self.buffer.len() >= self.config.max_batch_size {
            self.release();
        }
    }

    fn release(&mut self) {
        self.deadline = None;
        let batch = std::mem::take(&mut self.buffer);
        if batch.is_empty() {
            return;
        }

        debug!(size = batch.len(), "releasing batch");
        self.executor.stats.write().batches_released += 1;
        self.in_flight += batch.len();

        let executor = self.executor.clone();
        tokio::spawn(async move {
            futures::future::join_all(
                batch
                    .into_iter()
                    .map(|runnable| executor.execute(runnable)),
            )
            .await;
        });
    }

    async fn finish(&mut self, completion: Completion) {
        let Completion { runnable, outcome } = completion;
        self.in_flight = self.in_flight.saturating_sub(1);

        let unit = Arc::clone(&runnable);
        let removed = on_blocking_pool(&self.storage, move |storage| storage.remove(unit.as_ref())).await;
        if let Err(e) = removed {
            // The unit stays in the store and runs again after a restart.
            error!(unit = %runnable.id(), error = %e, "failed to remove finished unit");
            self.executor.stats.write().removal_failures += 1;
        }

        let mut stats = self.executor.stats.write();
        match outcome {
            Outcome::Succeeded => stats.succeeded += 1,
            Outcome::GaveUp => stats.gave_up += 1,
        }
    }
}

/// Runs units with retries. Cloned into every batch task.
#[derive(Clone)]
struct Executor {
    retry: Arc<dyn RetryPolicyEvaluator>,
    stats: Arc<RwLock<SchedulerStats>>,
    permits: Option<Arc<Semaphore>>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl Executor {
    async fn execute(&self, runnable: Arc<dyn Runnable>) {
        let outcome = self.run_until_terminal(runnable.as_ref()).await;
        let _ = self.completions.send(Completion { runnable, outcome });
    }

    async fn run_until_terminal(&self, runnable: &dyn Runnable) -> Outcome {
        let mut attempt = 0u32;
        loop {
            let result = {
                let _permit = self.acquire().await;
                self.stats.write().attempts += 1;
                runnable.run().await
            };

            let error = match result {
                Ok(()) => {
                    debug!(unit = %runnable.id(), attempt, "unit succeeded");
                    return Outcome::Succeeded;
                }
                Err(error) => error,
            };

            match self.retry.evaluate(&error, attempt) {
                RetryPolicy::RetryImmediately => {
                    debug!(unit = %runnable.id(), attempt, error = %error, "retrying immediately");
                }
                RetryPolicy::RetryAfter(delay) => {
                    debug!(unit = %runnable.id(), attempt, ?delay, error = %error, "retrying after delay");
                    sleep(delay).await;
                }
                RetryPolicy::GiveUp => {
                    warn!(unit = %runnable.id(), attempt, error = %error, "giving up on unit");
                    return Outcome::GaveUp;
                }
            }

            self.stats.write().retries += 1;
            attempt += 1;
        }
    }

    async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        match &self.permits {
            Some(permits) => Arc::clone(permits).acquire_owned().await.ok(),
            None => None,
        }
    }
}

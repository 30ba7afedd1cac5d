//! The reconciliation engine.

use crate::calculator::{ChangeCalculator, DataChangeCalculator};
use crate::capability::RemoteProvider;
use crate::config::SyncConfig;
use crate::content::{Change, Content, DataAction};
use crate::entity::{Entity, EntityRef};
use crate::error::{SyncError, SyncResult};
use crate::observe::{AbortOnDrop, Observation, SNAPSHOT_BUFFER};
use crate::registry::EntityRegistry;
use concord_scheduler::{BackoffPolicy, RetryPolicy, RetryPolicyEvaluator, RunError, RunnableScheduler};
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

/// Keeps local and remote collections of registered entities consistent.
///
/// - `register` stores the entity and runs a full remote sync
/// - `add`, `update` and `remove` write locally, then schedule the remote
///   write on the durable scheduler
/// - `observe_objects` streams local snapshots while ingesting remote
///   changes into local storage
///
/// # Example
///
/// ```rust,ignore
/// let engine = SyncEngine::new(SyncConfig::default(), scheduler);
/// engine.register(Entity::new("tasks", local).with_remote(remote)).await?;
/// engine.add(task, "tasks").await?;
/// ```
pub struct SyncEngine<K: ChangeCalculator = DataChangeCalculator> {
    config: SyncConfig,
    registry: EntityRegistry,
    scheduler: Arc<dyn RunnableScheduler>,
    calculator: Arc<K>,
    syncs: Mutex<HashMap<String, ActiveSync>>,
    next_sync: AtomicU64,
    /// Orders registry insertion together with the sync hand-over.
    registrations: tokio::sync::Mutex<()>,
}

struct ActiveSync {
    generation: u64,
    task: AbortHandle,
}

impl SyncEngine<DataChangeCalculator> {
    /// Creates an engine with the default change calculator.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: SyncConfig, scheduler: Arc<dyn RunnableScheduler>) -> Self {
        Self::with_calculator(config, scheduler, DataChangeCalculator)
    }
}

impl<K: ChangeCalculator> SyncEngine<K> {
    /// Creates an engine with a custom change calculator.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_calculator(config: SyncConfig, scheduler: Arc<dyn RunnableScheduler>, calculator: K) -> Self {
        Self {
            registry: EntityRegistry::start(config.lookup_timeout),
            config,
            scheduler,
            calculator: Arc::new(calculator),
            syncs: Mutex::new(HashMap::new()),
            next_sync: AtomicU64::new(0),
            registrations: tokio::sync::Mutex::new(()),
        }
    }

    /// Gets the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Registers `entity`, replacing any entity with the same id.
    ///
    /// If the entity has a remote provider, the full remote collection is
    /// fetched and synced into local storage, with retries. Returns once the
    /// sync has succeeded or given up; sync failures are logged, not
    /// returned. Re-registering an id aborts its previous sync, and the
    /// superseded `register` call returns `Ok`.
    ///
    /// Lookups waiting for the id resolve as soon as it is inserted.
    pub async fn register<C: Content>(&self, entity: Entity<C>) -> SyncResult<()> {
        let id = entity.id().to_string();

        // The surviving sync must belong to the entity the registry ends up
        // holding, so insertion and hand-over happen in the same order.
        let started = {
            let _order = self.registrations.lock().await;
            self.registry.register(entity.clone()).await?;

            let started = entity.remote().cloned().map(|remote| {
                let generation = self.next_sync.fetch_add(1, Ordering::Relaxed);
                let task = spawn_on(
                    entity.runtime(),
                    initial_sync(entity.clone(), remote, self.config.sync_retry.clone()),
                );
                (generation, task)
            });

            let previous = match &started {
                Some((generation, task)) => self.syncs.lock().insert(
                    id.clone(),
                    ActiveSync {
                        generation: *generation,
                        task: task.abort_handle(),
                    },
                ),
                None => self.syncs.lock().remove(&id),
            };
            if let Some(previous) = previous {
                debug!(entity = %id, "aborting superseded sync");
                previous.task.abort();
            }
            started
        };

        let Some((generation, task)) = started else {
            debug!(entity = %id, "registered local-only entity");
            return Ok(());
        };

        let joined = task.await;

        {
            let mut syncs = self.syncs.lock();
            if syncs.get(&id).map(|s| s.generation) == Some(generation) {
                syncs.remove(&id);
            }
        }

        match joined {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(SyncError::TaskFailed(e.to_string())),
        }
    }

    /// Resolves a registered entity, waiting up to the lookup timeout.
    pub async fn entity<C: Content>(&self, entity: impl Into<EntityRef>) -> SyncResult<Entity<C>> {
        self.registry.lookup(&entity.into()).await
    }

    /// Inserts `object` locally and schedules the remote insert.
    pub async fn add<C: Content>(&self, object: C, entity: impl Into<EntityRef>) -> SyncResult<()> {
        self.write_through(DataAction::Insert, object, entity.into()).await
    }

    /// Updates `object` locally and schedules the remote update.
    pub async fn update<C: Content>(&self, object: C, entity: impl Into<EntityRef>) -> SyncResult<()> {
        self.write_through(DataAction::Update, object, entity.into()).await
    }

    /// Deletes `object` locally and schedules the remote delete.
    pub async fn remove<C: Content>(&self, object: C, entity: impl Into<EntityRef>) -> SyncResult<()> {
        self.write_through(DataAction::Delete, object, entity.into()).await
    }

    /// Observes the entity's collection.
    ///
    /// The entity is resolved before this returns, so lookup failures are
    /// returned here. Remote changes are ingested into local storage for as
    /// long as the observation lives.
    pub async fn observe_objects<C: Content>(&self, entity: impl Into<EntityRef>) -> SyncResult<Observation<C>> {
        let entity: Entity<C> = self.registry.lookup(&entity.into()).await?;

        let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);
        let snapshots = entity.local().observe_objects();
        let ingestion = entity.remote().map(|remote| {
            let changes = remote.observe_changes();
            let runtime = entity.runtime().cloned();
            AbortOnDrop(spawn_on(
                runtime.as_ref(),
                ingest_changes(changes, entity.clone(), Arc::clone(&self.calculator)),
            ))
        });

        let forwarder = tokio::spawn(forward_snapshots(snapshots, tx, ingestion));
        Ok(Observation::new(rx, forwarder.abort_handle()))
    }

    async fn write_through<C: Content>(&self, action: DataAction, object: C, entity: EntityRef) -> SyncResult<()> {
        let entity: Entity<C> = self.registry.lookup(&entity).await?;
        let runtime = entity.runtime().cloned();
        let work = perform_write(entity, Arc::clone(&self.scheduler), action, object);

        match runtime {
            Some(runtime) => runtime
                .spawn(work)
                .await
                .map_err(|e| SyncError::TaskFailed(e.to_string()))?,
            None => work.await,
        }
    }
}

impl<K: ChangeCalculator> Drop for SyncEngine<K> {
    fn drop(&mut self) {
        for (_, sync) in self.syncs.lock().drain() {
            sync.task.abort();
        }
    }
}

fn spawn_on<F>(runtime: Option<&Handle>, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match runtime {
        Some(runtime) => runtime.spawn(future),
        None => tokio::spawn(future),
    }
}

async fn perform_write<C: Content>(
    entity: Entity<C>,
    scheduler: Arc<dyn RunnableScheduler>,
    action: DataAction,
    object: C,
) -> SyncResult<()> {
    let Some(remote) = entity.remote() else {
        return entity.local().perform(action, object).await;
    };

    entity.local().perform(action, object.clone()).await?;
    let unit = remote.perform_action(object, action).await?;
    debug!(entity = %entity.id(), unit = %unit.id(), ?action, "scheduling remote write");
    scheduler.schedule(unit).await?;
    Ok(())
}

async fn initial_sync<C: Content>(entity: Entity<C>, remote: Arc<dyn RemoteProvider<C>>, policy: BackoffPolicy) {
    let mut attempt = 0u32;
    loop {
        let result = match remote.objects().await {
            Ok(objects) => {
                let count = objects.len();
                entity.local().sync_from_remote(objects).await.map(|()| count)
            }
            Err(e) => Err(e),
        };

        let error = match result {
            Ok(count) => {
                info!(entity = %entity.id(), count, attempt, "initial sync complete");
                return;
            }
            Err(e) if e.is_retryable() => RunError::transient(e.to_string()),
            Err(e) => RunError::fatal(e.to_string()),
        };

        match policy.evaluate(&error, attempt) {
            RetryPolicy::RetryImmediately => {}
            RetryPolicy::RetryAfter(delay) => tokio::time::sleep(delay).await,
            RetryPolicy::GiveUp => {
                warn!(entity = %entity.id(), attempt, error = %error, "initial sync abandoned");
                return;
            }
        }
        debug!(entity = %entity.id(), attempt, error = %error, "retrying initial sync");
        attempt += 1;
    }
}

async fn ingest_changes<C: Content, K: ChangeCalculator>(
    mut changes: BoxStream<'static, SyncResult<Change<C>>>,
    entity: Entity<C>,
    calculator: Arc<K>,
) {
    while let Some(change) = changes.next().await {
        let applied = match change {
            Ok(change) => calculator.compute(change, &entity).await,
            Err(e) => Err(e),
        };
        if let Err(e) = applied {
            warn!(entity = %entity.id(), error = %e, "failed to apply remote change");
        }
    }
    debug!(entity = %entity.id(), "remote change feed ended");
}

async fn forward_snapshots<C: Content>(
    mut snapshots: BoxStream<'static, SyncResult<Vec<C>>>,
    tx: mpsc::Sender<SyncResult<Vec<C>>>,
    _ingestion: Option<AbortOnDrop<()>>,
) {
    while let Some(snapshot) = snapshots.next().await {
        if tx.send(snapshot).await.is_err() {
            break;
        }
    }
}

//! Integration tests for the sync engine.

use concord_scheduler::{BackoffPolicy, PersistentScheduler, RecordStorage, SchedulerConfig};
use concord_storage::QueueStore;
use concord_sync_engine::{
    Change, ChangeCalculator, ChangeType, DataAction, DataChangeCalculator, Entity, EntityRegistry,
    SyncConfig, SyncEngine, SyncError,
};
use concord_testkit::prelude::*;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

fn config() -> SyncConfig {
    SyncConfig::default()
        .with_lookup_timeout(Duration::from_millis(200))
        .with_sync_retry(
            BackoffPolicy::new(3)
                .with_initial_delay(Duration::from_millis(5))
                .with_jitter(false),
        )
}

struct Fixture {
    engine: Arc<SyncEngine>,
    scheduler: Arc<RecordingScheduler>,
    local: Arc<MemoryLocalStorage<Task>>,
    remote: Arc<MockRemoteProvider<Task>>,
}

impl Fixture {
    fn new(remote_objects: Vec<Task>) -> Self {
        init_tracing();
        let scheduler = RecordingScheduler::new();
        Self {
            engine: Arc::new(SyncEngine::new(config(), scheduler.clone())),
            scheduler,
            local: Arc::new(MemoryLocalStorage::new()),
            remote: Arc::new(MockRemoteProvider::new(remote_objects)),
        }
    }

    fn local_only(&self) -> Entity<Task> {
        Entity::<Task>::new("tasks", self.local.clone())
    }

    fn synced(&self) -> Entity<Task> {
        self.local_only().with_remote(self.remote.clone())
    }
}

fn t(id: &str) -> Task {
    Task::new(id, format!("task {id}"))
}

fn has(objects: &[Task], id: &str) -> bool {
    objects.iter().any(|o| o.id == id)
}

// Registry and lookup

#[tokio::test]
async fn lookup_after_register_returns_entity() {
    let fx = Fixture::new(Vec::new());
    fx.engine.register(fx.local_only()).await.unwrap();

    let entity = fx.engine.entity::<Task>("tasks").await.unwrap();
    assert_eq!(entity.id(), "tasks");
    assert!(entity.remote().is_none());
}

#[tokio::test]
async fn lookup_waits_for_registration() {
    let fx = Fixture::new(Vec::new());
    let engine = fx.engine.clone();
    let pending = tokio::spawn(async move { engine.entity::<Task>("tasks").await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    fx.engine.register(fx.local_only()).await.unwrap();

    let entity = pending.await.unwrap().unwrap();
    assert_eq!(entity.id(), "tasks");
}

#[tokio::test]
async fn lookup_times_out_with_unknown_entity() {
    let fx = Fixture::new(Vec::new());

    let result = fx.engine.entity::<Task>("missing").await;
    assert!(matches!(result, Err(SyncError::UnknownEntity { ref id }) if id == "missing"));
}

#[tokio::test]
async fn lookup_with_wrong_content_type_fails() {
    let fx = Fixture::new(Vec::new());
    fx.engine.register(fx.local_only()).await.unwrap();

    let result = fx.engine.entity::<Note>("tasks").await;
    assert!(matches!(result, Err(SyncError::ContentTypeMismatch { .. })));
}

#[test]
fn lookup_fails_once_the_registry_lane_is_gone() {
    let lane_runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let registry = lane_runtime.block_on(async { EntityRegistry::start(Duration::from_secs(10)) });
    drop(lane_runtime);

    let caller = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let result = caller.block_on(registry.lookup::<Task>(&"tasks".into()));
    assert!(matches!(result, Err(SyncError::DeallocatedInstance)));

    let result = caller.block_on(registry.register(Entity::<Task>::new(
        "tasks",
        Arc::new(MemoryLocalStorage::<Task>::new()),
    )));
    assert!(matches!(result, Err(SyncError::DeallocatedInstance)));
}

#[tokio::test]
async fn re_registering_replaces_the_entity() {
    let fx = Fixture::new(Vec::new());
    fx.engine.register(fx.local_only()).await.unwrap();

    let replacement = Arc::new(MemoryLocalStorage::<Task>::new());
    fx.engine
        .register(Entity::<Task>::new("tasks", replacement.clone()))
        .await
        .unwrap();

    fx.engine.add(t("t1"), "tasks").await.unwrap();
    assert!(has(&replacement.contents(), "t1"));
    assert!(fx.local.contents().is_empty());
}

// Registration sync

#[tokio::test]
async fn register_syncs_remote_collection() {
    let fx = Fixture::new(vec![t("t1")]);
    fx.engine.register(fx.synced()).await.unwrap();

    assert_eq!(fx.local.contents(), vec![t("t1")]);
    assert_eq!(fx.remote.fetch_count(), 1);
}

#[tokio::test]
async fn register_retries_failed_sync() {
    let fx = Fixture::new(vec![t("t1")]);
    fx.remote.fail_next_fetches(2);

    fx.engine.register(fx.synced()).await.unwrap();

    assert_eq!(fx.local.contents(), vec![t("t1")]);
    assert_eq!(fx.remote.fetch_count(), 3);
}

#[tokio::test]
async fn exhausted_sync_does_not_fail_registration() {
    let fx = Fixture::new(vec![t("t1")]);
    fx.remote.fail_next_fetches(100);

    fx.engine.register(fx.synced()).await.unwrap();

    assert!(fx.local.contents().is_empty());
    assert_eq!(fx.remote.fetch_count(), 3);
    assert!(fx.engine.entity::<Task>("tasks").await.is_ok());
}

#[tokio::test]
async fn re_registering_aborts_the_superseded_sync() {
    let fx = Fixture::new(vec![t("stale")]);
    fx.remote.pause_fetches();

    let engine = fx.engine.clone();
    let first = fx.synced();
    let first_register = tokio::spawn(async move { engine.register(first).await });
    assert!(wait_until(DEFAULT_WAIT, || fx.remote.fetch_count() == 1).await);

    let local = Arc::new(MemoryLocalStorage::<Task>::new());
    let remote = Arc::new(MockRemoteProvider::new(vec![t("fresh")]));
    fx.engine
        .register(Entity::<Task>::new("tasks", local.clone()).with_remote(remote))
        .await
        .unwrap();

    assert!(first_register.await.unwrap().is_ok());
    fx.remote.resume_fetches();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(fx.local.sync_count(), 0);
    assert!(fx.local.contents().is_empty());
    assert_eq!(local.sync_count(), 1);
    assert!(has(&local.contents(), "fresh"));
}

#[tokio::test]
async fn re_registering_as_local_only_aborts_the_pending_sync() {
    let fx = Fixture::new(vec![t("stale")]);
    fx.remote.pause_fetches();

    let engine = fx.engine.clone();
    let first = fx.synced();
    let first_register = tokio::spawn(async move { engine.register(first).await });
    assert!(wait_until(DEFAULT_WAIT, || fx.remote.fetch_count() == 1).await);

    fx.engine.register(fx.local_only()).await.unwrap();
    assert!(first_register.await.unwrap().is_ok());

    fx.remote.resume_fetches();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fx.local.sync_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations_sync_the_surviving_entity() {
    init_tracing();
    for _ in 0..50 {
        let engine = Arc::new(SyncEngine::new(config(), RecordingScheduler::new()));
        let sides: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|tag| {
                let local = Arc::new(MemoryLocalStorage::<Task>::new());
                let remote = Arc::new(MockRemoteProvider::new(vec![t(tag)]));
                (tag, local, remote)
            })
            .collect();

        let registrations: Vec<_> = sides
            .iter()
            .map(|(_, local, remote)| {
                let engine = engine.clone();
                let entity = Entity::<Task>::new("tasks", local.clone()).with_remote(remote.clone());
                tokio::spawn(async move { engine.register(entity).await })
            })
            .collect();
        for registration in registrations {
            registration.await.unwrap().unwrap();
        }

        let registered = engine.entity::<Task>("tasks").await.unwrap();
        let fetched = registered.remote().unwrap().objects().await.unwrap();
        let tag = fetched[0].id.clone();
        let (_, local, _) = sides.iter().find(|(side, _, _)| *side == tag).unwrap();
        assert!(has(&local.contents(), &tag), "registered entity {tag} was never synced");
    }
}

// Mutations

#[tokio::test]
async fn add_is_observed() {
    let fx = Fixture::new(Vec::new());
    fx.engine.register(fx.local_only()).await.unwrap();

    fx.engine.add(t("t1"), "tasks").await.unwrap();

    let mut observation = fx.engine.observe_objects::<Task>("tasks").await.unwrap();
    let snapshot = next_matching(&mut observation, DEFAULT_WAIT, |s| has(s, "t1")).await;
    assert!(snapshot.is_some());
}

#[tokio::test]
async fn remove_is_observed() {
    let fx = Fixture::new(Vec::new());
    fx.engine.register(fx.local_only()).await.unwrap();
    let mut observation = fx.engine.observe_objects::<Task>("tasks").await.unwrap();

    fx.engine.add(t("t1"), "tasks").await.unwrap();
    assert!(next_matching(&mut observation, DEFAULT_WAIT, |s| has(s, "t1")).await.is_some());

    fx.engine.remove(t("t1"), "tasks").await.unwrap();
    assert!(next_matching(&mut observation, DEFAULT_WAIT, |s| !has(s, "t1")).await.is_some());
}

#[tokio::test]
async fn update_replaces_stale_object() {
    let fx = Fixture::new(Vec::new());
    fx.engine.register(fx.local_only()).await.unwrap();
    let original = t("t1");

    fx.engine.add(original.clone(), "tasks").await.unwrap();
    fx.engine.update(original.completed(), "tasks").await.unwrap();

    let mut observation = fx.engine.observe_objects::<Task>("tasks").await.unwrap();
    let snapshot = next_matching(&mut observation, DEFAULT_WAIT, |s| s.iter().any(|o| o.done))
        .await
        .unwrap();
    assert_eq!(snapshot, vec![original.completed()]);
}

#[tokio::test]
async fn local_only_entity_schedules_nothing() {
    let fx = Fixture::new(Vec::new());
    fx.engine.register(fx.local_only()).await.unwrap();

    fx.engine.add(t("t1"), "tasks").await.unwrap();

    assert_eq!(fx.local.write_count(), 1);
    assert_eq!(fx.scheduler.scheduled_count(), 0);
}

#[tokio::test]
async fn end_to_end_tasks_entity() {
    let fx = Fixture::new(vec![t("t1")]);
    fx.engine.register(fx.synced()).await.unwrap();
    assert_eq!(fx.local.ids(), vec!["t1".to_string()]);

    fx.engine.add(t("t2"), "tasks").await.unwrap();
    assert_eq!(fx.local.ids(), vec!["t1".to_string(), "t2".to_string()]);
    assert_eq!(fx.scheduler.scheduled_count(), 1);

    fx.engine.remove(t("t1"), "tasks").await.unwrap();
    assert_eq!(fx.local.ids(), vec!["t2".to_string()]);
    assert_eq!(fx.scheduler.scheduled_count(), 2);

    assert_eq!(
        fx.remote.actions(),
        vec![(DataAction::Insert, t("t2")), (DataAction::Delete, t("t1"))]
    );
}

#[tokio::test]
async fn local_write_failure_propagates() {
    let fx = Fixture::new(Vec::new());
    fx.engine.register(fx.synced()).await.unwrap();
    fx.local.set_fail_writes(true);

    let result = fx.engine.add(t("t1"), "tasks").await;

    assert!(matches!(result, Err(SyncError::LocalStorage(_))));
    assert_eq!(fx.scheduler.scheduled_count(), 0);
    assert!(fx.remote.actions().is_empty());
}

#[tokio::test]
async fn remote_unit_failure_propagates() {
    let fx = Fixture::new(Vec::new());
    fx.engine.register(fx.synced()).await.unwrap();
    fx.remote.set_fail_actions(true);

    let result = fx.engine.add(t("t1"), "tasks").await;

    assert!(matches!(result, Err(SyncError::RemoteProvider(_))));
    assert!(has(&fx.local.contents(), "t1"));
    assert_eq!(fx.scheduler.scheduled_count(), 0);
}

#[tokio::test]
async fn scheduler_rejection_propagates() {
    let fx = Fixture::new(Vec::new());
    fx.engine.register(fx.synced()).await.unwrap();
    fx.scheduler.set_reject(true);

    let result = fx.engine.add(t("t1"), "tasks").await;
    assert!(matches!(result, Err(SyncError::Scheduler(_))));
}

#[tokio::test]
async fn mutation_on_unknown_entity_fails() {
    let fx = Fixture::new(Vec::new());

    let result = fx.engine.add(t("t1"), "tasks").await;
    assert!(matches!(result, Err(SyncError::UnknownEntity { .. })));
    assert_eq!(fx.local.write_count(), 0);
}

#[tokio::test]
async fn entity_runtime_runs_the_write() {
    let fx = Fixture::new(Vec::new());
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();

    fx.engine
        .register(fx.synced().on_runtime(runtime.handle().clone()))
        .await
        .unwrap();
    fx.engine.add(t("t1"), "tasks").await.unwrap();

    assert!(has(&fx.local.contents(), "t1"));
    assert_eq!(fx.scheduler.scheduled_count(), 1);
    runtime.shutdown_background();
}

// Observation and remote changes

#[tokio::test]
async fn remote_changes_reach_local_storage() {
    let fx = Fixture::new(Vec::new());
    fx.engine.register(fx.synced()).await.unwrap();
    let mut observation = fx.engine.observe_objects::<Task>("tasks").await.unwrap();
    assert!(wait_until(DEFAULT_WAIT, || fx.remote.subscriber_count() == 1).await);

    fx.remote.inject_change(Change::insert(t("r1")));
    assert!(next_matching(&mut observation, DEFAULT_WAIT, |s| has(s, "r1")).await.is_some());

    fx.remote.inject_change(Change::delete(t("r1")));
    assert!(next_matching(&mut observation, DEFAULT_WAIT, |s| !has(s, "r1")).await.is_some());

    assert_eq!(fx.scheduler.scheduled_count(), 0);
}

#[tokio::test]
async fn malformed_and_failed_changes_do_not_stop_ingestion() {
    let fx = Fixture::new(Vec::new());
    fx.engine.register(fx.synced()).await.unwrap();
    let mut observation = fx.engine.observe_objects::<Task>("tasks").await.unwrap();
    assert!(wait_until(DEFAULT_WAIT, || fx.remote.subscriber_count() == 1).await);

    fx.remote
        .inject_change(Change::new(None, Some(t("x")), ChangeType::Insert));
    fx.remote.inject_error("feed hiccup");
    fx.remote.inject_change(Change::sync(t("r2")));

    let snapshot = next_matching(&mut observation, DEFAULT_WAIT, |s| has(s, "r2"))
        .await
        .unwrap();
    assert!(!has(&snapshot, "x"));
}

#[tokio::test]
async fn cancelled_observation_stops_delivery_and_ingestion() {
    let fx = Fixture::new(Vec::new());
    fx.engine.register(fx.synced()).await.unwrap();
    let mut observation = fx.engine.observe_objects::<Task>("tasks").await.unwrap();
    assert!(wait_until(DEFAULT_WAIT, || fx.remote.subscriber_count() == 1).await);

    observation.cancel();

    assert!(observation.is_cancelled());
    assert!(observation.next().await.is_none());
    assert!(wait_until(DEFAULT_WAIT, || fx.remote.subscriber_count() == 0).await);
}

#[tokio::test]
async fn dropped_observation_stops_ingestion() {
    let fx = Fixture::new(Vec::new());
    fx.engine.register(fx.synced()).await.unwrap();
    let observation = fx.engine.observe_objects::<Task>("tasks").await.unwrap();
    assert!(wait_until(DEFAULT_WAIT, || fx.remote.subscriber_count() == 1).await);

    drop(observation);

    assert!(wait_until(DEFAULT_WAIT, || fx.remote.subscriber_count() == 0).await);
}

#[tokio::test]
async fn observing_unknown_entity_fails() {
    let fx = Fixture::new(Vec::new());

    let result = fx.engine.observe_objects::<Task>("missing").await;
    assert!(matches!(result, Err(SyncError::UnknownEntity { .. })));
}

// Change calculator

#[tokio::test]
async fn calculator_applies_each_change_type() {
    let fx = Fixture::new(Vec::new());
    let entity = fx.local_only();
    let calculator = DataChangeCalculator;

    calculator.compute(Change::insert(t("a")), &entity).await.unwrap();
    calculator.compute(Change::sync(t("b")), &entity).await.unwrap();
    calculator
        .compute(Change::update(t("a").completed(), Some(t("a"))), &entity)
        .await
        .unwrap();
    calculator.compute(Change::delete(t("b")), &entity).await.unwrap();

    assert_eq!(fx.local.contents(), vec![t("a").completed()]);
}

#[tokio::test]
async fn calculator_rejects_missing_payload() {
    let fx = Fixture::new(Vec::new());
    let entity = fx.local_only();

    let result = DataChangeCalculator
        .compute(Change::new(Some(t("a")), None, ChangeType::Delete), &entity)
        .await;

    assert!(matches!(
        result,
        Err(SyncError::MalformedChange {
            change_type: ChangeType::Delete
        })
    ));
    assert_eq!(fx.local.write_count(), 0);
}

// With the persistent scheduler

#[tokio::test]
async fn scheduled_remote_writes_run_and_leave_the_queue() {
    init_tracing();
    let queue = TempQueueFile::new();
    let local = Arc::new(MemoryLocalStorage::<Task>::new());
    let remote = Arc::new(MockRemoteProvider::new(Vec::new()));

    let storage = Arc::new(RecordStorage::new(queue.open(), remote.runnable_registry()));
    let scheduler = PersistentScheduler::start(
        SchedulerConfig::new(1, Duration::from_millis(10)),
        storage.clone(),
        Arc::new(BackoffPolicy::default()),
    )
    .await
    .unwrap();
    let engine = SyncEngine::new(config(), Arc::new(scheduler));

    engine
        .register(Entity::<Task>::new("tasks", local.clone()).with_remote(remote.clone()))
        .await
        .unwrap();
    engine.add(t("t1"), "tasks").await.unwrap();
    engine.update(t("t1").completed(), "tasks").await.unwrap();

    assert!(wait_until(DEFAULT_WAIT, || remote.executed_count() == 2).await);
    assert!(wait_until(DEFAULT_WAIT, || storage.store().is_empty().unwrap_or(false)).await);
    assert_eq!(local.contents(), vec![t("t1").completed()]);
}

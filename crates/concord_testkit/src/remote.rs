//! Scriptable remote provider.

use async_trait::async_trait;
use concord_scheduler::{RunError, Runnable, RunnableRegistry};
use concord_storage::RunnableRecord;
use concord_sync_engine::{Change, Content, DataAction, RemoteProvider, SyncError, SyncResult};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Type tag of the units produced by [`MockRemoteProvider`].
pub const REMOTE_WRITE_KIND: &str = "remote_write";

/// A [`RemoteProvider`] with a fixed collection, injectable changes and
/// failure injection.
pub struct MockRemoteProvider<C: Content> {
    objects: Mutex<Vec<C>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<SyncResult<Change<C>>>>>,
    actions: Mutex<Vec<(DataAction, C)>>,
    failing_fetches: AtomicUsize,
    fetches: AtomicUsize,
    fail_actions: AtomicBool,
    fetch_gate: watch::Sender<bool>,
    executed: Arc<AtomicUsize>,
}

impl<C: Content> MockRemoteProvider<C> {
    /// Creates a provider whose full fetch returns `objects`.
    pub fn new(objects: Vec<C>) -> Self {
        Self {
            objects: Mutex::new(objects),
            subscribers: Mutex::new(Vec::new()),
            actions: Mutex::new(Vec::new()),
            failing_fetches: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            fail_actions: AtomicBool::new(false),
            fetch_gate: watch::channel(true).0,
            executed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replaces the remote collection.
    pub fn set_objects(&self, objects: Vec<C>) {
        *self.objects.lock() = objects;
    }

    /// Makes the next `count` full fetches fail.
    pub fn fail_next_fetches(&self, count: usize) {
        self.failing_fetches.store(count, Ordering::SeqCst);
    }

    /// Holds every full fetch, once started, until [`Self::resume_fetches`].
    pub fn pause_fetches(&self) {
        self.fetch_gate.send_replace(false);
    }

    /// Lets held and future full fetches complete.
    pub fn resume_fetches(&self) {
        self.fetch_gate.send_replace(true);
    }

    /// Makes `perform_action` fail.
    pub fn set_fail_actions(&self, fail: bool) {
        self.fail_actions.store(fail, Ordering::SeqCst);
    }

    /// Number of full fetches attempted.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Actions requested through `perform_action`, in order.
    pub fn actions(&self) -> Vec<(DataAction, C)> {
        self.actions.lock().clone()
    }

    /// Number of produced units that have run.
    pub fn executed_count(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    /// Number of live change subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| !s.is_closed());
        subscribers.len()
    }

    /// Delivers `change` to every live subscription.
    pub fn inject_change(&self, change: Change<C>) {
        self.subscribers
            .lock()
            .retain(|s| s.send(Ok(change.clone())).is_ok());
    }

    /// Delivers a feed error to every live subscription.
    pub fn inject_error(&self, message: &str) {
        self.subscribers
            .lock()
            .retain(|s| s.send(Err(SyncError::remote(message.to_string()))).is_ok());
    }

    /// Returns a registry that rebuilds this provider's units on replay.
    pub fn runnable_registry(&self) -> RunnableRegistry {
        let executed = Arc::clone(&self.executed);
        RunnableRegistry::new().with_payload(REMOTE_WRITE_KIND, move |id, payload: RemoteWrite| {
            Arc::new(RemoteWriteRunnable {
                id,
                write: payload,
                executed: Arc::clone(&executed),
            }) as Arc<dyn Runnable>
        })
    }
}

#[async_trait]
impl<C: Content> RemoteProvider<C> for MockRemoteProvider<C> {
    async fn objects(&self) -> SyncResult<Vec<C>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.fetch_gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        let failing = self
            .failing_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(SyncError::remote("injected fetch failure"));
        }
        Ok(self.objects.lock().clone())
    }

    fn observe_changes(&self) -> BoxStream<'static, SyncResult<Change<C>>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
    }

    async fn perform_action(&self, content: C, action: DataAction) -> SyncResult<Arc<dyn Runnable>> {
        if self.fail_actions.load(Ordering::SeqCst) {
            return Err(SyncError::remote("injected action failure"));
        }
        self.actions.lock().push((action, content.clone()));

        let payload = serde_json::to_value(&content).map_err(SyncError::remote)?;
        Ok(Arc::new(RemoteWriteRunnable {
            id: uuid::Uuid::new_v4().to_string(),
            write: RemoteWrite {
                action: format!("{action:?}"),
                content: payload,
            },
            executed: Arc::clone(&self.executed),
        }))
    }
}

/// Payload of a remote write unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteWrite {
    /// The requested action.
    pub action: String,
    /// The serialized record.
    pub content: serde_json::Value,
}

/// Unit produced by [`MockRemoteProvider::perform_action`]. Always succeeds.
pub struct RemoteWriteRunnable {
    id: String,
    write: RemoteWrite,
    executed: Arc<AtomicUsize>,
}

impl RemoteWriteRunnable {
    /// Returns the payload.
    pub fn write(&self) -> &RemoteWrite {
        &self.write
    }
}

#[async_trait]
impl Runnable for RemoteWriteRunnable {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self) -> Result<(), RunError> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn representation(&self) -> RunnableRecord {
        let payload = serde_json::to_value(&self.write).unwrap_or_default();
        RunnableRecord::new(self.id.clone(), REMOTE_WRITE_KIND, payload)
    }
}

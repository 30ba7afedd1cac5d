//! In-memory local storage.

use async_trait::async_trait;
use concord_sync_engine::{Content, DataAction, LocalStorage, SyncError, SyncResult};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::watch;

/// A [`LocalStorage`] backed by a vector, with failure injection.
///
/// Every subscriber receives the current collection first, then a snapshot
/// after every write. Intermediate snapshots may be coalesced.
pub struct MemoryLocalStorage<C: Content> {
    objects: watch::Sender<Vec<C>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
    syncs: AtomicUsize,
}

impl<C: Content> MemoryLocalStorage<C> {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::with_objects(Vec::new())
    }

    /// Creates a storage holding `objects`.
    pub fn with_objects(objects: Vec<C>) -> Self {
        let (tx, _) = watch::channel(objects);
        Self {
            objects: tx,
            fail_writes: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
            syncs: AtomicUsize::new(0),
        }
    }

    /// Returns the current collection.
    pub fn contents(&self) -> Vec<C> {
        self.objects.borrow().clone()
    }

    /// Returns the ids of the current collection, in storage order.
    pub fn ids(&self) -> Vec<C::Id> {
        self.objects.borrow().iter().map(Content::id).collect()
    }

    /// Makes every subsequent write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `perform` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of successful `sync_from_remote` calls.
    pub fn sync_count(&self) -> usize {
        self.syncs.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> SyncResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(SyncError::local("injected local write failure"))
        } else {
            Ok(())
        }
    }
}

impl<C: Content> Default for MemoryLocalStorage<C> {
    fn default() -> Self {
        Self::new()
    }
}

fn upsert<C: Content>(objects: &mut Vec<C>, content: C) {
    let id = content.id();
    match objects.iter_mut().find(|o| o.id() == id) {
        Some(existing) => *existing = content,
        None => objects.push(content),
    }
}

#[async_trait]
impl<C: Content> LocalStorage<C> for MemoryLocalStorage<C> {
    fn observe_objects(&self) -> BoxStream<'static, SyncResult<Vec<C>>> {
        let rx = self.objects.subscribe();
        stream::unfold((rx, true), |(mut rx, first)| async move {
            if !first {
                rx.changed().await.ok()?;
            }
            let snapshot = rx.borrow_and_update().clone();
            Some((Ok(snapshot), (rx, false)))
        })
        .boxed()
    }

    async fn perform(&self, action: DataAction, content: C) -> SyncResult<()> {
        self.check_writable()?;
        self.objects.send_modify(|objects| match action {
            DataAction::Insert | DataAction::Update | DataAction::Sync => upsert(objects, content),
            DataAction::Delete => {
                let id = content.id();
                objects.retain(|o| o.id() != id);
            }
        });
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn sync_from_remote(&self, objects: Vec<C>) -> SyncResult<()> {
        self.check_writable()?;
        self.objects.send_replace(objects);
        self.syncs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

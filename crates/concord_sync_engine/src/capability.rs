//! Capabilities supplied by the embedding application.
//!
//! The engine depends only on these traits. Implementations manage their
//! own internal concurrency.

use crate::content::{Change, Content, DataAction};
use crate::error::SyncResult;
use async_trait::async_trait;
use concord_scheduler::Runnable;
use futures::stream::BoxStream;
use std::sync::Arc;

/// The always-available local store of one entity.
#[async_trait]
pub trait LocalStorage<C: Content>: Send + Sync {
    /// Returns a live feed of full-collection snapshots.
    ///
    /// The feed emits the current collection first, then one snapshot after
    /// every change.
    fn observe_objects(&self) -> BoxStream<'static, SyncResult<Vec<C>>>;

    /// Applies one write.
    async fn perform(&self, action: DataAction, content: C) -> SyncResult<()>;

    /// Replaces the records delivered by a full remote fetch.
    async fn sync_from_remote(&self, objects: Vec<C>) -> SyncResult<()>;
}

/// The intermittently-available remote backend of one entity.
#[async_trait]
pub trait RemoteProvider<C: Content>: Send + Sync {
    /// Fetches the full remote collection once.
    async fn objects(&self) -> SyncResult<Vec<C>>;

    /// Returns a live feed of remote changes.
    fn observe_changes(&self) -> BoxStream<'static, SyncResult<Change<C>>>;

    /// Builds the deferred work unit that applies `action` remotely.
    ///
    /// The unit is handed to the scheduler and may run more than once.
    async fn perform_action(&self, content: C, action: DataAction) -> SyncResult<Arc<dyn Runnable>>;
}

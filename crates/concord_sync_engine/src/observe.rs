//! Live observation of an entity's collection.

use crate::error::SyncResult;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};

/// Capacity of the snapshot channel between the forwarder and the observer.
pub(crate) const SNAPSHOT_BUFFER: usize = 16;

/// A live feed of full-collection snapshots.
///
/// Snapshots come only from the entity's local storage. Remote changes
/// show up as the local writes they cause.
///
/// Dropping the observation, or calling [`Observation::cancel`], stops both
/// the snapshot feed and the remote change ingestion. Writes already in
/// progress are not affected.
pub struct Observation<C> {
    snapshots: mpsc::Receiver<SyncResult<Vec<C>>>,
    forwarder: AbortHandle,
    cancelled: bool,
}

impl<C> Observation<C> {
    pub(crate) fn new(snapshots: mpsc::Receiver<SyncResult<Vec<C>>>, forwarder: AbortHandle) -> Self {
        Self {
            snapshots,
            forwarder,
            cancelled: false,
        }
    }

    /// Stops the observation. No snapshot is delivered afterwards.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.forwarder.abort();
        self.snapshots.close();
    }

    /// Returns true once the observation was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl<C> Stream for Observation<C> {
    type Item = SyncResult<Vec<C>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.cancelled {
            return Poll::Ready(None);
        }
        this.snapshots.poll_recv(cx)
    }
}

impl<C> Drop for Observation<C> {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

/// Aborts a task when dropped.
pub(crate) struct AbortOnDrop<T>(pub(crate) JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

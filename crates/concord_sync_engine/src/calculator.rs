//! Mapping of remote changes onto local writes.

use crate::content::{Change, Content};
use crate::entity::Entity;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;

/// Turns one remote change into a write against an entity's local storage.
#[async_trait]
pub trait ChangeCalculator: Send + Sync + 'static {
    /// Applies `change` to `entity`.
    async fn compute<C: Content>(&self, change: Change<C>, entity: &Entity<C>) -> SyncResult<()>;
}

/// The default calculator.
///
/// Sync, insert and update changes write `current` with the matching
/// action; delete changes delete `old`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataChangeCalculator;

#[async_trait]
impl ChangeCalculator for DataChangeCalculator {
    async fn compute<C: Content>(&self, change: Change<C>, entity: &Entity<C>) -> SyncResult<()> {
        let change_type = change.change_type;
        let payload = change
            .into_payload()
            .ok_or(SyncError::MalformedChange { change_type })?;

        entity.local().perform(change_type.action(), payload).await
    }
}

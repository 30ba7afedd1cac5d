//! Content values, local write actions and remote change notifications.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::hash::Hash;

/// One identifiable, serializable record of an entity's collection.
///
/// Uniqueness of [`Content::id`] within a collection is enforced by the
/// local storage, not by the engine.
pub trait Content: Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Identifier type.
    type Id: Clone + Eq + Hash + Debug + Send + Sync;

    /// Returns the record's identifier.
    fn id(&self) -> Self::Id;
}

/// A write requested against local storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataAction {
    /// Insert a new record.
    Insert,
    /// Replace an existing record with the same id.
    Update,
    /// Delete the record with the same id.
    Delete,
    /// Make local storage match the remote copy.
    ///
    /// A full sync replaces the whole collection through
    /// [`crate::LocalStorage::sync_from_remote`]; a single record sent with
    /// this action replaces whatever local storage holds for its id.
    Sync,
}

/// Kind of a remote-origin change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    /// The remote re-sent the record as part of a sync.
    Sync,
    /// The record was created remotely.
    Insert,
    /// The record was modified remotely.
    Update,
    /// The record was deleted remotely.
    Delete,
}

impl ChangeType {
    /// Returns the local write that applies this change.
    pub fn action(self) -> DataAction {
        match self {
            ChangeType::Sync => DataAction::Sync,
            ChangeType::Insert => DataAction::Insert,
            ChangeType::Update => DataAction::Update,
            ChangeType::Delete => DataAction::Delete,
        }
    }

    /// Returns true if the change must carry the old record rather than the
    /// current one.
    pub fn needs_old(self) -> bool {
        matches!(self, ChangeType::Delete)
    }
}

/// A remote-origin notification about one record.
///
/// Sync, insert and update changes carry `current`; delete changes carry
/// `old`.
#[derive(Debug, Clone, PartialEq)]
pub struct Change<C> {
    /// The record after the change.
    pub current: Option<C>,
    /// The record before the change.
    pub old: Option<C>,
    /// The kind of change.
    pub change_type: ChangeType,
}

impl<C> Change<C> {
    /// Creates a change from its parts.
    pub fn new(current: Option<C>, old: Option<C>, change_type: ChangeType) -> Self {
        Self {
            current,
            old,
            change_type,
        }
    }

    /// A record re-sent by a remote sync.
    pub fn sync(current: C) -> Self {
        Self::new(Some(current), None, ChangeType::Sync)
    }

    /// A record created remotely.
    pub fn insert(current: C) -> Self {
        Self::new(Some(current), None, ChangeType::Insert)
    }

    /// A record modified remotely.
    pub fn update(current: C, old: Option<C>) -> Self {
        Self::new(Some(current), old, ChangeType::Update)
    }

    /// A record deleted remotely.
    pub fn delete(old: C) -> Self {
        Self::new(None, Some(old), ChangeType::Delete)
    }

    /// Consumes the change and returns the record it applies: `old` for a
    /// delete, `current` otherwise.
    pub fn into_payload(self) -> Option<C> {
        if self.change_type.needs_old() {
            self.old
        } else {
            self.current
        }
    }
}

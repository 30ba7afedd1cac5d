//! Entities: named, independently synchronized collections.

use crate::capability::{LocalStorage, RemoteProvider};
use crate::content::Content;
use std::fmt;
use std::sync::Arc;
use tokio::runtime::Handle;

/// A named collection of `C` records with its storage capabilities.
///
/// An entity without a remote provider is local-only.
pub struct Entity<C: Content> {
    id: String,
    local: Arc<dyn LocalStorage<C>>,
    remote: Option<Arc<dyn RemoteProvider<C>>>,
    runtime: Option<Handle>,
}

impl<C: Content> Entity<C> {
    /// Creates a local-only entity.
    pub fn new(id: impl Into<String>, local: Arc<dyn LocalStorage<C>>) -> Self {
        Self {
            id: id.into(),
            local,
            remote: None,
            runtime: None,
        }
    }

    /// Attaches a remote provider.
    pub fn with_remote(mut self, remote: Arc<dyn RemoteProvider<C>>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Runs this entity's storage work on `runtime` instead of the caller's.
    pub fn on_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Returns the entity id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the local storage.
    pub fn local(&self) -> &Arc<dyn LocalStorage<C>> {
        &self.local
    }

    /// Returns the remote provider, if any.
    pub fn remote(&self) -> Option<&Arc<dyn RemoteProvider<C>>> {
        self.remote.as_ref()
    }

    /// Returns the runtime storage work is dispatched to, if any.
    pub fn runtime(&self) -> Option<&Handle> {
        self.runtime.as_ref()
    }

    /// Returns a reference to this entity.
    pub fn to_ref(&self) -> EntityRef {
        EntityRef(self.id.clone())
    }

    /// Returns the name of the content type.
    pub fn content_type() -> &'static str {
        std::any::type_name::<C>()
    }
}

impl<C: Content> Clone for Entity<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            local: Arc::clone(&self.local),
            remote: self.remote.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

impl<C: Content> fmt::Debug for Entity<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("content_type", &Self::content_type())
            .field("remote", &self.remote.is_some())
            .field("runtime", &self.runtime.is_some())
            .finish()
    }
}

/// Reference to an entity by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef(String);

impl EntityRef {
    /// Creates a reference.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the referenced id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityRef {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityRef {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl<C: Content> From<&Entity<C>> for EntityRef {
    fn from(entity: &Entity<C>) -> Self {
        entity.to_ref()
    }
}

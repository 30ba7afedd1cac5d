//! Work units and their durable representation.

use crate::error::RunError;
use async_trait::async_trait;
use concord_storage::RunnableRecord;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A deferred, replayable unit of work.
///
/// The scheduler guarantees at-least-once execution: a unit may run more
/// than once (for example after a crash between a successful run and its
/// removal from the queue), so `run` must be idempotent or safely
/// re-appliable.
#[async_trait]
pub trait Runnable: Send + Sync {
    /// Dedup and removal key.
    fn id(&self) -> &str;

    /// Executes the unit once.
    async fn run(&self) -> Result<(), RunError>;

    /// Returns the durable form of this unit.
    ///
    /// The record's `kind` must match a decoder registered with the
    /// [`RunnableFactory`] used on replay, or the unit is dropped when the
    /// scheduler restarts.
    fn representation(&self) -> RunnableRecord;
}

impl fmt::Debug for dyn Runnable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runnable").field("id", &self.id()).finish()
    }
}

/// Rebuilds work units from persisted records.
pub trait RunnableFactory: Send + Sync {
    /// Returns the unit for `record`, or `None` if the record is not
    /// recognised.
    fn make(&self, record: &RunnableRecord) -> Option<Arc<dyn Runnable>>;

    /// Returns true if `record` would be decoded by this factory.
    fn recognizes(&self, record: &RunnableRecord) -> bool {
        self.make(record).is_some()
    }
}

type Decoder = Box<dyn Fn(&RunnableRecord) -> Option<Arc<dyn Runnable>> + Send + Sync>;

/// A [`RunnableFactory`] that dispatches on the record's type tag.
///
/// # Example
///
/// ```rust,ignore
/// let registry = RunnableRegistry::new()
///     .with_payload("push", |id, payload: PushPayload| Arc::new(Push::new(id, payload)));
/// ```
#[derive(Default)]
pub struct RunnableRegistry {
    decoders: HashMap<String, Decoder>,
}

impl RunnableRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a raw decoder for `kind`, replacing any previous one.
    pub fn register<F>(&mut self, kind: impl Into<String>, decoder: F) -> &mut Self
    where
        F: Fn(&RunnableRecord) -> Option<Arc<dyn Runnable>> + Send + Sync + 'static,
    {
        self.decoders.insert(kind.into(), Box::new(decoder));
        self
    }

    /// Registers a decoder that deserializes the payload into `P` first.
    ///
    /// Records whose payload does not deserialize are treated as
    /// unrecognised.
    pub fn with_payload<P, F>(mut self, kind: impl Into<String>, build: F) -> Self
    where
        P: DeserializeOwned,
        F: Fn(String, P) -> Arc<dyn Runnable> + Send + Sync + 'static,
    {
        let kind = kind.into();
        let tag = kind.clone();
        self.register(kind, move |record| {
            match serde_json::from_value::<P>(record.payload.clone()) {
                Ok(payload) => Some(build(record.id.clone(), payload)),
                Err(e) => {
                    tracing::debug!(unit = %record.id, kind = %tag, error = %e, "undecodable payload");
                    None
                }
            }
        });
        self
    }

    /// Returns true if a decoder is registered for `kind`.
    pub fn knows(&self, kind: &str) -> bool {
        self.decoders.contains_key(kind)
    }

    /// Returns the registered type tags.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<_> = self.decoders.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl fmt::Debug for RunnableRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnableRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl RunnableFactory for RunnableRegistry {
    fn make(&self, record: &RunnableRecord) -> Option<Arc<dyn Runnable>> {
        self.decoders.get(&record.kind).and_then(|decode| decode(record))
    }
}

//! Entity registry.
//!
//! A single lane task owns the id → entity map. Registrations and lookups
//! are messages to that task, so they are applied in arrival order and no
//! caller ever holds a lock on the map.
//!
//! Lookups of an id that is not registered yet park on the lane until the
//! id is registered or the caller's timeout elapses.

use crate::content::Content;
use crate::entity::{Entity, EntityRef};
use crate::error::{SyncError, SyncResult};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

const LANE_CAPACITY: usize = 64;

#[derive(Clone)]
struct Registered {
    content_type: &'static str,
    entity: Arc<dyn Any + Send + Sync>,
}

impl Registered {
    fn new<C: Content>(entity: Entity<C>) -> Self {
        Self {
            content_type: Entity::<C>::content_type(),
            entity: Arc::new(entity),
        }
    }

    fn downcast<C: Content>(self, id: &EntityRef) -> SyncResult<Entity<C>> {
        let registered = self.content_type;
        match self.entity.downcast::<Entity<C>>() {
            Ok(entity) => Ok(Entity::clone(&entity)),
            Err(_) => Err(SyncError::ContentTypeMismatch {
                entity: id.to_string(),
                expected: Entity::<C>::content_type(),
                registered,
            }),
        }
    }
}

enum Command {
    Register {
        id: String,
        entry: Registered,
        done: oneshot::Sender<()>,
    },
    Lookup {
        id: String,
        reply: oneshot::Sender<Registered>,
    },
}

/// Handle to the registry lane.
///
/// Dropping the handle stops the lane. Operations borrow the handle, so the
/// lane outlives every call made through it; a call only sees
/// [`SyncError::DeallocatedInstance`] if the lane task itself is gone, for
/// example because its runtime shut down.
pub struct EntityRegistry {
    commands: mpsc::Sender<Command>,
    lookup_timeout: Duration,
}

impl EntityRegistry {
    /// Starts a registry lane.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(lookup_timeout: Duration) -> Self {
        let (commands, rx) = mpsc::channel(LANE_CAPACITY);
        tokio::spawn(run_lane(rx));
        Self {
            commands,
            lookup_timeout,
        }
    }

    /// Inserts `entity`, replacing any entity with the same id.
    ///
    /// Returns once the entity is visible to lookups.
    pub async fn register<C: Content>(&self, entity: Entity<C>) -> SyncResult<()> {
        let (done, done_rx) = oneshot::channel();
        self.send(Command::Register {
            id: entity.id().to_string(),
            entry: Registered::new(entity),
            done,
        })
        .await?;

        done_rx.await.map_err(|_| SyncError::DeallocatedInstance)
    }

    /// Looks up an entity, waiting up to the lookup timeout for it to be
    /// registered.
    ///
    /// # Errors
    ///
    /// - [`SyncError::UnknownEntity`] if the timeout elapses
    /// - [`SyncError::ContentTypeMismatch`] if the entity holds another type
    /// - [`SyncError::DeallocatedInstance`] if the lane has stopped
    pub async fn lookup<C: Content>(&self, id: &EntityRef) -> SyncResult<Entity<C>> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(Command::Lookup {
            id: id.to_string(),
            reply,
        })
        .await?;

        match tokio::time::timeout(self.lookup_timeout, reply_rx).await {
            Ok(Ok(entry)) => entry.downcast(id),
            Ok(Err(_)) => Err(SyncError::DeallocatedInstance),
            Err(_) => Err(SyncError::UnknownEntity { id: id.to_string() }),
        }
    }

    async fn send(&self, command: Command) -> SyncResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SyncError::DeallocatedInstance)
    }
}

async fn run_lane(mut commands: mpsc::Receiver<Command>) {
    let mut entities: HashMap<String, Registered> = HashMap::new();
    let mut waiters: HashMap<String, Vec<oneshot::Sender<Registered>>> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Register { id, entry, done } => {
                debug!(entity = %id, content_type = entry.content_type, "entity registered");
                if let Some(parked) = waiters.remove(&id) {
                    for waiter in parked {
                        let _ = waiter.send(entry.clone());
                    }
                }
                entities.insert(id, entry);
                let _ = done.send(());
            }
            Command::Lookup { id, reply } => match entities.get(&id) {
                Some(entry) => {
                    let _ = reply.send(entry.clone());
                }
                None => waiters.entry(id).or_default().push(reply),
            },
        }

        // Lookups that timed out have dropped their receivers.
        waiters.retain(|_, parked| {
            parked.retain(|waiter| !waiter.is_closed());
            !parked.is_empty()
        });
    }

    debug!("entity registry stopped");
}

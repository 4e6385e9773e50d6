use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::events::{EventPublisher, LifecycleEvent, Room};
use crate::models::identity::Actor;
use crate::observability::metrics::Metrics;

pub type ConnectionId = u64;

struct Connection {
    actor: Actor,
    tx: mpsc::Sender<Arc<str>>,
    rooms: HashSet<Room>,
}

/// Registry of live connections and the rooms they subscribe to.
///
/// Connect, join, leave and publish may all run concurrently from many
/// connections. Payloads are serialized once per publish and shared.
pub struct RoomRouter {
    connections: DashMap<ConnectionId, Connection>,
    rooms: DashMap<Room, HashSet<ConnectionId>>,
    next_id: AtomicU64,
    buffer_size: usize,
    metrics: Metrics,
}

impl RoomRouter {
    pub fn new(buffer_size: usize, metrics: Metrics) -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer_size: buffer_size.max(1),
            metrics,
        }
    }

    /// Registers an authenticated connection and returns its outbound queue.
    pub fn connect(&self, actor: Actor) -> (ConnectionId, mpsc::Receiver<Arc<str>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer_size);

        self.connections.insert(
            id,
            Connection {
                actor,
                tx,
                rooms: HashSet::new(),
            },
        );
        self.metrics.ws_connections.inc();
        debug!(connection_id = id, user_id = %actor.user_id, "connection registered");

        (id, rx)
    }

    pub fn disconnect(&self, id: ConnectionId) {
        let Some((_, connection)) = self.connections.remove(&id) else {
            return;
        };
        self.metrics.ws_connections.dec();

        for room in connection.rooms {
            self.remove_member(&room, id);
        }
        debug!(connection_id = id, "connection removed");
    }

    pub fn actor(&self, id: ConnectionId) -> Option<Actor> {
        self.connections.get(&id).map(|connection| connection.actor)
    }

    /// Returns `false` when the connection is gone.
    pub fn join(&self, id: ConnectionId, room: Room) -> bool {
        match self.connections.get_mut(&id) {
            Some(mut connection) => {
                connection.rooms.insert(room);
            }
            None => return false,
        }

        self.rooms.entry(room).or_default().insert(id);

        // A disconnect may have raced the join; do not leave a dangling member.
        if !self.connections.contains_key(&id) {
            self.remove_member(&room, id);
            return false;
        }
        true
    }

    pub fn leave(&self, id: ConnectionId, room: &Room) {
        if let Some(mut connection) = self.connections.get_mut(&id) {
            connection.rooms.remove(room);
        }
        self.remove_member(room, id);
    }

    pub fn member_count(&self, room: &Room) -> usize {
        self.rooms.get(room).map_or(0, |members| members.len())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Queues a pre-serialized message for a single connection.
    pub fn send_to(&self, id: ConnectionId, payload: Arc<str>) -> bool {
        self.connections
            .get(&id)
            .is_some_and(|connection| Self::enqueue(id, &connection.tx, payload))
    }

    /// Like [`EventPublisher::publish`] but skips the `except` connection.
    pub fn publish_except(
        &self,
        rooms: &[Room],
        event: &LifecycleEvent,
        except: Option<ConnectionId>,
    ) -> usize {
        let payload: Arc<str> = match serde_json::to_string(event) {
            Ok(json) => json.into(),
            Err(err) => {
                warn!(error = %err, event = event.name(), "failed to serialize event");
                return 0;
            }
        };

        let mut targets: HashSet<ConnectionId> = HashSet::new();
        for room in rooms {
            if let Some(members) = self.rooms.get(room) {
                targets.extend(members.iter().copied());
            }
        }
        if let Some(except) = except {
            targets.remove(&except);
        }

        let delivered = targets
            .into_iter()
            .filter(|id| self.send_to(*id, payload.clone()))
            .count();

        self.metrics
            .events_published_total
            .with_label_values(&[event.name()])
            .inc();
        debug!(event = event.name(), delivered, "event published");

        delivered
    }

    fn enqueue(id: ConnectionId, tx: &mpsc::Sender<Arc<str>>, payload: Arc<str>) -> bool {
        match tx.try_send(payload) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(connection_id = id, "outbound queue full; dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    fn remove_member(&self, room: &Room, id: ConnectionId) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(&id);
        }
        self.rooms.remove_if(room, |_, members| members.is_empty());
    }
}

impl EventPublisher for RoomRouter {
    fn publish(&self, rooms: &[Room], event: &LifecycleEvent) {
        self.publish_except(rooms, event, None);
    }
}

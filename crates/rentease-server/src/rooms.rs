//! Connection table and identity-keyed rooms.
//!
//! Every open socket is attached here with an unbounded outbound queue. A
//! connection that has joined as a user is also subscribed to the room named
//! after that user, so events can be published by identity instead of by
//! socket bookkeeping.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use rentease_shared::protocol::ServerEvent;
use rentease_shared::types::UserId;

/// Process-unique handle of one socket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

pub type EventSender = mpsc::UnboundedSender<ServerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ServerEvent>;

#[derive(Default)]
struct HubInner {
    connections: HashMap<ConnectionId, EventSender>,
    rooms: HashMap<UserId, HashSet<ConnectionId>>,
}

#[derive(Clone, Default)]
pub struct RoomHub {
    inner: Arc<RwLock<HubInner>>,
    next_id: Arc<AtomicU64>,
}

impl RoomHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection. The returned receiver yields every event
    /// addressed to it until [`RoomHub::detach`] is called.
    pub async fn attach(&self) -> (ConnectionId, EventReceiver) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut inner = self.inner.write().await;
        inner.connections.insert(id, tx);
        debug!(conn = %id, total = inner.connections.len(), "Connection attached");

        (id, rx)
    }

    /// Drop a connection and all its room subscriptions. Closing the sender
    /// ends the connection's outbound stream once it is drained.
    pub async fn detach(&self, id: ConnectionId) {
        let mut inner = self.inner.write().await;
        inner.connections.remove(&id);
        inner.rooms.retain(|_, members| {
            members.remove(&id);
            !members.is_empty()
        });
        debug!(conn = %id, total = inner.connections.len(), "Connection detached");
    }

    pub async fn subscribe(&self, room: &UserId, id: ConnectionId) {
        let mut inner = self.inner.write().await;
        let members = inner.rooms.entry(room.clone()).or_default();
        members.insert(id);
        info!(room = %room, conn = %id, members = members.len(), "Joined room");
    }

    pub async fn unsubscribe(&self, room: &UserId, id: ConnectionId) {
        let mut inner = self.inner.write().await;
        let now_empty = match inner.rooms.get_mut(room) {
            Some(members) => {
                members.remove(&id);
                members.is_empty()
            }
            None => false,
        };
        if now_empty {
            inner.rooms.remove(room);
        }
    }

    /// Deliver to one connection. A closed or unknown handle is a silent
    /// no-op reported as `false`.
    pub async fn send_to(&self, id: ConnectionId, event: ServerEvent) -> bool {
        let inner = self.inner.read().await;
        match inner.connections.get(&id) {
            Some(tx) => {
                let name = event.name();
                if tx.send(event).is_err() {
                    debug!(conn = %id, event = name, "Dropping event for closed connection");
                    return false;
                }
                true
            }
            None => {
                debug!(conn = %id, event = event.name(), "Dropping event for stale handle");
                false
            }
        }
    }

    /// Deliver to every connection subscribed to `room`. Returns how many
    /// connections accepted the event.
    pub async fn publish(&self, room: &UserId, event: ServerEvent) -> usize {
        let inner = self.inner.read().await;
        let Some(members) = inner.rooms.get(room) else {
            return 0;
        };

        members
            .iter()
            .filter_map(|id| inner.connections.get(id))
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }

    /// Deliver to every open connection, joined or not.
    pub async fn broadcast(&self, event: ServerEvent) -> usize {
        let inner = self.inner.read().await;
        inner
            .connections
            .values()
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    #[cfg(test)]
    pub async fn room_size(&self, room: &UserId) -> usize {
        self.inner
            .read()
            .await
            .rooms
            .get(room)
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping() -> ServerEvent {
        ServerEvent::error("ping")
    }

    #[tokio::test]
    async fn test_attach_detach() {
        let hub = RoomHub::new();
        let (a, _rx_a) = hub.attach().await;
        let (b, _rx_b) = hub.attach().await;
        assert_ne!(a, b);
        assert_eq!(hub.connection_count().await, 2);

        hub.subscribe(&UserId::new("u"), a).await;
        hub.detach(a).await;
        assert_eq!(hub.connection_count().await, 1);
        assert_eq!(hub.room_size(&UserId::new("u")).await, 0);
    }

    #[tokio::test]
    async fn test_publish_reaches_room_members_only() {
        let hub = RoomHub::new();
        let room = UserId::new("tenant");
        let (a, mut rx_a) = hub.attach().await;
        let (b, mut rx_b) = hub.attach().await;
        let (_c, mut rx_c) = hub.attach().await;
        hub.subscribe(&room, a).await;
        hub.subscribe(&room, b).await;

        assert_eq!(hub.publish(&room, ping()).await, 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone() {
        let hub = RoomHub::new();
        let (_a, mut rx_a) = hub.attach().await;
        let (_b, mut rx_b) = hub.attach().await;

        assert_eq!(hub.broadcast(ping()).await, 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_send_to_dead_handle_is_noop() {
        let hub = RoomHub::new();
        let (a, rx_a) = hub.attach().await;
        drop(rx_a);
        assert!(!hub.send_to(a, ping()).await);
        assert!(!hub.send_to(ConnectionId(999), ping()).await);
    }
}

//! Presence registry: which identity is online, and on which connection.
//!
//! One entry per identity. A second join from the same identity overwrites
//! the handle (last join wins), so only the newest connection is the relay
//! target. State is in memory only and starts empty on every process start.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use rentease_shared::types::{PresenceStatus, UserId};

use crate::rooms::ConnectionId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceEntry {
    pub connection: ConnectionId,
    pub status: PresenceStatus,
    pub since: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct PresenceRegistry {
    entries: Arc<RwLock<HashMap<UserId, PresenceEntry>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `user` on `connection`, returning the handle it replaced.
    pub async fn join(&self, user: UserId, connection: ConnectionId) -> Option<ConnectionId> {
        let entry = PresenceEntry {
            connection,
            status: PresenceStatus::Online,
            since: Utc::now(),
        };

        let mut entries = self.entries.write().await;
        let previous = entries.insert(user.clone(), entry).map(|e| e.connection);

        match previous {
            Some(old) if old != connection => info!(
                user = %user,
                old = %old,
                new = %connection,
                "Presence handle replaced (last join wins)"
            ),
            _ => debug!(user = %user, conn = %connection, online = entries.len(), "User online"),
        }

        previous
    }

    /// Remove the entry owned by `connection`, if any.
    ///
    /// A connection whose handle was overwritten by a newer join owns no
    /// entry, so closing it leaves the user online.
    pub async fn leave(&self, connection: ConnectionId) -> Option<UserId> {
        let mut entries = self.entries.write().await;
        let user = entries
            .iter()
            .find(|(_, e)| e.connection == connection)
            .map(|(user, _)| user.clone())?;
        if let Some(entry) = entries.remove(&user) {
            debug!(
                user = %user,
                conn = %connection,
                was = ?entry.status,
                since = %entry.since,
                online = entries.len(),
                "User offline"
            );
        }
        Some(user)
    }

    pub async fn lookup(&self, user: &UserId) -> Option<ConnectionId> {
        self.entries.read().await.get(user).map(|e| e.connection)
    }

    pub async fn is_online(&self, user: &UserId) -> bool {
        self.entries.read().await.contains_key(user)
    }

    pub async fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<_> = self.entries.read().await.keys().cloned().collect();
        users.sort();
        users
    }

    /// Drop every entry. Called once the server has stopped accepting
    /// connections.
    pub async fn shutdown(&self) -> usize {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        count
    }
}

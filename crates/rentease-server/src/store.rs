//! Async handle over the SQLite store.
//!
//! The `rusqlite` connection is synchronous and not `Sync`, so it lives behind
//! a mutex and every call runs on the blocking thread pool. Each call is one
//! short critical section; SQLite provides atomicity for the single-row writes.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use rentease_shared::types::{MessageId, UserId};
use rentease_store::{
    ContentPolicy, ConversationSummary, Database, Message, NewMessage, StoreError, User,
};

use crate::error::ServerError;

#[derive(Clone)]
pub struct MessageStore {
    db: Arc<Mutex<Database>>,
}

impl MessageStore {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Open the database at `path`, or at the platform default when `None`.
    pub fn open(path: Option<&Path>) -> Result<Self, StoreError> {
        let db = match path {
            Some(p) => {
                if let Some(parent) = p.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                tracing::info!(path = %p.display(), "opening database");
                Database::open_at(p)?
            }
            None => Database::new()?,
        };
        Ok(Self::new(db))
    }

    async fn run<T, F>(&self, op: F) -> Result<T, ServerError>
    where
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| ServerError::Storage(format!("Lock poisoned: {e}")))?;
            op(&*guard).map_err(ServerError::from)
        })
        .await
        .map_err(|e| ServerError::Internal(format!("Store task failed: {e}")))?
    }

    pub async fn persist(
        &self,
        message: NewMessage,
        policy: ContentPolicy,
    ) -> Result<Message, ServerError> {
        self.run(move |db| db.persist(message, policy)).await
    }

    pub async fn history(&self, a: UserId, b: UserId) -> Result<Vec<Message>, ServerError> {
        self.run(move |db| db.history(&a, &b)).await
    }

    pub async fn get_message(&self, id: MessageId) -> Result<Message, ServerError> {
        self.run(move |db| db.get_message(id)).await
    }

    pub async fn mark_delivered(&self, id: MessageId) -> Result<bool, ServerError> {
        self.run(move |db| db.mark_delivered(id)).await
    }

    pub async fn mark_message_read(&self, id: MessageId) -> Result<bool, ServerError> {
        self.run(move |db| db.mark_message_read(id)).await
    }

    pub async fn mark_read(&self, sender: UserId, receiver: UserId) -> Result<usize, ServerError> {
        self.run(move |db| db.mark_read(&sender, &receiver)).await
    }

    pub async fn delete(&self, id: MessageId) -> Result<bool, ServerError> {
        self.run(move |db| db.delete_message(id)).await
    }

    pub async fn list_conversations(
        &self,
        user: UserId,
    ) -> Result<Vec<ConversationSummary>, ServerError> {
        self.run(move |db| db.list_conversations(&user)).await
    }

    pub async fn upsert_user(
        &self,
        id: UserId,
        full_name: String,
        avatar: Option<String>,
        email: Option<String>,
    ) -> Result<User, ServerError> {
        self.run(move |db| db.upsert_user(&id, &full_name, avatar.as_deref(), email.as_deref()))
            .await
    }

    pub async fn find_user(&self, id: UserId) -> Result<Option<User>, ServerError> {
        self.run(move |db| db.find_user(&id)).await
    }

    pub async fn set_user_online(
        &self,
        id: UserId,
        online: bool,
        at: DateTime<Utc>,
    ) -> Result<bool, ServerError> {
        self.run(move |db| db.set_user_online(&id, online, at)).await
    }
}

#[cfg(test)]
impl MessageStore {
    /// Run raw SQL against the underlying database.
    pub(crate) async fn execute_batch(&self, sql: &'static str) -> Result<(), ServerError> {
        self.run(move |db| db.conn().execute_batch(sql).map_err(StoreError::from))
            .await
    }
}

#[cfg(test)]
pub(crate) fn temp_store() -> (MessageStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let db = Database::open_at(&dir.path().join("server.db")).expect("open db");
    (MessageStore::new(db), dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_maps_not_found() {
        let (store, _dir) = temp_store();
        let err = store.delete(MessageId::new()).await.unwrap_err();
        assert!(matches!(err, ServerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_store_persist_and_history() {
        let (store, _dir) = temp_store();
        let sent = store
            .persist(NewMessage::text("a", "b", "Hi"), ContentPolicy::Allow)
            .await
            .unwrap();
        let history = store.history("b".into(), "a".into()).await.unwrap();
        assert_eq!(history, vec![sent]);
    }
}

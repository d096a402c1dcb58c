//! Message store: persistence, history and read/delivery flags.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use rentease_shared::types::{MediaKind, MessageId, UserId};

use crate::database::{format_ts, now, parse_ts, Database};
use crate::error::{Result, StoreError};
use crate::models::{ContentPolicy, Message, NewMessage};

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, text, media, media_type, \
                               is_read, is_delivered, property_id, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Validate and store a new message.
    ///
    /// The record starts unread and undelivered; the store assigns its id and
    /// creation timestamp.
    pub fn persist(&self, new: NewMessage, policy: ContentPolicy) -> Result<Message> {
        if new.sender_id.is_blank() || new.receiver_id.is_blank() {
            return Err(StoreError::Validation(
                "senderId and receiverId are required".into(),
            ));
        }

        let text = new
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        if text.is_none() && new.media.is_none() && policy == ContentPolicy::Require {
            return Err(StoreError::Validation("Message text is required".into()));
        }

        let message = Message {
            id: MessageId::new(),
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            text,
            media: new.media,
            media_type: new.media_type,
            is_read: false,
            is_delivered: false,
            property: new.property,
            created_at: now(),
        };

        self.conn().execute(
            "INSERT INTO messages (id, sender_id, receiver_id, text, media, media_type,
                                   is_read, is_delivered, property_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, ?7, ?8)",
            params![
                message.id.to_string(),
                message.sender_id.as_str(),
                message.receiver_id.as_str(),
                message.text,
                message.media,
                message.media_type.map(|k| k.as_str()),
                message.property,
                format_ts(&message.created_at),
            ],
        )?;

        tracing::debug!(
            id = %message.id,
            sender = %message.sender_id,
            receiver = %message.receiver_id,
            "message persisted"
        );

        Ok(message)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// All messages exchanged between `a` and `b`, oldest first.
    pub fn history(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)
             ORDER BY created_at ASC, seq ASC"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![a.as_str(), b.as_str()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
        self.conn()
            .query_row(&sql, params![id.to_string()], row_to_message)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Every message sent or received by `user`, newest first.
    pub(crate) fn messages_touching(&self, user: &UserId) -> Result<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE sender_id = ?1 OR receiver_id = ?1
             ORDER BY created_at DESC, seq DESC"
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let rows = stmt.query_map(params![user.as_str()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Flag a message as delivered. Returns `true` if the flag flipped.
    pub fn mark_delivered(&self, id: MessageId) -> Result<bool> {
        self.set_flag(id, "is_delivered")
    }

    /// Flag a single message as read. Returns `true` if the flag flipped.
    pub fn mark_message_read(&self, id: MessageId) -> Result<bool> {
        self.set_flag(id, "is_read")
    }

    /// Mark every unread message from `sender` to `receiver` as read.
    ///
    /// Returns the number of messages that changed state; a second call with
    /// nothing new to read returns `0`.
    pub fn mark_read(&self, sender: &UserId, receiver: &UserId) -> Result<usize> {
        let affected = self.conn().execute(
            "UPDATE messages SET is_read = 1
             WHERE sender_id = ?1 AND receiver_id = ?2 AND is_read = 0",
            params![sender.as_str(), receiver.as_str()],
        )?;
        Ok(affected)
    }

    fn set_flag(&self, id: MessageId, column: &'static str) -> Result<bool> {
        let sql = format!("UPDATE messages SET {column} = 1 WHERE id = ?1 AND {column} = 0");
        let affected = self.conn().execute(&sql, params![id.to_string()])?;
        if affected > 0 {
            return Ok(true);
        }
        if self.message_exists(id)? {
            Ok(false)
        } else {
            Err(StoreError::NotFound)
        }
    }

    fn message_exists(&self, id: MessageId) -> Result<bool> {
        let found = self
            .conn()
            .query_row(
                "SELECT 1 FROM messages WHERE id = ?1",
                params![id.to_string()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Hard-delete a message. Fails with [`StoreError::NotFound`] if absent.
    pub fn delete_message(&self, id: MessageId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM messages WHERE id = ?1", params![id.to_string()])?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let sender: String = row.get(1)?;
    let receiver: String = row.get(2)?;
    let text: Option<String> = row.get(3)?;
    let media: Option<String> = row.get(4)?;
    let media_type: Option<String> = row.get(5)?;
    let is_read: bool = row.get(6)?;
    let is_delivered: bool = row.get(7)?;
    let property: Option<String> = row.get(8)?;
    let created_str: String = row.get(9)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Message {
        id: MessageId(id),
        sender_id: UserId(sender),
        receiver_id: UserId(receiver),
        text,
        media,
        media_type: media_type.as_deref().and_then(MediaKind::from_str_opt),
        is_read,
        is_delivered,
        property,
        created_at: parse_ts(9, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentease_shared::delivery::DeliveryState;

    fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("chat.db")).unwrap();
        (db, dir)
    }

    fn uid(s: &str) -> UserId {
        UserId::new(s)
    }

    #[test]
    fn persist_then_history_contains_message() {
        let (db, _dir) = test_db();
        let sent = db
            .persist(NewMessage::text("alice", "bob", "Hi"), ContentPolicy::Allow)
            .unwrap();

        let history = db.history(&uid("alice"), &uid("bob")).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0], sent);
        assert_eq!(history[0].text.as_deref(), Some("Hi"));
        assert!(!history[0].is_read);
        assert!(!history[0].is_delivered);
    }

    #[test]
    fn history_is_symmetric_and_ordered() {
        let (db, _dir) = test_db();
        for (s, r, t) in [("a", "b", "1"), ("b", "a", "2"), ("a", "c", "x"), ("a", "b", "3")] {
            db.persist(NewMessage::text(s, r, t), ContentPolicy::Allow)
                .unwrap();
        }

        let texts: Vec<_> = db
            .history(&uid("b"), &uid("a"))
            .unwrap()
            .into_iter()
            .map(|m| m.text.unwrap())
            .collect();
        assert_eq!(texts, ["1", "2", "3"]);
    }

    #[test]
    fn persist_rejects_missing_participants() {
        let (db, _dir) = test_db();
        let err = db
            .persist(NewMessage::text("", "bob", "Hi"), ContentPolicy::Allow)
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn empty_content_depends_on_policy() {
        let (db, _dir) = test_db();
        let empty = NewMessage {
            sender_id: uid("a"),
            receiver_id: uid("b"),
            text: Some("   ".into()),
            ..Default::default()
        };

        let err = db
            .persist(empty.clone(), ContentPolicy::Require)
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let stored = db.persist(empty, ContentPolicy::Allow).unwrap();
        assert!(!stored.has_content());
        assert_eq!(db.history(&uid("a"), &uid("b")).unwrap().len(), 1);
    }

    #[test]
    fn media_message_round_trips() {
        let (db, _dir) = test_db();
        let new = NewMessage {
            sender_id: uid("a"),
            receiver_id: uid("b"),
            media: Some("data:image/png;base64,AAAA".into()),
            media_type: Some(MediaKind::Image),
            property: Some("listing-42".into()),
            ..Default::default()
        };
        let stored = db.persist(new, ContentPolicy::Require).unwrap();
        let fetched = db.get_message(stored.id).unwrap();
        assert_eq!(fetched.media_type, Some(MediaKind::Image));
        assert_eq!(fetched.property.as_deref(), Some("listing-42"));
        assert!(fetched.text.is_none());
    }

    #[test]
    fn mark_read_is_idempotent() {
        let (db, _dir) = test_db();
        db.persist(NewMessage::text("a", "b", "1"), ContentPolicy::Allow)
            .unwrap();
        db.persist(NewMessage::text("a", "b", "2"), ContentPolicy::Allow)
            .unwrap();
        db.persist(NewMessage::text("b", "a", "reply"), ContentPolicy::Allow)
            .unwrap();

        assert_eq!(db.mark_read(&uid("a"), &uid("b")).unwrap(), 2);
        let after_once = db.history(&uid("a"), &uid("b")).unwrap();
        assert_eq!(db.mark_read(&uid("a"), &uid("b")).unwrap(), 0);
        let after_twice = db.history(&uid("a"), &uid("b")).unwrap();

        assert_eq!(after_once, after_twice);
        for m in &after_twice {
            // Only the a -> b direction is swept.
            assert_eq!(m.is_read, m.sender_id == uid("a"));
        }
    }

    #[test]
    fn mark_delivered_flips_once() {
        let (db, _dir) = test_db();
        let m = db
            .persist(NewMessage::text("a", "b", "hey"), ContentPolicy::Allow)
            .unwrap();

        assert!(db.mark_delivered(m.id).unwrap());
        assert!(!db.mark_delivered(m.id).unwrap());
        assert_eq!(
            db.get_message(m.id).unwrap().delivery_state(),
            DeliveryState::Delivered
        );
    }

    #[test]
    fn mark_message_read_unknown_id() {
        let (db, _dir) = test_db();
        let err = db.mark_message_read(MessageId::new()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[test]
    fn delete_message_hard_deletes() {
        let (db, _dir) = test_db();
        let m = db
            .persist(NewMessage::text("a", "b", "oops"), ContentPolicy::Allow)
            .unwrap();

        assert!(db.delete_message(m.id).unwrap());
        assert!(matches!(db.get_message(m.id), Err(StoreError::NotFound)));
        assert!(matches!(
            db.delete_message(m.id),
            Err(StoreError::NotFound)
        ));
    }
}

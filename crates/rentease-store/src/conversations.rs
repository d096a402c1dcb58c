//! Conversation list derived from the message table.
//!
//! A conversation is keyed by the *other* participant relative to the viewer.
//! Summaries are recomputed on every call and never persisted.

use std::collections::HashMap;

use rentease_shared::constants::{DEFAULT_AVATAR, UNKNOWN_USER_NAME};
use rentease_shared::types::UserId;

use crate::database::Database;
use crate::error::Result;
use crate::models::ConversationSummary;

impl Database {
    /// List the conversations of `user`, most recent first.
    ///
    /// Counterparts missing from the user directory are rendered as
    /// "Unknown User" instead of failing the whole list.
    pub fn list_conversations(&self, user: &UserId) -> Result<Vec<ConversationSummary>> {
        // Newest first, so the first message seen per counterpart is its preview.
        let messages = self.messages_touching(user)?;

        let mut order: Vec<ConversationSummary> = Vec::new();
        let mut index: HashMap<UserId, usize> = HashMap::new();

        for message in messages {
            let counterpart = if message.sender_id == *user {
                message.receiver_id.clone()
            } else {
                message.sender_id.clone()
            };

            let unread = message.receiver_id == *user && !message.is_read;

            let slot = match index.get(&counterpart) {
                Some(&i) => i,
                None => {
                    index.insert(counterpart.clone(), order.len());
                    order.push(ConversationSummary {
                        user_id: counterpart,
                        name: UNKNOWN_USER_NAME.to_string(),
                        avatar: DEFAULT_AVATAR.to_string(),
                        email: None,
                        last_message: message.text.clone(),
                        last_media_type: message.media_type,
                        last_message_time: message.created_at,
                        unread_count: 0,
                    });
                    order.len() - 1
                }
            };

            if unread {
                order[slot].unread_count += 1;
            }
        }

        for summary in &mut order {
            if let Some(profile) = self.find_user(&summary.user_id)? {
                summary.name = profile.full_name;
                summary.avatar = profile
                    .avatar
                    .unwrap_or_else(|| DEFAULT_AVATAR.to_string());
                summary.email = profile.email;
            }
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentPolicy, NewMessage};

    fn test_db() -> (Database, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("convos.db")).unwrap();
        (db, dir)
    }

    fn send(db: &Database, from: &str, to: &str, text: &str) {
        db.persist(NewMessage::text(from, to, text), ContentPolicy::Allow)
            .unwrap();
    }

    #[test]
    fn groups_by_counterpart_most_recent_first() {
        let (db, _dir) = test_db();
        send(&db, "alice", "bob", "hi bob");
        send(&db, "carol", "bob", "hi from carol");
        send(&db, "bob", "alice", "hey alice");

        let convos = db.list_conversations(&UserId::new("bob")).unwrap();
        let ids: Vec<_> = convos.iter().map(|c| c.user_id.as_str()).collect();
        assert_eq!(ids, ["alice", "carol"]);
        assert_eq!(convos[0].last_message.as_deref(), Some("hey alice"));
        assert_eq!(convos[0].unread_count, 1);
        assert_eq!(convos[1].unread_count, 1);
    }

    #[test]
    fn unread_count_resets_after_mark_read() {
        let (db, _dir) = test_db();
        send(&db, "a", "b", "1");
        send(&db, "a", "b", "2");
        send(&db, "a", "b", "3");

        let b = UserId::new("b");
        assert_eq!(db.list_conversations(&b).unwrap()[0].unread_count, 3);

        db.mark_read(&UserId::new("a"), &b).unwrap();
        assert_eq!(db.list_conversations(&b).unwrap()[0].unread_count, 0);
        // The sender never had anything unread in this conversation.
        assert_eq!(
            db.list_conversations(&UserId::new("a")).unwrap()[0].unread_count,
            0
        );
    }

    #[test]
    fn resolves_names_and_falls_back_to_unknown() {
        let (db, _dir) = test_db();
        db.upsert_user(&UserId::new("landlord"), "Lana Lord", None, Some("l@x.io"))
            .unwrap();
        send(&db, "landlord", "me", "Viewing at 5?");
        send(&db, "deleted-account", "me", "still there?");

        let convos = db.list_conversations(&UserId::new("me")).unwrap();
        let unknown = convos
            .iter()
            .find(|c| c.user_id.as_str() == "deleted-account")
            .unwrap();
        assert_eq!(unknown.name, UNKNOWN_USER_NAME);
        assert_eq!(unknown.avatar, DEFAULT_AVATAR);

        let known = convos
            .iter()
            .find(|c| c.user_id.as_str() == "landlord")
            .unwrap();
        assert_eq!(known.name, "Lana Lord");
        assert_eq!(known.email.as_deref(), Some("l@x.io"));
    }

    #[test]
    fn empty_for_user_without_messages() {
        let (db, _dir) = test_db();
        send(&db, "x", "y", "hello");
        assert!(db.list_conversations(&UserId::new("z")).unwrap().is_empty());
    }
}

//! Domain model structs persisted in (or derived from) the SQLite database.
//!
//! Every struct derives `Serialize` so it can be handed directly to the HTTP
//! layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentease_shared::protocol::SendMessagePayload;
use rentease_shared::types::{MediaKind, UserId};

pub use rentease_shared::protocol::Message;

// ---------------------------------------------------------------------------
// NewMessage
// ---------------------------------------------------------------------------

/// A message as submitted by a sender, before the store assigns its id and
/// timestamp.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    #[serde(default)]
    pub sender_id: UserId,
    #[serde(default)]
    pub receiver_id: UserId,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, rename = "image")]
    pub media: Option<String>,
    #[serde(default)]
    pub media_type: Option<MediaKind>,
    #[serde(default)]
    pub property: Option<String>,
}

impl NewMessage {
    pub fn text(sender: impl Into<UserId>, receiver: impl Into<UserId>, text: &str) -> Self {
        Self {
            sender_id: sender.into(),
            receiver_id: receiver.into(),
            text: Some(text.to_string()),
            ..Default::default()
        }
    }
}

impl From<SendMessagePayload> for NewMessage {
    fn from(p: SendMessagePayload) -> Self {
        Self {
            sender_id: p.sender_id,
            receiver_id: p.receiver_id,
            text: p.text,
            media: p.image,
            media_type: p.media_type,
            property: p.property,
        }
    }
}

/// Whether [`Database::persist`](crate::Database::persist) accepts a message
/// with neither text nor media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentPolicy {
    /// Store it anyway; clients render a placeholder.
    Allow,
    /// Reject with [`StoreError::Validation`](crate::StoreError::Validation).
    Require,
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A user record in the local directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub full_name: String,
    pub avatar: Option<String>,
    pub email: Option<String>,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ConversationSummary
// ---------------------------------------------------------------------------

/// One entry of a user's conversation list. Derived on demand, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    /// The counterpart, relative to the viewing user.
    pub user_id: UserId,
    pub name: String,
    pub avatar: String,
    pub email: Option<String>,
    pub last_message: Option<String>,
    pub last_media_type: Option<MediaKind>,
    pub last_message_time: DateTime<Utc>,
    /// Messages from the counterpart to the viewer that are still unread.
    pub unread_count: u32,
}

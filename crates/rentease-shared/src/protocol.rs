//! JSON wire protocol of the realtime chat socket.
//!
//! Every text frame is an envelope `{"event": <name>, "data": <payload>}`.
//! Event and field names are camelCase to match the browser client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::{MediaKind, MessageId, PresenceStatus, UserId};

/// A persisted chat message as seen by clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "_id", alias = "id")]
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub text: Option<String>,
    /// Media payload reference (a data URL or an upload URL).
    #[serde(rename = "image")]
    pub media: Option<String>,
    pub media_type: Option<MediaKind>,
    pub is_read: bool,
    pub is_delivered: bool,
    /// Listing the conversation was started from, if any.
    pub property: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn has_content(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty()) || self.media.is_some()
    }
}

/// Events sent by the browser client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Announce the identity of this connection.
    Join(UserId),
    SendMessage(SendMessagePayload),
    MessageRead(ReadReceipt),
    Typing(TypingPayload),
    StopTyping(TypingPayload),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    #[serde(default)]
    pub sender_id: UserId,
    #[serde(default)]
    pub receiver_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<MediaKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
}

impl SendMessagePayload {
    /// Length of the payload re-serialized as JSON, the figure checked
    /// against the configured size limit.
    pub fn serialized_len(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(usize::MAX)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub message_id: MessageId,
    /// Original author of the message being acknowledged.
    pub sender_id: UserId,
    /// The reader.
    pub receiver_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub sender_id: UserId,
    pub receiver_id: UserId,
}

/// Events pushed by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    ReceiveMessage(Message),
    MessageSent {
        success: bool,
        message_id: MessageId,
        is_delivered: bool,
    },
    MessageDelivered {
        message_id: MessageId,
    },
    MessageReadConfirm {
        message_id: MessageId,
        receiver_id: UserId,
    },
    UserStatusChange {
        user_id: UserId,
        status: PresenceStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        last_seen: Option<DateTime<Utc>>,
    },
    UserTyping {
        sender_id: UserId,
    },
    UserStoppedTyping {
        sender_id: UserId,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ReceiveMessage(_) => "receiveMessage",
            Self::MessageSent { .. } => "messageSent",
            Self::MessageDelivered { .. } => "messageDelivered",
            Self::MessageReadConfirm { .. } => "messageReadConfirm",
            Self::UserStatusChange { .. } => "userStatusChange",
            Self::UserTyping { .. } => "userTyping",
            Self::UserStoppedTyping { .. } => "userStoppedTyping",
            Self::Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }
}

impl ClientEvent {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_join() {
        let ev = ClientEvent::from_json(r#"{"event":"join","data":"u1"}"#).unwrap();
        assert!(matches!(ev, ClientEvent::Join(id) if id.as_str() == "u1"));
    }

    #[test]
    fn test_parse_send_message_without_media() {
        let ev = ClientEvent::from_json(
            r#"{"event":"sendMessage","data":{"senderId":"a","receiverId":"b","text":"Hi"}}"#,
        )
        .unwrap();
        let ClientEvent::SendMessage(p) = ev else {
            panic!("expected sendMessage");
        };
        assert_eq!(p.sender_id.as_str(), "a");
        assert_eq!(p.text.as_deref(), Some("Hi"));
        assert!(p.image.is_none());
    }

    #[test]
    fn test_missing_ids_parse_as_blank() {
        let ev =
            ClientEvent::from_json(r#"{"event":"sendMessage","data":{"text":"Hi"}}"#).unwrap();
        let ClientEvent::SendMessage(p) = ev else {
            panic!("expected sendMessage");
        };
        assert!(p.sender_id.is_blank());
    }

    #[test]
    fn test_unknown_event_rejected() {
        let err = ClientEvent::from_json(r#"{"event":"shout","data":{}}"#).unwrap_err();
        assert!(err.to_string().starts_with("Invalid event"));
    }

    #[test]
    fn test_server_event_envelope() {
        let ev = ServerEvent::UserStatusChange {
            user_id: UserId::new("u1"),
            status: PresenceStatus::Online,
            last_seen: None,
        };
        let v: serde_json::Value = serde_json::from_str(&ev.to_json().unwrap()).unwrap();
        assert_eq!(v["event"], "userStatusChange");
        assert_eq!(v["data"]["userId"], "u1");
        assert_eq!(v["data"]["status"], "online");
        assert!(v["data"].get("lastSeen").is_none());
    }

    #[test]
    fn test_message_sent_field_names() {
        let id = MessageId::new();
        let ev = ServerEvent::MessageSent {
            success: true,
            message_id: id,
            is_delivered: false,
        };
        let v: serde_json::Value = serde_json::from_str(&ev.to_json().unwrap()).unwrap();
        assert_eq!(v["data"]["messageId"], id.to_string());
        assert_eq!(v["data"]["isDelivered"], false);
    }
}

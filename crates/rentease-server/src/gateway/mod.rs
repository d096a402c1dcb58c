//! Realtime gateway: per-connection event handling for the chat socket.
//!
//! The gateway owns no socket. A transport (see [`socket`]) calls
//! [`Gateway::open`] for every new connection, feeds inbound events to
//! [`Gateway::handle`] one at a time, drains the returned receiver into the
//! socket, and finally calls [`Gateway::close`]. Events from one connection
//! are therefore processed in arrival order; nothing orders events across
//! connections.

mod session;
pub mod socket;

pub use session::Session;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use rentease_shared::constants::DEFAULT_MAX_MESSAGE_BYTES;
use rentease_shared::delivery::DeliveryEvent;
use rentease_shared::protocol::{
    ClientEvent, ReadReceipt, SendMessagePayload, ServerEvent, TypingPayload,
};
use rentease_shared::types::{PresenceStatus, UserId};
use rentease_store::ContentPolicy;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::presence::PresenceRegistry;
use crate::rooms::{EventReceiver, RoomHub};
use crate::store::MessageStore;

/// Which connections receive events relayed to an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayMode {
    /// Only the connection currently held by the presence registry.
    #[default]
    LastJoinWins,
    /// Every connection that joined as the identity.
    FanOut,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub max_message_bytes: usize,
    pub content_policy: ContentPolicy,
    pub relay_mode: RelayMode,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            content_policy: ContentPolicy::Allow,
            relay_mode: RelayMode::LastJoinWins,
        }
    }
}

impl From<&ServerConfig> for GatewayConfig {
    fn from(config: &ServerConfig) -> Self {
        Self {
            max_message_bytes: config.max_message_bytes,
            content_policy: if config.require_message_content {
                ContentPolicy::Require
            } else {
                ContentPolicy::Allow
            },
            relay_mode: config.relay_mode,
        }
    }
}

#[derive(Clone)]
pub struct Gateway {
    store: MessageStore,
    presence: PresenceRegistry,
    hub: RoomHub,
    config: Arc<GatewayConfig>,
}

impl Gateway {
    pub fn new(
        store: MessageStore,
        presence: PresenceRegistry,
        hub: RoomHub,
        config: GatewayConfig,
    ) -> Self {
        Self {
            store,
            presence,
            hub,
            config: Arc::new(config),
        }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    pub fn hub(&self) -> &RoomHub {
        &self.hub
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// Accept a new connection in the `Connected` state.
    pub async fn open(&self) -> (Session, EventReceiver) {
        let (connection, rx) = self.hub.attach().await;
        info!(conn = %connection, "Client connected");
        (Session::new(connection), rx)
    }

    /// Decode one text frame and handle it. Undecodable frames are answered
    /// with an `error` event.
    pub async fn handle_text(&self, session: &mut Session, text: &str) {
        match ClientEvent::from_json(text) {
            Ok(event) => self.handle(session, event).await,
            Err(e) => {
                debug!(conn = %session.connection(), error = %e, "Rejected frame");
                self.reply(session, ServerEvent::error(e.to_string())).await;
            }
        }
    }

    pub async fn handle(&self, session: &mut Session, event: ClientEvent) {
        if session.is_closed() {
            return;
        }

        let (result, context) = match event {
            ClientEvent::Join(user) => (self.on_join(session, user).await, "join"),
            ClientEvent::SendMessage(payload) => (
                self.on_send_message(session, payload).await,
                "Failed to send message",
            ),
            ClientEvent::MessageRead(receipt) => (
                self.on_message_read(session, receipt).await,
                "Failed to mark message read",
            ),
            ClientEvent::Typing(payload) => (self.on_typing(session, payload, true).await, "typing"),
            ClientEvent::StopTyping(payload) => {
                (self.on_typing(session, payload, false).await, "stopTyping")
            }
        };

        if let Err(e) = result {
            let message = if e.status().is_server_error() {
                error!(conn = %session.connection(), error = %e, "{context}");
                format!("{context}: {}", e.public_message())
            } else {
                debug!(conn = %session.connection(), error = %e, "Event rejected");
                e.public_message()
            };
            self.reply(session, ServerEvent::error(message)).await;
        }
    }

    /// Tear down a connection: leave presence, broadcast offline, detach.
    pub async fn close(&self, session: &mut Session) {
        if session.is_closed() {
            return;
        }
        let connection = session.connection();
        session.disconnect();

        self.hub.detach(connection).await;

        if let Some(user) = self.presence.leave(connection).await {
            self.announce_offline(user).await;
        }

        info!(conn = %connection, "Client disconnected");
    }

    // ------------------------------------------------------------------
    // Event handlers
    // ------------------------------------------------------------------

    async fn on_join(&self, session: &mut Session, user: UserId) -> Result<(), ServerError> {
        if user.is_blank() {
            return Err(ServerError::Validation("userId is required".into()));
        }
        let connection = session.connection();

        if let Some(previous) = session.user().cloned() {
            if previous != user {
                self.hub.unsubscribe(&previous, connection).await;
                if self.presence.leave(connection).await.is_some() {
                    self.announce_offline(previous).await;
                }
            }
        }

        self.presence.join(user.clone(), connection).await;
        self.hub.subscribe(&user, connection).await;
        session.join(user.clone());

        if let Err(e) = self.store.set_user_online(user.clone(), true, Utc::now()).await {
            warn!(user = %user, error = %e, "Failed to record online status");
        }

        self.hub
            .broadcast(ServerEvent::UserStatusChange {
                user_id: user.clone(),
                status: PresenceStatus::Online,
                last_seen: None,
            })
            .await;

        info!(user = %user, conn = %connection, "User joined");
        Ok(())
    }

    async fn on_send_message(
        &self,
        session: &Session,
        payload: SendMessagePayload,
    ) -> Result<(), ServerError> {
        if session.user().is_none() {
            return Err(ServerError::NotJoined);
        }

        let size = payload.serialized_len();
        if size > self.config.max_message_bytes {
            warn!(
                conn = %session.connection(),
                size,
                max = self.config.max_message_bytes,
                "Message rejected: too large"
            );
            return Err(ServerError::PayloadTooLarge {
                size,
                max: self.config.max_message_bytes,
            });
        }

        let mut message = self
            .store
            .persist(payload.into(), self.config.content_policy)
            .await?;

        if !message.has_content() {
            warn!(id = %message.id, sender = %message.sender_id, "Stored message without content");
        }

        // Relay first: a message counts as delivered only once a live
        // connection accepted it.
        let mut relayed = message.clone();
        relayed.apply(DeliveryEvent::Delivered);
        let receiver = message.receiver_id.clone();
        let delivered = self
            .relay(&receiver, ServerEvent::ReceiveMessage(relayed))
            .await;

        if delivered {
            self.store.mark_delivered(message.id).await?;
            message.apply(DeliveryEvent::Delivered);
            self.reply(
                session,
                ServerEvent::MessageDelivered {
                    message_id: message.id,
                },
            )
            .await;
            debug!(id = %message.id, from = %message.sender_id, to = %receiver, "Message delivered");
        } else {
            debug!(id = %message.id, to = %receiver, "Receiver offline");
        }

        self.reply(
            session,
            ServerEvent::MessageSent {
                success: true,
                message_id: message.id,
                is_delivered: message.is_delivered,
            },
        )
        .await;

        Ok(())
    }

    async fn on_message_read(
        &self,
        session: &Session,
        receipt: ReadReceipt,
    ) -> Result<(), ServerError> {
        if session.user().is_none() {
            return Err(ServerError::NotJoined);
        }

        self.store.mark_message_read(receipt.message_id).await?;

        self.relay(
            &receipt.sender_id,
            ServerEvent::MessageReadConfirm {
                message_id: receipt.message_id,
                receiver_id: receipt.receiver_id,
            },
        )
        .await;

        Ok(())
    }

    async fn on_typing(
        &self,
        session: &Session,
        payload: TypingPayload,
        started: bool,
    ) -> Result<(), ServerError> {
        if session.user().is_none() {
            return Err(ServerError::NotJoined);
        }

        let event = if started {
            ServerEvent::UserTyping {
                sender_id: payload.sender_id,
            }
        } else {
            ServerEvent::UserStoppedTyping {
                sender_id: payload.sender_id,
            }
        };
        self.relay(&payload.receiver_id, event).await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Delivery helpers
    // ------------------------------------------------------------------

    /// Send an event to an online identity. Offline targets and dead
    /// handles are silently skipped.
    async fn relay(&self, user: &UserId, event: ServerEvent) -> bool {
        let Some(connection) = self.presence.lookup(user).await else {
            return false;
        };
        match self.config.relay_mode {
            RelayMode::LastJoinWins => self.hub.send_to(connection, event).await,
            RelayMode::FanOut => self.hub.publish(user, event).await > 0,
        }
    }

    async fn reply(&self, session: &Session, event: ServerEvent) {
        self.hub.send_to(session.connection(), event).await;
    }

    async fn announce_offline(&self, user: UserId) {
        let now = Utc::now();
        if let Err(e) = self.store.set_user_online(user.clone(), false, now).await {
            warn!(user = %user, error = %e, "Failed to record offline status");
        }

        self.hub
            .broadcast(ServerEvent::UserStatusChange {
                user_id: user,
                status: PresenceStatus::Offline,
                last_seen: Some(now),
            })
            .await;
    }
}

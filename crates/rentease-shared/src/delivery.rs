//! Delivery lifecycle of a single chat message.
//!
//! ```text
//! Sent ──delivered──▶ Delivered ──read──▶ Read
//!   └──────────────read───────────────────▲
//! ```
//!
//! Transitions are monotonic and idempotent: replaying an event never moves
//! a message backwards. `Sent → Read` is legal because a fast reader can
//! acknowledge before the delivered flag is written; in that case the stored
//! `is_delivered` flag may stay `false` while the message is logically read.

use serde::{Deserialize, Serialize};

use crate::protocol::Message;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    Sent,
    Delivered,
    Read,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryEvent {
    /// The receiver was online and the message was relayed to it.
    Delivered,
    /// The receiver acknowledged reading the message.
    Read,
}

impl DeliveryState {
    pub fn from_flags(is_delivered: bool, is_read: bool) -> Self {
        if is_read {
            Self::Read
        } else if is_delivered {
            Self::Delivered
        } else {
            Self::Sent
        }
    }

    pub fn advance(self, event: DeliveryEvent) -> Self {
        let target = match event {
            DeliveryEvent::Delivered => Self::Delivered,
            DeliveryEvent::Read => Self::Read,
        };
        self.max(target)
    }
}

impl Message {
    pub fn delivery_state(&self) -> DeliveryState {
        DeliveryState::from_flags(self.is_delivered, self.is_read)
    }

    /// Apply a delivery event to the in-memory flags.
    ///
    /// Returns `true` if any flag changed.
    pub fn apply(&mut self, event: DeliveryEvent) -> bool {
        let flag = match event {
            DeliveryEvent::Delivered => &mut self.is_delivered,
            DeliveryEvent::Read => &mut self.is_read,
        };
        let changed = !*flag;
        *flag = true;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_is_monotonic() {
        let s = DeliveryState::Read.advance(DeliveryEvent::Delivered);
        assert_eq!(s, DeliveryState::Read);
        assert_eq!(
            DeliveryState::Sent.advance(DeliveryEvent::Delivered),
            DeliveryState::Delivered
        );
    }

    #[test]
    fn test_sent_can_jump_to_read() {
        assert_eq!(
            DeliveryState::Sent.advance(DeliveryEvent::Read),
            DeliveryState::Read
        );
        // Delivered flag lagging behind a fast read still reports Read.
        assert_eq!(DeliveryState::from_flags(false, true), DeliveryState::Read);
    }

    #[test]
    fn test_advance_is_idempotent() {
        let once = DeliveryState::Sent.advance(DeliveryEvent::Delivered);
        let twice = once.advance(DeliveryEvent::Delivered);
        assert_eq!(once, twice);
    }
}

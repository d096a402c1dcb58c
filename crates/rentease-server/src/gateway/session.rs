use rentease_shared::types::UserId;

use crate::rooms::ConnectionId;

/// Lifecycle of one socket connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Open, identity not yet announced.
    Connected,
    /// Identity announced with `join`.
    Joined(UserId),
    /// Terminal.
    Disconnected,
}

#[derive(Debug)]
pub struct Session {
    connection: ConnectionId,
    state: SessionState,
}

impl Session {
    pub fn new(connection: ConnectionId) -> Self {
        Self {
            connection,
            state: SessionState::Connected,
        }
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    #[cfg(test)]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn user(&self) -> Option<&UserId> {
        match &self.state {
            SessionState::Joined(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Disconnected
    }

    /// Move to `Joined(user)`, returning the identity previously joined on
    /// this connection. No-op once disconnected.
    pub fn join(&mut self, user: UserId) -> Option<UserId> {
        if self.is_closed() {
            return None;
        }
        match std::mem::replace(&mut self.state, SessionState::Joined(user)) {
            SessionState::Joined(previous) => Some(previous),
            _ => None,
        }
    }

    /// Move to `Disconnected`, returning the identity that was joined.
    pub fn disconnect(&mut self) -> Option<UserId> {
        match std::mem::replace(&mut self.state, SessionState::Disconnected) {
            SessionState::Joined(user) => Some(user),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let mut session = Session::new(ConnectionId(7));
        assert_eq!(session.state(), &SessionState::Connected);
        assert!(session.user().is_none());

        assert_eq!(session.join(UserId::new("a")), None);
        assert_eq!(session.user(), Some(&UserId::new("a")));

        assert_eq!(session.join(UserId::new("b")), Some(UserId::new("a")));

        assert_eq!(session.disconnect(), Some(UserId::new("b")));
        assert!(session.is_closed());
    }

    #[test]
    fn test_disconnected_is_terminal() {
        let mut session = Session::new(ConnectionId(1));
        session.disconnect();
        assert_eq!(session.join(UserId::new("a")), None);
        assert!(session.is_closed());
        assert_eq!(session.disconnect(), None);
    }
}

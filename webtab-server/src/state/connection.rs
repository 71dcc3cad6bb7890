use log::error;

/// The lifecycle of a connection session.  Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    /// The transport handshake is in progress
    Accepting,

    /// The dispatch loop and pumps are running
    Active,

    /// Work is cancelled, and the close frame is being sent
    Draining,

    /// Every tab is being killed and reaped.  Terminal.
    Closed,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Accepting
    }
}

impl ConnectionState {
    /// Moves to `next`, if it lies ahead of the current state
    pub fn advance(&mut self, next: ConnectionState) -> bool {
        if next <= *self {
            error!("refusing connection transition {:?} -> {:?}", self, next);
            return false;
        }

        *self = next;
        true
    }

    pub fn is_closed(&self) -> bool {
        *self == ConnectionState::Closed
    }
}

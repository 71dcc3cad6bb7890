//! The message types exchanged with the transport that carries frames to and from the peer.
//!
//! Inbound traffic is a stream of `Result<Vec<u8>, TransportError>` chunks.  Outbound traffic is
//! a sink of [Outgoing] values.  The websocket crate provides both halves for a live socket.

use thiserror::Error;

/// The close indicator sent to the peer when a connection ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseStatus {
    Normal,
    Error(String),
}

impl CloseStatus {
    pub fn is_normal(&self) -> bool {
        matches!(self, CloseStatus::Normal)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// One complete, encoded frame
    Frame(Vec<u8>),
    Close(CloseStatus),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer went away.  This is an expected end of the connection.
    #[error("the peer disconnected")]
    Disconnected,

    #[error("transport fault: {0}")]
    Fault(String),
}

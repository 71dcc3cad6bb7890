use std::{borrow::Cow, io::ErrorKind};
use tungstenite::{
    error::ProtocolError,
    protocol::{frame::coding::CloseCode, CloseFrame},
    Error,
};
use webtab_api::transport::{CloseStatus, TransportError};

// close frame payloads are limited to 125 bytes, two of which hold the code
const MAX_REASON_LEN: usize = 123;

/// Classifies a websocket error.  Errors caused by the peer going away are disconnects, and
/// protocol violations are faults.
pub fn transport_error(error: Error) -> TransportError {
    match error {
        Error::ConnectionClosed
        | Error::AlreadyClosed
        | Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            TransportError::Disconnected
        }
        Error::Io(ref io) if is_disconnect(io.kind()) => TransportError::Disconnected,
        error => TransportError::Fault(error.to_string()),
    }
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
    )
}

pub fn close_frame(status: CloseStatus) -> CloseFrame<'static> {
    match status {
        CloseStatus::Normal => CloseFrame {
            code: CloseCode::Normal,
            reason: Cow::Borrowed(""),
        },
        CloseStatus::Error(reason) => CloseFrame {
            code: CloseCode::Error,
            reason: Cow::Owned(truncate(reason, MAX_REASON_LEN)),
        },
    }
}

fn truncate(mut text: String, max_len: usize) -> String {
    if text.len() <= max_len {
        return text;
    }

    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }

    text.truncate(end);
    text
}

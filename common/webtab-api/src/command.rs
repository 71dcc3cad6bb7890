use crate::{
    frame::{deserialize_payload, serialize_payload, CodecError, WireMessage},
    tab::TabId,
};
use serde::{Deserialize, Serialize};

const OPEN_NEW_TAB: &str = "OpenNewTab";
const SEND_INPUT: &str = "SendInput";
const RESIZE_TAB: &str = "ResizeTab";

/// Commands sent by the client, applied by the connection's dispatch loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Spawns a new shell on a fresh pseudo-terminal.  Answered with a TabOpened event.
    OpenNewTab,

    /// Writes raw bytes to the stdin of the given tab
    SendInput(SendInput),

    /// Resizes the given tab
    ResizeTab(ResizeTab),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SendInput {
    pub tab_id: TabId,
    pub payload: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ResizeTab {
    pub tab_id: TabId,
    pub cols: u16,
    pub rows: u16,
}

impl WireMessage for Command {
    fn tag(&self) -> &'static str {
        match self {
            Command::OpenNewTab => OPEN_NEW_TAB,
            Command::SendInput(_) => SEND_INPUT,
            Command::ResizeTab(_) => RESIZE_TAB,
        }
    }

    fn encode_payload(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            Command::OpenNewTab => serialize_payload(&()),
            Command::SendInput(input) => serialize_payload(input),
            Command::ResizeTab(resize) => serialize_payload(resize),
        }
    }

    fn decode_payload(tag: &str, payload: &[u8]) -> Result<Self, CodecError> {
        match tag {
            OPEN_NEW_TAB => deserialize_payload::<()>(payload).map(|_| Command::OpenNewTab),
            SEND_INPUT => deserialize_payload(payload).map(Command::SendInput),
            RESIZE_TAB => deserialize_payload(payload).map(Command::ResizeTab),
            unknown => Err(CodecError::UnknownTag(unknown.to_string())),
        }
    }
}

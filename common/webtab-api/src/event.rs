use crate::{
    frame::{deserialize_payload, serialize_payload, CodecError, WireMessage, MAX_PAYLOAD_LEN},
    tab::TabId,
};
use serde::{Deserialize, Serialize};

const TAB_OPENED: &str = "TabOpened";
const STDOUT_STREAM: &str = "StdOutStream";

// the tab id (u32) and the data length prefix (u64), under fixint encoding
const STDOUT_HEADER_LEN: usize = 4 + 8;

/// The largest chunk of output that fits in a single StdOutStream frame
pub const MAX_STDOUT_CHUNK: usize = MAX_PAYLOAD_LEN - STDOUT_HEADER_LEN;

/// Events streamed from the server to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Acknowledges an OpenNewTab command, with the assigned id
    TabOpened(TabOpened),

    /// A chunk of output from the tab's process
    StdOutStream(StdOutStream),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TabOpened {
    pub id: TabId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StdOutStream {
    pub tab_id: TabId,
    pub data: Vec<u8>,
}

impl WireMessage for Event {
    fn tag(&self) -> &'static str {
        match self {
            Event::TabOpened(_) => TAB_OPENED,
            Event::StdOutStream(_) => STDOUT_STREAM,
        }
    }

    fn encode_payload(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            Event::TabOpened(opened) => serialize_payload(opened),
            Event::StdOutStream(stdout) => serialize_payload(stdout),
        }
    }

    fn decode_payload(tag: &str, payload: &[u8]) -> Result<Self, CodecError> {
        match tag {
            TAB_OPENED => deserialize_payload(payload).map(Event::TabOpened),
            STDOUT_STREAM => deserialize_payload(payload).map(Event::StdOutStream),
            unknown => Err(CodecError::UnknownTag(unknown.to_string())),
        }
    }
}

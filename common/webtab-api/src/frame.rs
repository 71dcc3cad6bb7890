//! The wire envelope shared by commands and events.
//!
//! A frame is `[u16 BE tag length][tag, utf-8][u32 BE payload length][payload]`.  The tag names
//! the message variant, and the payload is the bincode encoding of that variant's fields.
//! Because the payload is length-prefixed, a receiver can skip a frame it does not understand.
//!
//! Decoding tolerates partial delivery.  [decode] reports how many bytes a frame occupied, and
//! [FrameBuffer] retains trailing bytes until the rest of the frame arrives.

use bincode::Options;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// The hard upper bound on a declared payload length
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

const TAG_LEN_BYTES: usize = 2;
const PAYLOAD_LEN_BYTES: usize = 4;

/// A message that travels inside a frame envelope
pub trait WireMessage: Sized {
    /// The tag written into the envelope for this value
    fn tag(&self) -> &'static str;

    fn encode_payload(&self) -> Result<Vec<u8>, CodecError>;

    /// Reconstructs a value from an envelope's tag and payload
    fn decode_payload(tag: &str, payload: &[u8]) -> Result<Self, CodecError>;
}

/// Errors for a single frame.  The frame can be skipped, and the stream remains usable.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unknown message tag: {0:?}")]
    UnknownTag(String),

    #[error("message tag is not valid utf-8")]
    InvalidTag,

    #[error("message tag is {0} bytes, longer than the envelope allows")]
    TagTooLong(usize),

    #[error("payload is {0} bytes, larger than the envelope allows")]
    PayloadTooLarge(usize),

    #[error("payload encoding: {0}")]
    Payload(#[from] bincode::Error),
}

/// Errors that leave the byte stream unusable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("declared payload length {declared} exceeds the limit of {limit} bytes")]
    PayloadTooLarge { declared: usize, limit: usize },
}

/// The result of decoding from the front of a buffer
#[derive(Debug)]
pub enum Decoded<M> {
    /// A complete frame, which occupied `consumed` bytes
    Frame { value: M, consumed: usize },

    /// The buffer holds a fraction of a frame
    NeedMoreData,

    /// A complete frame that could not be decoded.  Skip `consumed` bytes and continue.
    Malformed { consumed: usize, error: CodecError },
}

fn payload_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_PAYLOAD_LEN as u64)
        .reject_trailing_bytes()
}

pub fn serialize_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    Ok(payload_options().serialize(value)?)
}

pub fn deserialize_payload<T: DeserializeOwned>(payload: &[u8]) -> Result<T, CodecError> {
    Ok(payload_options().deserialize(payload)?)
}

/// Encodes a message into a self-contained frame
pub fn encode<M: WireMessage>(message: &M) -> Result<Vec<u8>, CodecError> {
    let tag = message.tag().as_bytes();
    if tag.len() > u16::MAX as usize {
        return Err(CodecError::TagTooLong(tag.len()));
    }

    let payload = message.encode_payload()?;
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(CodecError::PayloadTooLarge(payload.len()));
    }

    let mut frame =
        Vec::with_capacity(TAG_LEN_BYTES + tag.len() + PAYLOAD_LEN_BYTES + payload.len());
    frame.extend_from_slice(&(tag.len() as u16).to_be_bytes());
    frame.extend_from_slice(tag);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload.as_slice());

    Ok(frame)
}

/// Decodes one frame from the front of `buffer`
pub fn decode<M: WireMessage>(buffer: &[u8]) -> Result<Decoded<M>, FrameError> {
    if buffer.len() < TAG_LEN_BYTES {
        return Ok(Decoded::NeedMoreData);
    }

    let tag_len = u16::from_be_bytes([buffer[0], buffer[1]]) as usize;
    let tag_end = TAG_LEN_BYTES + tag_len;
    let payload_start = tag_end + PAYLOAD_LEN_BYTES;

    if buffer.len() < payload_start {
        return Ok(Decoded::NeedMoreData);
    }

    let mut len_bytes = [0u8; PAYLOAD_LEN_BYTES];
    len_bytes.copy_from_slice(&buffer[tag_end..payload_start]);
    let payload_len = u32::from_be_bytes(len_bytes) as usize;

    if payload_len > MAX_PAYLOAD_LEN {
        return Err(FrameError::PayloadTooLarge {
            declared: payload_len,
            limit: MAX_PAYLOAD_LEN,
        });
    }

    let consumed = payload_start + payload_len;
    if buffer.len() < consumed {
        return Ok(Decoded::NeedMoreData);
    }

    let tag = &buffer[TAG_LEN_BYTES..tag_end];
    let payload = &buffer[payload_start..consumed];

    let decoded = std::str::from_utf8(tag)
        .map_err(|_| CodecError::InvalidTag)
        .and_then(|tag| M::decode_payload(tag, payload));

    match decoded {
        Ok(value) => Ok(Decoded::Frame { value, consumed }),
        Err(error) => Ok(Decoded::Malformed { consumed, error }),
    }
}

/// Accumulates inbound bytes, and hands out complete frames as they become available
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buffer: Vec<u8>,
    start: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        if self.start > 0 {
            self.buffer.drain(..self.start);
            self.start = 0;
        }

        self.buffer.extend_from_slice(bytes);
    }

    /// The number of retained bytes that have not been consumed
    pub fn len(&self) -> usize {
        self.buffer.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn decode<M: WireMessage>(&self) -> Result<Decoded<M>, FrameError> {
        decode(&self.buffer[self.start..])
    }

    /// Moves the read cursor past `consumed` bytes
    pub fn advance(&mut self, consumed: usize) {
        self.start = (self.start + consumed).min(self.buffer.len());
    }

    /// Decodes the next frame, and advances past it if it was complete
    pub fn next_frame<M: WireMessage>(&mut self) -> Result<Decoded<M>, FrameError> {
        let decoded = self.decode()?;

        match &decoded {
            Decoded::Frame { consumed, .. } | Decoded::Malformed { consumed, .. } => {
                self.advance(*consumed)
            }
            Decoded::NeedMoreData => {}
        }

        Ok(decoded)
    }
}

use futures::{Sink, SinkExt};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use webtab_api::{
    event::Event,
    frame::{self, CodecError},
    transport::{CloseStatus, Outgoing, TransportError},
};

/// The connection's single outbound channel, shared by the dispatch loop and every pump.
///
/// Each frame is encoded, sent and flushed while holding the lock, so frames from concurrent
/// writers never interleave, and frames from one writer arrive in the order they were written.
///
/// Once the sink fails or is closed, it is never polled again.  Later writes report
/// [TransportError::Disconnected].
pub struct OutboundWriter<O> {
    sink: Arc<Mutex<Outbound<O>>>,
}

struct Outbound<O> {
    sink: O,
    closed: bool,
}

impl<O> Outbound<O>
where
    O: Sink<Outgoing, Error = TransportError> + Unpin,
{
    async fn send(&mut self, outgoing: Outgoing) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Disconnected);
        }

        let sent = self.sink.send(outgoing).await;
        if sent.is_err() {
            self.closed = true;
        }

        sent
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Disconnected);
        }

        self.closed = true;
        self.sink.close().await
    }
}

impl<O> Clone for OutboundWriter<O> {
    fn clone(&self) -> Self {
        Self {
            sink: self.sink.clone(),
        }
    }
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("failed to encode frame: {0}")]
    Encode(#[from] CodecError),

    #[error("failed to write frame: {0}")]
    Transport(#[from] TransportError),
}

impl WriteError {
    /// True if the peer has gone away, and no further frames can be delivered
    pub fn is_closed(&self) -> bool {
        matches!(self, WriteError::Transport(TransportError::Disconnected))
    }
}

impl<O> OutboundWriter<O>
where
    O: Sink<Outgoing, Error = TransportError> + Unpin + Send + 'static,
{
    pub fn new(sink: O) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Outbound {
                sink,
                closed: false,
            })),
        }
    }

    pub async fn write_event(&self, event: &Event) -> Result<(), WriteError> {
        let frame = frame::encode(event)?;

        let mut sink = self.sink.lock().await;
        sink.send(Outgoing::Frame(frame)).await?;

        Ok(())
    }

    /// Sends the close indicator, and closes the sink
    pub async fn close(&self, status: CloseStatus) -> Result<(), WriteError> {
        let mut sink = self.sink.lock().await;
        sink.send(Outgoing::Close(status)).await?;
        sink.close().await?;

        Ok(())
    }
}

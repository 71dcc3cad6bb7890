use crate::{
    outbound::OutboundWriter,
    service::pump::TabPump,
    state::registry::{TabRegistry, TabSession},
};
use anyhow::Context;
use futures::{Sink, Stream, StreamExt};
use log::{debug, error, info, trace, warn};
use std::sync::Arc;
use thiserror::Error;
use tokio::select;
use tokio_util::sync::CancellationToken;
use webtab_api::{
    command::{Command, ResizeTab, SendInput},
    event::{Event, TabOpened},
    frame::{Decoded, FrameBuffer, FrameError},
    transport::{Outgoing, TransportError},
};
use webtab_pty_process::{PtyOptions, PtySystem, PtySystemInstance, Size};

/// Why the dispatch loop stopped, for exits that are part of normal operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchExit {
    /// The inbound stream completed
    EndOfInput,

    /// The connection's cancellation token fired
    Cancelled,

    /// The peer went away without closing
    Disconnected,
}

/// A fault that ends the connection with an error close
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("transport fault: {0}")]
    Transport(String),

    #[error("framing violation: {0}")]
    Frame(#[from] FrameError),
}

/// The connection's single consumer of inbound bytes.
///
/// Decodes commands from the inbound stream, and applies them to the tab registry.
pub struct Dispatcher<P: PtySystem, O> {
    pty: Arc<P>,
    options: PtyOptions,
    registry: TabRegistry<P>,
    writer: OutboundWriter<O>,
    cancel: CancellationToken,
    max_chunk: usize,
    frames: FrameBuffer,
}

impl<P, O> Dispatcher<P, O>
where
    P: PtySystem,
    O: Sink<Outgoing, Error = TransportError> + Unpin + Send + 'static,
{
    pub fn new(
        pty: Arc<P>,
        options: PtyOptions,
        writer: OutboundWriter<O>,
        cancel: CancellationToken,
        max_chunk: usize,
    ) -> Self {
        Self {
            pty,
            options,
            registry: TabRegistry::new(),
            writer,
            cancel,
            max_chunk,
            frames: FrameBuffer::new(),
        }
    }

    pub fn registry(&self) -> &TabRegistry<P> {
        &self.registry
    }

    /// Removes every tab from the registry, for teardown
    pub fn take_sessions(&mut self) -> Vec<TabSession<P>> {
        self.registry.drain()
    }

    /// Runs until the inbound stream completes, the connection is cancelled, or a fault occurs.
    ///
    /// Malformed frames and failed commands are logged and skipped.
    pub async fn run<I>(&mut self, inbound: &mut I) -> Result<DispatchExit, ConnectionError>
    where
        I: Stream<Item = Result<Vec<u8>, TransportError>> + Unpin + Send,
    {
        loop {
            let next = select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(DispatchExit::Cancelled),
                next = inbound.next() => next,
            };

            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                None => {
                    if !self.frames.is_empty() {
                        debug!(
                            "discarding {} bytes of an incomplete frame",
                            self.frames.len()
                        );
                    }

                    return Ok(DispatchExit::EndOfInput);
                }
                Some(Err(TransportError::Disconnected)) => return Ok(DispatchExit::Disconnected),
                Some(Err(TransportError::Fault(fault))) => {
                    return Err(ConnectionError::Transport(fault))
                }
            };

            trace!("received {} bytes", chunk.len());
            self.frames.push(chunk.as_slice());

            loop {
                if self.cancel.is_cancelled() {
                    return Ok(DispatchExit::Cancelled);
                }

                match self.frames.next_frame::<Command>()? {
                    Decoded::Frame { value, .. } => {
                        if let Err(e) = self.dispatch(value).await {
                            error!("command failed: {:#}", e);
                        }
                    }
                    Decoded::Malformed { consumed, error } => {
                        warn!("skipping malformed frame of {} bytes: {}", consumed, error);
                    }
                    Decoded::NeedMoreData => break,
                }
            }
        }
    }

    async fn dispatch(&mut self, command: Command) -> anyhow::Result<()> {
        trace!("dispatching {:?}", &command);

        match command {
            Command::OpenNewTab => self.open_tab().await,
            Command::SendInput(input) => self.send_input(input).await,
            Command::ResizeTab(resize) => self.resize_tab(resize).await,
        }
    }

    async fn open_tab(&mut self) -> anyhow::Result<()> {
        let id = self.registry.allocate_id();

        let PtySystemInstance {
            child,
            master,
            read,
            write,
        } = self
            .pty
            .spawn(&self.options)
            .with_context(|| format!("failed to start {}", id))?;

        let session = TabSession::new(id, child, master, write);
        let alive = session.alive_flag();
        info!("opened {} (pid {:?})", id, session.pid());
        self.registry.insert(session);

        let opened = Event::TabOpened(TabOpened { id });
        select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(()),
            written = self.writer.write_event(&opened) => {
                written.with_context(|| format!("failed to acknowledge {}", id))?
            },
        }

        let pump = TabPump {
            tab_id: id,
            read,
            writer: self.writer.clone(),
            alive,
            cancel: self.cancel.clone(),
            max_chunk: self.max_chunk,
        }
        .spawn();

        if let Some(session) = self.registry.get_mut(id) {
            session.attach_pump(pump);
        }

        Ok(())
    }

    async fn send_input(&mut self, input: SendInput) -> anyhow::Result<()> {
        let session = match self.registry.get_mut(input.tab_id) {
            Some(session) => session,
            None => {
                debug!("ignoring input for unknown {}", input.tab_id);
                return Ok(());
            }
        };

        if !session.is_alive() {
            debug!("ignoring input for exited {}", input.tab_id);
            return Ok(());
        }

        select! {
            biased;
            _ = self.cancel.cancelled() => {},
            written = session.write_input(input.payload.as_slice()) => {
                written.with_context(|| format!("failed to write input to {}", input.tab_id))?;
                trace!("wrote {} bytes to {}", input.payload.len(), input.tab_id);
            },
        }

        Ok(())
    }

    async fn resize_tab(&mut self, resize: ResizeTab) -> anyhow::Result<()> {
        let session = match self.registry.get(resize.tab_id) {
            Some(session) => session,
            None => {
                debug!("ignoring resize for unknown {}", resize.tab_id);
                return Ok(());
            }
        };

        let size = Size {
            cols: resize.cols,
            rows: resize.rows,
        };

        debug!("resizing {} to {:?}", resize.tab_id, size);
        session
            .resize(size)
            .await
            .with_context(|| format!("failed to resize {}", resize.tab_id))
    }
}

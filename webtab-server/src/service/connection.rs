use crate::{
    config::ConnectionConfig,
    outbound::OutboundWriter,
    service::dispatch::Dispatcher,
    state::connection::ConnectionState,
};
use futures::{Sink, Stream};
use log::{debug, error, info, warn};
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use webtab_api::transport::{CloseStatus, Outgoing, TransportError};
use webtab_pty_process::PtySystem;

/// Owns one socket's lifecycle: `Accepting -> Active -> Draining -> Closed`.
///
/// However the dispatch loop ends, the session cancels every pump, sends a close frame, then
/// kills and reaps every tab it opened.
pub struct ConnectionSession<P: PtySystem, O> {
    state: ConnectionState,
    dispatcher: Dispatcher<P, O>,
    writer: OutboundWriter<O>,
    cancel: CancellationToken,
    close_timeout: Duration,
}

impl<P, O> ConnectionSession<P, O>
where
    P: PtySystem,
    O: Sink<Outgoing, Error = TransportError> + Unpin + Send + 'static,
{
    /// Creates a session for a transport whose handshake is in progress or complete
    pub fn new(
        pty: Arc<P>,
        config: ConnectionConfig,
        outbound: O,
        cancel: CancellationToken,
    ) -> Self {
        let writer = OutboundWriter::new(outbound);
        let dispatcher = Dispatcher::new(
            pty,
            config.pty,
            writer.clone(),
            cancel.clone(),
            config.max_chunk,
        );

        Self {
            state: ConnectionState::Accepting,
            dispatcher,
            writer,
            cancel,
            close_timeout: config.close_timeout,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Runs the session to completion, and returns the close status sent to the peer
    pub async fn run<I>(mut self, mut inbound: I) -> CloseStatus
    where
        I: Stream<Item = Result<Vec<u8>, TransportError>> + Unpin + Send,
    {
        self.transition(ConnectionState::Active);

        let status = match self.dispatcher.run(&mut inbound).await {
            Ok(exit) => {
                info!("connection ending: {:?}", exit);
                CloseStatus::Normal
            }
            Err(e) => {
                error!("connection fault: {}", e);
                CloseStatus::Error(e.to_string())
            }
        };

        self.transition(ConnectionState::Draining);
        self.cancel.cancel();
        drop(inbound);
        self.send_close(status.clone()).await;

        self.transition(ConnectionState::Closed);
        self.terminate_tabs().await;

        status
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state.advance(next) {
            debug!("connection state: {:?}", next);
        }
    }

    async fn send_close(&self, status: CloseStatus) {
        match timeout(self.close_timeout, self.writer.close(status)).await {
            Ok(Ok(())) => debug!("close frame sent"),
            Ok(Err(e)) if e.is_closed() => debug!("transport already closed"),
            Ok(Err(e)) => warn!("failed to send close frame: {}", e),
            Err(_elapsed) => warn!(
                "close frame not sent within {} ms",
                self.close_timeout.as_millis()
            ),
        }
    }

    /// Kills every tab, then waits for each to exit
    async fn terminate_tabs(&mut self) {
        let mut sessions = self.dispatcher.take_sessions();
        if sessions.is_empty() {
            return;
        }

        for session in sessions.iter_mut() {
            session.kill().await;
        }

        for session in sessions {
            let id = session.id();
            match session.wait().await {
                Ok(status) => debug!("{} exited: {}", id, status),
                Err(e) => error!("failed to wait for {}: {}", id, e),
            }
        }

        info!("connection closed, all tabs terminated");
    }
}

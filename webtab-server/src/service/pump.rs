use crate::outbound::OutboundWriter;
use futures::Sink;
use lifeline::{Lifeline, Task};
use log::{debug, error, trace};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    select,
};
use tokio_util::sync::CancellationToken;
use webtab_api::{
    event::{Event, StdOutStream, MAX_STDOUT_CHUNK},
    tab::TabId,
    transport::{Outgoing, TransportError},
};

/// Forwards one tab's output to the connection, as StdOutStream events.
///
/// The pump stops when the output reaches end-of-stream, when the outbound channel closes, or
/// when the connection is cancelled.  Faults stop only this pump.
pub struct TabPump<R, O> {
    pub tab_id: TabId,
    pub read: R,
    pub writer: OutboundWriter<O>,
    pub alive: Arc<AtomicBool>,
    pub cancel: CancellationToken,
    pub max_chunk: usize,
}

impl<R, O> TabPump<R, O>
where
    R: AsyncRead + Send + Unpin + 'static,
    O: Sink<Outgoing, Error = TransportError> + Unpin + Send + 'static,
{
    /// Spawns the pump.  Dropping the returned lifeline aborts it.
    pub fn spawn(self) -> Lifeline {
        let name = format!("pump_{}", self.tab_id.0);
        Self::task(name.as_str(), self.run())
    }

    async fn run(self) {
        let TabPump {
            tab_id,
            mut read,
            writer,
            alive,
            cancel,
            max_chunk,
        } = self;

        let mut buffer = vec![0u8; max_chunk.clamp(1, MAX_STDOUT_CHUNK)];

        loop {
            let read = select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("{} pump cancelled", tab_id);
                    break;
                },
                read = read.read(buffer.as_mut_slice()) => read,
            };

            let len = match read {
                Ok(0) => {
                    debug!("{} output reached end-of-stream", tab_id);
                    break;
                }
                Ok(len) => len,
                Err(e) => {
                    error!("{} output read failed: {}", tab_id, e);
                    break;
                }
            };

            let event = Event::StdOutStream(StdOutStream {
                tab_id,
                data: buffer[..len].to_vec(),
            });

            let written = select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("{} pump cancelled", tab_id);
                    break;
                },
                written = writer.write_event(&event) => written,
            };

            match written {
                Ok(()) => trace!("{} forwarded {} bytes", tab_id, len),
                Err(e) if e.is_closed() => {
                    debug!("{} pump stopping, the connection is closed", tab_id);
                    break;
                }
                Err(e) => {
                    error!("{} pump stopping: {}", tab_id, e);
                    break;
                }
            }
        }

        alive.store(false, Ordering::SeqCst);
    }
}

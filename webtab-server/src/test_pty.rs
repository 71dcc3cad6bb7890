//! An in-memory PtySystem, and channel-backed transports, for connection tests.
//!
//! Each spawned fake tab is a pair of duplex pipes.  The test drives the "process" side through
//! a [FakeHandle]: it reads what the server wrote to stdin, and writes output for the pump.

use async_trait::async_trait;
use futures::{
    channel::mpsc::{self, SendError, UnboundedReceiver, UnboundedSender},
    sink::SinkMapErr,
    SinkExt,
};
use std::{
    io,
    os::unix::process::ExitStatusExt,
    process::ExitStatus,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};
use tokio::{
    io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream},
    sync::{watch, Mutex as AsyncMutex},
};
use webtab_api::{
    command::Command,
    event::Event,
    frame::{self, Decoded},
    transport::{Outgoing, TransportError},
};
use webtab_pty_process::{
    Child, Master, PtyOptions, PtySystem, PtySystemError, PtySystemInstance, Size,
};

const PIPE_CAPACITY: usize = 64 * 1024;

struct FakeState {
    options: PtyOptions,
    size: Mutex<Size>,
    resizes: Mutex<Vec<Size>>,
    killed: AtomicBool,
    waited: AtomicBool,
    exited: watch::Sender<bool>,
    output: AsyncMutex<Option<DuplexStream>>,
    input: AsyncMutex<DuplexStream>,
}

/// The test's view of a fake tab process
#[derive(Clone)]
pub struct FakeHandle {
    state: Arc<FakeState>,
}

impl FakeHandle {
    pub fn options(&self) -> &PtyOptions {
        &self.state.options
    }

    pub async fn write_output(&self, data: &[u8]) {
        let mut output = self.state.output.lock().await;
        if let Some(output) = output.as_mut() {
            output.write_all(data).await.expect("fake output write");
        }
    }

    pub async fn read_input(&self, len: usize) -> Vec<u8> {
        let mut input = self.state.input.lock().await;
        let mut buf = vec![0u8; len];
        input.read_exact(buf.as_mut_slice()).await.expect("fake input read");
        buf
    }

    /// Simulates the process exiting on its own
    pub async fn exit(&self) {
        // the pump sees end-of-stream once the process side of the pipe is gone
        self.state.output.lock().await.take();
        let _ = self.state.exited.send(true);
    }

    pub fn killed(&self) -> bool {
        self.state.killed.load(Ordering::SeqCst)
    }

    pub fn waited(&self) -> bool {
        self.state.waited.load(Ordering::SeqCst)
    }

    pub fn resizes(&self) -> Vec<Size> {
        self.state.resizes.lock().expect("resizes").clone()
    }
}

pub struct FakeChild {
    state: Arc<FakeState>,
    exited: watch::Receiver<bool>,
}

#[async_trait]
impl Child for FakeChild {
    fn id(&self) -> Option<u32> {
        None
    }

    async fn wait(mut self) -> io::Result<ExitStatus> {
        while !*self.exited.borrow() {
            if self.exited.changed().await.is_err() {
                break;
            }
        }

        self.state.waited.store(true, Ordering::SeqCst);
        Ok(ExitStatus::from_raw(0))
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.state.killed.store(true, Ordering::SeqCst);
        self.state.output.lock().await.take();
        let _ = self.state.exited.send(true);
        Ok(())
    }
}

pub struct FakeMaster {
    state: Arc<FakeState>,
}

#[async_trait]
impl Master for FakeMaster {
    async fn size(&self) -> io::Result<Size> {
        Ok(*self.state.size.lock().expect("size"))
    }

    async fn resize(&self, size: Size) -> io::Result<()> {
        *self.state.size.lock().expect("size") = size;
        self.state.resizes.lock().expect("resizes").push(size);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePtySystem {
    handles: Mutex<Vec<FakeHandle>>,
    fail: AtomicBool,
}

impl FakePtySystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent spawns fail
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn spawned(&self) -> usize {
        self.handles.lock().expect("handles").len()
    }

    pub fn handle(&self, index: usize) -> FakeHandle {
        self.handles.lock().expect("handles")[index].clone()
    }
}

impl PtySystem for FakePtySystem {
    type Child = FakeChild;
    type Master = FakeMaster;
    type MasterRead = DuplexStream;
    type MasterWrite = DuplexStream;

    fn spawn(&self, options: &PtyOptions) -> Result<PtySystemInstance<Self>, PtySystemError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PtySystemError::InvalidCommand(
                "fake spawn failure".to_string(),
            ));
        }

        let (read, process_output) = duplex(PIPE_CAPACITY);
        let (write, process_input) = duplex(PIPE_CAPACITY);
        let (exited, exited_rx) = watch::channel(false);

        let state = Arc::new(FakeState {
            options: options.clone(),
            size: Mutex::new(options.dimensions),
            resizes: Mutex::new(Vec::new()),
            killed: AtomicBool::new(false),
            waited: AtomicBool::new(false),
            exited,
            output: AsyncMutex::new(Some(process_output)),
            input: AsyncMutex::new(process_input),
        });

        self.handles.lock().expect("handles").push(FakeHandle {
            state: state.clone(),
        });

        Ok(PtySystemInstance {
            child: FakeChild {
                state: state.clone(),
                exited: exited_rx,
            },
            master: FakeMaster { state },
            read,
            write,
        })
    }
}

pub type TestOutbound = SinkMapErr<UnboundedSender<Outgoing>, fn(SendError) -> TransportError>;
pub type TestInbound = UnboundedReceiver<Result<Vec<u8>, TransportError>>;

fn disconnected(_err: SendError) -> TransportError {
    TransportError::Disconnected
}

/// An outbound sink whose frames can be inspected through the receiver
pub fn outbound_channel() -> (TestOutbound, UnboundedReceiver<Outgoing>) {
    let (tx, rx) = mpsc::unbounded();
    let map: fn(SendError) -> TransportError = disconnected;
    (tx.sink_map_err(map), rx)
}

/// An inbound stream fed by the sender
pub fn inbound_channel() -> (
    UnboundedSender<Result<Vec<u8>, TransportError>>,
    TestInbound,
) {
    mpsc::unbounded()
}

pub fn encode_command(command: &Command) -> Vec<u8> {
    frame::encode(command).expect("encode command")
}

pub fn decode_event(frame: &[u8]) -> Event {
    match frame::decode::<Event>(frame).expect("frame error") {
        Decoded::Frame { value, consumed } => {
            assert_eq!(frame.len(), consumed, "one event per outbound frame");
            value
        }
        other => panic!("expected an event, got {:?}", other),
    }
}

/// Drains every frame the server has written so far, skipping the close indicator
pub fn received_events(rx: &mut UnboundedReceiver<Outgoing>) -> Vec<Event> {
    let mut events = Vec::new();

    while let Ok(Some(outgoing)) = rx.try_next() {
        if let Outgoing::Frame(frame) = outgoing {
            events.push(decode_event(frame.as_slice()));
        }
    }

    events
}

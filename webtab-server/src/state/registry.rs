use lifeline::Lifeline;
use log::debug;
use std::{
    io,
    process::ExitStatus,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::io::AsyncWriteExt;
use webtab_api::tab::TabId;
use webtab_pty_process::{Child, Master, PtySystem, Size};

/// A running tab: the child process, its terminal, and the pump forwarding its output
pub struct TabSession<P: PtySystem> {
    id: TabId,
    child: P::Child,
    master: P::Master,
    input: P::MasterWrite,
    alive: Arc<AtomicBool>,
    pump: Option<Lifeline>,
}

impl<P: PtySystem> TabSession<P> {
    pub fn new(id: TabId, child: P::Child, master: P::Master, input: P::MasterWrite) -> Self {
        Self {
            id,
            child,
            master,
            input,
            alive: Arc::new(AtomicBool::new(true)),
            pump: None,
        }
    }

    pub fn id(&self) -> TabId {
        self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// False once the tab's pump has stopped forwarding output.
    ///
    /// The pump stops at end-of-stream, and also when the connection is cancelled or its
    /// outbound channel fails.  Input for a tab that is no longer alive is dropped.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// The liveness flag, shared with the tab's pump
    pub fn alive_flag(&self) -> Arc<AtomicBool> {
        self.alive.clone()
    }

    pub fn attach_pump(&mut self, pump: Lifeline) {
        self.pump = Some(pump);
    }

    pub async fn write_input(&mut self, data: &[u8]) -> io::Result<()> {
        self.input.write_all(data).await?;
        self.input.flush().await
    }

    pub async fn resize(&self, size: Size) -> io::Result<()> {
        self.master.resize(size).await
    }

    /// Kills the child process.  A child that has already exited is not an error.
    pub async fn kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            debug!("kill {} failed, it may have already exited: {}", self.id, e);
        }
    }

    /// Stops the pump, and waits for the child process to exit
    pub async fn wait(self) -> io::Result<ExitStatus> {
        drop(self.pump);
        drop(self.input);
        self.child.wait().await
    }
}

/// The tabs owned by one connection, in the order they were opened.
///
/// Only the connection's dispatch loop mutates the registry.
pub struct TabRegistry<P: PtySystem> {
    sessions: Vec<TabSession<P>>,
    next_id: u32,
}

impl<P: PtySystem> Default for TabRegistry<P> {
    fn default() -> Self {
        Self {
            sessions: Vec::new(),
            next_id: 1,
        }
    }
}

impl<P: PtySystem> TabRegistry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next id.  Ids are never handed out twice, even if the tab fails to start.
    pub fn allocate_id(&mut self) -> TabId {
        let id = TabId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, session: TabSession<P>) {
        self.sessions.push(session);
    }

    pub fn get(&self, id: TabId) -> Option<&TabSession<P>> {
        self.sessions.iter().find(|session| session.id == id)
    }

    pub fn get_mut(&mut self, id: TabId) -> Option<&mut TabSession<P>> {
        self.sessions.iter_mut().find(|session| session.id == id)
    }

    pub fn ids(&self) -> Vec<TabId> {
        self.sessions.iter().map(|session| session.id).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Removes every session, for teardown
    pub fn drain(&mut self) -> Vec<TabSession<P>> {
        std::mem::take(&mut self.sessions)
    }
}

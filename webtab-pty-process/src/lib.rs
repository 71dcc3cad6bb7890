//! The terminal process adapter used by `webtab-server`.
//!
//! A [PtySystem] spawns a child process attached to a fresh pseudo-terminal, and hands back the
//! four pieces of a running tab: the child (kill/wait), the master (resize), and the read & write
//! halves of the terminal stream.  Each piece is owned by exactly one task.
pub mod unix;

use std::{collections::HashMap, fmt::Debug, io, path::PathBuf, process::ExitStatus};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Error, Debug)]
pub enum PtySystemError {
    #[error("io error: {0}")]
    IoError(io::Error),

    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub cols: u16,
    pub rows: u16,
}

impl From<(u16, u16)> for Size {
    fn from((cols, rows): (u16, u16)) -> Self {
        Size { cols, rows }
    }
}

/// Describes the process launched on a new pseudo-terminal
#[derive(Debug, Clone)]
pub struct PtyOptions {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_directory: Option<PathBuf>,
    pub dimensions: Size,
    pub raw_mode: bool,
}

impl PtyOptions {
    pub fn new<S: Into<String>>(command: S) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            working_directory: None,
            dimensions: Size { cols: 80, rows: 24 },
            raw_mode: false,
        }
    }
}

#[async_trait]
pub trait Child: Send {
    /// The OS process id, if the child is still running
    fn id(&self) -> Option<u32>;

    async fn wait(self) -> io::Result<ExitStatus>;

    /// Signals the child to exit, and returns without waiting for it
    async fn kill(&mut self) -> io::Result<()>;
}

#[async_trait]
pub trait Master: Send + Sync {
    async fn size(&self) -> io::Result<Size>;
    async fn resize(&self, size: Size) -> io::Result<()>;
}

pub trait PtySystem: Send + Sync + 'static {
    type Child: Child + Sync + 'static;
    type Master: Master + 'static;
    type MasterRead: AsyncRead + Send + Unpin + 'static;
    type MasterWrite: AsyncWrite + Send + Sync + Unpin + 'static;

    fn spawn(&self, options: &PtyOptions) -> Result<PtySystemInstance<Self>, PtySystemError>;
}

pub struct PtySystemInstance<P>
where
    P: PtySystem + ?Sized,
{
    pub child: P::Child,
    pub master: P::Master,
    pub read: P::MasterRead,
    pub write: P::MasterWrite,
}

mod child;
mod internal;

use async_trait::async_trait;

use std::{
    io, mem,
    os::unix::prelude::AsRawFd,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard},
    task::{Context, Poll},
};

use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    process::Command,
};

use crate::{Master, PtyOptions, PtySystem, PtySystemError, PtySystemInstance, Size};

pub use self::child::UnixPtyChild;
use self::internal::UnixInternal;

/// Spawns processes on unix pseudo-terminals (posix_openpt)
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixPtySystem;

impl UnixPtySystem {
    pub fn new() -> Self {
        UnixPtySystem
    }

    fn command(options: &PtyOptions) -> Result<Command, PtySystemError> {
        if options.command.is_empty() {
            return Err(PtySystemError::InvalidCommand(
                "the command must not be empty".to_string(),
            ));
        }

        let mut command = Command::new(options.command.as_str());
        command.args(options.args.iter());
        command.envs(options.env.iter());

        if let Some(ref dir) = options.working_directory {
            command.current_dir(dir);
        }

        command.kill_on_drop(true);

        Ok(command)
    }
}

impl PtySystem for UnixPtySystem {
    type Child = UnixPtyChild;
    type Master = UnixPtyMaster;
    type MasterRead = UnixPtyRead;
    type MasterWrite = UnixPtyWrite;

    fn spawn(&self, options: &PtyOptions) -> Result<PtySystemInstance<Self>, PtySystemError> {
        let mut command = Self::command(options)?;

        let internal = UnixInternal::new().map_err(PtySystemError::IoError)?;
        internal
            .resize(options.dimensions.cols, options.dimensions.rows)
            .map_err(PtySystemError::IoError)?;

        let master_fd = internal.as_raw_fd();

        let slave_fd = {
            let slave = internal
                .open_sync_pty_slave()
                .map_err(PtySystemError::IoError)?;
            let slave_fd = slave.as_raw_fd();

            let stdin = slave.try_clone().map_err(PtySystemError::IoError)?;
            command.stdin(stdin);
            let stdout = slave.try_clone().map_err(PtySystemError::IoError)?;
            command.stdout(stdout);
            command.stderr(slave);

            slave_fd
        };

        let raw_mode = options.raw_mode;
        unsafe {
            command.pre_exec(move || {
                if raw_mode {
                    let mut attrs: libc::termios = mem::zeroed();

                    if libc::tcgetattr(slave_fd, &mut attrs as _) != 0 {
                        return Err(io::Error::last_os_error());
                    }

                    libc::cfmakeraw(&mut attrs as _);

                    if libc::tcsetattr(slave_fd, libc::TCSANOW, &attrs as _) != 0 {
                        return Err(io::Error::last_os_error());
                    }
                }

                // the child is about to exec, so it may close the master even though it doesn't own it
                if libc::close(master_fd) != 0 {
                    return Err(io::Error::last_os_error());
                }

                if libc::setsid() < 0 {
                    return Err(io::Error::last_os_error());
                }

                if libc::ioctl(0, libc::TIOCSCTTY.into(), 1) != 0 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let child = command.spawn().map_err(PtySystemError::IoError)?;
        // the slave fds held by `command` close here, so reads see end-of-stream once the child exits
        drop(command);

        let child = UnixPtyChild::new(child);
        let internal = Arc::new(Mutex::new(internal));

        Ok(PtySystemInstance {
            child,
            master: UnixPtyMaster(internal.clone()),
            read: UnixPtyRead(internal.clone()),
            write: UnixPtyWrite(internal),
        })
    }
}

fn lock_internal(internal: &Mutex<UnixInternal>) -> io::Result<MutexGuard<'_, UnixInternal>> {
    internal
        .lock()
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "pty lock poisoned"))
}

pub struct UnixPtyMaster(Arc<Mutex<UnixInternal>>);

#[async_trait]
impl Master for UnixPtyMaster {
    async fn size(&self) -> io::Result<Size> {
        let lock = lock_internal(&self.0)?;
        let (cols, rows) = lock.winsize()?;
        Ok(Size { cols, rows })
    }

    async fn resize(&self, size: Size) -> io::Result<()> {
        let lock = lock_internal(&self.0)?;
        lock.resize(size.cols, size.rows)
    }
}

pub struct UnixPtyRead(Arc<Mutex<UnixInternal>>);

impl AsyncRead for UnixPtyRead {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut lock = lock_internal(&self.0)?;
        AsyncRead::poll_read(Pin::new(&mut *lock), cx, buf)
    }
}

pub struct UnixPtyWrite(Arc<Mutex<UnixInternal>>);

impl AsyncWrite for UnixPtyWrite {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, io::Error>> {
        let mut lock = lock_internal(&self.0)?;
        AsyncWrite::poll_write(Pin::new(&mut *lock), cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        let mut lock = lock_internal(&self.0)?;
        AsyncWrite::poll_flush(Pin::new(&mut *lock), cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        let mut lock = lock_internal(&self.0)?;
        AsyncWrite::poll_shutdown(Pin::new(&mut *lock), cx)
    }
}

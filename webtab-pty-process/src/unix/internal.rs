use std::{
    ffi::{CStr, OsStr},
    fs::{File, OpenOptions},
    io::{self, Read, Write},
    os::unix::prelude::{AsRawFd, FromRawFd, OsStrExt, RawFd},
    pin::Pin,
    task::{Context, Poll},
};
use tokio::io::{unix::AsyncFd, AsyncRead, AsyncWrite, ReadBuf};

/// The non-blocking master side of a pseudo-terminal, registered with the tokio reactor
pub struct UnixInternal {
    handle: AsyncFd<File>,
}

/// Converts a libc return code into an io::Result
fn check(code: libc::c_int) -> io::Result<libc::c_int> {
    if code < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(code)
    }
}

/// Opens a new master fd with O_NONBLOCK set.
///
/// FreeBSD rejects O_NONBLOCK in posix_openpt, and macOS rejects setting it with fcntl afterwards.
fn open_master() -> io::Result<RawFd> {
    const NONBLOCK_AFTER_OPEN: bool = cfg!(target_os = "freebsd");

    let flags = if NONBLOCK_AFTER_OPEN {
        libc::O_RDWR | libc::O_NOCTTY
    } else {
        libc::O_RDWR | libc::O_NOCTTY | libc::O_NONBLOCK
    };

    unsafe {
        let fd = check(libc::posix_openpt(flags))?;

        let unlocked = check(libc::grantpt(fd)).and_then(|_| check(libc::unlockpt(fd)));
        if let Err(e) = unlocked {
            libc::close(fd);
            return Err(e);
        }

        if NONBLOCK_AFTER_OPEN {
            let current = check(libc::fcntl(fd, libc::F_GETFL, 0))?;
            check(libc::fcntl(fd, libc::F_SETFL, current | libc::O_NONBLOCK))?;
        }

        Ok(fd)
    }
}

impl UnixInternal {
    pub fn new() -> io::Result<Self> {
        let fd = open_master()?;
        let file = unsafe { File::from_raw_fd(fd) };
        let handle = AsyncFd::new(file)?;

        Ok(Self { handle })
    }

    /// Open a pseudo-TTY slave that is connected to this master.
    ///
    /// The resulting file handle is *not* set to non-blocking mode.
    pub fn open_sync_pty_slave(&self) -> io::Result<File> {
        let mut buf: [libc::c_char; 512] = [0; 512];
        let fd = self.handle.as_raw_fd();

        #[cfg(not(any(target_os = "macos", target_os = "freebsd")))]
        {
            if unsafe { libc::ptsname_r(fd, buf.as_mut_ptr(), buf.len()) } != 0 {
                return Err(io::Error::last_os_error());
            }
        }

        #[cfg(any(target_os = "macos", target_os = "freebsd"))]
        unsafe {
            let name = libc::ptsname(fd);
            if name.is_null() {
                return Err(io::Error::last_os_error());
            }
            libc::strncpy(buf.as_mut_ptr(), name, buf.len() - 1);
        }

        let ptsname = OsStr::from_bytes(unsafe { CStr::from_ptr(buf.as_ptr()) }.to_bytes());
        OpenOptions::new().read(true).write(true).open(ptsname)
    }

    /// Returns the window size as (cols, rows)
    pub fn winsize(&self) -> io::Result<(u16, u16)> {
        let mut winsize: libc::winsize = unsafe { std::mem::zeroed() };
        let fd = self.handle.as_raw_fd();

        check(unsafe { libc::ioctl(fd, libc::TIOCGWINSZ.into(), &mut winsize) })?;

        Ok((winsize.ws_col, winsize.ws_row))
    }

    pub fn resize(&self, cols: u16, rows: u16) -> io::Result<()> {
        let winsize = libc::winsize {
            ws_row: rows,
            ws_col: cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let fd = self.handle.as_raw_fd();

        check(unsafe { libc::ioctl(fd, libc::TIOCSWINSZ.into(), &winsize) })?;

        Ok(())
    }

    fn poll_write_with<T>(
        &self,
        cx: &mut Context<'_>,
        mut op: impl FnMut(&File) -> io::Result<T>,
    ) -> Poll<io::Result<T>> {
        loop {
            let mut guard = match self.handle.poll_write_ready(cx)? {
                Poll::Ready(guard) => guard,
                Poll::Pending => return Poll::Pending,
            };

            if let Ok(result) = guard.try_io(|inner| op(inner.get_ref())) {
                return Poll::Ready(result);
            }
        }
    }
}

impl AsRawFd for UnixInternal {
    fn as_raw_fd(&self) -> RawFd {
        self.handle.as_raw_fd()
    }
}

impl AsyncRead for UnixInternal {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = match self.handle.poll_read_ready(cx)? {
                Poll::Ready(guard) => guard,
                Poll::Pending => return Poll::Pending,
            };

            match guard.try_io(|inner| inner.get_ref().read(buf.initialize_unfilled())) {
                Ok(Ok(bytes)) => {
                    buf.advance(bytes);
                    return Poll::Ready(Ok(()));
                }
                // linux reports EIO on the master once every slave fd has closed
                Ok(Err(err)) if err.raw_os_error() == Some(libc::EIO) => {
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(err)) => {
                    return Poll::Ready(Err(err));
                }
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsyncWrite for UnixInternal {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize, io::Error>> {
        self.poll_write_with(cx, |mut file| file.write(buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        self.poll_write_with(cx, |mut file| file.flush())
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }
}

//! Unix PTY allocation and line discipline.
//!
//! This module provides the PTY master used by the spawner, using rustix
//! for the low-level PTY and termios operations.

use std::io;
use std::os::unix::io::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use rustix::fs::{Mode, OFlags, fcntl_setfl, open};
use rustix::pty::{OpenptFlags, grantpt, openpt, ptsname, unlockpt};
use rustix::termios::{
    InputModes, LocalModes, OptionalActions, OutputModes, Winsize, tcgetattr, tcsetattr,
    tcsetwinsize,
};
use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::config::WindowSize;
use crate::error::{PtyError, Result, errno_to_io};
use crate::traits::PtyMaster;

/// Unix PTY master implementation.
///
/// Wraps the master side of a pseudo-terminal, providing async read/write
/// operations and terminal control.
pub struct UnixPtyMaster {
    /// The master file descriptor wrapped for async I/O.
    async_fd: AsyncFd<OwnedFd>,
    /// Whether the PTY is still open.
    open: Arc<AtomicBool>,
}

impl std::fmt::Debug for UnixPtyMaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixPtyMaster")
            .field("fd", &self.async_fd.as_raw_fd())
            .field("open", &self.open.load(Ordering::SeqCst))
            .finish()
    }
}

fn openpt_flags() -> OpenptFlags {
    #[cfg(target_os = "linux")]
    {
        OpenptFlags::RDWR | OpenptFlags::NOCTTY | OpenptFlags::CLOEXEC
    }
    #[cfg(not(target_os = "linux"))]
    {
        OpenptFlags::RDWR | OpenptFlags::NOCTTY
    }
}

impl UnixPtyMaster {
    /// Allocate a new pseudo-terminal pair and return the master side
    /// together with the slave device path.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open() -> Result<(Self, String)> {
        let create = |e: rustix::io::Errno| PtyError::Create(errno_to_io(e));

        let master_fd = openpt(openpt_flags()).map_err(create)?;
        grantpt(&master_fd).map_err(create)?;
        unlockpt(&master_fd).map_err(create)?;

        let slave_name = ptsname(&master_fd, Vec::new()).map_err(create)?;
        let slave_path = slave_name
            .to_str()
            .map_err(|_| {
                PtyError::Create(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "invalid slave path encoding",
                ))
            })?
            .to_string();

        fcntl_setfl(&master_fd, OFlags::NONBLOCK).map_err(create)?;

        let async_fd = AsyncFd::new(master_fd).map_err(PtyError::Create)?;

        Ok((
            Self {
                async_fd,
                open: Arc::new(AtomicBool::new(true)),
            },
            slave_path,
        ))
    }

    /// Check if the PTY is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Set the window size.
    pub fn set_window_size(&self, size: WindowSize) -> Result<()> {
        if !self.is_open() {
            return Err(PtyError::Closed);
        }

        let winsize = Winsize {
            ws_col: size.cols,
            ws_row: size.rows,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };

        tcsetwinsize(self.async_fd.get_ref(), winsize).map_err(|e| PtyError::Io(errno_to_io(e)))
    }

    /// Turn echo on or off for the terminal pair.
    pub fn set_echo(&self, echo: bool) -> Result<()> {
        if !self.is_open() {
            return Err(PtyError::Closed);
        }
        configure_discipline(self.async_fd.get_ref(), echo)
    }

    /// Close the PTY master.
    pub fn close(&mut self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Put a terminal into the raw-ish mode the spawner relies on.
///
/// Input is passed through without CR/NL translation, output is not
/// post-processed (no `\n` to `\r\n` expansion), and echo is set as requested.
pub fn configure_discipline(fd: impl AsFd, echo: bool) -> Result<()> {
    let mut termios = tcgetattr(&fd).map_err(|e| PtyError::GetAttributes(errno_to_io(e)))?;

    termios
        .input_modes
        .remove(InputModes::INLCR | InputModes::ICRNL | InputModes::IGNCR);
    termios.output_modes.remove(OutputModes::OPOST);
    termios.local_modes.set(LocalModes::ECHO, echo);

    tcsetattr(&fd, OptionalActions::Now, &termios)
        .map_err(|e| PtyError::SetAttributes(errno_to_io(e)))
}

impl AsRawFd for UnixPtyMaster {
    fn as_raw_fd(&self) -> RawFd {
        self.async_fd.as_raw_fd()
    }
}

impl AsyncRead for UnixPtyMaster {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.open.load(Ordering::SeqCst) {
            return Poll::Ready(Ok(())); // EOF
        }

        loop {
            let mut guard = match self.async_fd.poll_read_ready(cx) {
                Poll::Ready(Ok(guard)) => guard,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            };

            let unfilled = buf.initialize_unfilled();
            match rustix::io::read(self.async_fd.get_ref(), unfilled) {
                Ok(n) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                Err(rustix::io::Errno::AGAIN) => {
                    guard.clear_ready();
                }
                // Linux reports EIO once the last slave descriptor is closed.
                Err(rustix::io::Errno::IO) => return Poll::Ready(Ok(())),
                Err(e) => return Poll::Ready(Err(errno_to_io(e))),
            }
        }
    }
}

impl AsyncWrite for UnixPtyMaster {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if !self.open.load(Ordering::SeqCst) {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "PTY closed")));
        }

        loop {
            let mut guard = match self.async_fd.poll_write_ready(cx) {
                Poll::Ready(Ok(guard)) => guard,
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            };

            match rustix::io::write(self.async_fd.get_ref(), buf) {
                Ok(n) => return Poll::Ready(Ok(n)),
                Err(rustix::io::Errno::AGAIN) => {
                    guard.clear_ready();
                }
                Err(e) => return Poll::Ready(Err(errno_to_io(e))),
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.open.store(false, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

impl PtyMaster for UnixPtyMaster {
    fn resize(&self, size: WindowSize) -> Result<()> {
        self.set_window_size(size)
    }

    fn set_echo(&self, echo: bool) -> Result<()> {
        Self::set_echo(self, echo)
    }

    fn close(&mut self) -> Result<()> {
        Self::close(self)
    }

    fn is_open(&self) -> bool {
        Self::is_open(self)
    }

    fn as_raw_fd(&self) -> RawFd {
        AsRawFd::as_raw_fd(self)
    }
}

/// Open the slave side of a PTY.
///
/// The descriptor is close-on-exec; the child receives duplicates of it as
/// its standard streams.
pub fn open_slave(path: &str) -> Result<OwnedFd> {
    open(
        Path::new(path),
        OFlags::RDWR | OFlags::NOCTTY | OFlags::CLOEXEC,
        Mode::empty(),
    )
    .map_err(|e| PtyError::Create(errno_to_io(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_pty() {
        let (master, slave_path) = UnixPtyMaster::open().unwrap();
        assert!(master.is_open());
        assert!(slave_path.starts_with("/dev/pts/") || slave_path.starts_with("/dev/pty"));
    }

    #[tokio::test]
    async fn discipline_disables_translation() {
        let (_master, slave_path) = UnixPtyMaster::open().unwrap();
        let slave = open_slave(&slave_path).unwrap();

        configure_discipline(&slave, false).unwrap();

        let termios = tcgetattr(&slave).unwrap();
        assert!(!termios.input_modes.contains(InputModes::ICRNL));
        assert!(!termios.output_modes.contains(OutputModes::OPOST));
        assert!(!termios.local_modes.contains(LocalModes::ECHO));
    }

    #[tokio::test]
    async fn echo_can_be_enabled() {
        let (master, slave_path) = UnixPtyMaster::open().unwrap();
        let slave = open_slave(&slave_path).unwrap();

        master.set_echo(true).unwrap();

        let termios = tcgetattr(&slave).unwrap();
        assert!(termios.local_modes.contains(LocalModes::ECHO));
    }

    #[tokio::test]
    async fn close_pty() {
        let (mut master, _) = UnixPtyMaster::open().unwrap();
        assert!(master.is_open());

        master.close().unwrap();
        assert!(!master.is_open());
        assert!(matches!(master.set_echo(true), Err(PtyError::Closed)));
    }
}

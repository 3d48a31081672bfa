//! Unix platform implementation for PTY operations.
//!
//! - PTY master/slave pair allocation via openpt/grantpt/unlockpt
//! - Line discipline setup (no CR/NL translation, no output processing, echo on request)
//! - Async I/O through tokio's `AsyncFd`
//! - Child process management with session/controlling terminal setup
//!
//! # Example
//!
//! ```ignore
//! use aexpect_pty::{PtyConfig, UnixPtySystem};
//!
//! let config = PtyConfig::default();
//! let (master, child) = UnixPtySystem::spawn("ls /", &config)?;
//! ```

mod child;
mod pty;

pub use child::{UnixPtyChild, spawn_child};
pub use pty::{UnixPtyMaster, configure_discipline, open_slave};

use crate::config::PtyConfig;
use crate::error::Result;

/// Unix PTY system implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixPtySystem;

impl UnixPtySystem {
    /// Run a shell command line behind a freshly allocated PTY.
    ///
    /// The line discipline is configured on the slave before the child
    /// starts, so the child never observes the default cooked settings.
    /// Must be called from within a Tokio runtime.
    pub fn spawn(command: &str, config: &PtyConfig) -> Result<(UnixPtyMaster, UnixPtyChild)> {
        let (master, slave_path) = UnixPtyMaster::open()?;
        master.set_window_size(config.window_size.into())?;

        let slave_fd = open_slave(&slave_path)?;
        configure_discipline(&slave_fd, config.echo)?;

        let child = spawn_child(slave_fd, command, config)?;

        Ok((master, child))
    }
}

/// Convenience type alias for the default PTY system on Unix.
pub type NativePtySystem = UnixPtySystem;

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn spawn_echo_reaches_master() {
        let config = PtyConfig::default();
        let (mut master, mut child) = UnixPtySystem::spawn("echo hello", &config).unwrap();

        let mut output = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            let n = master.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            output.extend_from_slice(&buf[..n]);
        }

        let status = child.wait().await.unwrap();
        assert!(status.success());
        // OPOST is off, so no carriage return is inserted.
        assert_eq!(String::from_utf8_lossy(&output), "hello\n");
    }

    #[tokio::test]
    async fn exit_code_is_reported() {
        let config = PtyConfig::default();
        let (_master, mut child) = UnixPtySystem::spawn("exit 3", &config).unwrap();

        let status = child.wait().await.unwrap();
        assert_eq!(status.code(), Some(3));
        assert!(!child.is_running());
    }

    #[tokio::test]
    async fn kill_reports_signal() {
        let config = PtyConfig::default();
        let (_master, mut child) = UnixPtySystem::spawn("sleep 30", &config).unwrap();

        child.kill().unwrap();
        let status = child.wait().await.unwrap();
        assert_eq!(status.signal(), Some(libc::SIGKILL));
        assert_eq!(status.as_status_code(), 128 + libc::SIGKILL);
    }
}

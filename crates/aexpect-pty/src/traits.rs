//! Core traits for PTY abstraction.
//!
//! - [`PtyMaster`]: The master side of a PTY (reading child output, writing input).
//! - [`PtyChild`]: Handle for the spawned child process.
//! - [`ExitStatus`]: How the child ended.

use std::future::Future;
use std::os::unix::io::RawFd;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::{PtySignal, WindowSize};
use crate::error::Result;

/// The master side of a pseudo-terminal.
///
/// Reads yield everything the child writes to its terminal; writes are
/// delivered to the child as terminal input. Once every slave descriptor is
/// closed, reads report end of file.
pub trait PtyMaster: AsyncRead + AsyncWrite + Send + Sync + Unpin {
    /// Resize the PTY to the given window size.
    fn resize(&self, size: WindowSize) -> Result<()>;

    /// Turn terminal echo on or off.
    fn set_echo(&self, echo: bool) -> Result<()>;

    /// Close the master side of the PTY.
    fn close(&mut self) -> Result<()>;

    /// Check if the PTY is still open.
    fn is_open(&self) -> bool;

    /// Get the raw file descriptor.
    fn as_raw_fd(&self) -> RawFd;
}

/// Handle for a child process spawned in a PTY.
pub trait PtyChild: Send + Sync {
    /// Get the process ID of the child.
    fn pid(&self) -> u32;

    /// Check if the child process is still running.
    fn is_running(&self) -> bool;

    /// Wait for the child process to exit.
    fn wait(&mut self) -> Pin<Box<dyn Future<Output = Result<ExitStatus>> + Send + '_>>;

    /// Try to get the exit status without blocking.
    ///
    /// Returns `None` if the process is still running.
    fn try_wait(&mut self) -> Result<Option<ExitStatus>>;

    /// Send a signal to the child process.
    fn signal(&self, signal: PtySignal) -> Result<()>;

    /// Kill the child process with SIGKILL.
    fn kill(&mut self) -> Result<()>;
}

/// Exit status of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The process exited normally with the given exit code.
    Exited(i32),

    /// The process was terminated by a signal.
    Signaled(i32),
}

impl ExitStatus {
    /// Check if the process exited successfully (exit code 0).
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// Get the exit code, if available.
    #[must_use]
    pub const fn code(&self) -> Option<i32> {
        match self {
            Self::Exited(code) => Some(*code),
            Self::Signaled(_) => None,
        }
    }

    /// Get the signal number that terminated the process.
    #[must_use]
    pub const fn signal(&self) -> Option<i32> {
        match self {
            Self::Signaled(sig) => Some(*sig),
            Self::Exited(_) => None,
        }
    }

    /// The single integer recorded for this status: the exit code, or
    /// `128 + signal` for a process killed by a signal (shell convention).
    #[must_use]
    pub const fn as_status_code(&self) -> i32 {
        match self {
            Self::Exited(code) => *code,
            Self::Signaled(sig) => 128 + *sig,
        }
    }
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {code}"),
            Self::Signaled(sig) => write!(f, "terminated by signal {sig}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn exit_status_success() {
        let status = ExitStatus::Exited(0);
        assert!(status.success());
        assert_eq!(status.code(), Some(0));
        assert_eq!(status.as_status_code(), 0);
    }

    #[test]
    fn exit_status_signaled() {
        let status = ExitStatus::Signaled(9);
        assert!(!status.success());
        assert_eq!(status.code(), None);
        assert_eq!(status.signal(), Some(9));
        assert_eq!(status.as_status_code(), 137);
        assert_eq!(status.to_string(), "terminated by signal 9");
    }

    proptest! {
        #[test]
        fn signaled_codes_never_collide_with_small_exit_codes(sig in 1i32..64, code in 0i32..128) {
            prop_assert_ne!(
                ExitStatus::Signaled(sig).as_status_code(),
                ExitStatus::Exited(code).as_status_code()
            );
        }
    }
}

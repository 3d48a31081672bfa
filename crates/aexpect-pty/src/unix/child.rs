//! Unix child process management for PTY.
//!
//! This module spawns the shell command behind the slave side of a PTY and
//! tracks its lifecycle.

use std::io;
use std::os::unix::io::OwnedFd;
use std::process::ExitStatus as StdExitStatus;
use std::process::Stdio;

use rustix::process::{Pid, Signal, kill_process};
use tokio::process::{Child as TokioChild, Command};

use crate::config::{PtyConfig, PtySignal};
use crate::error::{PtyError, Result, errno_to_io};
use crate::traits::{ExitStatus, PtyChild};

/// Unix child process handle.
pub struct UnixPtyChild {
    /// The underlying tokio child process.
    child: TokioChild,
    /// The process ID.
    pid: u32,
    /// Cached exit status, set once the child has been reaped.
    exit_status: Option<ExitStatus>,
}

impl std::fmt::Debug for UnixPtyChild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixPtyChild")
            .field("pid", &self.pid)
            .field("exit_status", &self.exit_status)
            .finish()
    }
}

impl UnixPtyChild {
    /// Create a new child process handle.
    pub fn new(child: TokioChild) -> Result<Self> {
        let pid = child.id().ok_or_else(|| {
            PtyError::Spawn(io::Error::other("child exited before its pid was read"))
        })?;
        Ok(Self {
            child,
            pid,
            exit_status: None,
        })
    }

    /// Get the process ID.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Check if the process is still running (has not been reaped).
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.exit_status.is_none()
    }

    /// Wait for the child process to exit.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.exit_status {
            return Ok(status);
        }

        let status = self.child.wait().await.map_err(PtyError::Wait)?;
        let status = convert_exit_status(status);
        self.exit_status = Some(status);
        Ok(status)
    }

    /// Try to get the exit status without blocking.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        if let Some(status) = self.exit_status {
            return Ok(Some(status));
        }

        let status = self
            .child
            .try_wait()
            .map_err(PtyError::Wait)?
            .map(convert_exit_status);
        self.exit_status = status;
        Ok(status)
    }

    /// Send a signal to the child process.
    pub fn signal(&self, signal: PtySignal) -> Result<()> {
        if let Some(status) = self.exit_status {
            return Err(PtyError::ProcessExited(status.as_status_code()));
        }

        let pid = Pid::from_raw(self.pid as i32).ok_or_else(|| {
            PtyError::Signal(io::Error::new(io::ErrorKind::InvalidInput, "invalid pid"))
        })?;
        let signal = Signal::from_named_raw(signal.as_unix_signal()).ok_or_else(|| {
            PtyError::Signal(io::Error::new(io::ErrorKind::InvalidInput, "invalid signal"))
        })?;

        kill_process(pid, signal).map_err(|e| PtyError::Signal(errno_to_io(e)))
    }

    /// Kill the child process (SIGKILL).
    pub fn kill(&mut self) -> Result<()> {
        self.signal(PtySignal::Kill)
    }
}

impl PtyChild for UnixPtyChild {
    fn pid(&self) -> u32 {
        Self::pid(self)
    }

    fn is_running(&self) -> bool {
        Self::is_running(self)
    }

    fn wait(
        &mut self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<ExitStatus>> + Send + '_>> {
        Box::pin(Self::wait(self))
    }

    fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        Self::try_wait(self)
    }

    fn signal(&self, signal: PtySignal) -> Result<()> {
        Self::signal(self, signal)
    }

    fn kill(&mut self) -> Result<()> {
        Self::kill(self)
    }
}

/// Convert `std::process::ExitStatus` to our `ExitStatus`.
fn convert_exit_status(status: StdExitStatus) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    if let Some(code) = status.code() {
        ExitStatus::Exited(code)
    } else if let Some(signal) = status.signal() {
        ExitStatus::Signaled(signal)
    } else {
        ExitStatus::Exited(-1)
    }
}

/// Run `command` through the configured shell with the slave PTY as its
/// standard streams and controlling terminal.
pub fn spawn_child(slave_fd: OwnedFd, command: &str, config: &PtyConfig) -> Result<UnixPtyChild> {
    let mut cmd = Command::new(&config.shell);
    cmd.arg("-c").arg(command);
    cmd.env_clear();
    cmd.envs(config.effective_env());

    if let Some(ref dir) = config.working_directory {
        cmd.current_dir(dir);
    }

    cmd.stdin(Stdio::from(slave_fd.try_clone().map_err(PtyError::Spawn)?));
    cmd.stdout(Stdio::from(slave_fd.try_clone().map_err(PtyError::Spawn)?));
    cmd.stderr(Stdio::from(slave_fd));

    // SAFETY: setsid and ioctl are async-signal-safe; stdin is already the
    // slave PTY when pre_exec closures run.
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(io::Error::last_os_error());
            }
            if libc::ioctl(libc::STDIN_FILENO, libc::TIOCSCTTY, 0) == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = cmd.spawn().map_err(PtyError::Spawn)?;
    tracing::debug!(command, pid = ?child.id(), "Spawned child behind PTY");

    UnixPtyChild::new(child)
}

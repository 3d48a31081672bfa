//! Blocking wrapper for shell sessions.
//!
//! [`SyncShellSession`] owns a small Tokio runtime so callers without one can
//! drive a [`ShellSession`]. The runtime keeps a worker thread so the tail
//! callbacks keep running between calls.

use std::time::Duration;

use tokio::runtime::{Builder, Runtime};

use crate::error::{ExpectError, Result, ShellResult};
use crate::expect::{PatternReader, ReadOptions};
use crate::process::{ProcessHandle, PtySignal, SpawnOptions};
use crate::shell::{ShellProtocol, ShellSession};
use crate::tail::{LineTailer, TailCallbacks};

/// A [`ShellSession`] with blocking methods.
#[derive(Debug)]
pub struct SyncShellSession {
    // Dropped before the runtime its pipes are registered with.
    inner: ShellSession,
    runtime: Runtime,
}

impl SyncShellSession {
    /// Spawn a shell session.
    pub fn spawn(options: SpawnOptions, callbacks: TailCallbacks) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("aexpect-sync")
            .enable_all()
            .build()
            .map_err(|e| ExpectError::io_context("creating tokio runtime", e))?;

        let inner = runtime.block_on(ShellSession::spawn(options, callbacks))?;
        Ok(Self { runtime, inner })
    }

    /// The wrapped async session.
    #[must_use]
    pub const fn inner(&self) -> &ShellSession {
        &self.inner
    }

    /// Default read options for this session.
    #[must_use]
    pub fn read_options(&self) -> ReadOptions<'static> {
        self.inner.read_options()
    }

    /// The session id.
    #[must_use]
    pub fn get_id(&self) -> &str {
        self.inner.get_id()
    }

    /// Process id of the child.
    #[must_use]
    pub fn get_pid(&self) -> Option<u32> {
        self.inner.get_pid()
    }

    /// Everything the child printed so far.
    #[must_use]
    pub fn get_output(&self) -> String {
        self.inner.get_output()
    }

    /// Whether the child is alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.is_alive()
    }

    /// Wait for the child to end and return its exit status.
    pub fn get_status(&self) -> Option<i32> {
        self.runtime.block_on(self.inner.get_status())
    }

    /// Write raw input.
    pub fn send(&self, data: impl AsRef<[u8]>) {
        self.inner.send(data);
    }

    /// Write a line of input.
    pub fn sendline(&self, line: &str) {
        self.inner.sendline(line);
    }

    /// Set the output callback of the tail.
    pub fn set_output_func<F>(&mut self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let _guard = self.runtime.enter();
        self.inner.set_output_func(f);
    }

    /// Set the termination callback of the tail.
    pub fn set_termination_func<F>(&mut self, f: F)
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        let _guard = self.runtime.enter();
        self.inner.set_termination_func(f);
    }

    /// Set the prompt regex.
    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.inner.set_prompt(prompt);
    }

    /// Read whatever arrives until the reader stays quiet for `timeout`.
    pub fn read_nonblocking(&mut self, timeout: Duration) -> Result<String> {
        self.runtime.block_on(self.inner.read_nonblocking(timeout))
    }

    /// Read until the last non-empty line matches one of `patterns`.
    pub fn read_until_last_line_matches<P>(
        &mut self,
        patterns: &[P],
        options: ReadOptions<'_>,
    ) -> Result<(usize, String)>
    where
        P: AsRef<str> + Sync,
    {
        self.runtime
            .block_on(self.inner.read_until_last_line_matches(patterns, options))
    }

    /// Read until the prompt.
    pub fn read_up_to_prompt(&mut self, options: ReadOptions<'_>) -> Result<String> {
        self.runtime.block_on(self.inner.read_up_to_prompt(options))
    }

    /// Whether the shell answers a newline within `timeout`.
    pub fn is_responsive(&mut self, timeout: Duration) -> bool {
        self.runtime.block_on(self.inner.is_responsive(timeout))
    }

    /// See [`ShellProtocol::cmd_output`].
    pub fn cmd_output(&mut self, cmd: &str, options: ReadOptions<'_>) -> ShellResult<String> {
        self.runtime.block_on(self.inner.cmd_output(cmd, options))
    }

    /// See [`ShellProtocol::cmd_status_output`].
    pub fn cmd_status_output(
        &mut self,
        cmd: &str,
        options: ReadOptions<'_>,
    ) -> ShellResult<(i32, String)> {
        self.runtime
            .block_on(self.inner.cmd_status_output(cmd, options))
    }

    /// See [`ShellProtocol::cmd_status`].
    pub fn cmd_status(&mut self, cmd: &str, options: ReadOptions<'_>) -> ShellResult<i32> {
        self.runtime.block_on(self.inner.cmd_status(cmd, options))
    }

    /// See [`ShellProtocol::cmd`].
    pub fn cmd(&mut self, cmd: &str, options: ReadOptions<'_>) -> ShellResult<String> {
        self.runtime.block_on(self.inner.cmd(cmd, options))
    }

    /// Kill the shell and clean up. Safe to call more than once.
    pub fn close(&mut self, signal: PtySignal) {
        self.runtime.block_on(self.inner.close(signal));
    }

    /// [`SyncShellSession::close`] with `SIGKILL`.
    pub fn close_default(&mut self) {
        self.close(PtySignal::Kill);
    }
}

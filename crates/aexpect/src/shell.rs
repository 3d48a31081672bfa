//! Command execution against an interactive shell.
//!
//! [`ShellSession`] drives a shell-like child (a local shell, ssh, a serial
//! console) through its prompt: send a command line, read until the prompt
//! comes back, then strip the echoed command and the prompt line. The exit
//! status is obtained with a second probe command (`echo $?` by default).
//!
//! # Example
//!
//! ```ignore
//! use aexpect::{ShellProtocol, ShellSession, SpawnOptions, TailCallbacks};
//!
//! let mut shell = ShellSession::spawn(SpawnOptions::new("sh"), TailCallbacks::new()).await?;
//! shell.read_up_to_prompt(shell.read_options()).await?;
//! let output = shell.cmd("uname -s", shell.read_options()).await?;
//! ```

mod output;

use std::future::Future;
use std::time::Duration;

pub use output::{parse_status, remove_command_echo, remove_last_nonempty_line};
use tokio::time::Instant;

use crate::error::{Result, ShellError, ShellResult};
use crate::expect::{Expect, ExpectReader, PatternReader, ReadOptions};
use crate::process::{ProcessHandle, ProcessSession, PtySignal, SpawnOptions};
use crate::tail::{LineTailer, Tail, TailCallbacks, TailSupervisor};

/// The shell command protocol on top of pattern reads.
pub trait ShellProtocol: PatternReader {
    /// Regex matched against the last non-empty line to detect the prompt.
    fn prompt(&self) -> &str;

    /// Change the prompt regex.
    fn set_prompt(&mut self, prompt: impl Into<String>);

    /// Command printing the previous command's exit status.
    fn status_test_command(&self) -> &str;

    /// Change the status probe command.
    fn set_status_test_command(&mut self, command: impl Into<String>);

    /// Whether the child answers a bare newline within `timeout`.
    fn is_responsive(&mut self, timeout: Duration) -> impl Future<Output = bool> + Send {
        async move {
            // Discard pending output so the answer is to our newline.
            if let Err(e) = self.read_nonblocking(Duration::ZERO).await {
                tracing::debug!(error = %e, "Could not drain stale output");
            }
            self.sendline("");

            let idle = self.process().config().timeouts.internal;
            let deadline = Instant::now() + timeout;
            while Instant::now() < deadline {
                match self.reader().wait_readable(deadline).await {
                    Ok(true) => {}
                    Ok(false) => return false,
                    Err(e) => {
                        tracing::debug!(error = %e, "Responsiveness probe failed");
                        return false;
                    }
                }
                match self.reader().read_available(idle, Some(deadline)).await {
                    Ok((text, _)) if !text.trim().is_empty() => return true,
                    Ok((_, true)) => return false,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!(error = %e, "Responsiveness probe failed");
                        return false;
                    }
                }
            }
            false
        }
    }

    /// Read until the last non-empty line matches the prompt.
    fn read_up_to_prompt<'a>(
        &'a mut self,
        options: ReadOptions<'a>,
    ) -> impl Future<Output = Result<String>> + Send + 'a {
        async move {
            let patterns = [self.prompt().to_string()];
            let (_, output) = self
                .read_until_last_line_matches(&patterns, options)
                .await?;
            Ok(output)
        }
    }

    /// Run `cmd` and return its output without the echoed command and the
    /// final prompt.
    fn cmd_output<'a>(
        &'a mut self,
        cmd: &'a str,
        options: ReadOptions<'a>,
    ) -> impl Future<Output = ShellResult<String>> + Send + 'a {
        async move {
            tracing::debug!(id = %self.get_id(), cmd, "Sending command");
            self.read_nonblocking(Duration::ZERO)
                .await
                .map_err(|e| ShellError::from_expect(cmd, e))?;
            self.sendline(cmd);

            let output = self
                .read_up_to_prompt(options)
                .await
                .map_err(|e| ShellError::from_expect(cmd, e))?;
            Ok(remove_last_nonempty_line(&remove_command_echo(&output, cmd)))
        }
    }

    /// Run `cmd` and return its exit status and output.
    fn cmd_status_output<'a>(
        &'a mut self,
        cmd: &'a str,
        options: ReadOptions<'a>,
    ) -> impl Future<Output = ShellResult<(i32, String)>> + Send + 'a {
        async move {
            let output = self.cmd_output(cmd, options).await?;

            let probe = self.status_test_command().to_string();
            let probe_options = ReadOptions::new(self.process().config().timeouts.status)
                .internal_timeout(options.internal_timeout);
            let status = match self.cmd_output(&probe, probe_options).await {
                Ok(status) => status,
                Err(e) => {
                    tracing::debug!(cmd, error = %e, "Status probe failed");
                    return Err(ShellError::Status {
                        cmd: cmd.to_string(),
                        output,
                    });
                }
            };

            match parse_status(&status) {
                Some(status) => Ok((status, output)),
                None => Err(ShellError::Status {
                    cmd: cmd.to_string(),
                    output,
                }),
            }
        }
    }

    /// Run `cmd` and return its exit status.
    fn cmd_status<'a>(
        &'a mut self,
        cmd: &'a str,
        options: ReadOptions<'a>,
    ) -> impl Future<Output = ShellResult<i32>> + Send + 'a {
        async move {
            let (status, _) = self.cmd_status_output(cmd, options).await?;
            Ok(status)
        }
    }

    /// Run `cmd` and return its output, failing if it exits nonzero.
    fn cmd<'a>(
        &'a mut self,
        cmd: &'a str,
        options: ReadOptions<'a>,
    ) -> impl Future<Output = ShellResult<String>> + Send + 'a {
        async move {
            let (status, output) = self.cmd_status_output(cmd, options).await?;
            if status != 0 {
                return Err(ShellError::Cmd {
                    cmd: cmd.to_string(),
                    status,
                    output,
                });
            }
            Ok(output)
        }
    }

    /// Alias of [`ShellProtocol::cmd_output`].
    fn get_command_output<'a>(
        &'a mut self,
        cmd: &'a str,
        options: ReadOptions<'a>,
    ) -> impl Future<Output = ShellResult<String>> + Send + 'a {
        self.cmd_output(cmd, options)
    }

    /// Alias of [`ShellProtocol::cmd_status_output`].
    fn get_command_status_output<'a>(
        &'a mut self,
        cmd: &'a str,
        options: ReadOptions<'a>,
    ) -> impl Future<Output = ShellResult<(i32, String)>> + Send + 'a {
        self.cmd_status_output(cmd, options)
    }

    /// Alias of [`ShellProtocol::cmd_status`].
    fn get_command_status<'a>(
        &'a mut self,
        cmd: &'a str,
        options: ReadOptions<'a>,
    ) -> impl Future<Output = ShellResult<i32>> + Send + 'a {
        self.cmd_status(cmd, options)
    }
}

/// An [`Expect`] session speaking to a shell.
#[derive(Debug)]
pub struct ShellSession {
    expect: Expect,
    prompt: String,
    status_test_command: String,
}

impl ShellSession {
    /// Spawn a shell session. The prompt and status probe come from the
    /// options' configuration.
    pub async fn spawn(options: SpawnOptions, callbacks: TailCallbacks) -> Result<Self> {
        let shell = options.session_config().shell.clone();
        let expect = Expect::spawn(options, callbacks).await?;
        Ok(Self::from_expect(expect, shell.prompt, shell.status_test_command))
    }

    /// Like [`ShellSession::spawn`], with the tail worker tracked by
    /// `supervisor`.
    pub async fn spawn_with_supervisor(
        options: SpawnOptions,
        callbacks: TailCallbacks,
        supervisor: &TailSupervisor,
    ) -> Result<Self> {
        let shell = options.session_config().shell.clone();
        let expect = Expect::spawn_with_supervisor(options, callbacks, supervisor).await?;
        Ok(Self::from_expect(expect, shell.prompt, shell.status_test_command))
    }

    /// Wrap an existing [`Expect`] session.
    #[must_use]
    pub fn from_expect(
        expect: Expect,
        prompt: impl Into<String>,
        status_test_command: impl Into<String>,
    ) -> Self {
        Self {
            expect,
            prompt: prompt.into(),
            status_test_command: status_test_command.into(),
        }
    }

    /// Default read options for this session.
    #[must_use]
    pub fn read_options(&self) -> ReadOptions<'static> {
        self.expect.read_options()
    }

    /// Kill the shell and clean up. Safe to call more than once.
    pub async fn close(&mut self, signal: PtySignal) {
        self.expect.close(signal).await;
    }

    /// [`ShellSession::close`] with `SIGKILL`.
    pub async fn close_default(&mut self) {
        self.expect.close_default().await;
    }
}

impl ProcessHandle for ShellSession {
    fn process(&self) -> &ProcessSession {
        self.expect.process()
    }

    fn process_mut(&mut self) -> &mut ProcessSession {
        self.expect.process_mut()
    }
}

impl LineTailer for ShellSession {
    fn tail(&mut self) -> &mut Tail {
        self.expect.tail()
    }
}

impl PatternReader for ShellSession {
    fn reader(&mut self) -> &mut ExpectReader {
        self.expect.reader()
    }
}

impl ShellProtocol for ShellSession {
    fn prompt(&self) -> &str {
        &self.prompt
    }

    fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    fn status_test_command(&self) -> &str {
        &self.status_test_command
    }

    fn set_status_test_command(&mut self, command: impl Into<String>) {
        self.status_test_command = command.into();
    }
}

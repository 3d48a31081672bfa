//! Client handle of a spawned process.
//!
//! [`ProcessSession`] launches an `aexpect-server` for a command (or attaches
//! to one that is already running), opens the reader FIFOs it asked for and
//! exposes the basic controls: send input, read the output log, query
//! liveness and exit status, and close.
//!
//! # Example
//!
//! ```ignore
//! use aexpect::{ProcessSession, SpawnOptions};
//!
//! let mut session = ProcessSession::spawn(SpawnOptions::new("cat")).await?;
//! session.sendline("hello");
//! assert!(session.is_alive());
//! session.close_default().await;
//! ```

mod kill;

use std::collections::HashMap;
use std::future::Future;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, OnceLock};

pub use aexpect_pty::PtySignal;
pub use kill::{child_pids, kill_process_tree};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use crate::config::{EnvConfig, SessionConfig};
use crate::error::{ExpectError, Result, SpawnError};
use crate::pipe::ReaderPipe;
use crate::server::{StartupParams, ready_line};
use crate::session_files::{FileLock, SessionFiles, generate_id};

/// Hook run once when a session is closed, before its files are removed.
pub type CloseHook = Box<dyn FnOnce(&ProcessSession) + Send + Sync>;

/// How to create or attach to a session.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    command: Option<String>,
    id: Option<String>,
    echo: Option<bool>,
    linesep: Option<String>,
    readers: Vec<String>,
    auto_close: bool,
    config: SessionConfig,
}

impl SpawnOptions {
    /// Run `command` in a new session.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            id: None,
            echo: None,
            linesep: None,
            readers: Vec::new(),
            auto_close: false,
            config: SessionConfig::from_env(),
        }
    }

    /// Attach to the running session `id`.
    pub fn attach(id: impl Into<String>) -> Self {
        Self {
            command: None,
            id: Some(id.into()),
            ..Self::new("")
        }
    }

    /// Use a specific session id instead of a random one.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set whether the terminal echoes input (default from the configuration).
    #[must_use]
    pub const fn echo(mut self, echo: bool) -> Self {
        self.echo = Some(echo);
        self
    }

    /// Set the line separator (default from the configuration).
    #[must_use]
    pub fn linesep(mut self, linesep: impl Into<String>) -> Self {
        self.linesep = Some(linesep.into());
        self
    }

    /// Declare an additional reader.
    #[must_use]
    pub fn reader(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.readers.contains(&name) {
            self.readers.push(name);
        }
        self
    }

    /// Kill the process and remove its files when the session is dropped
    /// without being closed.
    #[must_use]
    pub const fn auto_close(mut self, auto_close: bool) -> Self {
        self.auto_close = auto_close;
        self
    }

    /// Use the given configuration.
    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// The configuration in effect.
    #[must_use]
    pub const fn session_config(&self) -> &SessionConfig {
        &self.config
    }
}

/// Write-once exit status shared by a session and its background workers.
#[derive(Debug, Clone)]
pub struct StatusProbe {
    lock: PathBuf,
    status_file: PathBuf,
    cached: Arc<OnceLock<i32>>,
}

impl StatusProbe {
    fn new(files: &SessionFiles) -> Self {
        Self {
            lock: files.lock_server_running(),
            status_file: files.status_file(),
            cached: Arc::new(OnceLock::new()),
        }
    }

    /// The status, if it was already read.
    #[must_use]
    pub fn cached(&self) -> Option<i32> {
        self.cached.get().copied()
    }

    /// Wait for the spawner to finish, then read the exit status.
    ///
    /// `None` if the status file cannot be read. The first value read is
    /// kept, so later calls agree even after the files are gone.
    pub async fn get(&self) -> Option<i32> {
        if let Some(status) = self.cached() {
            return Some(status);
        }

        if let Err(e) = FileLock::wait_unlocked_async(self.lock.clone()).await {
            tracing::debug!(error = %e, "Could not wait for running lock");
            return None;
        }

        let content = tokio::fs::read_to_string(&self.status_file).await.ok()?;
        let status = content.trim().parse().ok()?;
        Some(*self.cached.get_or_init(|| status))
    }
}

/// Client side of one session.
pub struct ProcessSession {
    files: SessionFiles,
    readers: Vec<String>,
    pipes: HashMap<String, ReaderPipe>,
    echo: bool,
    linesep: String,
    status: StatusProbe,
    close_hooks: Vec<CloseHook>,
    closed: bool,
    auto_close: bool,
    config: SessionConfig,
}

impl std::fmt::Debug for ProcessSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSession")
            .field("id", &self.files.id())
            .field("readers", &self.readers)
            .field("echo", &self.echo)
            .field("closed", &self.closed)
            .finish()
    }
}

impl ProcessSession {
    /// Launch a new spawner or attach to an existing one.
    ///
    /// Reader FIFOs are opened only while the spawner is alive; failures to
    /// open them are tolerated and leave the reader unavailable.
    pub async fn spawn(options: SpawnOptions) -> Result<Self> {
        let SpawnOptions {
            command,
            id,
            echo,
            linesep,
            readers,
            auto_close,
            config,
        } = options;

        if command.is_none() && id.is_none() {
            return Err(SpawnError::MissingCommand.into());
        }
        let id = id.unwrap_or_else(generate_id);
        let echo = echo.unwrap_or(config.echo);
        let linesep = linesep.unwrap_or_else(|| config.linesep.clone());

        let params = command.map(|command| StartupParams {
            id: id.clone(),
            echo,
            readers: readers.clone(),
            command,
        });
        if let Some(params) = &params {
            params.validate()?;
        }

        let files = SessionFiles::new(&config.base_dir, &id);
        files
            .create_base_dir()
            .map_err(|e| ExpectError::io_context("creating session directory", e))?;

        // Held until every reader is open, so the spawner cannot remove the
        // FIFOs under us even if the child exits immediately.
        let starting = FileLock::acquire_async(files.lock_client_starting())
            .await
            .map_err(|e| ExpectError::io_context("locking starting lock", e))?;

        if let Some(params) = &params {
            if let Err(e) = launch_server(params, &config).await {
                drop(starting);
                discard_failed_spawn(&files, &readers);
                return Err(e);
            }
        }

        let mut pipes = HashMap::new();
        if FileLock::is_locked(files.lock_server_running()) {
            for name in &readers {
                match ReaderPipe::open(&files.reader_fifo(name), name) {
                    Ok(pipe) => {
                        pipes.insert(name.clone(), pipe);
                    }
                    Err(e) => {
                        tracing::debug!(id = %id, reader = %name, error = %e, "Could not open reader pipe");
                    }
                }
            }
        }

        if let Err(e) = starting.release() {
            tracing::warn!(id = %id, error = %e, "Could not release starting lock");
        }

        tracing::debug!(
            id = %id,
            attached = params.is_none(),
            readers = pipes.len(),
            "Session ready"
        );

        Ok(Self {
            status: StatusProbe::new(&files),
            files,
            readers,
            pipes,
            echo,
            linesep,
            close_hooks: Vec::new(),
            closed: false,
            auto_close,
            config,
        })
    }

    /// Attach to the running session `id`, opening the given readers.
    pub async fn attach<I, S>(id: &str, readers: I, config: SessionConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let options = readers
            .into_iter()
            .fold(SpawnOptions::attach(id).config(config), SpawnOptions::reader);
        Self::spawn(options).await
    }

    /// The session id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.files.id()
    }

    /// The session's files.
    #[must_use]
    pub const fn files(&self) -> &SessionFiles {
        &self.files
    }

    /// The declared reader names.
    #[must_use]
    pub fn readers(&self) -> &[String] {
        &self.readers
    }

    /// Whether the terminal echoes input.
    #[must_use]
    pub const fn echo(&self) -> bool {
        self.echo
    }

    /// The line separator appended by [`ProcessSession::sendline`].
    #[must_use]
    pub fn linesep(&self) -> &str {
        &self.linesep
    }

    /// Change the line separator.
    pub fn set_linesep(&mut self, linesep: impl Into<String>) {
        self.linesep = linesep.into();
    }

    /// The configuration this session was created with.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Take ownership of an opened reader pipe.
    pub fn take_reader(&mut self, name: &str) -> Option<ReaderPipe> {
        self.pipes.remove(name)
    }

    /// Process id of the child, `None` if it cannot be read.
    #[must_use]
    pub fn get_pid(&self) -> Option<u32> {
        std::fs::read_to_string(self.files.pid_file())
            .ok()?
            .trim()
            .parse()
            .ok()
    }

    /// Everything the child printed so far, with carriage returns removed.
    /// Empty if the log cannot be read.
    #[must_use]
    pub fn get_output(&self) -> String {
        match std::fs::read(self.files.output_file()) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                tracing::debug!(id = %self.id(), error = %e, "Could not read output file");
                String::new()
            }
        }
    }

    /// Whether the spawner still holds the running lock.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        FileLock::is_locked(self.files.lock_server_running())
    }

    /// Wait for the process to end and return its exit status.
    ///
    /// `None` if the status cannot be read. The value is cached.
    pub async fn get_status(&self) -> Option<i32> {
        self.status.get().await
    }

    /// A shareable handle on the exit status.
    #[must_use]
    pub fn status_probe(&self) -> StatusProbe {
        self.status.clone()
    }

    /// Write `data` to the child's input. Failures are logged and ignored.
    pub fn send(&self, data: impl AsRef<[u8]>) {
        let written = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.files.inpipe())
            .and_then(|mut pipe| pipe.write_all(data.as_ref()));
        if let Err(e) = written {
            tracing::debug!(id = %self.id(), error = %e, "Could not send input");
        }
    }

    /// Send `line` followed by the line separator.
    pub fn sendline(&self, line: &str) {
        self.send(format!("{line}{}", self.linesep));
    }

    /// Register a hook to run when the session is closed.
    pub fn add_close_hook<F>(&mut self, hook: F)
    where
        F: FnOnce(&Self) + Send + Sync + 'static,
    {
        self.close_hooks.push(Box::new(hook));
    }

    /// Whether [`ProcessSession::cleanup`] already ran.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Signal the child's process tree if it is alive and wait until the
    /// spawner has finished. The exit status is read and cached.
    pub async fn terminate(&self, signal: PtySignal) {
        if self.is_alive() {
            match self.get_pid() {
                Some(pid) => kill_process_tree(pid, signal),
                None => tracing::warn!(id = %self.id(), "Process alive but pid unknown"),
            }
        }

        if let Err(e) = FileLock::wait_unlocked_async(self.files.lock_server_running()).await {
            tracing::debug!(id = %self.id(), error = %e, "Could not wait for spawner exit");
        }
        let _ = self.status.get().await;
    }

    /// Run close hooks, close the reader pipes and delete the session files.
    /// Does nothing the second time.
    pub fn cleanup(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.run_close_hooks();
        self.pipes.clear();
        self.files
            .remove_all(self.readers.iter().map(String::as_str));
        tracing::debug!(id = %self.id(), "Session closed");
    }

    /// Kill the process if alive, wait for the spawner, and clean up.
    /// Safe to call more than once.
    pub async fn close(&mut self, signal: PtySignal) {
        if self.closed {
            return;
        }
        self.terminate(signal).await;
        self.cleanup();
    }

    /// [`ProcessSession::close`] with `SIGKILL`.
    pub async fn close_default(&mut self) {
        self.close(PtySignal::Kill).await;
    }

    fn run_close_hooks(&mut self) {
        let hooks = std::mem::take(&mut self.close_hooks);
        for hook in hooks {
            hook(&*self);
        }
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        if !self.auto_close || self.closed {
            return;
        }

        if self.is_alive() {
            if let Some(pid) = self.get_pid() {
                kill_process_tree(pid, PtySignal::Kill);
            }
        }
        self.run_close_hooks();
        self.pipes.clear();
        self.closed = true;

        // The spawner owns its files until it lets go of the running lock;
        // never block the dropping thread on that.
        let files = self.files.clone();
        let readers = self.readers.clone();
        let spawned = std::thread::Builder::new()
            .name("aexpect-cleanup".into())
            .spawn(move || {
                let _ = FileLock::wait_unlocked(files.lock_server_running());
                files.remove_all(readers.iter().map(String::as_str));
            });
        if let Err(e) = spawned {
            tracing::debug!(error = %e, "Could not start cleanup thread");
        }
    }
}

/// Access to the [`ProcessSession`] behind a higher-level session, with the
/// basic controls forwarded.
pub trait ProcessHandle {
    /// The underlying session.
    fn process(&self) -> &ProcessSession;

    /// The underlying session, mutably.
    fn process_mut(&mut self) -> &mut ProcessSession;

    /// The session id.
    fn get_id(&self) -> &str {
        self.process().id()
    }

    /// Process id of the child.
    fn get_pid(&self) -> Option<u32> {
        self.process().get_pid()
    }

    /// Everything the child printed so far.
    fn get_output(&self) -> String {
        self.process().get_output()
    }

    /// Whether the child is alive.
    fn is_alive(&self) -> bool {
        self.process().is_alive()
    }

    /// Wait for the child to end and return its exit status.
    fn get_status(&self) -> impl Future<Output = Option<i32>> + Send {
        self.process().get_status()
    }

    /// Write raw input.
    fn send(&self, data: impl AsRef<[u8]>) {
        self.process().send(data);
    }

    /// Write a line of input.
    fn sendline(&self, line: &str) {
        self.process().sendline(line);
    }
}

impl ProcessHandle for ProcessSession {
    fn process(&self) -> &ProcessSession {
        self
    }

    fn process_mut(&mut self) -> &mut ProcessSession {
        self
    }
}

/// Stop whatever a failed launch left running and remove its files.
fn discard_failed_spawn(files: &SessionFiles, readers: &[String]) {
    if let Some(pid) = std::fs::read_to_string(files.pid_file())
        .ok()
        .and_then(|pid| pid.trim().parse().ok())
    {
        kill_process_tree(pid, PtySignal::Kill);
    }
    files.remove_all(readers.iter().map(String::as_str));
    tracing::debug!(id = %files.id(), "Discarded failed spawn");
}

async fn launch_server(params: &StartupParams, config: &SessionConfig) -> Result<()> {
    let program = config.resolve_server_program();

    let mut child = Command::new(&program)
        .envs(EnvConfig::default().server_vars(config))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        // Own process group: the spawner outlives signals aimed at ours.
        .process_group(0)
        .spawn()
        .map_err(|source| SpawnError::Launch {
            program: program.display().to_string(),
            source,
        })?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| SpawnError::Io(io::Error::other("spawner stdin unavailable")))?;
    stdin
        .write_all(params.encode().as_bytes())
        .await
        .map_err(SpawnError::Io)?;
    drop(stdin);

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| SpawnError::Io(io::Error::other("spawner stdout unavailable")))?;
    let expected = ready_line(&params.id);
    let mut lines = BufReader::new(stdout).lines();
    let ready = async {
        while let Some(line) = lines.next_line().await? {
            if line.contains(&expected) {
                return Ok(true);
            }
            tracing::debug!(line = %line, "Unexpected spawner output");
        }
        Ok::<_, io::Error>(false)
    };

    match tokio::time::timeout(config.timeouts.spawn, ready).await {
        Ok(Ok(true)) => {
            tracing::debug!(id = %params.id, program = %program.display(), "Spawner ready");
            Ok(())
        }
        Ok(Ok(false)) => Err(SpawnError::NotReady {
            id: params.id.clone(),
        }
        .into()),
        Ok(Err(e)) => Err(SpawnError::Io(e).into()),
        Err(_) => {
            let _ = child.start_kill();
            Err(SpawnError::ReadyTimeout {
                id: params.id.clone(),
                duration: config.timeouts.spawn,
            }
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_defaults() {
        let options = SpawnOptions::new("ls").reader("tail").reader("tail");
        assert_eq!(options.readers, vec!["tail".to_string()]);
        assert_eq!(options.command.as_deref(), Some("ls"));
        assert!(options.id.is_none());
        assert!(!options.auto_close);
    }

    #[test]
    fn attach_options() {
        let options = SpawnOptions::attach("abc").echo(true);
        assert!(options.command.is_none());
        assert_eq!(options.id.as_deref(), Some("abc"));
        assert_eq!(options.echo, Some(true));
    }

    #[tokio::test]
    async fn attach_to_missing_session() {
        let dir = std::env::temp_dir().join(format!("aexpect-attach-{}", generate_id()));
        let config = SessionConfig::new().base_dir(&dir);

        let mut session = ProcessSession::attach("nosuch", ["expect"], config)
            .await
            .unwrap();
        assert!(!session.is_alive());
        assert!(session.take_reader("expect").is_none());
        assert_eq!(session.get_output(), "");
        assert_eq!(session.get_pid(), None);
        assert_eq!(session.get_status().await, None);

        session.close_default().await;
        assert!(session.is_closed());
        assert!(!session.files().lock_client_starting().exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn status_is_cached() {
        let dir = std::env::temp_dir().join(format!("aexpect-status-{}", generate_id()));
        std::fs::create_dir_all(&dir).unwrap();
        let files = SessionFiles::new(&dir, "s");
        std::fs::write(files.status_file(), "7\n").unwrap();

        let probe = StatusProbe::new(&files);
        assert_eq!(probe.get().await, Some(7));
        std::fs::remove_file(files.status_file()).unwrap();
        assert_eq!(probe.clone().get().await, Some(7));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn missing_command_and_id() {
        let mut options = SpawnOptions::attach("x");
        options.id = None;
        let err = ProcessSession::spawn(options).await.unwrap_err();
        assert!(matches!(err, ExpectError::Spawn(SpawnError::MissingCommand)));
    }
}

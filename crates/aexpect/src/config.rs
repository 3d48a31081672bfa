//! Configuration types for aexpect.
//!
//! Settings are layered: built-in defaults, then an optional TOML file
//! ([`ConfigFile`]), then `AEXPECT_*` environment variables ([`EnvConfig`]),
//! then explicit builder calls.

pub mod env;
pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

pub use env::EnvConfig;
pub use file::ConfigFile;

use crate::error::Result;

/// Default directory holding session files.
pub const DEFAULT_BASE_DIR: &str = "/tmp/aexpect";

/// Name of the spawner executable.
pub const DEFAULT_SERVER_PROGRAM: &str = "aexpect-server";

/// Default line separator appended by `sendline`.
pub const DEFAULT_LINESEP: &str = "\n";

/// Default shell prompt pattern.
pub const DEFAULT_PROMPT: &str = r"[\#\$]\s*$";

/// Default command used to query the last exit status.
pub const DEFAULT_STATUS_TEST_COMMAND: &str = "echo $?";

/// Default time to wait for the spawner to announce readiness.
pub const DEFAULT_SPAWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default overall timeout of expect reads.
pub const DEFAULT_EXPECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default idle time after which a non-blocking read returns.
pub const DEFAULT_INTERNAL_TIMEOUT: Duration = Duration::from_millis(100);

/// Default timeout of the status probe command.
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait of the spawner loop before checking on the child.
pub const DEFAULT_SERVER_POLL: Duration = Duration::from_millis(500);

/// Default bound on flushing buffered reader output after the child exits.
pub const DEFAULT_SERVER_DRAIN: Duration = Duration::from_secs(2);

/// Default idle time after which the tail worker flushes a partial line.
pub const DEFAULT_TAIL_POLL: Duration = Duration::from_millis(50);

/// Default bound on joining tail workers.
pub const DEFAULT_TAIL_JOIN: Duration = Duration::from_secs(10);

/// Default time to confirm process death after a read loop ends.
pub const DEFAULT_TERMINATED_WAIT: Duration = Duration::from_secs(5);

/// Default timeout of the responsiveness probe.
pub const DEFAULT_RESPONSIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time `run_bg` waits for the process.
pub const DEFAULT_RUN_BG_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration shared by sessions and the spawner.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Directory holding session files.
    pub base_dir: PathBuf,

    /// Explicit spawner executable; resolved on demand when unset.
    pub server_program: Option<PathBuf>,

    /// Line separator appended by `sendline`.
    pub linesep: String,

    /// Whether the terminal echoes input.
    pub echo: bool,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Shell protocol configuration.
    pub shell: ShellConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            server_program: None,
            linesep: DEFAULT_LINESEP.to_string(),
            echo: false,
            timeouts: TimeoutConfig::default(),
            shell: ShellConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `AEXPECT_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        EnvConfig::default().apply(Self::default())
    }

    /// Defaults overridden by a TOML file, then by the environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = ConfigFile::load(path)?;
        let config = file.apply(Self::default())?;
        Ok(EnvConfig::default().apply(config))
    }

    /// Set the directory holding session files.
    #[must_use]
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Set the spawner executable.
    #[must_use]
    pub fn server_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.server_program = Some(program.into());
        self
    }

    /// Set the line separator.
    #[must_use]
    pub fn linesep(mut self, linesep: impl Into<String>) -> Self {
        self.linesep = linesep.into();
        self
    }

    /// Set whether the terminal echoes input.
    #[must_use]
    pub const fn echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Set the timeout configuration.
    #[must_use]
    pub const fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the shell protocol configuration.
    #[must_use]
    pub fn shell(mut self, shell: ShellConfig) -> Self {
        self.shell = shell;
        self
    }

    /// Locate the spawner executable.
    ///
    /// An explicit path wins; otherwise a sibling of the current executable
    /// (or of its parent directory, which covers test binaries under
    /// `target/*/deps`), else the bare program name for a `PATH` lookup.
    #[must_use]
    pub fn resolve_server_program(&self) -> PathBuf {
        if let Some(program) = &self.server_program {
            return program.clone();
        }

        if let Ok(exe) = std::env::current_exe() {
            let candidates = exe
                .parent()
                .into_iter()
                .chain(exe.parent().and_then(Path::parent));
            for dir in candidates {
                let candidate = dir.join(DEFAULT_SERVER_PROGRAM);
                if candidate.is_file() {
                    return candidate;
                }
            }
        }

        PathBuf::from(DEFAULT_SERVER_PROGRAM)
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Wait for the spawner's readiness line.
    pub spawn: Duration,
    /// Overall deadline of expect reads.
    pub expect: Duration,
    /// Idle time ending a non-blocking read.
    pub internal: Duration,
    /// Deadline of the status probe command.
    pub status: Duration,
    /// Spawner loop wait before checking on the child.
    pub server_poll: Duration,
    /// Bound on flushing reader buffers after the child exits.
    pub server_drain: Duration,
    /// Idle time after which the tail worker flushes a partial line.
    pub tail_poll: Duration,
    /// Bound on joining a tail worker.
    pub tail_join: Duration,
    /// Time to confirm process death after a read loop ends.
    pub terminated_wait: Duration,
    /// Deadline of the responsiveness probe.
    pub responsive: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            spawn: DEFAULT_SPAWN_TIMEOUT,
            expect: DEFAULT_EXPECT_TIMEOUT,
            internal: DEFAULT_INTERNAL_TIMEOUT,
            status: DEFAULT_STATUS_TIMEOUT,
            server_poll: DEFAULT_SERVER_POLL,
            server_drain: DEFAULT_SERVER_DRAIN,
            tail_poll: DEFAULT_TAIL_POLL,
            tail_join: DEFAULT_TAIL_JOIN,
            terminated_wait: DEFAULT_TERMINATED_WAIT,
            responsive: DEFAULT_RESPONSIVE_TIMEOUT,
        }
    }
}

impl TimeoutConfig {
    /// Create a new timeout configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the spawner readiness timeout.
    #[must_use]
    pub const fn spawn(mut self, timeout: Duration) -> Self {
        self.spawn = timeout;
        self
    }

    /// Set the expect timeout.
    #[must_use]
    pub const fn expect(mut self, timeout: Duration) -> Self {
        self.expect = timeout;
        self
    }

    /// Set the internal (idle) read timeout.
    #[must_use]
    pub const fn internal(mut self, timeout: Duration) -> Self {
        self.internal = timeout;
        self
    }

    /// Set the status probe timeout.
    #[must_use]
    pub const fn status(mut self, timeout: Duration) -> Self {
        self.status = timeout;
        self
    }

    /// Set the spawner poll interval.
    #[must_use]
    pub const fn server_poll(mut self, timeout: Duration) -> Self {
        self.server_poll = timeout;
        self
    }

    /// Set the bound on flushing reader buffers after the child exits.
    #[must_use]
    pub const fn server_drain(mut self, timeout: Duration) -> Self {
        self.server_drain = timeout;
        self
    }

    /// Set the tail flush interval.
    #[must_use]
    pub const fn tail_poll(mut self, timeout: Duration) -> Self {
        self.tail_poll = timeout;
        self
    }

    /// Set the tail join bound.
    #[must_use]
    pub const fn tail_join(mut self, timeout: Duration) -> Self {
        self.tail_join = timeout;
        self
    }
}

/// Shell protocol configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// Regular expression matching the shell prompt line.
    pub prompt: String,
    /// Command printing the last exit status.
    pub status_test_command: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            status_test_command: DEFAULT_STATUS_TEST_COMMAND.to_string(),
        }
    }
}

impl ShellConfig {
    /// Set the prompt pattern.
    #[must_use]
    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Set the status probe command.
    #[must_use]
    pub fn status_test_command(mut self, command: impl Into<String>) -> Self {
        self.status_test_command = command.into();
        self
    }
}

//! Configuration types for PTY creation and management.
//!
//! This module provides [`PtyConfig`] for configuring how the spawner's
//! child is started and [`PtySignal`] for the signals sessions send to it.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;

/// Shell used to interpret spawned command lines.
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// `TERM` value exported to spawned children.
pub const DEFAULT_TERM: &str = "dumb";

/// Configuration for running a command behind a new PTY.
///
/// # Example
///
/// ```
/// use aexpect_pty::PtyConfig;
///
/// let config = PtyConfig::builder()
///     .working_directory("/tmp")
///     .env("LANG", "C")
///     .echo(true)
///     .build();
/// assert!(config.echo);
/// ```
#[derive(Debug, Clone)]
pub struct PtyConfig {
    /// Working directory for the child process.
    pub working_directory: Option<PathBuf>,

    /// Additional environment variables (merged with the inherited environment).
    pub env_add: HashMap<OsString, OsString>,

    /// Environment variables to remove from the inherited environment.
    pub env_remove: Vec<OsString>,

    /// Shell used as `<shell> -c <command>`.
    pub shell: PathBuf,

    /// Whether the terminal echoes input back.
    pub echo: bool,

    /// Initial window size (columns, rows).
    pub window_size: (u16, u16),
}

impl Default for PtyConfig {
    fn default() -> Self {
        let mut env_add = HashMap::new();
        env_add.insert(OsString::from("TERM"), OsString::from(DEFAULT_TERM));

        Self {
            working_directory: None,
            env_add,
            env_remove: Vec::new(),
            shell: PathBuf::from(DEFAULT_SHELL),
            echo: false,
            window_size: (80, 24),
        }
    }
}

impl PtyConfig {
    /// Create a new builder for `PtyConfig`.
    #[must_use]
    pub fn builder() -> PtyConfigBuilder {
        PtyConfigBuilder::new()
    }

    /// Get the effective environment for the child process.
    ///
    /// This starts from the inherited environment, adds variables from
    /// `env_add`, and removes variables from `env_remove`.
    #[must_use]
    pub fn effective_env(&self) -> HashMap<OsString, OsString> {
        let mut env: HashMap<OsString, OsString> = std::env::vars_os().collect();
        env.extend(self.env_add.clone());
        for key in &self.env_remove {
            env.remove(key);
        }
        env
    }
}

/// Builder for [`PtyConfig`].
#[derive(Debug, Clone, Default)]
pub struct PtyConfigBuilder {
    config: PtyConfig,
}

impl PtyConfigBuilder {
    /// Create a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the working directory for the child process.
    #[must_use]
    pub fn working_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.working_directory = Some(path.into());
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.config.env_add.insert(key.into(), value.into());
        self
    }

    /// Remove an environment variable.
    #[must_use]
    pub fn env_remove(mut self, key: impl Into<OsString>) -> Self {
        self.config.env_remove.push(key.into());
        self
    }

    /// Set the shell used to interpret the command line.
    #[must_use]
    pub fn shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.config.shell = shell.into();
        self
    }

    /// Set whether the terminal echoes input.
    #[must_use]
    pub const fn echo(mut self, echo: bool) -> Self {
        self.config.echo = echo;
        self
    }

    /// Set the initial window size.
    #[must_use]
    pub const fn window_size(mut self, cols: u16, rows: u16) -> Self {
        self.config.window_size = (cols, rows);
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> PtyConfig {
        self.config
    }
}

/// Signals a session may deliver to its child process tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum PtySignal {
    /// Interrupt signal (SIGINT).
    Interrupt,

    /// Quit signal (SIGQUIT).
    Quit,

    /// Terminate signal (SIGTERM).
    Terminate,

    /// Kill signal, cannot be caught (SIGKILL).
    #[default]
    Kill,

    /// Hangup signal (SIGHUP).
    Hangup,

    /// Stop signal, cannot be caught (SIGSTOP).
    Stop,

    /// Continue signal (SIGCONT).
    Continue,

    /// User-defined signal 1 (SIGUSR1).
    User1,

    /// User-defined signal 2 (SIGUSR2).
    User2,
}

impl PtySignal {
    /// Get the Unix signal number.
    #[must_use]
    pub const fn as_unix_signal(self) -> i32 {
        match self {
            Self::Interrupt => libc::SIGINT,
            Self::Quit => libc::SIGQUIT,
            Self::Terminate => libc::SIGTERM,
            Self::Kill => libc::SIGKILL,
            Self::Hangup => libc::SIGHUP,
            Self::Stop => libc::SIGSTOP,
            Self::Continue => libc::SIGCONT,
            Self::User1 => libc::SIGUSR1,
            Self::User2 => libc::SIGUSR2,
        }
    }
}

/// Window size for the PTY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    /// Number of columns (characters per line).
    pub cols: u16,
    /// Number of rows (lines).
    pub rows: u16,
}

impl WindowSize {
    /// Create a new window size with the given dimensions.
    #[must_use]
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self::new(80, 24)
    }
}

impl From<(u16, u16)> for WindowSize {
    fn from((cols, rows): (u16, u16)) -> Self {
        Self::new(cols, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = PtyConfig::builder()
            .working_directory("/tmp")
            .env("FOO", "bar")
            .window_size(120, 40)
            .echo(true)
            .build();

        assert_eq!(config.working_directory, Some(PathBuf::from("/tmp")));
        assert_eq!(config.window_size, (120, 40));
        assert!(config.echo);
        assert!(config.env_add.contains_key(&OsString::from("FOO")));
    }

    #[test]
    fn default_exports_dumb_term() {
        let env = PtyConfig::default().effective_env();
        assert_eq!(env.get(&OsString::from("TERM")), Some(&OsString::from("dumb")));
    }

    #[test]
    fn env_remove_wins() {
        let config = PtyConfig::builder()
            .env("AEXPECT_PTY_TEST", "1")
            .env_remove("AEXPECT_PTY_TEST")
            .build();
        assert!(!config.effective_env().contains_key(&OsString::from("AEXPECT_PTY_TEST")));
    }

    #[test]
    fn kill_is_default_signal() {
        assert_eq!(PtySignal::default(), PtySignal::Kill);
        assert_eq!(PtySignal::Kill.as_unix_signal(), libc::SIGKILL);
        assert_eq!(PtySignal::Stop.as_unix_signal(), libc::SIGSTOP);
    }
}

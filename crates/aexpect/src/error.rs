//! Error types for aexpect.
//!
//! Expect-layer errors carry the patterns that were being looked for and the
//! output accumulated so far; shell-layer errors carry the command and its
//! output with the echoed command line removed. Both render a bounded,
//! boxed snippet of the captured output.

use std::time::Duration;

use thiserror::Error;

use crate::shell::remove_command_echo;

/// Maximum length of output to display in error messages.
const MAX_BUFFER_DISPLAY: usize = 500;

/// Context lines to show before/after truncation point.
const CONTEXT_LINES: usize = 3;

/// Format captured output for display, truncating if necessary.
fn format_buffer_snippet(buffer: &str) -> String {
    if buffer.is_empty() {
        return "(no output)".to_string();
    }

    let buffer_len = buffer.len();

    if buffer_len <= MAX_BUFFER_DISPLAY {
        return format!(
            "┌─ output ({} bytes) ──────────────────────\n│ {}\n└────────────────────────────────────────",
            buffer_len,
            buffer.lines().collect::<Vec<_>>().join("\n│ ")
        );
    }

    let lines: Vec<&str> = buffer.lines().collect();
    let total_lines = lines.len();

    if total_lines <= CONTEXT_LINES * 2 {
        return format!(
            "┌─ output ({} bytes, {} lines) ─────────────\n│ {}\n└────────────────────────────────────────",
            buffer_len,
            total_lines,
            lines.join("\n│ ")
        );
    }

    // Show the tail; the end of the output is where prompts and errors are.
    let tail_lines = &lines[lines.len().saturating_sub(CONTEXT_LINES * 2)..];
    let hidden = total_lines - tail_lines.len();

    format!(
        "┌─ output ({} bytes, {} lines) ─────────────\n│ ... ({} lines hidden)\n│ {}\n└────────────────────────────────────────",
        buffer_len,
        total_lines,
        hidden,
        tail_lines.join("\n│ ")
    )
}

fn format_status(status: Option<i32>) -> String {
    status.map_or_else(|| "unknown".to_string(), |s| s.to_string())
}

fn format_expect_timeout(patterns: &[String], output: &str) -> String {
    format!(
        "timeout expired while looking for patterns {patterns:?}\n\n{}",
        format_buffer_snippet(output)
    )
}

fn format_expect_terminated(patterns: &[String], status: Option<i32>, output: &str) -> String {
    format!(
        "process terminated while looking for patterns {patterns:?} (status: {})\n\n{}",
        format_status(status),
        format_buffer_snippet(output)
    )
}

fn format_expect_unknown(patterns: &[String], output: &str) -> String {
    format!(
        "unknown error occurred while looking for patterns {patterns:?}\n\n{}",
        format_buffer_snippet(output)
    )
}

fn format_shell_error(message: &str, cmd: &str, output: &str) -> String {
    format!(
        "{message} (command: {cmd:?})\n\n{}",
        format_buffer_snippet(output)
    )
}

/// The main error type for aexpect operations.
#[derive(Debug, Error)]
pub enum ExpectError {
    /// No pattern matched before the overall deadline.
    #[error("{}", format_expect_timeout(patterns, output))]
    Timeout {
        /// The patterns that were being looked for.
        patterns: Vec<String>,
        /// Output read before the deadline.
        output: String,
    },

    /// The child process ended before any pattern matched.
    #[error("{}", format_expect_terminated(patterns, *status, output))]
    ProcessTerminated {
        /// The patterns that were being looked for.
        patterns: Vec<String>,
        /// Exit status of the child, if it could be read.
        status: Option<i32>,
        /// Output read before the process ended.
        output: String,
    },

    /// The read loop stopped without a match and without a definitive cause.
    #[error("{}", format_expect_unknown(patterns, output))]
    Unknown {
        /// The patterns that were being looked for.
        patterns: Vec<String>,
        /// Output read before the loop stopped.
        output: String,
    },

    /// Failed to start or attach to a spawner.
    #[error("failed to spawn process: {0}")]
    Spawn(#[from] SpawnError),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An I/O error occurred with additional context.
    #[error("{context}: {source}")]
    IoWithContext {
        /// What operation was being performed.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid regex pattern.
    #[error("invalid regex pattern: {0}")]
    Regex(#[from] regex::Error),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// PTY layer error (spawner side).
    #[error("PTY error: {0}")]
    Pty(#[from] aexpect_pty::PtyError),
}

/// Errors related to starting or attaching to a spawner.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The spawner program could not be started.
    #[error("could not launch spawner {program}: {source}")]
    Launch {
        /// The spawner program that was run.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The spawner did not announce readiness in time.
    #[error("spawner for session {id} not ready after {duration:?}")]
    ReadyTimeout {
        /// The session id.
        id: String,
        /// How long the client waited.
        duration: Duration,
    },

    /// The spawner exited before announcing readiness.
    #[error("spawner for session {id} exited before it was ready")]
    NotReady {
        /// The session id.
        id: String,
    },

    /// Neither a command nor a session id to attach to was given.
    #[error("either a command or a session id is required")]
    MissingCommand,

    /// An argument cannot be carried by the startup protocol.
    #[error("invalid {kind}: {reason}")]
    InvalidArgument {
        /// The kind of invalid input (e.g., "command", "reader name").
        kind: String,
        /// The value that was invalid.
        value: String,
        /// The reason it's invalid.
        reason: String,
    },

    /// General I/O error during spawn.
    #[error("I/O error during spawn: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the shell command protocol.
#[derive(Debug, Error)]
pub enum ShellError {
    /// The prompt did not reappear before the deadline.
    #[error("{}", format_shell_error("timeout expired while waiting for shell command to complete", cmd, output))]
    Timeout {
        /// The command that was run.
        cmd: String,
        /// Output read so far, without the echoed command.
        output: String,
    },

    /// The shell process ended while the command was running.
    #[error("{}", format_shell_error(&format!("shell process terminated while waiting for command to complete (status: {})", format_status(*status)), cmd, output))]
    ProcessTerminated {
        /// The command that was run.
        cmd: String,
        /// Exit status of the shell, if it could be read.
        status: Option<i32>,
        /// Output read so far, without the echoed command.
        output: String,
    },

    /// The exit status of the command could not be obtained.
    #[error("{}", format_shell_error("could not get exit status of command", cmd, output))]
    Status {
        /// The command whose status was requested.
        cmd: String,
        /// The command's output.
        output: String,
    },

    /// The command exited with a nonzero status.
    #[error("{}", format_shell_error(&format!("shell command failed with status {status}"), cmd, output))]
    Cmd {
        /// The command that failed.
        cmd: String,
        /// Its nonzero exit status.
        status: i32,
        /// The command's output.
        output: String,
    },

    /// The read loop stopped without a definitive cause.
    #[error("{}", format_shell_error("could not execute shell command", cmd, output))]
    Unknown {
        /// The command that was run.
        cmd: String,
        /// Output read so far, without the echoed command.
        output: String,
    },

    /// A failure outside the command protocol (I/O, invalid prompt regex).
    #[error(transparent)]
    Expect(ExpectError),
}

/// Result type alias for aexpect operations.
pub type Result<T> = std::result::Result<T, ExpectError>;

/// Result type alias for shell protocol operations.
pub type ShellResult<T> = std::result::Result<T, ShellError>;

impl ExpectError {
    /// Create a timeout error.
    pub fn timeout<P: AsRef<str>>(patterns: &[P], output: impl Into<String>) -> Self {
        Self::Timeout {
            patterns: pattern_list(patterns),
            output: output.into(),
        }
    }

    /// Create a process terminated error.
    pub fn process_terminated<P: AsRef<str>>(
        patterns: &[P],
        status: Option<i32>,
        output: impl Into<String>,
    ) -> Self {
        Self::ProcessTerminated {
            patterns: pattern_list(patterns),
            status,
            output: output.into(),
        }
    }

    /// Create an error for a read loop that stopped without a known cause.
    pub fn unknown<P: AsRef<str>>(patterns: &[P], output: impl Into<String>) -> Self {
        Self::Unknown {
            patterns: pattern_list(patterns),
            output: output.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an I/O error with context.
    pub fn io_context(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::IoWithContext {
            context: context.into(),
            source,
        }
    }

    /// Wrap an I/O result with context.
    pub fn with_io_context<T>(result: std::io::Result<T>, context: impl Into<String>) -> Result<T> {
        result.map_err(|e| Self::io_context(context, e))
    }

    /// Check if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if the child process was found dead.
    #[must_use]
    pub const fn is_process_terminated(&self) -> bool {
        matches!(self, Self::ProcessTerminated { .. })
    }

    /// The output accumulated before the error, for pattern-match errors.
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Timeout { output, .. }
            | Self::ProcessTerminated { output, .. }
            | Self::Unknown { output, .. } => Some(output),
            _ => None,
        }
    }

    /// The patterns that were attempted, for pattern-match errors.
    #[must_use]
    pub fn patterns(&self) -> Option<&[String]> {
        match self {
            Self::Timeout { patterns, .. }
            | Self::ProcessTerminated { patterns, .. }
            | Self::Unknown { patterns, .. } => Some(patterns),
            _ => None,
        }
    }

    /// Exit status carried by a process terminated error.
    #[must_use]
    pub const fn status(&self) -> Option<i32> {
        match self {
            Self::ProcessTerminated { status, .. } => *status,
            _ => None,
        }
    }
}

impl SpawnError {
    /// Create an invalid argument error.
    pub fn invalid_argument(
        kind: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidArgument {
            kind: kind.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

impl ShellError {
    /// Map an expect-layer error raised while running `cmd` to its shell-layer
    /// counterpart, removing the echoed command from the partial output.
    #[must_use]
    pub fn from_expect(cmd: &str, err: ExpectError) -> Self {
        match err {
            ExpectError::Timeout { output, .. } => Self::Timeout {
                cmd: cmd.to_string(),
                output: remove_command_echo(&output, cmd),
            },
            ExpectError::ProcessTerminated { status, output, .. } => Self::ProcessTerminated {
                cmd: cmd.to_string(),
                status,
                output: remove_command_echo(&output, cmd),
            },
            ExpectError::Unknown { output, .. } => Self::Unknown {
                cmd: cmd.to_string(),
                output: remove_command_echo(&output, cmd),
            },
            other => Self::Expect(other),
        }
    }

    /// The command this error relates to.
    #[must_use]
    pub fn cmd(&self) -> Option<&str> {
        match self {
            Self::Timeout { cmd, .. }
            | Self::ProcessTerminated { cmd, .. }
            | Self::Status { cmd, .. }
            | Self::Cmd { cmd, .. }
            | Self::Unknown { cmd, .. } => Some(cmd),
            Self::Expect(_) => None,
        }
    }

    /// The command output carried by this error.
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Timeout { output, .. }
            | Self::ProcessTerminated { output, .. }
            | Self::Status { output, .. }
            | Self::Cmd { output, .. }
            | Self::Unknown { output, .. } => Some(output),
            Self::Expect(err) => err.output(),
        }
    }

    /// The exit status carried by this error (command status for
    /// [`ShellError::Cmd`], shell status for [`ShellError::ProcessTerminated`]).
    #[must_use]
    pub const fn status(&self) -> Option<i32> {
        match self {
            Self::Cmd { status, .. } => Some(*status),
            Self::ProcessTerminated { status, .. } => *status,
            _ => None,
        }
    }

    /// Check if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<ExpectError> for ShellError {
    fn from(err: ExpectError) -> Self {
        Self::Expect(err)
    }
}

fn pattern_list<P: AsRef<str>>(patterns: &[P]) -> Vec<String> {
    patterns.iter().map(|p| p.as_ref().to_string()).collect()
}

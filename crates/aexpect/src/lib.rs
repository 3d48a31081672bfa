//! aexpect: detached process sessions with expect-style reads
//!
//! This crate runs a command behind a pseudo-terminal in a separate spawner
//! process (`aexpect-server`) and talks to it through a handful of files:
//! FIFOs for input and for each output reader, a log of everything printed,
//! and advisory lock files that tell whether the process is alive. A session
//! therefore outlives the handle that created it and can be attached to by id.
//!
//! # Layers
//!
//! - [`ProcessSession`]: spawn or attach, send input, read the log, query
//!   liveness and exit status, close
//! - [`Tail`]: background line callbacks on a private reader
//! - [`Expect`]: pattern reads on a second private reader
//! - [`ShellSession`]: run shell commands through the prompt and collect
//!   their output and exit status
//!
//! The capabilities are traits ([`ProcessHandle`], [`LineTailer`],
//! [`PatternReader`], [`ShellProtocol`]) implemented by composition.
//!
//! # Example
//!
//! ```ignore
//! use aexpect::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ShellError> {
//!     let mut shell = ShellSession::spawn(SpawnOptions::new("sh"), TailCallbacks::new()).await?;
//!     shell.read_up_to_prompt(shell.read_options()).await?;
//!     let status = shell.cmd_status("test -d /tmp", shell.read_options()).await?;
//!     assert_eq!(status, 0);
//!     shell.close_default().await;
//!     Ok(())
//! }
//! ```

// Lets the macros name `::aexpect` from inside this crate too.
extern crate self as aexpect;

// Re-export macros
pub use aexpect_macros::{patterns, regex};

#[doc(hidden)]
pub mod __private {
    pub use regex::Regex;
}

pub mod config;
pub mod error;
pub mod expect;
pub mod pipe;
pub mod prelude;
pub mod process;
pub mod server;
pub mod session_files;
pub mod shell;
pub mod sync;
pub mod tail;

pub use config::{SessionConfig, ShellConfig, TimeoutConfig};
pub use error::{ExpectError, Result, ShellError, ShellResult, SpawnError};
pub use expect::{
    Expect, ExpectReader, PatternReader, ReadOptions, RegexCache, get_regex, last_line,
    last_word, match_patterns,
};
pub use process::{
    ProcessHandle, ProcessSession, PtySignal, SpawnOptions, StatusProbe, kill_process_tree,
};
pub use session_files::{FileLock, SessionFiles, generate_id};
pub use shell::{
    ShellProtocol, ShellSession, parse_status, remove_command_echo, remove_last_nonempty_line,
};
pub use sync::SyncShellSession;
pub use tail::{LineTailer, Tail, TailCallbacks, TailSupervisor, run_bg, run_fg};

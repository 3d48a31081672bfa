//! aexpect-pty: async PTY layer for the aexpect spawner
//!
//! This crate allocates a pseudo-terminal, runs a shell command line behind
//! it and exposes the master side as an async byte stream.
//!
//! # Quick Start
//!
//! ```ignore
//! use aexpect_pty::{PtyConfig, UnixPtySystem};
//! use tokio::io::AsyncReadExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PtyConfig::builder().echo(false).build();
//!     let (mut master, mut child) = UnixPtySystem::spawn("uname -a", &config)?;
//!
//!     let mut buf = [0u8; 1024];
//!     let n = master.read(&mut buf).await?;
//!     println!("{}", String::from_utf8_lossy(&buf[..n]));
//!
//!     println!("{}", child.wait().await?);
//!     Ok(())
//! }
//! ```

#[cfg(not(unix))]
compile_error!("aexpect-pty only supports Unix platforms");

pub mod config;
pub mod error;
pub mod traits;
pub mod unix;

// Re-export primary types
pub use config::{PtyConfig, PtyConfigBuilder, PtySignal, WindowSize};
pub use error::{PtyError, Result};
pub use traits::{ExitStatus, PtyChild, PtyMaster};
pub use unix::{NativePtySystem, UnixPtyChild, UnixPtyMaster, UnixPtySystem};

/// Run a command line behind a new PTY with the default configuration.
///
/// # Errors
///
/// Returns an error if PTY creation or spawning fails.
pub fn spawn_command(command: &str) -> Result<(UnixPtyMaster, UnixPtyChild)> {
    UnixPtySystem::spawn(command, &PtyConfig::default())
}

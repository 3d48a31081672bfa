//! Convenient re-exports for common aexpect usage.
//!
//! ```ignore
//! use aexpect::prelude::*;
//! ```

// Configuration
pub use crate::config::{SessionConfig, ShellConfig, TimeoutConfig};

// Error handling
pub use crate::error::{ExpectError, Result, ShellError, ShellResult, SpawnError};

// Macros (re-exported from aexpect-macros)
pub use crate::{patterns, regex};

// Sessions
pub use crate::expect::{Expect, ReadOptions};
pub use crate::process::{ProcessSession, PtySignal, SpawnOptions};
pub use crate::shell::ShellSession;
pub use crate::sync::SyncShellSession;
pub use crate::tail::{Tail, TailCallbacks, TailSupervisor};

// Capability traits
pub use crate::expect::PatternReader;
pub use crate::process::ProcessHandle;
pub use crate::shell::ShellProtocol;
pub use crate::tail::LineTailer;

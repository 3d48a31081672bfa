//! Shared helpers for the session integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use aexpect::{SessionConfig, generate_id};

/// An interactive POSIX shell with a predictable prompt.
pub const SHELL: &str = "env PS1='$ ' /bin/sh";

/// A configuration with its own base directory and the freshly built server.
pub fn config() -> SessionConfig {
    SessionConfig::new()
        .base_dir(base_dir())
        .server_program(env!("CARGO_BIN_EXE_aexpect-server"))
}

fn base_dir() -> PathBuf {
    std::env::temp_dir().join(format!("aexpect-it-{}", generate_id()))
}

/// Poll `check` every 20 ms until it holds or `timeout` passes.
pub async fn eventually<F: FnMut() -> bool>(timeout: Duration, mut check: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// Remove a test's base directory.
pub fn remove_base_dir(config: &SessionConfig) {
    let _ = std::fs::remove_dir_all(&config.base_dir);
}

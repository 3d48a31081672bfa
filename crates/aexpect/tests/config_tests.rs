//! Configuration loading tests.

#![cfg(unix)]

mod common;

use std::path::PathBuf;
use std::time::Duration;

use aexpect::{SessionConfig, ShellProtocol, ShellSession, SpawnOptions, TailCallbacks, generate_id};

fn write_config(content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("aexpect-config-{}.toml", generate_id()));
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn load_layers_file_over_defaults() {
    let path = write_config(
        r#"
        [session]
        linesep = "\r\n"

        [timeouts]
        expect = 12
        status = 0.5
        "#,
    );

    let config = SessionConfig::load(&path).unwrap();
    assert_eq!(config.linesep, "\r\n");
    assert_eq!(config.timeouts.status, Duration::from_millis(500));
    // Untouched keys keep their defaults.
    assert_eq!(config.timeouts.internal, Duration::from_millis(100));
    assert_eq!(config.shell, SessionConfig::default().shell);

    let _ = std::fs::remove_file(path);
}

#[test]
fn load_reports_syntax_errors() {
    let path = write_config("[timeouts\nexpect = 1\n");
    let err = SessionConfig::load(&path).unwrap_err();
    assert!(err.to_string().starts_with("configuration error"));
    let _ = std::fs::remove_file(path);
}

/// The prompt of a loaded configuration drives the shell protocol.
#[tokio::test]
async fn shell_uses_configured_prompt() {
    let path = write_config("[shell]\nprompt = '^\\$ $'\n");
    let config = SessionConfig::load(&path)
        .unwrap()
        .base_dir(common::config().base_dir)
        .server_program(env!("CARGO_BIN_EXE_aexpect-server"));
    let _ = std::fs::remove_file(path);

    let mut shell = ShellSession::spawn(
        SpawnOptions::new(common::SHELL).config(config.clone()),
        TailCallbacks::new(),
    )
    .await
    .unwrap();
    assert_eq!(shell.prompt(), r"^\$ $");

    let options = shell.read_options();
    shell.read_up_to_prompt(options).await.unwrap();
    let output = shell.cmd_output("echo configured", options).await.unwrap();
    assert_eq!(output, "configured\n");

    shell.close_default().await;
    common::remove_base_dir(&config);
}

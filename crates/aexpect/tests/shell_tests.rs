//! Integration tests for the shell command protocol.

#![cfg(unix)]

mod common;

use std::time::Duration;

use aexpect::{
    ProcessHandle, ShellError, ShellProtocol, ShellSession, SpawnOptions, SyncShellSession,
    TailCallbacks,
};

async fn shell(config: &aexpect::SessionConfig) -> ShellSession {
    let mut shell = ShellSession::spawn(
        SpawnOptions::new(common::SHELL).config(config.clone()),
        TailCallbacks::new(),
    )
    .await
    .unwrap();
    shell.read_up_to_prompt(shell.read_options()).await.unwrap();
    shell
}

/// Command output comes back without the echo and the prompt.
#[tokio::test]
async fn cmd_output_strips_prompt() {
    let config = common::config();
    let mut shell = shell(&config).await;

    let output = shell
        .cmd_output("echo hello", shell.read_options())
        .await
        .unwrap();
    assert_eq!(output, "hello\n");

    shell.close_default().await;
    common::remove_base_dir(&config);
}

/// The echoed command line is removed when the terminal echoes input.
#[tokio::test]
async fn cmd_output_strips_echo() {
    let config = common::config().echo(true);
    let mut shell = shell(&config).await;

    let output = shell
        .cmd_output("echo two words", shell.read_options())
        .await
        .unwrap();
    assert_eq!(output, "two words\n");

    shell.close_default().await;
    common::remove_base_dir(&config);
}

/// Exit statuses come from the status probe.
#[tokio::test]
async fn cmd_status_values() {
    let config = common::config();
    let mut shell = shell(&config).await;
    let options = shell.read_options();

    assert_eq!(shell.cmd_status("true", options).await.unwrap(), 0);
    assert_eq!(shell.cmd_status("false", options).await.unwrap(), 1);
    let (status, output) = shell
        .cmd_status_output("echo out; (exit 5)", options)
        .await
        .unwrap();
    assert_eq!(status, 5);
    assert_eq!(output, "out\n");

    shell.close_default().await;
    common::remove_base_dir(&config);
}

/// `cmd` fails on a nonzero status and carries the details.
#[tokio::test]
async fn cmd_rejects_failure() {
    let config = common::config();
    let mut shell = shell(&config).await;

    let err = shell.cmd("false", shell.read_options()).await.unwrap_err();
    match err {
        ShellError::Cmd { cmd, status, .. } => {
            assert_eq!(cmd, "false");
            assert_eq!(status, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(shell.cmd("echo fine", shell.read_options()).await.unwrap(), "fine\n");

    shell.close_default().await;
    common::remove_base_dir(&config);
}

/// A command that outlives its timeout maps to the shell timeout error.
#[tokio::test]
async fn cmd_timeout() {
    let config = common::config();
    let mut shell = shell(&config).await;

    let options = shell.read_options().timeout(Duration::from_millis(300));
    let err = shell.cmd_output("sleep 5", options).await.unwrap_err();
    assert!(err.is_timeout(), "unexpected error: {err}");
    assert_eq!(err.cmd(), Some("sleep 5"));

    shell.close_default().await;
    common::remove_base_dir(&config);
}

/// Exiting the shell maps to the process terminated error.
#[tokio::test]
async fn shell_exit_is_reported() {
    let config = common::config();
    let mut shell = shell(&config).await;

    let err = shell
        .cmd_output("exit 9", shell.read_options())
        .await
        .unwrap_err();
    match err {
        ShellError::ProcessTerminated { status, .. } => assert_eq!(status, Some(9)),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!shell.is_alive());

    shell.close_default().await;
    common::remove_base_dir(&config);
}

/// A live shell answers a bare newline.
#[tokio::test]
async fn responsiveness_probe() {
    let config = common::config();
    let mut shell = shell(&config).await;

    assert!(shell.is_responsive(Duration::from_secs(5)).await);
    shell.close_default().await;
    assert!(!shell.is_responsive(Duration::from_millis(200)).await);
    common::remove_base_dir(&config);
}

/// A changed prompt is what delimits command output.
#[tokio::test]
async fn custom_prompt() {
    let config = common::config();
    let mut shell = shell(&config).await;

    shell.set_prompt(r"ready>\s*$");
    let output = shell
        .cmd_output("PS1='ready> '", shell.read_options())
        .await
        .unwrap();
    assert_eq!(output, "");

    let output = shell
        .cmd_output("echo custom", shell.read_options())
        .await
        .unwrap();
    assert_eq!(output, "custom\n");
    assert_eq!(shell.prompt(), r"ready>\s*$");

    shell.close_default().await;
    common::remove_base_dir(&config);
}

/// The blocking wrapper drives a shell without an outer runtime.
#[test]
fn sync_shell_session() {
    let config = common::config();
    let mut shell = SyncShellSession::spawn(
        SpawnOptions::new(common::SHELL).config(config.clone()),
        TailCallbacks::new(),
    )
    .unwrap();
    let options = shell.read_options();

    shell.read_up_to_prompt(options).unwrap();
    assert_eq!(shell.cmd("echo sync", options).unwrap(), "sync\n");
    assert_eq!(shell.cmd_status("false", options).unwrap(), 1);

    shell.close_default();
    assert!(!shell.is_alive());
    common::remove_base_dir(&config);
}

//! Integration tests for the process client and the spawner.

#![cfg(unix)]

mod common;

use std::time::Duration;

use aexpect::{ProcessSession, SessionFiles, SpawnOptions, TimeoutConfig};

/// Output of a process that exits at once is still recorded.
#[tokio::test]
async fn instant_exit_keeps_output() {
    let config = common::config();
    let mut session = ProcessSession::spawn(SpawnOptions::new("echo quick").config(config.clone()))
        .await
        .unwrap();

    assert_eq!(session.get_status().await, Some(0));
    assert_eq!(session.get_output(), "quick\n");
    assert!(!session.is_alive());

    session.close_default().await;
    common::remove_base_dir(&config);
}

/// `is_alive` follows the running lock and flips after exit.
#[tokio::test]
async fn liveness_flips_after_exit() {
    let config = common::config();
    let mut session = ProcessSession::spawn(SpawnOptions::new("sleep 0.3").config(config.clone()))
        .await
        .unwrap();

    assert!(session.is_alive());
    assert!(session.get_pid().is_some());
    assert!(common::eventually(Duration::from_secs(10), || !session.is_alive()).await);

    session.close_default().await;
    common::remove_base_dir(&config);
}

/// The exit status is the same on every read, even after close.
#[tokio::test]
async fn status_is_stable() {
    let config = common::config();
    let mut session = ProcessSession::spawn(SpawnOptions::new("exit 7").config(config.clone()))
        .await
        .unwrap();

    assert_eq!(session.get_status().await, Some(7));
    assert_eq!(session.get_status().await, Some(7));
    session.close_default().await;
    assert_eq!(session.get_status().await, Some(7));
    common::remove_base_dir(&config);
}

/// Killing the process reports `128 + SIGKILL`.
#[tokio::test]
async fn close_kills_running_process() {
    let config = common::config();
    let mut session = ProcessSession::spawn(SpawnOptions::new("sleep 30").config(config.clone()))
        .await
        .unwrap();
    assert!(session.is_alive());

    session.close_default().await;
    assert!(!session.is_alive());
    assert_eq!(session.get_status().await, Some(137));
    common::remove_base_dir(&config);
}

/// Closing twice is harmless and does not bring files back.
#[tokio::test]
async fn close_twice() {
    let config = common::config();
    let mut session = ProcessSession::spawn(SpawnOptions::new("cat").config(config.clone()))
        .await
        .unwrap();
    let files = session.files().clone();

    session.close_default().await;
    session.close_default().await;
    session.sendline("ignored");

    assert!(session.is_closed());
    assert!(!files.inpipe().exists());
    assert!(!files.output_file().exists());
    assert!(!files.lock_server_running().exists());
    assert!(!files.lock_client_starting().exists());
    common::remove_base_dir(&config);
}

/// Input reaches the child and its answer lands in the log.
#[tokio::test]
async fn send_reaches_child() {
    let config = common::config();
    let mut session = ProcessSession::spawn(SpawnOptions::new("cat").config(config.clone()))
        .await
        .unwrap();

    session.send("par");
    session.sendline("tial");
    let answered =
        common::eventually(Duration::from_secs(10), || session.get_output() == "partial\n").await;
    assert!(answered, "output was {:?}", session.get_output());

    session.close_default().await;
    common::remove_base_dir(&config);
}

/// A second handle can attach by id and drive the same process.
#[tokio::test]
async fn attach_by_id() {
    let config = common::config();
    let mut owner = ProcessSession::spawn(
        SpawnOptions::new("cat").id("attachme").config(config.clone()),
    )
    .await
    .unwrap();

    let attached = ProcessSession::attach("attachme", Vec::<String>::new(), config.clone())
        .await
        .unwrap();
    assert!(attached.is_alive());
    assert_eq!(attached.get_pid(), owner.get_pid());

    attached.sendline("from attached");
    let seen =
        common::eventually(Duration::from_secs(10), || owner.get_output().contains("from attached"))
            .await;
    assert!(seen);

    owner.close_default().await;
    assert!(!attached.is_alive());
    common::remove_base_dir(&config);
}

/// Close hooks run once, before the files are removed.
#[tokio::test]
async fn close_hooks_run_once() {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    let config = common::config();
    let mut session = ProcessSession::spawn(SpawnOptions::new("cat").config(config.clone()))
        .await
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    session.add_close_hook(move |s| {
        assert!(s.files().output_file().exists());
        counter.fetch_add(1, Ordering::SeqCst);
    });

    session.close_default().await;
    session.close_default().await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    common::remove_base_dir(&config);
}

/// Dropping an auto-closing session kills the process and removes its files.
#[tokio::test]
async fn auto_close_on_drop() {
    let config = common::config();
    let session = ProcessSession::spawn(
        SpawnOptions::new("sleep 30")
            .auto_close(true)
            .config(config.clone()),
    )
    .await
    .unwrap();
    let files = session.files().clone();
    drop(session);

    let removed = common::eventually(Duration::from_secs(10), || {
        !files.output_file().exists() && !files.lock_server_running().exists()
    })
    .await;
    assert!(removed);
    common::remove_base_dir(&config);
}

/// The spawner runs with the client's poll interval: a background job
/// keeps the terminal open after the shell exits, so the exit is only
/// noticed on the next poll tick.
#[tokio::test]
async fn spawner_uses_client_poll_interval() {
    let config = common::config().timeouts(
        TimeoutConfig::new()
            .server_poll(Duration::from_secs(3))
            .server_drain(Duration::from_millis(200)),
    );
    let mut session = ProcessSession::spawn(SpawnOptions::new("sleep 4 & true").config(config.clone()))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(session.is_alive());
    assert!(common::eventually(Duration::from_secs(10), || !session.is_alive()).await);
    assert_eq!(session.get_status().await, Some(0));

    session.close_default().await;
    common::remove_base_dir(&config);
}

/// A spawner that never announces readiness leaves no session files.
#[tokio::test]
async fn failed_spawn_leaves_no_files() {
    let config = common::config().server_program("/bin/true");
    let result = ProcessSession::spawn(
        SpawnOptions::new("echo never")
            .id("failed1")
            .reader("expect")
            .config(config.clone()),
    )
    .await;
    assert!(result.is_err());

    let files = SessionFiles::new(&config.base_dir, "failed1");
    for path in files.all(["expect"]) {
        assert!(!path.exists(), "{} was left behind", path.display());
    }
    common::remove_base_dir(&config);
}

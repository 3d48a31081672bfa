//! Signalling whole process trees.

use std::io;

use aexpect_pty::PtySignal;
use rustix::process::{Pid, Signal, kill_process};

/// Signal `pid` and every descendant.
///
/// Each process is stopped before its children are collected, so it cannot
/// fork new ones behind our back, then signalled and continued. Processes
/// that disappear along the way are skipped.
pub fn kill_process_tree(pid: u32, signal: PtySignal) {
    let _ = send(pid, PtySignal::Stop);
    for child in child_pids(pid) {
        kill_process_tree(child, signal);
    }
    if let Err(e) = send(pid, signal) {
        tracing::debug!(pid, ?signal, error = %e, "Could not signal process");
    }
    let _ = send(pid, PtySignal::Continue);
}

fn send(pid: u32, signal: PtySignal) -> io::Result<()> {
    let pid = Pid::from_raw(pid as i32)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid pid"))?;
    let signal = Signal::from_named_raw(signal.as_unix_signal())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid signal"))?;
    kill_process(pid, signal).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

/// Direct children of `ppid`, found by scanning `/proc/*/stat`.
#[must_use]
pub fn child_pids(ppid: u32) -> Vec<u32> {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };

    entries
        .filter_map(|entry| {
            let pid: u32 = entry.ok()?.file_name().to_str()?.parse().ok()?;
            let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
            (parse_ppid(&stat)? == ppid).then_some(pid)
        })
        .collect()
}

/// Parent pid field of a `/proc/<pid>/stat` line.
///
/// The command name may contain spaces and parentheses, so fields are
/// counted from the last `)`.
fn parse_ppid(stat: &str) -> Option<u32> {
    let rest = &stat[stat.rfind(')')? + 1..];
    rest.split_whitespace().nth(1)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ppid_with_odd_names() {
        assert_eq!(parse_ppid("42 (sh) S 7 42 42 0"), Some(7));
        assert_eq!(parse_ppid("42 (a) b (c)) R 9 1 1"), Some(9));
        assert_eq!(parse_ppid("garbage"), None);
    }

    #[test]
    fn finds_own_children() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let children = child_pids(std::process::id());
        assert!(children.contains(&child.id()));

        kill_process_tree(child.id(), PtySignal::Kill);
        let status = child.wait().unwrap();
        assert!(!status.success());
    }
}

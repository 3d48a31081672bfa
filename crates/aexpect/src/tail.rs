//! Line tailing of a session's output.
//!
//! A [`Tail`] owns the private `tail` reader of its session. Once an output
//! or termination callback is registered, a background worker reads that
//! reader, splits it into lines and hands each line to the output callback.
//! A partial line is handed over as soon as the reader stays quiet for the
//! poll interval, so prompts without a trailing newline still show up. When
//! the process ends the worker emits a final
//! `(Process terminated with status N)` line and calls the termination
//! callback once.

mod supervisor;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub use supervisor::TailSupervisor;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_RUN_BG_TIMEOUT;
use crate::error::Result;
use crate::pipe::{ReadEvent, ReaderPipe, Utf8Decoder};
use crate::process::{ProcessHandle, ProcessSession, PtySignal, SpawnOptions, StatusProbe};

/// Name of the reader owned by [`Tail`].
pub const TAIL_READER: &str = "tail";

/// Interval between liveness checks in [`run_bg`].
const RUN_BG_POLL: Duration = Duration::from_millis(100);

/// Callback receiving each output line.
pub type OutputFunc = Arc<dyn Fn(&str) + Send + Sync>;

/// Callback receiving the exit status.
pub type TerminationFunc = Arc<dyn Fn(i32) + Send + Sync>;

/// Callbacks of a [`Tail`].
#[derive(Clone, Default)]
pub struct TailCallbacks {
    output_func: Option<OutputFunc>,
    termination_func: Option<TerminationFunc>,
    output_prefix: String,
}

impl std::fmt::Debug for TailCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailCallbacks")
            .field("output_func", &self.output_func.is_some())
            .field("termination_func", &self.termination_func.is_some())
            .field("output_prefix", &self.output_prefix)
            .finish()
    }
}

impl TailCallbacks {
    /// No callbacks, empty prefix.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `f` with every output line.
    #[must_use]
    pub fn on_output<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.output_func = Some(Arc::new(f));
        self
    }

    /// Call `f` with the exit status when the process ends.
    #[must_use]
    pub fn on_termination<F>(mut self, f: F) -> Self
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.termination_func = Some(Arc::new(f));
        self
    }

    /// Prepend `prefix` to every output line.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.output_prefix = prefix.into();
        self
    }

    fn has_callback(&self) -> bool {
        self.output_func.is_some() || self.termination_func.is_some()
    }
}

/// A session whose output is tailed line by line in the background.
pub struct Tail {
    session: ProcessSession,
    callbacks: Arc<Mutex<TailCallbacks>>,
    pipe: Option<ReaderPipe>,
    worker: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    supervisor: Option<TailSupervisor>,
    handle: Handle,
}

impl std::fmt::Debug for Tail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tail")
            .field("session", &self.session)
            .field("worker", &self.worker.is_some())
            .finish()
    }
}

impl Tail {
    /// Spawn a session with a `tail` reader.
    pub async fn spawn(options: SpawnOptions, callbacks: TailCallbacks) -> Result<Self> {
        let session = ProcessSession::spawn(options.reader(TAIL_READER)).await?;
        Ok(Self::from_session(session, callbacks, None))
    }

    /// Like [`Tail::spawn`], with the worker tracked by `supervisor`.
    pub async fn spawn_with_supervisor(
        options: SpawnOptions,
        callbacks: TailCallbacks,
        supervisor: &TailSupervisor,
    ) -> Result<Self> {
        let session = ProcessSession::spawn(options.reader(TAIL_READER)).await?;
        Ok(Self::from_session(
            session,
            callbacks,
            Some(supervisor.clone()),
        ))
    }

    /// Wrap a session that declared the `tail` reader.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn from_session(
        mut session: ProcessSession,
        callbacks: TailCallbacks,
        supervisor: Option<TailSupervisor>,
    ) -> Self {
        let cancel = supervisor
            .as_ref()
            .map_or_else(CancellationToken::new, TailSupervisor::child_token);
        let mut tail = Self {
            pipe: session.take_reader(TAIL_READER),
            session,
            callbacks: Arc::new(Mutex::new(callbacks)),
            worker: None,
            cancel,
            supervisor,
            handle: Handle::current(),
        };
        tail.start_worker();
        tail
    }

    /// The underlying session.
    #[must_use]
    pub const fn session(&self) -> &ProcessSession {
        &self.session
    }

    /// The underlying session, mutably.
    pub fn session_mut(&mut self) -> &mut ProcessSession {
        &mut self.session
    }

    /// Set the termination callback.
    pub fn set_termination_func<F>(&mut self, f: F)
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.callbacks().termination_func = Some(Arc::new(f));
        self.start_worker();
    }

    /// Set the output callback.
    pub fn set_output_func<F>(&mut self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks().output_func = Some(Arc::new(f));
        self.start_worker();
    }

    /// Set the prefix of every output line.
    pub fn set_output_prefix(&mut self, prefix: impl Into<String>) {
        self.callbacks().output_prefix = prefix.into();
        self.start_worker();
    }

    /// Whether the background worker was started.
    #[must_use]
    pub const fn is_tailing(&self) -> bool {
        self.worker.is_some()
    }

    /// Kill the process, wait for the worker to deliver the remaining lines
    /// and the termination callback, then clean up the session.
    pub async fn close(&mut self, signal: PtySignal) {
        if self.session.is_closed() {
            return;
        }
        self.session.terminate(signal).await;
        self.join_worker().await;
        self.session.cleanup();
    }

    /// [`Tail::close`] with `SIGKILL`.
    pub async fn close_default(&mut self) {
        self.close(PtySignal::Kill).await;
    }

    fn callbacks(&self) -> MutexGuard<'_, TailCallbacks> {
        lock(&self.callbacks)
    }

    fn start_worker(&mut self) {
        if self.worker.is_some() || !self.callbacks().has_callback() {
            return;
        }
        let Some(pipe) = self.pipe.take() else {
            tracing::debug!(id = %self.session.id(), "No tail reader, not tailing");
            return;
        };

        let worker = TailWorker {
            pipe,
            callbacks: Arc::clone(&self.callbacks),
            status: self.session.status_probe(),
            poll: self.session.config().timeouts.tail_poll,
            cancel: self.cancel.clone(),
        };
        tracing::debug!(id = %self.session.id(), "Starting tail worker");
        self.worker = Some(match &self.supervisor {
            Some(supervisor) => supervisor.spawn_on(worker.run(), &self.handle),
            None => self.handle.spawn(worker.run()),
        });
    }

    async fn join_worker(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let abort = worker.abort_handle();
        let bound = self.session.config().timeouts.tail_join;
        if tokio::time::timeout(bound, worker).await.is_err() {
            tracing::warn!(id = %self.session.id(), "Tail worker did not finish in time");
            self.cancel.cancel();
            abort.abort();
        }
    }
}

impl Drop for Tail {
    fn drop(&mut self) {
        // The worker only lives as long as its tail.
        self.cancel.cancel();
    }
}

impl ProcessHandle for Tail {
    fn process(&self) -> &ProcessSession {
        &self.session
    }

    fn process_mut(&mut self) -> &mut ProcessSession {
        &mut self.session
    }
}

/// Access to the [`Tail`] behind a higher-level session.
pub trait LineTailer: ProcessHandle {
    /// The underlying tail.
    fn tail(&mut self) -> &mut Tail;

    /// Set the termination callback.
    fn set_termination_func<F>(&mut self, f: F)
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.tail().set_termination_func(f);
    }

    /// Set the output callback.
    fn set_output_func<F>(&mut self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.tail().set_output_func(f);
    }

    /// Set the prefix of every output line.
    fn set_output_prefix(&mut self, prefix: impl Into<String>) {
        self.tail().set_output_prefix(prefix);
    }
}

impl LineTailer for Tail {
    fn tail(&mut self) -> &mut Tail {
        self
    }
}

fn lock(callbacks: &Mutex<TailCallbacks>) -> MutexGuard<'_, TailCallbacks> {
    callbacks.lock().unwrap_or_else(PoisonError::into_inner)
}

struct TailWorker {
    pipe: ReaderPipe,
    callbacks: Arc<Mutex<TailCallbacks>>,
    status: StatusProbe,
    poll: Duration,
    cancel: CancellationToken,
}

impl TailWorker {
    async fn run(mut self) {
        let mut decoder = Utf8Decoder::new();
        let mut lines = LineSplitter::default();

        loop {
            let event = tokio::select! {
                () = self.cancel.cancelled() => return,
                event = self.pipe.read_timeout(self.poll) => event,
            };
            match event {
                Ok(ReadEvent::Data(bytes)) => {
                    for line in lines.push(&decoder.decode(&bytes)) {
                        self.emit(&line);
                    }
                }
                Ok(ReadEvent::Idle) => {
                    if let Some(line) = lines.flush() {
                        self.emit(&line);
                    }
                }
                Ok(ReadEvent::Eof) => break,
                Err(e) => {
                    tracing::debug!(error = %e, "Tail read failed");
                    break;
                }
            }
        }

        for line in lines.push(&decoder.finish()) {
            self.emit(&line);
        }
        if let Some(line) = lines.flush() {
            self.emit(&line);
        }

        let status = tokio::select! {
            () = self.cancel.cancelled() => return,
            status = self.status.get() => status,
        };
        let Some(status) = status else {
            tracing::debug!("Exit status unavailable, no termination callback");
            return;
        };

        self.emit(&format!("(Process terminated with status {status})"));
        let termination = lock(&self.callbacks).termination_func.clone();
        if let Some(termination) = termination {
            termination(status);
        }
        tracing::debug!(status, "Tail worker finished");
    }

    fn emit(&self, line: &str) {
        let (output, prefix) = {
            let callbacks = lock(&self.callbacks);
            (
                callbacks.output_func.clone(),
                callbacks.output_prefix.clone(),
            )
        };
        if let Some(output) = output {
            output(&format!("{prefix}{}", line.trim_end()));
        }
    }
}

/// Splits a text stream into lines, holding back the trailing partial line.
#[derive(Debug, Default)]
pub(crate) struct LineSplitter {
    partial: String,
}

impl LineSplitter {
    /// Append `text` and return every completed line, newline included.
    pub(crate) fn push(&mut self, text: &str) -> Vec<String> {
        self.partial.push_str(text);
        let mut lines = Vec::new();
        while let Some(end) = self.partial.find('\n') {
            lines.push(self.partial.drain(..=end).collect());
        }
        lines
    }

    /// Take the partial line, if any.
    pub(crate) fn flush(&mut self) -> Option<String> {
        (!self.partial.is_empty()).then(|| std::mem::take(&mut self.partial))
    }
}

/// Start a [`Tail`] and return it once the process ended or `timeout`
/// elapsed, whichever comes first.
pub async fn run_bg(
    options: SpawnOptions,
    callbacks: TailCallbacks,
    timeout: Option<Duration>,
) -> Result<Tail> {
    let tail = Tail::spawn(options, callbacks).await?;
    let deadline = Instant::now() + timeout.unwrap_or(DEFAULT_RUN_BG_TIMEOUT);
    while tail.is_alive() && Instant::now() < deadline {
        tokio::time::sleep(RUN_BG_POLL.min(deadline.saturating_duration_since(Instant::now())))
            .await;
    }
    Ok(tail)
}

/// Run a command to completion (or `timeout`), returning its exit status
/// (`None` if it is still running) and its output. The session is closed
/// before returning.
pub async fn run_fg(
    options: SpawnOptions,
    callbacks: TailCallbacks,
    timeout: Option<Duration>,
) -> Result<(Option<i32>, String)> {
    let mut tail = run_bg(options, callbacks, timeout).await?;
    let output = tail.get_output();
    let status = if tail.is_alive() {
        None
    } else {
        tail.get_status().await
    };
    tail.close_default().await;
    Ok((status, output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn splitter_holds_partial_line() {
        let mut lines = LineSplitter::default();
        assert_eq!(lines.push("a\nb"), vec!["a\n"]);
        assert_eq!(lines.push("c\n\nd"), vec!["bc\n", "\n"]);
        assert_eq!(lines.flush().as_deref(), Some("d"));
        assert_eq!(lines.flush(), None);
    }

    #[test]
    fn callbacks_debug() {
        let callbacks = TailCallbacks::new().on_output(|_| {}).prefix("[x] ");
        let debug = format!("{callbacks:?}");
        assert!(debug.contains("output_func: true"));
        assert!(debug.contains("termination_func: false"));
        assert!(callbacks.has_callback());
        assert!(!TailCallbacks::new().prefix("p").has_callback());
    }

    proptest! {
        #[test]
        fn splitter_keeps_every_byte(chunks in prop::collection::vec("[a-c\n]{0,8}", 0..16)) {
            let mut lines = LineSplitter::default();
            let mut out = String::new();
            for chunk in &chunks {
                for line in lines.push(chunk) {
                    prop_assert!(line.ends_with('\n'));
                    prop_assert_eq!(line.matches('\n').count(), 1);
                    out.push_str(&line);
                }
            }
            let rest = lines.flush().unwrap_or_default();
            prop_assert!(!rest.contains('\n'));
            out.push_str(&rest);
            prop_assert_eq!(out, chunks.concat());
        }
    }
}

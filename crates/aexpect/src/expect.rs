//! Pattern-driven reads against a session's output.
//!
//! [`Expect`] adds a private `expect` reader next to the `tail` reader of
//! [`Tail`], so synchronous reads never compete with the background tailer.
//! The [`PatternReader`] methods read that reader until the accumulated text
//! (optionally passed through a filter such as [`last_line`]) matches one of
//! a list of regular expressions.
//!
//! # Example
//!
//! ```ignore
//! use aexpect::{Expect, PatternReader, ReadOptions, SpawnOptions, TailCallbacks};
//!
//! let mut session = Expect::spawn(SpawnOptions::new("sh"), TailCallbacks::new()).await?;
//! session.sendline("echo ready");
//! let (index, output) = session
//!     .read_until_last_line_matches(&["ready"], ReadOptions::default())
//!     .await?;
//! ```

mod cache;

use std::future::Future;
use std::io;
use std::time::Duration;

pub use cache::{DEFAULT_CACHE_SIZE, RegexCache, get_regex};
use tokio::time::Instant;

use crate::config::{DEFAULT_EXPECT_TIMEOUT, DEFAULT_INTERNAL_TIMEOUT, TimeoutConfig};
use crate::error::{ExpectError, Result};
use crate::pipe::{ReaderPipe, Utf8Decoder};
use crate::process::{ProcessHandle, ProcessSession, PtySignal, SpawnOptions};
use crate::tail::{LineTailer, Tail, TailCallbacks, TailSupervisor};

/// Name of the reader owned by [`Expect`].
pub const EXPECT_READER: &str = "expect";

/// Interval between liveness checks after a read loop ended early.
const LIVENESS_POLL: Duration = Duration::from_millis(100);

/// Observer called with every line read.
pub type PrintFunc<'a> = &'a (dyn Fn(&str) + Sync);

/// Timeouts and observer of one pattern read.
#[derive(Clone, Copy)]
pub struct ReadOptions<'a> {
    /// Overall deadline for a match.
    pub timeout: Duration,
    /// Idle time that ends one drain of the reader.
    pub internal_timeout: Duration,
    /// Called with every line read.
    pub print_func: Option<PrintFunc<'a>>,
}

impl std::fmt::Debug for ReadOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadOptions")
            .field("timeout", &self.timeout)
            .field("internal_timeout", &self.internal_timeout)
            .field("print_func", &self.print_func.is_some())
            .finish()
    }
}

impl Default for ReadOptions<'_> {
    fn default() -> Self {
        Self::new(DEFAULT_EXPECT_TIMEOUT)
    }
}

impl From<Duration> for ReadOptions<'_> {
    fn from(timeout: Duration) -> Self {
        Self::new(timeout)
    }
}

impl<'a> ReadOptions<'a> {
    /// Read for at most `timeout`.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            internal_timeout: DEFAULT_INTERNAL_TIMEOUT,
            print_func: None,
        }
    }

    /// Defaults taken from a session's timeouts.
    #[must_use]
    pub const fn from_config(timeouts: &TimeoutConfig) -> Self {
        Self {
            timeout: timeouts.expect,
            internal_timeout: timeouts.internal,
            print_func: None,
        }
    }

    /// Set the overall timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the drain idle time.
    #[must_use]
    pub const fn internal_timeout(mut self, timeout: Duration) -> Self {
        self.internal_timeout = timeout;
        self
    }

    /// Call `f` with every line read.
    #[must_use]
    pub fn print_func(mut self, f: PrintFunc<'a>) -> Self {
        self.print_func = Some(f);
        self
    }
}

/// The `expect` reader of a session, with its decoding state.
#[derive(Debug, Default)]
pub struct ExpectReader {
    pipe: Option<ReaderPipe>,
    decoder: Utf8Decoder,
}

impl ExpectReader {
    /// Wrap an opened reader pipe. Without one every read sees end of file.
    #[must_use]
    pub fn new(pipe: Option<ReaderPipe>) -> Self {
        Self {
            pipe,
            decoder: Utf8Decoder::new(),
        }
    }

    /// Whether the reader is gone or hit end of file.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.pipe.as_ref().is_none_or(ReaderPipe::is_eof)
    }

    /// Wait until something can be read, no later than `deadline`.
    pub(crate) async fn wait_readable(&mut self, deadline: Instant) -> io::Result<bool> {
        match &mut self.pipe {
            Some(pipe) => pipe.readable_until(deadline).await,
            None => Ok(true),
        }
    }

    /// Read until the reader is quiet for `idle`, end of file is reached or
    /// `deadline` passes. Returns the text and whether end of file was seen.
    pub(crate) async fn read_available(
        &mut self,
        idle: Duration,
        deadline: Option<Instant>,
    ) -> io::Result<(String, bool)> {
        let Some(pipe) = &mut self.pipe else {
            return Ok((String::new(), true));
        };
        let (bytes, eof) = pipe.drain(idle, deadline).await?;
        let mut text = self.decoder.decode(&bytes);
        if eof {
            text.push_str(&self.decoder.finish());
        }
        Ok((text, eof))
    }
}

/// Index of the first non-empty pattern that matches somewhere in `text`.
pub fn match_patterns<P: AsRef<str>>(text: &str, patterns: &[P]) -> Result<Option<usize>> {
    for (i, pattern) in patterns.iter().enumerate() {
        let pattern = pattern.as_ref();
        if pattern.is_empty() {
            continue;
        }
        if get_regex(pattern)?.is_match(text) {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

/// The last whitespace-delimited word, empty if there is none.
#[must_use]
pub fn last_word(text: &str) -> &str {
    text.split_whitespace().next_back().unwrap_or("")
}

/// The last line with non-whitespace content, empty if there is none.
#[must_use]
pub fn last_line(text: &str) -> &str {
    text.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
}

fn identity(text: &str) -> &str {
    text
}

/// Pattern reads over a session's `expect` reader.
pub trait PatternReader: ProcessHandle + Send + Sync {
    /// The reader backing the pattern reads.
    fn reader(&mut self) -> &mut ExpectReader;

    /// Read whatever arrives until the reader stays quiet for `timeout`.
    /// Returns immediately at end of file.
    fn read_nonblocking(&mut self, timeout: Duration) -> impl Future<Output = Result<String>> + Send {
        async move {
            let (text, _) = self
                .reader()
                .read_available(timeout, None)
                .await
                .map_err(|e| ExpectError::io_context("reading expect pipe", e))?;
            Ok(text)
        }
    }

    /// Read until `filter` applied to everything read matches one of
    /// `patterns`. Returns the index of the first matching pattern and the
    /// text read.
    fn read_until_output_matches<'a, P, F>(
        &'a mut self,
        patterns: &'a [P],
        filter: F,
        options: ReadOptions<'a>,
    ) -> impl Future<Output = Result<(usize, String)>> + Send + 'a
    where
        P: AsRef<str> + Sync,
        F: Fn(&str) -> &str + Send + Sync + 'a,
    {
        async move {
            let deadline = Instant::now() + options.timeout;
            let mut output = String::new();

            loop {
                if Instant::now() >= deadline {
                    return Err(ExpectError::timeout(patterns, output));
                }

                let readable = self
                    .reader()
                    .wait_readable(deadline)
                    .await
                    .map_err(|e| ExpectError::io_context("waiting for expect pipe", e))?;
                if !readable {
                    return Err(ExpectError::timeout(patterns, output));
                }

                let (data, eof) = self
                    .reader()
                    .read_available(options.internal_timeout, Some(deadline))
                    .await
                    .map_err(|e| ExpectError::io_context("reading expect pipe", e))?;
                if data.is_empty() {
                    if eof {
                        break;
                    }
                    continue;
                }

                tracing::trace!(id = %self.get_id(), bytes = data.len(), "Expect read");
                if let Some(print) = options.print_func {
                    data.lines().for_each(print);
                }
                output.push_str(&data);

                if let Some(index) = match_patterns(filter(&output), patterns)? {
                    return Ok((index, output));
                }
                if eof {
                    break;
                }
            }

            // The reader closed without a match: tell a dead process from
            // a lost pipe.
            let wait = self.process().config().timeouts.terminated_wait;
            let give_up = Instant::now() + wait;
            while Instant::now() < give_up {
                if !self.is_alive() {
                    let status = self.get_status().await;
                    return Err(ExpectError::process_terminated(patterns, status, output));
                }
                tokio::time::sleep(LIVENESS_POLL).await;
            }
            Err(ExpectError::unknown(patterns, output))
        }
    }

    /// Read until everything read matches one of `patterns`.
    fn read_until_any_matches<'a, P>(
        &'a mut self,
        patterns: &'a [P],
        options: ReadOptions<'a>,
    ) -> impl Future<Output = Result<(usize, String)>> + Send + 'a
    where
        P: AsRef<str> + Sync,
    {
        self.read_until_output_matches(patterns, identity, options)
    }

    /// Read until the last word read matches one of `patterns`.
    fn read_until_last_word_matches<'a, P>(
        &'a mut self,
        patterns: &'a [P],
        options: ReadOptions<'a>,
    ) -> impl Future<Output = Result<(usize, String)>> + Send + 'a
    where
        P: AsRef<str> + Sync,
    {
        self.read_until_output_matches(patterns, last_word, options)
    }

    /// Read until the last non-empty line read matches one of `patterns`.
    fn read_until_last_line_matches<'a, P>(
        &'a mut self,
        patterns: &'a [P],
        options: ReadOptions<'a>,
    ) -> impl Future<Output = Result<(usize, String)>> + Send + 'a
    where
        P: AsRef<str> + Sync,
    {
        self.read_until_output_matches(patterns, last_line, options)
    }
}

/// A tailed session with a dedicated reader for pattern reads.
#[derive(Debug)]
pub struct Expect {
    tail: Tail,
    reader: ExpectReader,
}

impl Expect {
    /// Spawn a session with `tail` and `expect` readers.
    pub async fn spawn(options: SpawnOptions, callbacks: TailCallbacks) -> Result<Self> {
        Self::spawn_inner(options, callbacks, None).await
    }

    /// Like [`Expect::spawn`], with the tail worker tracked by `supervisor`.
    pub async fn spawn_with_supervisor(
        options: SpawnOptions,
        callbacks: TailCallbacks,
        supervisor: &TailSupervisor,
    ) -> Result<Self> {
        Self::spawn_inner(options, callbacks, Some(supervisor.clone())).await
    }

    async fn spawn_inner(
        options: SpawnOptions,
        callbacks: TailCallbacks,
        supervisor: Option<TailSupervisor>,
    ) -> Result<Self> {
        let options = options
            .reader(crate::tail::TAIL_READER)
            .reader(EXPECT_READER);
        let mut session = ProcessSession::spawn(options).await?;
        let reader = ExpectReader::new(session.take_reader(EXPECT_READER));
        Ok(Self {
            tail: Tail::from_session(session, callbacks, supervisor),
            reader,
        })
    }

    /// Default read options for this session.
    #[must_use]
    pub fn read_options(&self) -> ReadOptions<'static> {
        ReadOptions::from_config(&self.process().config().timeouts)
    }

    /// Kill the process and clean up. Safe to call more than once.
    pub async fn close(&mut self, signal: PtySignal) {
        self.tail.close(signal).await;
        self.reader = ExpectReader::default();
    }

    /// [`Expect::close`] with `SIGKILL`.
    pub async fn close_default(&mut self) {
        self.close(PtySignal::Kill).await;
    }
}

impl ProcessHandle for Expect {
    fn process(&self) -> &ProcessSession {
        self.tail.session()
    }

    fn process_mut(&mut self) -> &mut ProcessSession {
        self.tail.session_mut()
    }
}

impl LineTailer for Expect {
    fn tail(&mut self) -> &mut Tail {
        &mut self.tail
    }
}

impl PatternReader for Expect {
    fn reader(&mut self) -> &mut ExpectReader {
        &mut self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn first_matching_index() {
        assert_eq!(match_patterns("foo bar", &["baz", "bar", "foo"]).unwrap(), Some(1));
        assert_eq!(match_patterns("foo", &["", "o+"]).unwrap(), Some(1));
        assert_eq!(match_patterns("foo", &["x"]).unwrap(), None);
        assert_eq!(match_patterns::<&str>("foo", &[]).unwrap(), None);
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let err = match_patterns("foo", &["("]).unwrap_err();
        assert!(matches!(err, ExpectError::Regex(_)));
    }

    #[test]
    fn filters() {
        assert_eq!(last_word("ls -l\nfoo bar $ "), "$");
        assert_eq!(last_word("  \n"), "");
        assert_eq!(last_line("a\nb $ \n\n  \n"), "b $ ");
        assert_eq!(last_line("\n\n"), "");
        assert_eq!(last_line("single"), "single");
    }

    #[test]
    fn read_options_builders() {
        let print = |_: &str| {};
        let options = ReadOptions::new(Duration::from_secs(3))
            .internal_timeout(Duration::from_millis(10))
            .print_func(&print);
        assert_eq!(options.timeout, Duration::from_secs(3));
        assert_eq!(options.internal_timeout, Duration::from_millis(10));
        assert!(options.print_func.is_some());
        assert_eq!(ReadOptions::default().timeout, DEFAULT_EXPECT_TIMEOUT);
    }

    #[tokio::test]
    async fn reader_without_pipe_is_at_eof() {
        let mut reader = ExpectReader::default();
        assert!(reader.wait_readable(Instant::now()).await.unwrap());
        let (text, eof) = reader
            .read_available(Duration::from_millis(1), None)
            .await
            .unwrap();
        assert!(text.is_empty());
        assert!(eof);
    }

    proptest! {
        #[test]
        fn match_is_first_matching_pattern(
            text in "[a-d ]{0,24}",
            patterns in prop::collection::vec("[a-d]{0,2}", 0..6),
        ) {
            let found = match_patterns(&text, &patterns).unwrap();
            let expected = patterns
                .iter()
                .position(|p| !p.is_empty() && text.contains(p.as_str()));
            prop_assert_eq!(found, expected);
        }
    }
}

//! Client side of a reader FIFO.
//!
//! Each reader gets its own copy of the child's output through a FIFO the
//! spawner writes to. Reads here are readiness driven and always bounded by
//! a deadline; end of file means the spawner has gone.

use std::io;
use std::path::Path;
use std::time::Duration;

use tokio::net::unix::pipe;
use tokio::time::Instant;

/// Size of a single read from the FIFO.
const READ_CHUNK: usize = 16 * 1024;

/// Outcome of a bounded read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent {
    /// Bytes were read.
    Data(Vec<u8>),
    /// Nothing arrived before the deadline.
    Idle,
    /// The writing side is closed.
    Eof,
}

/// Read end of one reader's FIFO.
#[derive(Debug)]
pub struct ReaderPipe {
    name: String,
    rx: pipe::Receiver,
    eof: bool,
}

impl ReaderPipe {
    /// Open the FIFO at `path` for reading without blocking.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(path: &Path, name: impl Into<String>) -> io::Result<Self> {
        let rx = pipe::OpenOptions::new().open_receiver(path)?;
        Ok(Self {
            name: name.into(),
            rx,
            eof: false,
        })
    }

    /// The reader name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether end of file was seen.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        self.eof
    }

    /// Read one chunk, waiting no later than `deadline` for it.
    pub async fn read_until(&mut self, deadline: Instant) -> io::Result<ReadEvent> {
        if self.eof {
            return Ok(ReadEvent::Eof);
        }

        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            match self.rx.try_read(&mut buf) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(ReadEvent::Eof);
                }
                Ok(n) => {
                    buf.truncate(n);
                    return Ok(ReadEvent::Data(buf));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(e),
            }

            match tokio::time::timeout_at(deadline, self.rx.readable()).await {
                Ok(ready) => ready?,
                Err(_) => return Ok(ReadEvent::Idle),
            }
        }
    }

    /// Read one chunk, waiting at most `timeout` for it.
    pub async fn read_timeout(&mut self, timeout: Duration) -> io::Result<ReadEvent> {
        self.read_until(Instant::now() + timeout).await
    }

    /// Wait until data or end of file is available, no later than `deadline`.
    pub async fn readable_until(&mut self, deadline: Instant) -> io::Result<bool> {
        if self.eof {
            return Ok(true);
        }
        match tokio::time::timeout_at(deadline, self.rx.readable()).await {
            Ok(ready) => ready.map(|()| true),
            Err(_) => Ok(false),
        }
    }

    /// Collect everything that arrives until the pipe stays quiet for `idle`
    /// or `deadline` (if any) passes. Also returns whether end of file was
    /// reached.
    pub async fn drain(
        &mut self,
        idle: Duration,
        deadline: Option<Instant>,
    ) -> io::Result<(Vec<u8>, bool)> {
        let mut out = Vec::new();
        loop {
            let quiet = Instant::now() + idle;
            let until = deadline.map_or(quiet, |deadline| quiet.min(deadline));
            match self.read_until(until).await? {
                ReadEvent::Data(bytes) => out.extend_from_slice(&bytes),
                ReadEvent::Idle => return Ok((out, false)),
                ReadEvent::Eof => return Ok((out, true)),
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Ok((out, false));
            }
        }
    }
}

/// Incremental UTF-8 decoder that carries split multi-byte sequences over
/// to the next chunk.
#[derive(Debug, Default, Clone)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes`, holding back an incomplete trailing sequence.
    /// Invalid sequences become U+FFFD.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let complete = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => incomplete_tail_start(&self.pending),
        };

        let rest = self.pending.split_off(complete);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = rest;
        text
    }

    /// Flush whatever is held back.
    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Index where a trailing incomplete UTF-8 sequence starts, or `len` if the
/// buffer does not end in one.
fn incomplete_tail_start(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=3.min(len) {
        let b = bytes[len - back];
        if b & 0xC0 != 0x80 {
            let needed = match b {
                0xC0..=0xDF => 2,
                0xE0..=0xEF => 3,
                0xF0..=0xF7 => 4,
                _ => return len,
            };
            return if needed > back { len - back } else { len };
        }
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_files::{generate_id, mkfifo};

    #[test]
    fn decoder_joins_split_sequences() {
        let mut decoder = Utf8Decoder::new();
        let bytes = "héllo".as_bytes();
        assert_eq!(decoder.decode(&bytes[..2]), "h");
        assert_eq!(decoder.decode(&bytes[2..]), "éllo");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::new();
        let mut bytes = vec![b'a', 0xFF, b'b'];
        bytes.extend_from_slice(&"é".as_bytes()[..1]);
        assert_eq!(decoder.decode(&bytes), "a\u{FFFD}b");
        assert_eq!(decoder.decode(&"é".as_bytes()[1..]), "é");
    }

    #[tokio::test]
    async fn reads_data_idle_and_eof() {
        let path = std::env::temp_dir().join(format!("aexpect-pipe-{}", generate_id()));
        mkfifo(&path, 0o600).unwrap();

        let mut reader = ReaderPipe::open(&path, "expect").unwrap();
        let mut writer = pipe::OpenOptions::new().open_sender(&path).unwrap();

        assert_eq!(
            reader.read_timeout(Duration::from_millis(20)).await.unwrap(),
            ReadEvent::Idle
        );

        tokio::io::AsyncWriteExt::write_all(&mut writer, b"hello\n")
            .await
            .unwrap();
        let (data, eof) = reader
            .drain(Duration::from_millis(50), Some(Instant::now() + Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(data, b"hello\n");
        assert!(!eof);

        drop(writer);
        assert_eq!(
            reader.read_timeout(Duration::from_secs(5)).await.unwrap(),
            ReadEvent::Eof
        );
        assert!(reader.is_eof());
        std::fs::remove_file(&path).unwrap();
    }
}

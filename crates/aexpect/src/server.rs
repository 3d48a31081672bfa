//! The spawner: owns the child and multiplexes its I/O.
//!
//! A spawner runs as its own process (`aexpect-server`). It starts the
//! command behind a PTY, copies everything the child prints into the output
//! log and into one FIFO per reader, and relays bytes written to the input
//! FIFO to the child. The running lock is held for as long as the child is
//! being serviced, so clients can observe liveness without talking to it.
//!
//! Shutdown order matters:
//!
//! 1. write the exit status,
//! 2. wait for any attaching client to release the starting lock,
//! 3. remove the FIFOs and flush what readers still have buffered,
//! 4. release the running lock.

pub mod protocol;

use std::path::Path;
use std::time::Duration;

use aexpect_pty::{ExitStatus, PtyConfig, PtySignal, UnixPtyChild, UnixPtyMaster, UnixPtySystem};
use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::net::unix::pipe;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub use protocol::{StartupParams, ready_line};

use crate::config::{SessionConfig, TimeoutConfig};
use crate::error::{ExpectError, Result};
use crate::session_files::{FileLock, SessionFiles, mkfifo, remove_if_exists};

/// Size of a single read from the PTY or the input FIFO.
const READ_CHUNK: usize = 16 * 1024;

/// Idle time that ends the final drain of the PTY after the child exited.
const MASTER_DRAIN_IDLE: Duration = Duration::from_millis(50);

/// Permission bits of the FIFOs.
const FIFO_MODE: u32 = 0o600;

/// A running spawner whose files are in place.
pub struct Spawner {
    params: StartupParams,
    files: SessionFiles,
    master: UnixPtyMaster,
    child: UnixPtyChild,
    running_lock: FileLock,
    log: File,
    inpipe: pipe::Receiver,
    readers: Vec<(String, pipe::Sender)>,
    timeouts: TimeoutConfig,
}

impl std::fmt::Debug for Spawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spawner")
            .field("id", &self.params.id)
            .field("pid", &self.child.pid())
            .field(
                "readers",
                &self.readers.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Spawner {
    /// Start the child and create the session files.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(params: StartupParams, config: &SessionConfig) -> Result<Self> {
        params.validate()?;

        let files = SessionFiles::new(&config.base_dir, &params.id);
        files
            .create_base_dir()
            .map_err(|e| ExpectError::io_context("creating session directory", e))?;

        // The id in the command line makes the session findable in `ps`.
        let command = format!("{} && echo {} > /dev/null", params.command, params.id);
        let pty_config = PtyConfig::builder().echo(params.echo).build();
        let (master, child) = UnixPtySystem::spawn(&command, &pty_config)?;

        let io = match SessionIo::open(&params, &files, &child) {
            Ok(io) => io,
            Err(e) => {
                // Nothing will service the child; don't leave it behind.
                if let Err(kill) = child.signal(PtySignal::Kill) {
                    tracing::debug!(id = %params.id, error = %kill, "Could not kill child");
                }
                files.remove_all(params.readers.iter().map(String::as_str));
                return Err(e);
            }
        };

        tracing::debug!(
            id = %params.id,
            pid = child.pid(),
            readers = ?params.readers,
            "Spawner started"
        );

        Ok(Self {
            params,
            files,
            master,
            child,
            running_lock: io.running_lock,
            log: File::from_std(io.log),
            inpipe: io.inpipe,
            readers: io.readers,
            timeouts: config.timeouts,
        })
    }

    /// The session id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.params.id
    }

    /// Service the child until it exits, then shut down. Returns the
    /// recorded exit status.
    pub async fn run(self) -> Result<i32> {
        let Self {
            params,
            files,
            master,
            mut child,
            running_lock,
            log,
            inpipe,
            readers,
            timeouts,
        } = self;

        let (master_rd, master_wr) = tokio::io::split(master);
        let relay = tokio::spawn(relay_input(inpipe, master_wr));

        let mut fanout = Vec::with_capacity(readers.len());
        let mut writers = Vec::with_capacity(readers.len());
        for (name, sender) in readers {
            let (tx, rx) = mpsc::unbounded_channel();
            fanout.push(tx);
            writers.push(tokio::spawn(feed_reader(name, sender, rx)));
        }

        let mut output = Output { log, fanout };
        let status = service_child(master_rd, &mut child, &mut output, &timeouts).await?;
        let code = status.as_status_code();
        tracing::debug!(id = %params.id, %status, "Child exited");

        if let Err(e) = tokio::fs::write(files.status_file(), code.to_string()).await {
            tracing::warn!(id = %params.id, error = %e, "Could not write status file");
        }
        relay.abort();

        if let Err(e) = FileLock::wait_unlocked_async(files.lock_client_starting()).await {
            tracing::warn!(id = %params.id, error = %e, "Could not wait for attaching client");
        }

        remove_if_exists(&files.inpipe());
        for name in &params.readers {
            remove_if_exists(&files.reader_fifo(name));
        }

        drop(output);
        drain_writers(writers, timeouts.server_drain).await;

        if let Err(e) = running_lock.release() {
            tracing::warn!(id = %params.id, error = %e, "Could not release running lock");
        }
        tracing::debug!(id = %params.id, status = code, "Spawner finished");
        Ok(code)
    }
}

/// Files and pipes a spawner services.
struct SessionIo {
    log: std::fs::File,
    running_lock: FileLock,
    inpipe: pipe::Receiver,
    readers: Vec<(String, pipe::Sender)>,
}

impl SessionIo {
    fn open(params: &StartupParams, files: &SessionFiles, child: &UnixPtyChild) -> Result<Self> {
        let log = std::fs::File::create(files.output_file())
            .map_err(|e| ExpectError::io_context("creating output file", e))?;

        let running_lock = FileLock::acquire(files.lock_server_running())
            .map_err(|e| ExpectError::io_context("locking running lock", e))?;

        let inpipe_path = files.inpipe();
        create_fifo(&inpipe_path)?;
        let inpipe = pipe::OpenOptions::new()
            .read_write(true)
            .open_receiver(&inpipe_path)
            .map_err(|e| ExpectError::io_context("opening input pipe", e))?;

        let mut readers = Vec::with_capacity(params.readers.len());
        for name in &params.readers {
            let path = files.reader_fifo(name);
            create_fifo(&path)?;
            let sender = pipe::OpenOptions::new()
                .read_write(true)
                .open_sender(&path)
                .map_err(|e| ExpectError::io_context(format!("opening reader pipe {name}"), e))?;
            readers.push((name.clone(), sender));
        }

        std::fs::write(files.pid_file(), child.pid().to_string())
            .map_err(|e| ExpectError::io_context("writing pid file", e))?;

        Ok(Self {
            log,
            running_lock,
            inpipe,
            readers,
        })
    }
}

/// Run a spawner for `params`, announcing readiness on `ready`.
pub async fn serve<W>(params: StartupParams, mut ready: W, config: &SessionConfig) -> Result<i32>
where
    W: AsyncWrite + Unpin,
{
    let spawner = Spawner::start(params, config)?;

    let line = format!("{}\n", ready_line(spawner.id()));
    let announced = async {
        ready.write_all(line.as_bytes()).await?;
        ready.flush().await
    };
    if let Err(e) = announced.await {
        tracing::warn!(id = %spawner.id(), error = %e, "Could not announce readiness");
    }
    drop(ready);

    spawner.run().await
}

/// Where captured output goes.
struct Output {
    log: File,
    fanout: Vec<mpsc::UnboundedSender<Bytes>>,
}

impl Output {
    async fn record(&mut self, data: &[u8]) {
        let data: Vec<u8> = data.iter().copied().filter(|&b| b != b'\r').collect();
        if data.is_empty() {
            return;
        }

        let logged = async {
            self.log.write_all(&data).await?;
            self.log.flush().await
        };
        if let Err(e) = logged.await {
            tracing::warn!(error = %e, "Could not write output file");
        }

        let chunk = Bytes::from(data);
        for tx in &self.fanout {
            // A closed channel means that reader's writer gave up.
            let _ = tx.send(chunk.clone());
        }
    }
}

/// Copy child output until the child is gone.
async fn service_child<R>(
    mut master: R,
    child: &mut UnixPtyChild,
    output: &mut Output,
    timeouts: &TimeoutConfig,
) -> Result<ExitStatus>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match tokio::time::timeout(timeouts.server_poll, master.read(&mut buf)).await {
            Ok(Ok(0)) => return Ok(child.wait().await?),
            Ok(Ok(n)) => output.record(&buf[..n]).await,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "PTY read failed");
                return Ok(child.wait().await?);
            }
            Err(_) => {
                if let Some(status) = child.try_wait()? {
                    // Descendants may still hold the terminal open; take
                    // what is already there and stop.
                    let deadline = Instant::now() + timeouts.server_drain;
                    drain_master(&mut master, &mut buf, output, deadline).await;
                    return Ok(status);
                }
            }
        }
    }
}

async fn drain_master<R>(master: &mut R, buf: &mut [u8], output: &mut Output, deadline: Instant)
where
    R: AsyncRead + Unpin,
{
    while Instant::now() < deadline {
        match tokio::time::timeout(MASTER_DRAIN_IDLE, master.read(buf)).await {
            Ok(Ok(n)) if n > 0 => output.record(&buf[..n]).await,
            _ => break,
        }
    }
}

async fn relay_input(mut inpipe: pipe::Receiver, mut master: WriteHalf<UnixPtyMaster>) {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match inpipe.read(&mut buf).await {
            Ok(0) => return,
            Ok(n) => {
                if let Err(e) = master.write_all(&buf[..n]).await {
                    tracing::debug!(error = %e, "Could not relay input to child");
                    return;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Input pipe read failed");
                return;
            }
        }
    }
}

async fn feed_reader(
    name: String,
    mut sender: pipe::Sender,
    mut rx: mpsc::UnboundedReceiver<Bytes>,
) {
    while let Some(chunk) = rx.recv().await {
        if let Err(e) = sender.write_all(&chunk).await {
            tracing::debug!(reader = %name, error = %e, "Reader pipe write failed");
            return;
        }
    }
}

async fn drain_writers(writers: Vec<JoinHandle<()>>, bound: Duration) {
    let deadline = Instant::now() + bound;
    for writer in writers {
        let abort = writer.abort_handle();
        if tokio::time::timeout_at(deadline, writer).await.is_err() {
            tracing::debug!("Reader did not drain its buffer in time");
            abort.abort();
        }
    }
}

fn create_fifo(path: &Path) -> Result<()> {
    remove_if_exists(path);
    mkfifo(path, FIFO_MODE)
        .map_err(|e| ExpectError::io_context(format!("creating FIFO {}", path.display()), e))
}

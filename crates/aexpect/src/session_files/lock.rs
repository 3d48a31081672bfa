//! Advisory file locks.
//!
//! The lock state of a file *is* the shared state: the spawner holds
//! `lock-server-running` while the child lives and a client holds
//! `lock-client-starting` while it attaches. Locks are `flock(2)` locks, so
//! they are released by the kernel when the holder dies.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use rustix::fs::{FlockOperation, flock};
use rustix::io::Errno;

/// An exclusive lock on a file, released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Block until an exclusive lock on `path` is obtained, creating the file
    /// if needed.
    pub fn acquire(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = open_for_lock(path, true)?;
        lock(&file, FlockOperation::LockExclusive)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Try to lock `path` without blocking; `None` if someone holds it.
    pub fn try_acquire(path: impl AsRef<Path>) -> io::Result<Option<Self>> {
        let path = path.as_ref();
        let file = open_for_lock(path, true)?;
        match lock(&file, FlockOperation::NonBlockingLockExclusive) {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// [`FileLock::acquire`] on the blocking thread pool.
    pub async fn acquire_async(path: PathBuf) -> io::Result<Self> {
        tokio::task::spawn_blocking(move || Self::acquire(path))
            .await
            .map_err(io::Error::other)?
    }

    /// Whether anyone currently holds a lock on `path`.
    ///
    /// A missing file is not locked. The file is never created.
    #[must_use]
    pub fn is_locked(path: impl AsRef<Path>) -> bool {
        let Ok(file) = open_for_lock(path.as_ref(), false) else {
            return false;
        };
        match lock(&file, FlockOperation::NonBlockingLockExclusive) {
            // Closing the descriptor releases the probe lock.
            Ok(()) => false,
            Err(e) => e.kind() == io::ErrorKind::WouldBlock,
        }
    }

    /// Block until nobody holds a lock on `path`.
    ///
    /// Returns immediately if the file does not exist; never creates it.
    pub fn wait_unlocked(path: impl AsRef<Path>) -> io::Result<()> {
        let file = match open_for_lock(path.as_ref(), false) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        lock(&file, FlockOperation::LockExclusive)?;
        lock(&file, FlockOperation::Unlock)
    }

    /// [`FileLock::wait_unlocked`] on the blocking thread pool.
    pub async fn wait_unlocked_async(path: PathBuf) -> io::Result<()> {
        tokio::task::spawn_blocking(move || Self::wait_unlocked(path))
            .await
            .map_err(io::Error::other)?
    }

    /// The locked file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock explicitly.
    pub fn release(self) -> io::Result<()> {
        lock(&self.file, FlockOperation::Unlock)
    }
}

fn open_for_lock(path: &Path, create: bool) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(create)
        .create(create)
        .truncate(false)
        .open(path)
}

fn lock(file: &File, operation: FlockOperation) -> io::Result<()> {
    loop {
        match flock(file, operation) {
            Ok(()) => return Ok(()),
            Err(Errno::INTR) => {}
            Err(e) => return Err(io::Error::from_raw_os_error(e.raw_os_error())),
        }
    }
}

//! Well-known session file paths.
//!
//! Client and spawner share no memory; they meet through a handful of files
//! under a base directory, all keyed by the session id:
//!
//! | File                        | Kind | Written by |
//! |-----------------------------|------|------------|
//! | `shell-pid-ID`              | text | spawner    |
//! | `status-ID`                 | text | spawner    |
//! | `output-ID`                 | text | spawner    |
//! | `inpipe-ID`                 | FIFO | client     |
//! | `lock-server-running-ID`    | lock | spawner    |
//! | `lock-client-starting-ID`   | lock | client     |
//! | `outpipe-<reader>-ID`       | FIFO | spawner    |

mod fifo;
mod lock;

use std::io;
use std::path::{Path, PathBuf};

pub use fifo::mkfifo;
pub use lock::FileLock;
use rand::Rng;
use rand::distr::Alphanumeric;

/// Length of generated session ids.
pub const ID_LENGTH: usize = 8;

/// Generate a random session id.
#[must_use]
pub fn generate_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LENGTH)
        .map(char::from)
        .collect()
}

/// Paths of every file belonging to one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFiles {
    base_dir: PathBuf,
    id: String,
}

impl SessionFiles {
    /// Describe the files of session `id` under `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>, id: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            id: id.into(),
        }
    }

    /// The session id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The directory holding the files.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path(&self, stem: &str) -> PathBuf {
        self.base_dir.join(format!("{stem}-{}", self.id))
    }

    /// File holding the child's process id.
    #[must_use]
    pub fn pid_file(&self) -> PathBuf {
        self.path("shell-pid")
    }

    /// File holding the child's exit status.
    #[must_use]
    pub fn status_file(&self) -> PathBuf {
        self.path("status")
    }

    /// Log of everything the child printed.
    #[must_use]
    pub fn output_file(&self) -> PathBuf {
        self.path("output")
    }

    /// FIFO relaying input to the child.
    #[must_use]
    pub fn inpipe(&self) -> PathBuf {
        self.path("inpipe")
    }

    /// Lock held by the spawner while the child is alive.
    #[must_use]
    pub fn lock_server_running(&self) -> PathBuf {
        self.path("lock-server-running")
    }

    /// Lock held by a client while it attaches its readers.
    #[must_use]
    pub fn lock_client_starting(&self) -> PathBuf {
        self.path("lock-client-starting")
    }

    /// Output FIFO of reader `name`.
    #[must_use]
    pub fn reader_fifo(&self, name: &str) -> PathBuf {
        self.path(&format!("outpipe-{name}"))
    }

    /// Create the base directory if needed.
    pub fn create_base_dir(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.base_dir)
    }

    /// Every file of the session, reader FIFOs included.
    pub fn all<'a, I>(&self, readers: I) -> Vec<PathBuf>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut paths = vec![
            self.pid_file(),
            self.status_file(),
            self.output_file(),
            self.inpipe(),
            self.lock_server_running(),
            self.lock_client_starting(),
        ];
        paths.extend(readers.into_iter().map(|name| self.reader_fifo(name)));
        paths
    }

    /// Delete every file of the session. Missing files are not an error.
    pub fn remove_all<'a, I>(&self, readers: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for path in self.all(readers) {
            remove_if_exists(&path);
        }
    }
}

/// Remove a file, ignoring "not found" and logging anything else.
pub fn remove_if_exists(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::debug!(path = %path.display(), error = %e, "Could not remove session file"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_alphanumeric() {
        let id = generate_id();
        assert_eq!(id.len(), ID_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(generate_id(), id);
    }

    #[test]
    fn file_names() {
        let files = SessionFiles::new("/tmp/aexpect", "abc123");
        assert_eq!(files.pid_file(), PathBuf::from("/tmp/aexpect/shell-pid-abc123"));
        assert_eq!(files.status_file(), PathBuf::from("/tmp/aexpect/status-abc123"));
        assert_eq!(files.output_file(), PathBuf::from("/tmp/aexpect/output-abc123"));
        assert_eq!(files.inpipe(), PathBuf::from("/tmp/aexpect/inpipe-abc123"));
        assert_eq!(
            files.lock_server_running(),
            PathBuf::from("/tmp/aexpect/lock-server-running-abc123")
        );
        assert_eq!(
            files.lock_client_starting(),
            PathBuf::from("/tmp/aexpect/lock-client-starting-abc123")
        );
        assert_eq!(
            files.reader_fifo("tail"),
            PathBuf::from("/tmp/aexpect/outpipe-tail-abc123")
        );
    }

    #[test]
    fn all_includes_readers() {
        let files = SessionFiles::new("/tmp", "x");
        let all = files.all(["tail", "expect"]);
        assert_eq!(all.len(), 8);
        assert!(all.contains(&files.reader_fifo("expect")));
    }

    #[test]
    fn remove_all_tolerates_missing_files() {
        let dir = std::env::temp_dir().join(format!("aexpect-files-{}", generate_id()));
        let files = SessionFiles::new(&dir, "id");
        files.create_base_dir().unwrap();
        std::fs::write(files.status_file(), "0").unwrap();

        files.remove_all(["tail"]);
        assert!(!files.status_file().exists());

        files.remove_all(["tail"]);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}

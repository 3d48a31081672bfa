//! Spawner startup protocol.
//!
//! The client writes four lines to the spawner's standard input: session id,
//! echo flag (`True`/`False`), comma-separated reader names, and the shell
//! command. The spawner answers `Server <id> ready` on standard output once
//! its files are in place.

use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

use crate::error::SpawnError;

/// Parameters the spawner reads at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupParams {
    /// Session id.
    pub id: String,
    /// Whether the terminal echoes input.
    pub echo: bool,
    /// Reader names, one output FIFO each.
    pub readers: Vec<String>,
    /// Shell command line to run.
    pub command: String,
}

impl StartupParams {
    /// Check that every field survives the line-based encoding.
    pub fn validate(&self) -> Result<(), SpawnError> {
        if self.id.is_empty() || self.id.contains(['\n', '/']) {
            return Err(SpawnError::invalid_argument(
                "session id",
                &self.id,
                "must be non-empty without newlines or slashes",
            ));
        }
        if self.command.contains('\n') {
            return Err(SpawnError::invalid_argument(
                "command",
                &self.command,
                "must be a single line",
            ));
        }
        for reader in &self.readers {
            if reader.is_empty() || reader.contains([',', '\n', '/']) {
                return Err(SpawnError::invalid_argument(
                    "reader name",
                    reader,
                    "must be non-empty without commas, newlines or slashes",
                ));
            }
        }
        Ok(())
    }

    /// Encode as the four protocol lines.
    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}\n",
            self.id,
            if self.echo { "True" } else { "False" },
            self.readers.join(","),
            self.command
        )
    }

    /// Read the four protocol lines.
    pub async fn read_from<R>(reader: R) -> io::Result<Self>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();

        let id = next_line(&mut lines).await?;
        let echo = next_line(&mut lines).await? == "True";
        let readers = next_line(&mut lines)
            .await?
            .split(',')
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();
        let command = next_line(&mut lines).await?;

        Ok(Self {
            id,
            echo,
            readers,
            command,
        })
    }
}

async fn next_line<R>(lines: &mut Lines<R>) -> io::Result<String>
where
    R: AsyncBufRead + Unpin,
{
    lines.next_line().await?.ok_or_else(|| {
        io::Error::new(io::ErrorKind::UnexpectedEof, "incomplete startup parameters")
    })
}

/// The line announcing that session `id` is ready.
#[must_use]
pub fn ready_line(id: &str) -> String {
    format!("Server {id} ready")
}

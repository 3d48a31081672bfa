//! File-based configuration loading.
//!
//! ```toml
//! [session]
//! base_dir = "/var/tmp/aexpect"
//! linesep = "\n"
//!
//! [timeouts]
//! expect = 30      # seconds
//! internal = 0.2
//!
//! [shell]
//! prompt = '[\#\$]\s*$'
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::SessionConfig;
use crate::error::{ExpectError, Result};

/// Parsed configuration file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// `[session]` table.
    pub session: SessionSection,
    /// `[timeouts]` table, values in seconds.
    pub timeouts: TimeoutsSection,
    /// `[shell]` table.
    pub shell: ShellSection,
}

/// `[session]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSection {
    /// Directory holding session files.
    pub base_dir: Option<PathBuf>,
    /// Spawner executable.
    pub server: Option<PathBuf>,
    /// Line separator.
    pub linesep: Option<String>,
    /// Terminal echo.
    pub echo: Option<bool>,
}

/// `[timeouts]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutsSection {
    /// Spawner readiness timeout.
    pub spawn: Option<f64>,
    /// Expect timeout.
    pub expect: Option<f64>,
    /// Idle read timeout.
    pub internal: Option<f64>,
    /// Status probe timeout.
    pub status: Option<f64>,
    /// Spawner poll interval.
    pub server_poll: Option<f64>,
    /// Spawner drain bound.
    pub server_drain: Option<f64>,
    /// Tail flush interval.
    pub tail_poll: Option<f64>,
    /// Tail join bound.
    pub tail_join: Option<f64>,
    /// Death confirmation wait.
    pub terminated_wait: Option<f64>,
    /// Responsiveness probe timeout.
    pub responsive: Option<f64>,
}

/// `[shell]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShellSection {
    /// Prompt pattern.
    pub prompt: Option<String>,
    /// Status probe command.
    pub status_test_command: Option<String>,
}

impl ConfigFile {
    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ExpectError::config(e.to_string()))
    }

    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExpectError::io_context(format!("reading config file {}", path.display()), e)
        })?;
        Self::parse(&content)
    }

    /// Override `config` with every key present in the file.
    pub fn apply(&self, mut config: SessionConfig) -> Result<SessionConfig> {
        if let Some(dir) = &self.session.base_dir {
            config.base_dir.clone_from(dir);
        }
        if let Some(server) = &self.session.server {
            config.server_program = Some(server.clone());
        }
        if let Some(linesep) = &self.session.linesep {
            config.linesep.clone_from(linesep);
        }
        if let Some(echo) = self.session.echo {
            config.echo = echo;
        }

        let t = &self.timeouts;
        let timeouts = &mut config.timeouts;
        for (name, value, slot) in [
            ("spawn", t.spawn, &mut timeouts.spawn),
            ("expect", t.expect, &mut timeouts.expect),
            ("internal", t.internal, &mut timeouts.internal),
            ("status", t.status, &mut timeouts.status),
            ("server_poll", t.server_poll, &mut timeouts.server_poll),
            ("server_drain", t.server_drain, &mut timeouts.server_drain),
            ("tail_poll", t.tail_poll, &mut timeouts.tail_poll),
            ("tail_join", t.tail_join, &mut timeouts.tail_join),
            ("terminated_wait", t.terminated_wait, &mut timeouts.terminated_wait),
            ("responsive", t.responsive, &mut timeouts.responsive),
        ] {
            if let Some(secs) = value {
                *slot = seconds(name, secs)?;
            }
        }

        if let Some(prompt) = &self.shell.prompt {
            config.shell.prompt.clone_from(prompt);
        }
        if let Some(command) = &self.shell.status_test_command {
            config.shell.status_test_command.clone_from(command);
        }

        Ok(config)
    }
}

fn seconds(name: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| ExpectError::config(format!("timeouts.{name}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_file() {
        let file = ConfigFile::parse(
            r#"
            [session]
            base_dir = "/var/tmp/aexpect"
            echo = true

            [timeouts]
            expect = 30
            internal = 0.25

            [shell]
            prompt = '>\s*$'
            "#,
        )
        .unwrap();

        let config = file.apply(SessionConfig::default()).unwrap();
        assert_eq!(config.base_dir, PathBuf::from("/var/tmp/aexpect"));
        assert!(config.echo);
        assert_eq!(config.timeouts.expect, Duration::from_secs(30));
        assert_eq!(config.timeouts.internal, Duration::from_millis(250));
        assert_eq!(config.timeouts.status, Duration::from_secs(10));
        assert_eq!(config.shell.prompt, r">\s*$");
    }

    #[test]
    fn empty_file_keeps_defaults() {
        let file = ConfigFile::parse("").unwrap();
        let config = file.apply(SessionConfig::default()).unwrap();
        assert_eq!(config.timeouts, SessionConfig::default().timeouts);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ConfigFile::parse("[session]\nbogus = 1\n").unwrap_err();
        assert!(matches!(err, ExpectError::Config { .. }));
    }

    #[test]
    fn negative_timeout_is_rejected() {
        let file = ConfigFile::parse("[timeouts]\nexpect = -3\n").unwrap();
        let err = file.apply(SessionConfig::default()).unwrap_err();
        assert!(err.to_string().contains("timeouts.expect"));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ConfigFile::load("/nonexistent/aexpect.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/aexpect.toml"));
    }
}

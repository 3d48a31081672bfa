//! Environment-based configuration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use super::SessionConfig;

/// Environment configuration prefix.
pub const DEFAULT_PREFIX: &str = "AEXPECT";

/// Recognized variable names (without prefix).
pub mod vars {
    /// Directory holding session files.
    pub const BASE_DIR: &str = "BASE_DIR";
    /// Spawner executable.
    pub const SERVER: &str = "SERVER";
    /// Expect timeout in seconds.
    pub const TIMEOUT: &str = "TIMEOUT";
    /// Shell prompt pattern.
    pub const PROMPT: &str = "PROMPT";
    /// Line separator.
    pub const LINESEP: &str = "LINESEP";
    /// Terminal echo.
    pub const ECHO: &str = "ECHO";
    /// Spawner poll interval in seconds.
    pub const SERVER_POLL: &str = "SERVER_POLL";
    /// Spawner reader drain bound in seconds.
    pub const SERVER_DRAIN: &str = "SERVER_DRAIN";
}

/// Environment variable reader.
///
/// Values come from the process environment unless an explicit set of
/// variables was supplied with [`EnvConfig::with_vars`].
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Prefix for environment variables.
    prefix: String,
    /// Variables used instead of the process environment.
    vars: Option<HashMap<String, String>>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl EnvConfig {
    /// Create a new environment config reader.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            vars: None,
        }
    }

    /// Read from the given variables instead of the process environment.
    #[must_use]
    pub fn with_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.vars = Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    /// Build the full environment variable name.
    fn var_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_uppercase()
        } else {
            format!("{}_{}", self.prefix, name.to_uppercase())
        }
    }

    /// Get a string value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        let var_name = self.var_name(name);
        match &self.vars {
            Some(vars) => vars.get(&var_name).cloned(),
            None => std::env::var(&var_name).ok(),
        }
    }

    /// Get a parsed value.
    #[must_use]
    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|v| v.trim().parse().ok())
    }

    /// Get a boolean value.
    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).map(|v| {
            matches!(
                v.to_lowercase().as_str(),
                "1" | "true" | "yes" | "on" | "enabled"
            )
        })
    }

    /// Get a duration given in (possibly fractional) seconds.
    #[must_use]
    pub fn duration_secs(&self, name: &str) -> Option<Duration> {
        self.parse::<f64>(name)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    /// Override `config` with every recognized variable that is set.
    #[must_use]
    pub fn apply(&self, mut config: SessionConfig) -> SessionConfig {
        if let Some(dir) = self.get(vars::BASE_DIR).filter(|d| !d.is_empty()) {
            config.base_dir = PathBuf::from(dir);
        }
        if let Some(server) = self.get(vars::SERVER).filter(|s| !s.is_empty()) {
            config.server_program = Some(PathBuf::from(server));
        }
        if let Some(timeout) = self.duration_secs(vars::TIMEOUT) {
            config.timeouts.expect = timeout;
        }
        if let Some(prompt) = self.get(vars::PROMPT) {
            config.shell.prompt = prompt;
        }
        if let Some(linesep) = self.get(vars::LINESEP) {
            config.linesep = linesep;
        }
        if let Some(echo) = self.bool(vars::ECHO) {
            config.echo = echo;
        }
        if let Some(poll) = self.duration_secs(vars::SERVER_POLL) {
            config.timeouts.server_poll = poll;
        }
        if let Some(drain) = self.duration_secs(vars::SERVER_DRAIN) {
            config.timeouts.server_drain = drain;
        }
        config
    }

    /// Variables handing the spawner-side settings of `config` to an
    /// `aexpect-server` process, which reads them back with
    /// [`EnvConfig::apply`].
    #[must_use]
    pub fn server_vars(&self, config: &SessionConfig) -> Vec<(String, String)> {
        vec![
            (
                self.var_name(vars::BASE_DIR),
                config.base_dir.display().to_string(),
            ),
            (
                self.var_name(vars::SERVER_POLL),
                config.timeouts.server_poll.as_secs_f64().to_string(),
            ),
            (
                self.var_name(vars::SERVER_DRAIN),
                config.timeouts.server_drain.as_secs_f64().to_string(),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_config_prefix() {
        let config = EnvConfig::new("TEST");
        assert_eq!(config.var_name("foo"), "TEST_FOO");
        assert_eq!(config.var_name("base_dir"), "TEST_BASE_DIR");
    }

    #[test]
    fn env_bool_parsing() {
        let config = EnvConfig::default().with_vars([("AEXPECT_A", "true"), ("AEXPECT_B", "0")]);
        assert_eq!(config.bool("A"), Some(true));
        assert_eq!(config.bool("B"), Some(false));
        assert_eq!(config.bool("C"), None);
    }

    #[test]
    fn apply_overrides_defaults() {
        let env = EnvConfig::default().with_vars([
            ("AEXPECT_BASE_DIR", "/run/aexpect"),
            ("AEXPECT_SERVER", "/usr/libexec/aexpect-server"),
            ("AEXPECT_TIMEOUT", "2.5"),
            ("AEXPECT_PROMPT", r">\s*$"),
            ("AEXPECT_ECHO", "yes"),
        ]);
        let config = env.apply(SessionConfig::default());

        assert_eq!(config.base_dir, PathBuf::from("/run/aexpect"));
        assert_eq!(
            config.server_program,
            Some(PathBuf::from("/usr/libexec/aexpect-server"))
        );
        assert_eq!(config.timeouts.expect, Duration::from_millis(2500));
        assert_eq!(config.shell.prompt, r">\s*$");
        assert!(config.echo);
    }

    #[test]
    fn server_settings_reach_the_spawner() {
        let client = SessionConfig::new().base_dir("/var/tmp/handoff").timeouts(
            crate::config::TimeoutConfig::new()
                .server_poll(Duration::from_millis(250))
                .server_drain(Duration::from_millis(1500)),
        );

        let exported = EnvConfig::default().server_vars(&client);
        assert!(exported.iter().any(|(k, _)| k == "AEXPECT_SERVER_DRAIN"));

        let server = EnvConfig::default()
            .with_vars(exported)
            .apply(SessionConfig::default());
        assert_eq!(server.base_dir, PathBuf::from("/var/tmp/handoff"));
        assert_eq!(server.timeouts.server_poll, Duration::from_millis(250));
        assert_eq!(server.timeouts.server_drain, Duration::from_millis(1500));
    }

    #[test]
    fn invalid_values_are_ignored() {
        let env = EnvConfig::default().with_vars([("AEXPECT_TIMEOUT", "-1"), ("AEXPECT_BASE_DIR", "")]);
        let config = env.apply(SessionConfig::default());
        assert_eq!(config.timeouts, SessionConfig::default().timeouts);
        assert_eq!(config.base_dir, SessionConfig::default().base_dir);
    }
}

//! Connector configuration.
//!
//! Loaded from an optional TOML file, with environment variables taking
//! precedence over file values.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding [`ConnectorConfig::busy_timeout_ms`].
pub const ENV_BUSY_TIMEOUT_MS: &str = "SQLITE_QUERY_BUSY_TIMEOUT_MS";
/// Environment variable overriding [`ConnectorConfig::query_timeout_ms`].
pub const ENV_QUERY_TIMEOUT_MS: &str = "SQLITE_QUERY_TIMEOUT_MS";
/// Environment variable overriding [`ConnectorConfig::progress_interval`].
pub const ENV_PROGRESS_INTERVAL: &str = "SQLITE_QUERY_PROGRESS_INTERVAL";

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("configuration error in {path}:\n  {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Tuning knobs for opening databases and running queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// How long a reader waits on a locked database file.
    pub busy_timeout_ms: u64,

    /// Upper bound for one async invocation. `None` waits indefinitely.
    pub query_timeout_ms: Option<u64>,

    /// SQLite VM steps between cancellation checks.
    pub progress_interval: i32,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5000,
            query_timeout_ms: None,
            progress_interval: 1000,
        }
    }
}

impl ConnectorConfig {
    /// Parses configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse_toml(content, Path::new("<inline>"))
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::parse_toml(&content, path)
    }

    fn parse_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Applies environment overrides. Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(ms) = lookup(ENV_BUSY_TIMEOUT_MS).and_then(|v| v.trim().parse().ok()) {
            self.busy_timeout_ms = ms;
        }
        if let Some(ms) = lookup(ENV_QUERY_TIMEOUT_MS).and_then(|v| v.trim().parse().ok()) {
            self.query_timeout_ms = Some(ms);
        }
        if let Some(steps) = lookup(ENV_PROGRESS_INTERVAL).and_then(|v| v.trim().parse().ok()) {
            self.progress_interval = steps;
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }
}

//! Channel configuration.
//!
//! A [`ChannelConfig`] names the shared directory and the four channel
//! files inside it, and carries every timing knob of the polling protocol.
//! It is fixed for the lifetime of a bridge; build a new bridge to change it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Directory name used under the platform data directory.
pub const DEFAULT_DIR_NAME: &str = "fbridge";

/// Configuration for one file channel.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// base_dir = "/run/user/1000/fbridge"
/// default_timeout_ms = 1500
/// verbose = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Shared directory holding the channel files.
    pub base_dir: PathBuf,

    /// Command slot written by the bridge.
    pub command_file: String,

    /// Result slot written by the interpreter.
    pub result_file: String,

    /// Append-only bridge log.
    pub log_file: String,

    /// Stop sentinel consumed by the interpreter.
    pub stop_file: String,

    /// Fast poll interval while results are expected.
    pub poll_interval_ms: u64,

    /// Slow poll interval after sustained inactivity.
    pub idle_interval_ms: u64,

    /// Consecutive idle polls before switching to `idle_interval_ms`.
    pub idle_threshold: u32,

    /// Wait deadline used when a call gives no explicit timeout.
    pub default_timeout_ms: u64,

    /// One-off wait when the result file has never been seen.
    pub startup_grace_ms: u64,

    /// Pause between noticing a new mtime and reading the content.
    pub settle_ms: u64,

    /// Fixed pause between attempts of a retried read.
    pub retry_backoff_ms: u64,

    /// Maximum age of buffered log lines before they are written.
    pub log_flush_interval_ms: u64,

    /// Maximum number of buffered log lines before they are written.
    pub log_flush_lines: usize,

    /// Entry cap of each memoization table.
    pub cache_capacity: usize,

    /// Echo every log line to stderr.
    pub verbose: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        let base_dir = dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(DEFAULT_DIR_NAME);
        Self::with_base_dir(base_dir)
    }
}

impl ChannelConfig {
    /// Creates a default configuration rooted at `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            command_file: "command.txt".to_string(),
            result_file: "result.txt".to_string(),
            log_file: "bridge_log.txt".to_string(),
            stop_file: "stop.flag".to_string(),
            poll_interval_ms: 50,
            idle_interval_ms: 1000,
            idle_threshold: 5,
            default_timeout_ms: 2000,
            startup_grace_ms: 100,
            settle_ms: 10,
            retry_backoff_ms: 100,
            log_flush_interval_ms: 10_000,
            log_flush_lines: 100,
            cache_capacity: 100,
            verbose: false,
        }
    }

    /// Parses a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).map_err(|e| BridgeError::io("read config", path, e))?;
        Self::from_toml_str(&text)
    }

    /// Serializes to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| BridgeError::Config(e.to_string()))
    }

    /// Checks the constraints the polling protocol relies on.
    pub fn validate(&self) -> Result<()> {
        let names = [
            ("command_file", &self.command_file),
            ("result_file", &self.result_file),
            ("log_file", &self.log_file),
            ("stop_file", &self.stop_file),
        ];

        for (field, name) in names {
            if name.trim().is_empty() {
                return Err(BridgeError::Config(format!("{field} must not be empty")));
            }
            if name.contains(&['/', '\\'][..]) {
                return Err(BridgeError::Config(format!(
                    "{field} must be a bare file name, got {name:?}"
                )));
            }
        }

        for (i, (field, name)) in names.iter().enumerate() {
            if let Some((other, _)) = names.iter().skip(i + 1).find(|(_, n)| n == name) {
                return Err(BridgeError::Config(format!(
                    "{field} and {other} both use {name:?}"
                )));
            }
        }

        if self.poll_interval_ms == 0 {
            return Err(BridgeError::Config(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.idle_interval_ms < self.poll_interval_ms {
            return Err(BridgeError::Config(format!(
                "idle_interval_ms ({}) must not be shorter than poll_interval_ms ({})",
                self.idle_interval_ms, self.poll_interval_ms
            )));
        }
        if self.cache_capacity == 0 {
            return Err(BridgeError::Config(
                "cache_capacity must be positive".to_string(),
            ));
        }
        if self.log_flush_lines == 0 {
            return Err(BridgeError::Config(
                "log_flush_lines must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn command_path(&self) -> PathBuf {
        self.base_dir.join(&self.command_file)
    }

    pub fn result_path(&self) -> PathBuf {
        self.base_dir.join(&self.result_file)
    }

    pub fn log_path(&self) -> PathBuf {
        self.base_dir.join(&self.log_file)
    }

    pub fn stop_path(&self) -> PathBuf {
        self.base_dir.join(&self.stop_file)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_millis(self.startup_grace_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn log_flush_interval(&self) -> Duration {
        Duration::from_millis(self.log_flush_interval_ms)
    }
}

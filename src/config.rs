//! Configuration loading and validation.
//!
//! Config lives in a single TOML file with a `[monitor]` section for the
//! inactivity watcher and an `[rcon]` section pointing at the external rcon
//! binary. Validation runs once at startup and reports every problem found,
//! not just the first.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Offset before the commit instant at which the warning broadcast fires.
///
/// With `shutdown_timeout_secs <= 60` the warn delay clamps to zero and the
/// warning goes out as soon as the sequence starts.
pub const WARN_OFFSET: Duration = Duration::from_secs(60);

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("monitor.watch_interval_secs must be greater than zero")]
    ZeroWatchInterval,
    #[error("rcon.path is required")]
    MissingRconPath,
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Inactivity monitor configuration.
    pub monitor: MonitorConfig,
    /// Command channel (rcon) configuration.
    pub rcon: RconConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate a loaded configuration, returning all errors found.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.monitor.watch_interval_secs == 0 {
            errors.push(ValidationError::ZeroWatchInterval);
        }
        if self.rcon.path.as_os_str().is_empty() {
            errors.push(ValidationError::MissingRconPath);
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Inactivity monitor configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between player-list polls.
    #[serde(default = "default_watch_interval")]
    pub watch_interval_secs: u64,
    /// Seconds of sustained zero-player state before the server is shut down.
    /// Values of 60 or less make the warning broadcast fire immediately.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
    /// Grace period passed to the server's shutdown command.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u32,
    /// Reason tag passed to the server's shutdown command.
    #[serde(default = "default_shutdown_reason")]
    pub shutdown_reason: String,
}

impl MonitorConfig {
    /// Poll period as a [`Duration`].
    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs)
    }

    /// Idle window before shutdown as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Command channel configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RconConfig {
    /// Path to the external rcon binary. The binary owns the wire protocol
    /// and its own connection settings; we only exec it per command.
    pub path: PathBuf,
}

fn default_watch_interval() -> u64 {
    5
}

fn default_shutdown_timeout() -> u64 {
    120
}

fn default_shutdown_grace() -> u32 {
    15
}

fn default_shutdown_reason() -> String {
    "shutting_down".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        toml::from_str(toml).expect("config should parse")
    }

    #[test]
    fn test_full_config_parses() {
        let config = parse(
            r#"
            [monitor]
            watch_interval_secs = 10
            shutdown_timeout_secs = 300
            shutdown_grace_secs = 30
            shutdown_reason = "going_to_sleep"

            [rcon]
            path = "/opt/rcon/rcon"
            "#,
        );
        assert_eq!(config.monitor.watch_interval_secs, 10);
        assert_eq!(config.monitor.shutdown_timeout(), Duration::from_secs(300));
        assert_eq!(config.monitor.shutdown_grace_secs, 30);
        assert_eq!(config.monitor.shutdown_reason, "going_to_sleep");
        assert_eq!(config.rcon.path, PathBuf::from("/opt/rcon/rcon"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_monitor_defaults() {
        let config = parse(
            r#"
            [monitor]

            [rcon]
            path = "rcon"
            "#,
        );
        assert_eq!(config.monitor.watch_interval_secs, 5);
        assert_eq!(config.monitor.shutdown_timeout_secs, 120);
        assert_eq!(config.monitor.shutdown_grace_secs, 15);
        assert_eq!(config.monitor.shutdown_reason, "shutting_down");
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let config = parse(
            r#"
            [monitor]
            watch_interval_secs = 0

            [rcon]
            path = ""
            "#,
        );
        let errors = config.validate().expect_err("should be invalid");
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], ValidationError::ZeroWatchInterval));
        assert!(matches!(errors[1], ValidationError::MissingRconPath));
    }

    #[test]
    fn test_short_timeout_is_valid() {
        // Timeouts at or below the warn offset are allowed and merely clamp
        // the warning to fire immediately.
        let config = parse(
            r#"
            [monitor]
            shutdown_timeout_secs = 30

            [rcon]
            path = "rcon"
            "#,
        );
        assert!(config.validate().is_ok());
        assert!(config.monitor.shutdown_timeout() <= WARN_OFFSET);
    }
}

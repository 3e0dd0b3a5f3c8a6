//! Client configuration.
//!
//! All sections deserialize from TOML with serde defaults, so an empty file
//! (or `ClientConfig::default()`) yields the documented behavior: 5 s
//! reconnect backoff, 120 s idle threshold, FIFO action selection, own
//! events ignored.

mod defaults;

use crate::queue::ActionType;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Transport and reconnection tuning.
    #[serde(default)]
    pub transport: TransportConfig,
    /// Action queue tuning.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Skip external listeners for events caused by this session's own
    /// identity. Internal tracked-entity handlers always run.
    #[serde(default = "defaults::default_true")]
    pub ignore_own_events: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            queue: QueueConfig::default(),
            ignore_own_events: true,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

/// Transport and idle-watchdog configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportConfig {
    /// Fixed delay before each reconnect attempt after a failure.
    #[serde(default = "defaults::default_reconnect_backoff_secs")]
    pub reconnect_backoff_secs: u64,
    /// Quiet time on the stream before the watchdog forces a reconnect.
    #[serde(default = "defaults::default_idle_threshold_secs")]
    pub idle_threshold_secs: u64,
    /// How often the watchdog samples the last-activity timestamp.
    #[serde(default = "defaults::default_watchdog_poll_secs")]
    pub watchdog_poll_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            reconnect_backoff_secs: defaults::default_reconnect_backoff_secs(),
            idle_threshold_secs: defaults::default_idle_threshold_secs(),
            watchdog_poll_secs: defaults::default_watchdog_poll_secs(),
        }
    }
}

impl TransportConfig {
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    pub fn watchdog_poll(&self) -> Duration {
        Duration::from_secs(self.watchdog_poll_secs)
    }
}

/// Action queue configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Consumer idle sleep between polls of the pending set.
    #[serde(default = "defaults::default_queue_poll_ms")]
    pub poll_interval_ms: u64,
    /// Optional priority table: action type -> weight, scanned in
    /// descending weight order. Empty means pure FIFO.
    #[serde(default)]
    pub priorities: HashMap<ActionType, u32>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::default_queue_poll_ms(),
            priorities: HashMap::new(),
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_yields_documented_defaults() {
        let config: ClientConfig = toml::from_str("").expect("empty config parses");
        assert_eq!(config.transport.reconnect_backoff(), Duration::from_secs(5));
        assert_eq!(config.transport.idle_threshold(), Duration::from_secs(120));
        assert!(config.ignore_own_events);
        assert!(config.queue.priorities.is_empty());
    }

    #[test]
    fn priority_table_parses_from_toml() {
        let config: ClientConfig = toml::from_str(
            r#"
            ignore_own_events = false

            [transport]
            idle_threshold_secs = 60

            [queue.priorities]
            kick_mute = 10
            post_message = 1
            "#,
        )
        .expect("config parses");
        assert!(!config.ignore_own_events);
        assert_eq!(config.transport.idle_threshold_secs, 60);
        assert_eq!(config.queue.priorities[&ActionType::KickMute], 10);
        assert_eq!(config.queue.priorities[&ActionType::PostMessage], 1);
    }
}

//! Configuration loading and management.
//!
//! The coordinator is embedded by the connection layer, so configuration is
//! deliberately small: channel sizing, matching timeouts, session timing,
//! and presence retention. Every field has a serde default; an empty TOML
//! file is a valid configuration.

use serde::Deserialize;
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

/// Coordinator configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Event delivery configuration.
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    /// Presence retention configuration.
    #[serde(default)]
    pub presence: PresenceConfig,
    /// Match request configuration.
    #[serde(default)]
    pub matching: MatchingConfig,
    /// Session timing configuration.
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Event delivery configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    /// Per-connection outbound event buffer (default: 64).
    ///
    /// A connection that stops draining its channel gets events dropped
    /// rather than stalling the coordinator.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self { event_buffer: default_event_buffer() }
    }
}

/// Presence retention configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    /// Seconds a disconnected presence entry is kept before the reaper
    /// removes it (default: 900).
    #[serde(default = "default_reap_after")]
    pub reap_after_secs: u64,

    /// Reaper sweep interval in seconds (default: 60).
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,

    /// How many recent partners to remember per user for repeat avoidance
    /// in random pairing (default: 5).
    #[serde(default = "default_recent_partners")]
    pub recent_partner_memory: usize,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            reap_after_secs: default_reap_after(),
            reap_interval_secs: default_reap_interval(),
            recent_partner_memory: default_recent_partners(),
        }
    }
}

/// Match request configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    /// Seconds before a pending request expires (default: 60).
    #[serde(default = "default_request_expiry")]
    pub request_expiry_secs: u64,

    /// Expiry sweep interval in milliseconds (default: 1000).
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

impl MatchingConfig {
    /// Expiry sweep interval as a [`Duration`].
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            request_expiry_secs: default_request_expiry(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

/// Session timing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Countdown tick interval in milliseconds (default: 1000).
    ///
    /// Each tick decrements the remaining time by one second regardless of
    /// the interval, so tests can shrink it to run the clock fast.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Maximum session length in minutes; longer requests are clamped
    /// (default: 120).
    #[serde(default = "default_max_duration")]
    pub max_duration_minutes: u32,

    /// Seconds an ended session is kept for late feedback before the
    /// archiver reclaims it (default: 300).
    #[serde(default = "default_archive_grace")]
    pub archive_grace_secs: u64,

    /// Archiver sweep interval in seconds (default: 30).
    #[serde(default = "default_archive_interval")]
    pub archive_interval_secs: u64,
}

impl SessionConfig {
    /// Countdown tick interval as a [`Duration`].
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            max_duration_minutes: default_max_duration(),
            archive_grace_secs: default_archive_grace(),
            archive_interval_secs: default_archive_interval(),
        }
    }
}

fn default_event_buffer() -> usize {
    64
}

fn default_reap_after() -> u64 {
    900
}

fn default_reap_interval() -> u64 {
    60
}

fn default_recent_partners() -> usize {
    5
}

fn default_request_expiry() -> u64 {
    60
}

fn default_sweep_interval_ms() -> u64 {
    1000
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_max_duration() -> u32 {
    120
}

fn default_archive_grace() -> u64 {
    300
}

fn default_archive_interval() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_is_valid() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.coordinator.event_buffer, 64);
        assert_eq!(config.matching.request_expiry_secs, 60);
        assert_eq!(config.session.tick_interval_ms, 1000);
        assert_eq!(config.presence.recent_partner_memory, 5);
    }

    #[test]
    fn test_partial_override() {
        let config: Config = toml::from_str(
            r#"
            [matching]
            request_expiry_secs = 5

            [session]
            tick_interval_ms = 10
            max_duration_minutes = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.matching.request_expiry_secs, 5);
        assert_eq!(config.session.tick_interval_ms, 10);
        assert_eq!(config.session.max_duration_minutes, 30);
        // Untouched section keeps defaults
        assert_eq!(config.presence.reap_after_secs, 900);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[coordinator]\nevent_buffer = 8").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.coordinator.event_buffer, 8);
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[matching\nbroken").unwrap();

        assert!(matches!(Config::load(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_tick_interval_never_zero() {
        let config: Config = toml::from_str("[session]\ntick_interval_ms = 0").unwrap();
        assert_eq!(config.session.tick_interval(), Duration::from_millis(1));
    }
}

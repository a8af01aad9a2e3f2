//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.

use std::env;
use std::time::Duration;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of live keys a bounded store admits
    pub max_entries: usize,
    /// Default TTL in seconds applied to read-through refills
    pub default_ttl: u64,
    /// Background sweep interval in milliseconds
    pub sweep_interval_ms: u64,
    /// Maximum number of expired entries removed per sweep
    pub sweep_batch: usize,
    /// Deadline in milliseconds for coalesced loads, 0 = no deadline
    pub load_timeout_ms: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_ENTRIES` - Maximum live keys (default: 1000)
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `CACHE_SWEEP_INTERVAL_MS` - Sweep frequency in milliseconds (default: 1000)
    /// - `CACHE_SWEEP_BATCH` - Expired entries removed per sweep (default: 10000)
    /// - `CACHE_LOAD_TIMEOUT_MS` - Coalesced load deadline, 0 disables (default: 0)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_entries: env_or("CACHE_MAX_ENTRIES", defaults.max_entries),
            default_ttl: env_or("CACHE_DEFAULT_TTL", defaults.default_ttl),
            sweep_interval_ms: env_or("CACHE_SWEEP_INTERVAL_MS", defaults.sweep_interval_ms),
            sweep_batch: env_or("CACHE_SWEEP_BATCH", defaults.sweep_batch),
            load_timeout_ms: env_or("CACHE_LOAD_TIMEOUT_MS", defaults.load_timeout_ms),
        }
    }

    /// Default TTL as a `Duration`.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl)
    }

    /// Sweep interval as a `Duration`, never shorter than one millisecond.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    /// Coalesced load deadline, if one is configured.
    pub fn load_timeout(&self) -> Option<Duration> {
        (self.load_timeout_ms > 0).then(|| Duration::from_millis(self.load_timeout_ms))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_ttl: 300,
            sweep_interval_ms: 1000,
            sweep_batch: crate::cache::DEFAULT_SWEEP_BATCH,
            load_timeout_ms: 0,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.max_entries, 1000);
        assert_eq!(config.default_ttl, 300);
        assert_eq!(config.sweep_interval_ms, 1000);
        assert_eq!(config.sweep_batch, 10_000);
        assert_eq!(config.load_timeout(), None);
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("CACHE_MAX_ENTRIES");
        env::remove_var("CACHE_DEFAULT_TTL");
        env::remove_var("CACHE_SWEEP_INTERVAL_MS");
        env::remove_var("CACHE_SWEEP_BATCH");
        env::remove_var("CACHE_LOAD_TIMEOUT_MS");

        let config = Config::from_env();
        assert_eq!(config.max_entries, 1000);
        assert_eq!(config.default_ttl(), Duration::from_secs(300));
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
        assert_eq!(config.sweep_batch, 10_000);
    }

    #[test]
    fn test_duration_helpers() {
        let config = Config {
            sweep_interval_ms: 0,
            load_timeout_ms: 250,
            ..Config::default()
        };
        assert_eq!(config.sweep_interval(), Duration::from_millis(1));
        assert_eq!(config.load_timeout(), Some(Duration::from_millis(250)));
    }
}

// src/config/mod.rs

//! Pool and backend configuration.
//!
//! `PoolConfig` is what the pool itself consumes and validates. `Settings` is
//! the on-disk form loaded by the binary: one section for the backend the
//! factory connects to, one for the pool, one for the stress driver.

use crate::common::error::{PoolError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Options for configuring a connection pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Idle floor kept by the reclamation task.
    pub min_idle: usize,
    /// Ceiling on idle plus lent connections.
    pub max_total: usize,
    /// Default time `acquire` waits for a permit.
    pub acquire_timeout: Duration,
    /// Period of the reclamation task.
    pub reclaim_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_idle: 1,
            max_total: 10,
            acquire_timeout: Duration::from_secs(30),
            reclaim_interval: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    /// Set the idle floor
    pub fn with_min_idle(mut self, min_idle: usize) -> Self {
        self.min_idle = min_idle;
        self
    }

    /// Set the ceiling
    pub fn with_max_total(mut self, max_total: usize) -> Self {
        self.max_total = max_total;
        self
    }

    /// Set the acquire timeout
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the reclamation period
    pub fn with_reclaim_interval(mut self, interval: Duration) -> Self {
        self.reclaim_interval = interval;
        self
    }

    /// Reject combinations the pool cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.max_total == 0 {
            return Err(PoolError::InvalidConfig(
                "max_total must be greater than zero".to_string(),
            ));
        }
        if self.min_idle > self.max_total {
            return Err(PoolError::InvalidConfig(format!(
                "min_idle ({}) exceeds max_total ({})",
                self.min_idle, self.max_total
            )));
        }
        if self.reclaim_interval.is_zero() {
            return Err(PoolError::InvalidConfig(
                "reclaim_interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Address and transport options for the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend host name or IP address
    pub host: String,
    /// Backend port
    pub port: u16,
    /// TCP connect timeout (in milliseconds)
    pub connect_timeout_ms: u64,
    /// Disable Nagle's algorithm on backend sockets
    pub tcp_nodelay: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5432,
            connect_timeout_ms: 5_000,
            tcp_nodelay: true,
        }
    }
}

impl BackendConfig {
    /// `host:port` form used for connecting and logging.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Pool section of the settings file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PoolSettings {
    pub min_idle: usize,
    pub max_total: usize,
    /// Acquire timeout (in milliseconds)
    pub acquire_timeout_ms: u64,
    /// Reclamation period (in milliseconds)
    pub reclaim_interval_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        let defaults = PoolConfig::default();
        Self {
            min_idle: defaults.min_idle,
            max_total: defaults.max_total,
            acquire_timeout_ms: defaults.acquire_timeout.as_millis() as u64,
            reclaim_interval_ms: defaults.reclaim_interval.as_millis() as u64,
        }
    }
}

impl PoolSettings {
    /// Convert to the validated in-memory form.
    pub fn to_pool_config(&self) -> Result<PoolConfig> {
        let config = PoolConfig {
            min_idle: self.min_idle,
            max_total: self.max_total,
            acquire_timeout: Duration::from_millis(self.acquire_timeout_ms),
            reclaim_interval: Duration::from_millis(self.reclaim_interval_ms),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Stress driver section of the settings file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StressSettings {
    /// Number of concurrent worker tasks
    pub num_threads: usize,
    /// How long each worker loops (in seconds)
    pub duration_secs: u64,
    /// Fraction of iterations that invalidate instead of release
    pub invalidate_ratio: f64,
}

impl Default for StressSettings {
    fn default() -> Self {
        Self {
            num_threads: 16,
            duration_secs: 10,
            invalidate_ratio: 0.1,
        }
    }
}

/// Complete settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub backend: BackendConfig,
    pub pool: PoolSettings,
    pub stress: StressSettings,
}

impl Settings {
    /// Load settings from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| PoolError::Config(format!("Failed to read settings file: {}", e)))?;

        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| PoolError::Config(format!("Failed to parse settings file: {}", e)))?;

        Ok(settings)
    }

    /// Save settings to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| PoolError::Config(format!("Failed to serialize settings: {}", e)))?;

        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_is_valid() {
        assert!(PoolConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_max_total_rejected() {
        let config = PoolConfig::default().with_min_idle(0).with_max_total(0);
        assert!(matches!(config.validate(), Err(PoolError::InvalidConfig(_))));
    }

    #[test]
    fn test_min_idle_above_max_total_rejected() {
        let config = PoolConfig::default().with_min_idle(5).with_max_total(4);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min_idle (5)"));
    }

    #[test]
    fn test_zero_reclaim_interval_rejected() {
        let config = PoolConfig::default().with_reclaim_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_min_idle_equal_to_max_total_allowed() {
        let config = PoolConfig::default().with_min_idle(3).with_max_total(3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_settings_file_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pool.json");

        let mut settings = Settings::default();
        settings.backend.port = 6543;
        settings.pool.max_total = 4;
        settings.to_file(&path).unwrap();

        let loaded = Settings::from_file(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_partial_settings_use_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.json");
        std::fs::write(&path, r#"{ "pool": { "max_total": 3, "min_idle": 2 } }"#).unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.backend, BackendConfig::default());
        let config = settings.pool.to_pool_config().unwrap();
        assert_eq!(config.max_total, 3);
        assert_eq!(config.min_idle, 2);
        assert_eq!(config.acquire_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_pool_section_fails_conversion() {
        let settings = PoolSettings { min_idle: 8, max_total: 2, ..PoolSettings::default() };
        assert!(matches!(settings.to_pool_config(), Err(PoolError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let dir = tempdir().unwrap();
        let result = Settings::from_file(dir.path().join("absent.json"));
        assert!(matches!(result, Err(PoolError::Config(_))));
    }
}

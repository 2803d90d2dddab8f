//! Engine configuration
//!
//! Loaded with `figment`: built-in defaults, then an optional config file
//! (`.yaml`, `.yml`, `.toml` or `.json`), then `KPI_`-prefixed environment
//! variables (e.g. `KPI_WORKER_COUNT=8`).

use std::path::Path;
use std::time::Duration;

use common::{init_logging, load_config_with_env, LogConfig, WorkerGuard};
use kpi_model::DEFAULT_VALIDITY_SECS;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, Result};

/// Environment variable prefix for engine settings
pub const ENV_PREFIX: &str = "KPI_";

/// Source tag attached to notifications emitted for recomputed metrics
pub const DERIVED_UPDATE_TAG: &str = "derived-update";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Validity window of cached values in seconds
    pub cache_ttl_secs: u64,
    /// Concurrent propagation tasks
    pub worker_count: usize,
    /// Capacity of the bounded notification queue
    pub queue_capacity: usize,
    /// Delay before the first reverse index build, in milliseconds
    pub settle_delay_ms: u64,
    /// Maximum nesting of recursive calculations
    pub max_recursion_depth: usize,
    /// Source tag for follow-up notifications
    pub persist_source_tag: String,
    /// Subscriber settings applied by [`EngineConfig::init_logging`]
    pub logging: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: DEFAULT_VALIDITY_SECS as u64,
            worker_count: 4,
            queue_capacity: 1024,
            settle_delay_ms: 2000,
            max_recursion_depth: 64,
            persist_source_tag: DERIVED_UPDATE_TAG.to_string(),
            logging: LogConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from an optional file and `KPI_` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Load from defaults and `KPI_` environment variables only
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let config: Self = load_config_with_env(path, env_prefix)?;
        config.validate()?;
        debug!("Engine config loaded: {:?}", config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_ttl_secs == 0 {
            return Err(EngineError::config("cache_ttl_secs must be greater than 0"));
        }
        if self.worker_count == 0 {
            return Err(EngineError::config("worker_count must be greater than 0"));
        }
        if self.queue_capacity == 0 {
            return Err(EngineError::config("queue_capacity must be greater than 0"));
        }
        if self.max_recursion_depth == 0 {
            return Err(EngineError::config(
                "max_recursion_depth must be greater than 0",
            ));
        }
        if self.persist_source_tag.trim().is_empty() {
            return Err(EngineError::config("persist_source_tag must not be empty"));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Install the global `tracing` subscriber from the `logging` section
    ///
    /// Keep the returned guard alive while file logging is needed. Fails if a
    /// global subscriber is already installed.
    pub fn init_logging(&self) -> Result<Option<WorkerGuard>> {
        Ok(init_logging(&self.logging)?)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.queue_capacity, 1024);
        assert_eq!(config.settle_delay(), Duration::from_millis(2000));
        assert_eq!(config.persist_source_tag, "derived-update");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = EngineConfig {
            worker_count: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));

        let config = EngineConfig {
            cache_ttl_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_yaml_file_with_partial_settings() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "worker_count: 8\ncache_ttl_secs: 60\nlogging:\n  level: debug").unwrap();

        let config =
            EngineConfig::load_with_prefix(Some(file.path()), "KPI_TEST_UNSET_").unwrap();
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.cache_ttl_secs, 60);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.queue_capacity, 1024);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "worker_count = 0").unwrap();

        let result = EngineConfig::load_with_prefix(Some(file.path()), "KPI_TEST_UNSET_");
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        writeln!(file, r#"{{"worker_count": 2, "settle_delay_ms": 10}}"#).unwrap();

        std::env::set_var("KPI_TEST_ENV_WORKER_COUNT", "6");
        let config =
            EngineConfig::load_with_prefix(Some(file.path()), "KPI_TEST_ENV_").unwrap();
        std::env::remove_var("KPI_TEST_ENV_WORKER_COUNT");

        assert_eq!(config.worker_count, 6);
        assert_eq!(config.settle_delay_ms, 10);
    }
}

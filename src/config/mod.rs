//! # Performance Layer Configuration
//!
//! Every tunable of the cache, client pools, task manager and background queue
//! is read once at process start into a [`PerformanceConfig`].
//!
//! ## Sources
//!
//! Layered with the `config` crate, later sources winning:
//!
//! 1. Built-in defaults (`PerformanceConfig::default()`)
//! 2. Optional TOML file named by `PERF_CONFIG_PATH`
//! 3. Environment variables prefixed `PERF__`, nested with `__`
//!    (e.g. `PERF__CACHE__MEMORY_LIMIT=5000`)
//!
//! ```rust,no_run
//! use perf_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let workers = manager.config().tasks.max_workers;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Deployment environment name (development, test, production)
    pub environment: String,

    pub enable_caching: bool,
    pub enable_client_pooling: bool,
    pub enable_async_tasks: bool,
    pub enable_background_tasks: bool,

    /// Period of the maintenance sweep
    pub maintenance_interval_seconds: u64,

    pub cache: CacheConfig,
    pub pool: PoolConfig,
    pub tasks: TaskManagerConfig,
    pub queue: QueueConfig,
    pub thresholds: ThresholdConfig,
    pub database: DatabaseConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            enable_caching: true,
            enable_client_pooling: true,
            enable_async_tasks: true,
            enable_background_tasks: true,
            maintenance_interval_seconds: 300,
            cache: CacheConfig::default(),
            pool: PoolConfig::default(),
            tasks: TaskManagerConfig::default(),
            queue: QueueConfig::default(),
            thresholds: ThresholdConfig::default(),
            database: DatabaseConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Multi-tier cache settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries held by the in-process tier
    pub memory_limit: usize,
    /// Largest serialized value accepted by `set`
    pub max_value_bytes: usize,
    /// Composed keys longer than this are replaced by a digest
    pub max_key_length: usize,
    pub default_ttl_seconds: u64,
    /// Shared fast tier endpoint (requires the `cache-redis` feature)
    pub redis_url: Option<String>,
    /// Use the durable store as the persistent tier
    pub enable_durable_tier: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_limit: 10_000,
            max_value_bytes: 400 * 1024,
            max_key_length: 250,
            default_ttl_seconds: 3600,
            redis_url: None,
            enable_durable_tier: true,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }
}

/// Client pool settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    /// Age after which a pooled client is replaced
    pub reuse_ttl_seconds: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            reuse_ttl_seconds: 300,
        }
    }
}

impl PoolConfig {
    pub fn reuse_ttl(&self) -> Duration {
        Duration::from_secs(self.reuse_ttl_seconds)
    }
}

/// Async task manager settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TaskManagerConfig {
    /// Bound on concurrently executing blocking tasks
    pub max_workers: usize,
    /// Terminal tasks older than this are purged from the in-process index
    pub retention_hours: u64,
    /// TTL applied to task records in the durable ledger
    pub ledger_ttl_days: u64,
    /// How long shutdown waits for running tasks
    pub shutdown_timeout_seconds: u64,
}

impl Default for TaskManagerConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            retention_hours: 24,
            ledger_ttl_days: 7,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl TaskManagerConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3600)
    }

    pub fn ledger_ttl(&self) -> Duration {
        Duration::from_secs(self.ledger_ttl_days * 86_400)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

/// Background queue settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    pub queue_name: String,
    /// Maximum messages read and dispatched per batch
    pub batch_size: usize,
    /// Long-poll wait for a batch read
    pub poll_wait_seconds: u64,
    /// Visibility timeout applied when reading
    pub visibility_timeout_seconds: u64,
    /// Deliveries after which a message is archived; 0 disables the limit
    pub max_retries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_name: "perf_background_tasks".to_string(),
            batch_size: 10,
            poll_wait_seconds: 20,
            visibility_timeout_seconds: 300,
            max_retries: 5,
        }
    }
}

impl QueueConfig {
    pub fn poll_wait(&self) -> Duration {
        Duration::from_secs(self.poll_wait_seconds)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }
}

/// Reporting thresholds; breaches are reported, never enforced
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThresholdConfig {
    pub max_response_time_seconds: f64,
    pub min_cache_hit_rate: f64,
    pub max_error_rate: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            max_response_time_seconds: 2.0,
            min_cache_hit_rate: 0.8,
            max_error_rate: 0.05,
        }
    }
}

/// Durable store connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres URL; falls back to `DATABASE_URL` when unset
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub cache_table: String,
    pub task_table: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_seconds: 10,
            cache_table: "perf_cache_entries".to_string(),
            task_table: "perf_async_tasks".to_string(),
        }
    }
}

impl DatabaseConfig {
    /// Configured URL, else `DATABASE_URL`
    pub fn resolved_url(&self) -> Option<String> {
        self.url
            .clone()
            .filter(|url| !url.is_empty())
            .or_else(|| std::env::var(crate::constants::env::DATABASE_URL).ok())
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }
}

/// Circuit breaker guarding the shared fast tier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,
    /// Time to wait in open state before attempting recovery
    pub timeout_seconds: u64,
    /// Number of successful calls in half-open state to close circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            timeout_seconds: 30,
            success_threshold: 2,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Preset for the shared fast cache tier
    pub fn for_cache_tier() -> Self {
        Self {
            enabled: true,
            failure_threshold: 3,
            timeout_seconds: 15,
            success_threshold: 2,
        }
    }
}

impl PerformanceConfig {
    /// Load through [`ConfigManager`] using the process environment
    pub fn from_env() -> ConfigResult<Self> {
        Ok(ConfigManager::load()?.config().clone())
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_seconds)
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Reject values the components cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.cache.memory_limit == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.memory_limit",
                0,
                "memory limit must be greater than 0",
            ));
        }

        if self.cache.max_value_bytes == 0 {
            return Err(ConfigurationError::invalid_value(
                "cache.max_value_bytes",
                0,
                "value size cap must be greater than 0",
            ));
        }

        // Long enough for a namespace plus a full sha256 digest
        if self.cache.max_key_length < 96 {
            return Err(ConfigurationError::invalid_value(
                "cache.max_key_length",
                self.cache.max_key_length,
                "key length bound must be at least 96",
            ));
        }

        if self.pool.reuse_ttl_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "pool.reuse_ttl_seconds",
                0,
                "client reuse TTL must be greater than 0",
            ));
        }

        if self.tasks.max_workers == 0 {
            return Err(ConfigurationError::invalid_value(
                "tasks.max_workers",
                0,
                "worker pool size must be greater than 0",
            ));
        }

        if self.queue.queue_name.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "queue.queue_name",
                "queue configuration",
            ));
        }

        if self.queue.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "queue.batch_size",
                0,
                "batch size must be greater than 0",
            ));
        }

        if self.queue.visibility_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "queue.visibility_timeout_seconds",
                0,
                "visibility timeout must be greater than 0",
            ));
        }

        for (field, rate) in [
            ("thresholds.min_cache_hit_rate", self.thresholds.min_cache_hit_rate),
            ("thresholds.max_error_rate", self.thresholds.max_error_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigurationError::invalid_value(
                    field,
                    rate,
                    "rate must be within [0.0, 1.0]",
                ));
            }
        }

        if self.thresholds.max_response_time_seconds <= 0.0 {
            return Err(ConfigurationError::invalid_value(
                "thresholds.max_response_time_seconds",
                self.thresholds.max_response_time_seconds,
                "response time threshold must be positive",
            ));
        }

        if self.circuit_breaker.enabled {
            if self.circuit_breaker.failure_threshold == 0 {
                return Err(ConfigurationError::invalid_value(
                    "circuit_breaker.failure_threshold",
                    0,
                    "failure_threshold must be greater than 0",
                ));
            }
            if self.circuit_breaker.success_threshold == 0 {
                return Err(ConfigurationError::invalid_value(
                    "circuit_breaker.success_threshold",
                    0,
                    "success_threshold must be greater than 0",
                ));
            }
        }

        if self.database.max_connections < self.database.min_connections {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                self.database.max_connections,
                "max_connections must be >= min_connections",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PerformanceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.memory_limit, 10_000);
        assert_eq!(config.cache.max_value_bytes, 409_600);
        assert_eq!(config.pool.reuse_ttl(), Duration::from_secs(300));
        assert_eq!(config.tasks.max_workers, 10);
        assert_eq!(config.tasks.retention(), Duration::from_secs(24 * 3600));
        assert_eq!(config.tasks.ledger_ttl(), Duration::from_secs(7 * 86_400));
        assert_eq!(config.queue.poll_wait(), Duration::from_secs(20));
    }

    #[test]
    fn test_validation_rejects_zero_workers() {
        let mut config = PerformanceConfig::default();
        config.tasks.max_workers = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_out_of_range_rates() {
        let mut config = PerformanceConfig::default();
        config.thresholds.min_cache_hit_rate = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_groups_fill_defaults() {
        let config: PerformanceConfig =
            serde_json::from_value(serde_json::json!({ "cache": { "memory_limit": 5 } })).unwrap();
        assert_eq!(config.cache.memory_limit, 5);
        assert_eq!(config.cache.max_key_length, 250);
        assert_eq!(config.queue, QueueConfig::default());
    }
}

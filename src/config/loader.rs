//! Configuration Loader
//!
//! Layers defaults, an optional TOML file and prefixed environment variables.

use super::error::{ConfigResult, ConfigurationError};
use super::PerformanceConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Environment variable naming an optional TOML config file
pub const CONFIG_PATH_ENV: &str = crate::constants::env::CONFIG_PATH;

/// Prefix for nested environment overrides (`PERF__CACHE__MEMORY_LIMIT`)
pub const ENV_PREFIX: &str = "PERF";

/// Loaded, validated configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: PerformanceConfig,
    environment: String,
    source_file: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        let file = env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        Self::load_from(file.as_deref(), ENV_PREFIX)
    }

    /// Load from an explicit file and environment prefix
    ///
    /// Tests pass a unique prefix so they never observe the process environment.
    pub fn load_from(file: Option<&Path>, env_prefix: &str) -> ConfigResult<Arc<ConfigManager>> {
        let defaults = Config::try_from(&PerformanceConfig::default())
            .map_err(ConfigurationError::build_error)?;

        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = file {
            if !path.exists() {
                return Err(ConfigurationError::file_not_found(path));
            }
            debug!(path = %path.display(), "Adding configuration file source");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: PerformanceConfig = builder
            .build()
            .map_err(ConfigurationError::build_error)?
            .try_deserialize()
            .map_err(ConfigurationError::deserialize_error)?;

        let environment = Self::detect_environment().unwrap_or_else(|| config.environment.clone());
        config.environment = environment.clone();

        config.validate()?;

        info!(
            environment = %environment,
            memory_limit = config.cache.memory_limit,
            max_workers = config.tasks.max_workers,
            queue = %config.queue.queue_name,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment,
            source_file: file.map(Path::to_path_buf),
        }))
    }

    /// Build a manager around an already constructed configuration
    pub fn from_config(config: PerformanceConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            environment: config.environment.clone(),
            config,
            source_file: None,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &PerformanceConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    /// `PERF_ENV`, then `APP_ENV`
    pub fn detect_environment() -> Option<String> {
        env::var(crate::constants::env::ENVIRONMENT)
            .or_else(|_| env::var(crate::constants::env::APP_ENVIRONMENT))
            .ok()
            .filter(|value| !value.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_defaults_without_sources() {
        let manager = ConfigManager::load_from(None, "PERF_TEST_NO_SOURCES").unwrap();
        assert_eq!(manager.config().cache, PerformanceConfig::default().cache);
        assert!(manager.source_file().is_none());
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[cache]\nmemory_limit = 42\n\n[queue]\nqueue_name = \"custom_queue\"\nmax_retries = 0\n"
        )
        .unwrap();

        let manager = ConfigManager::load_from(Some(file.path()), "PERF_TEST_TOML").unwrap();
        let config = manager.config();
        assert_eq!(config.cache.memory_limit, 42);
        assert_eq!(config.cache.max_value_bytes, 400 * 1024);
        assert_eq!(config.queue.queue_name, "custom_queue");
        assert_eq!(config.queue.max_retries, 0);
    }

    #[test]
    fn test_invalid_file_values_fail_validation() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[tasks]\nmax_workers = 0\n").unwrap();

        let result = ConfigManager::load_from(Some(file.path()), "PERF_TEST_INVALID");
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let result = ConfigManager::load_from(
            Some(Path::new("/nonexistent/perf-config.toml")),
            "PERF_TEST_MISSING",
        );
        assert!(matches!(result, Err(ConfigurationError::FileNotFound { .. })));
    }
}

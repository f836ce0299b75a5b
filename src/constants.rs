//! # System Constants
//!
//! Names shared between components: cache namespaces, health component keys
//! and environment variables read at startup.

/// Cache namespaces owned by the performance layer
pub mod cache_prefixes {
    /// Cached handler responses written by the optimizer
    pub const RESPONSE: &str = "response";
}

/// Keys of the `components` map in health reports
pub mod components {
    pub const CACHE: &str = "cache";
    pub const CLIENT_POOLS: &str = "client_pools";
    pub const TASK_MANAGER: &str = "task_manager";
    pub const BACKGROUND_QUEUE: &str = "background_queue";
}

/// Environment variables consulted outside the `PERF__*` config overrides
pub mod env {
    pub const CONFIG_PATH: &str = "PERF_CONFIG_PATH";
    pub const ENVIRONMENT: &str = "PERF_ENV";
    pub const APP_ENVIRONMENT: &str = "APP_ENV";
    pub const LOG_FORMAT: &str = "PERF_LOG_FORMAT";
    pub const DATABASE_URL: &str = "DATABASE_URL";
}

/// Overall status reported by health checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Every configured component is reachable
    Healthy,
    /// Running on a subset of components
    Degraded,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

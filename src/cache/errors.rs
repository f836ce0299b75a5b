//! Cache error types

use thiserror::Error;

/// Errors raised by individual cache tiers
///
/// The multi-tier cache absorbs these at its public surface; they only reach
/// callers that talk to a tier directly.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Failed to connect to cache backend
    #[error("Cache connection error: {0}")]
    ConnectionError(String),

    /// Failed to serialize or deserialize cache value
    #[error("Cache serialization error: {0}")]
    SerializationError(String),

    /// Value exceeds the configured size cap
    #[error("Cache value too large: {size_bytes} bytes exceeds limit of {limit_bytes} bytes")]
    ValueTooLarge { size_bytes: usize, limit_bytes: usize },

    /// Tier is known to be down (circuit open or marked unavailable)
    #[error("Cache tier unavailable: {0}")]
    Unavailable(String),

    /// Operation not supported by this tier
    #[error("Cache operation unsupported by {tier}: {operation}")]
    Unsupported { tier: String, operation: String },

    /// Generic backend error
    #[error("Cache backend error: {0}")]
    BackendError(String),
}

impl CacheError {
    pub fn unsupported(tier: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            tier: tier.into(),
            operation: operation.into(),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::SerializationError(err.to_string())
    }
}

impl From<sqlx::Error> for CacheError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                CacheError::ConnectionError(err.to_string())
            }
            _ => CacheError::BackendError(err.to_string()),
        }
    }
}

#[cfg(feature = "cache-redis")]
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout() {
            CacheError::ConnectionError(err.to_string())
        } else {
            CacheError::BackendError(err.to_string())
        }
    }
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

//! Redis fast tier
//!
//! Uses `redis::aio::ConnectionManager` for async multiplexed connections with
//! automatic reconnection. Requires the `cache-redis` feature flag.

use crate::cache::errors::{CacheError, CacheResult};
use crate::cache::keys::glob_escape;
use crate::cache::traits::FastTier;
use crate::clock::SharedClock;
use crate::models::CacheEntry;
use async_trait::async_trait;
use tracing::debug;

/// Redis-backed shared tier
///
/// Values are stored as raw bytes with a millisecond TTL matching the entry's
/// absolute expiry. Prefix deletion walks the keyspace with SCAN so the
/// server is never blocked.
#[derive(Clone)]
pub struct RedisFastTier {
    connection_manager: redis::aio::ConnectionManager,
    clock: SharedClock,
}

impl std::fmt::Debug for RedisFastTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisFastTier")
            .field("connection_manager", &"ConnectionManager")
            .finish()
    }
}

impl RedisFastTier {
    pub async fn connect(url: &str, clock: SharedClock) -> CacheResult<Self> {
        let client = redis::Client::open(url).map_err(|e| {
            CacheError::ConnectionError(format!("Failed to create Redis client: {e}"))
        })?;

        let connection_manager = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::ConnectionError(format!("Failed to connect to Redis: {e}")))?;

        debug!(url = %redact_url(url), "Redis fast tier connected");

        Ok(Self {
            connection_manager,
            clock,
        })
    }
}

#[async_trait]
impl FastTier for RedisFastTier {
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let mut conn = self.connection_manager.clone();
        let (value, pttl): (Option<Vec<u8>>, i64) = redis::pipe()
            .cmd("GET")
            .arg(key)
            .cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::BackendError(format!("Redis GET failed: {e}")))?;

        // PTTL is -2 for missing keys and -1 for keys without expiry
        let Some(value) = value else {
            return Ok(None);
        };
        if pttl == -2 {
            return Ok(None);
        }

        let now = self.clock.now();
        let expiry = if pttl > 0 {
            now + chrono::Duration::milliseconds(pttl)
        } else {
            now + chrono::Duration::days(36_500)
        };
        Ok(Some(CacheEntry::restore(key, value, expiry, now)))
    }

    async fn set(&self, entry: &CacheEntry) -> CacheResult<()> {
        let Some(remaining) = entry.remaining_ttl(self.clock.now()) else {
            return Ok(());
        };
        let mut conn = self.connection_manager.clone();
        let ttl_millis = (remaining.as_millis() as u64).max(1);

        let _: () = redis::cmd("PSETEX")
            .arg(&entry.key)
            .arg(ttl_millis)
            .arg(entry.value.as_slice())
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::BackendError(format!("Redis PSETEX failed: {e}")))?;

        debug!(key = %entry.key, ttl_millis = ttl_millis, "Fast tier SET");
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut conn = self.connection_manager.clone();
        let removed: u64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::BackendError(format!("Redis DEL failed: {e}")))?;
        Ok(removed > 0)
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<Option<u64>> {
        let mut conn = self.connection_manager.clone();
        let pattern = format!("{}*", glob_escape(prefix));
        let mut deleted: u64 = 0;
        let mut cursor: u64 = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| CacheError::BackendError(format!("Redis SCAN failed: {e}")))?;

            if !keys.is_empty() {
                let count: u64 = redis::cmd("DEL")
                    .arg(&keys)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| {
                        CacheError::BackendError(format!("Redis DEL (batch) failed: {e}"))
                    })?;
                deleted += count;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        debug!(pattern = %pattern, deleted = deleted, "Fast tier pattern DEL");
        Ok(Some(deleted))
    }

    async fn health_check(&self) -> CacheResult<bool> {
        let mut conn = self.connection_manager.clone();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::BackendError(format!("Redis PING failed: {e}")))?;
        Ok(pong == "PONG")
    }

    fn provider_name(&self) -> &'static str {
        "redis"
    }
}

/// Redact credentials from a Redis URL for logging
fn redact_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            return format!("{}***{}", &url[..=colon_pos], &url[at_pos..]);
        }
    }
    url.to_string()
}

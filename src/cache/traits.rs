//! Tier traits for the multi-tier cache.
//!
//! Implemented by concrete providers (Redis, Postgres, in-memory doubles).
//! Every operation is fallible; the multi-tier cache treats an `Err` as "tier
//! unreachable" and moves on.

use super::errors::CacheResult;
use crate::models::CacheEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Shared fast tier (e.g. Redis) sitting between process memory and the durable store
#[async_trait]
pub trait FastTier: Send + Sync + std::fmt::Debug {
    /// Fetch an unexpired entry
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>>;

    /// Store an entry until its `ttl_expiry`
    async fn set(&self, entry: &CacheEntry) -> CacheResult<()>;

    /// Remove a key; `Ok(true)` when something was removed
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Remove every key starting with `prefix`
    ///
    /// `Ok(None)` when the tier cannot scan by pattern.
    async fn delete_prefix(&self, _prefix: &str) -> CacheResult<Option<u64>> {
        Ok(None)
    }

    async fn health_check(&self) -> CacheResult<bool>;

    fn provider_name(&self) -> &'static str;
}

/// Durable keyed-value store acting as the cache's persistent tier
#[async_trait]
pub trait DurableCacheStore: Send + Sync + std::fmt::Debug {
    /// Fetch an entry, treating rows past their expiry as absent
    async fn get_entry(&self, key: &str, now: DateTime<Utc>) -> CacheResult<Option<CacheEntry>>;

    async fn put_entry(&self, entry: &CacheEntry) -> CacheResult<()>;

    async fn delete_entry(&self, key: &str) -> CacheResult<bool>;

    /// Prefix deletion; most durable stores rely on TTL expiry instead
    async fn delete_prefix(&self, _prefix: &str) -> CacheResult<Option<u64>> {
        Ok(None)
    }

    /// Drop rows whose expiry has passed
    async fn purge_expired(&self, now: DateTime<Utc>) -> CacheResult<u64>;

    async fn health_check(&self) -> CacheResult<bool>;

    fn provider_name(&self) -> &'static str;
}

//! # Multi-Tier Cache
//!
//! Namespaced cache over three tiers checked in fixed order:
//!
//! 1. **Memory**: bounded in-process map, a local accelerator only
//! 2. **Fast** (optional): shared tier such as Redis, circuit-breaker guarded
//! 3. **Durable** (optional): persistent keyed store with per-row expiry
//!
//! A hit in a lower tier is promoted into every higher tier with the same
//! absolute expiry. Tier failures are logged and skipped; no operation on
//! this type returns an error to the caller.
//!
//! ## Consistency
//!
//! `invalidate_pattern` always clears the memory tier and asks the fast tier
//! to scan by prefix. Durable stores that cannot delete by prefix keep stale
//! rows until their TTL passes, so a later `get` in another process may still
//! see them.

use super::keys::{invalidation_prefix, CacheKey};
use super::memory::MemoryTier;
use super::provider::FastTierProvider;
use super::traits::DurableCacheStore;
use crate::clock::SharedClock;
use crate::config::CacheConfig;
use crate::logging::log_cache_operation;
use crate::models::CacheEntry;
use crate::resilience::CircuitState;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct CacheCounters {
    memory_hits: AtomicU64,
    fast_hits: AtomicU64,
    durable_hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    rejected_oversize: AtomicU64,
    tier_errors: AtomicU64,
}

/// Last observed reachability of each tier; `None` when not configured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierAvailability {
    pub memory: bool,
    pub fast: Option<bool>,
    pub durable: Option<bool>,
}

/// Snapshot returned by [`MultiTierCache::get_stats`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub limit: usize,
    pub tier_availability: TierAvailability,
    pub memory_hits: u64,
    pub fast_hits: u64,
    pub durable_hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub rejected_oversize: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub tier_errors: u64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.memory_hits + self.fast_hits + self.durable_hits
    }

    /// Hits over lookups, `None` before the first lookup
    pub fn hit_rate(&self) -> Option<f64> {
        let lookups = self.hits() + self.misses;
        (lookups > 0).then(|| self.hits() as f64 / lookups as f64)
    }
}

/// Probed tier health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheHealth {
    pub healthy: bool,
    pub tier_availability: TierAvailability,
    pub fast_provider: Option<String>,
    pub fast_circuit: Option<CircuitState>,
    pub durable_provider: Option<String>,
    pub stats: CacheStats,
}

/// Result of a maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionReport {
    pub memory_removed: u64,
    pub durable_purged: u64,
}

#[derive(Debug)]
pub struct MultiTierCache {
    memory: MemoryTier,
    fast: Option<FastTierProvider>,
    durable: Option<Arc<dyn DurableCacheStore>>,
    max_value_bytes: usize,
    max_key_length: usize,
    default_ttl: Duration,
    clock: SharedClock,
    counters: CacheCounters,
    fast_available: AtomicBool,
    durable_available: AtomicBool,
}

impl MultiTierCache {
    /// Memory-only cache; attach remote tiers with the `with_*` methods
    pub fn new(config: &CacheConfig, clock: SharedClock) -> Self {
        Self {
            memory: MemoryTier::new(config.memory_limit),
            fast: None,
            durable: None,
            max_value_bytes: config.max_value_bytes,
            max_key_length: config.max_key_length,
            default_ttl: config.default_ttl(),
            clock,
            counters: CacheCounters::default(),
            fast_available: AtomicBool::new(true),
            durable_available: AtomicBool::new(true),
        }
    }

    pub fn with_fast_tier(mut self, fast: FastTierProvider) -> Self {
        self.fast = Some(fast);
        self
    }

    pub fn with_durable_store(mut self, durable: Arc<dyn DurableCacheStore>) -> Self {
        self.durable = Some(durable);
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn max_value_bytes(&self) -> usize {
        self.max_value_bytes
    }

    pub fn compose_key(&self, prefix: &str, key: &str, user_id: Option<&str>) -> CacheKey {
        CacheKey::compose(prefix, key, user_id, self.max_key_length)
    }

    /// Typed lookup; a value that no longer deserializes counts as a miss
    pub async fn get<T: DeserializeOwned>(
        &self,
        prefix: &str,
        key: &str,
        user_id: Option<&str>,
    ) -> Option<T> {
        let bytes = self.get_raw(prefix, key, user_id).await?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(prefix = prefix, key = key, error = %e, "Cached value failed to deserialize, treating as miss");
                None
            }
        }
    }

    /// Serialized lookup across all tiers with promotion
    pub async fn get_raw(
        &self,
        prefix: &str,
        key: &str,
        user_id: Option<&str>,
    ) -> Option<Arc<Vec<u8>>> {
        let key = self.compose_key(prefix, key, user_id);
        let now = self.clock.now();

        if let Some(entry) = self.memory.get(key.as_str(), now) {
            self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
            log_cache_operation("get", key.as_str(), Some("memory"), "hit");
            return Some(entry.value);
        }

        if let Some(fast) = &self.fast {
            match fast.get(key.as_str()).await {
                Ok(Some(entry)) if !entry.is_expired(now) => {
                    self.mark_fast(true);
                    self.counters.fast_hits.fetch_add(1, Ordering::Relaxed);
                    log_cache_operation("get", key.as_str(), Some("fast"), "hit_promoted");
                    self.memory.insert(entry.clone(), now);
                    return Some(entry.value);
                }
                Ok(_) => self.mark_fast(true),
                Err(e) => self.fast_failed("get", &key, &e),
            }
        }

        if let Some(durable) = &self.durable {
            match durable.get_entry(key.as_str(), now).await {
                Ok(Some(entry)) if !entry.is_expired(now) => {
                    self.mark_durable(true);
                    self.counters.durable_hits.fetch_add(1, Ordering::Relaxed);
                    log_cache_operation("get", key.as_str(), Some("durable"), "hit_promoted");
                    if let Some(fast) = &self.fast {
                        if let Err(e) = fast.set(&entry).await {
                            self.fast_failed("promote", &key, &e);
                        }
                    }
                    self.memory.insert(entry.clone(), now);
                    return Some(entry.value);
                }
                Ok(_) => self.mark_durable(true),
                Err(e) => self.durable_failed("get", &key, &e),
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        log_cache_operation("get", key.as_str(), None, "miss");
        None
    }

    /// Serialize and store in every reachable tier
    ///
    /// Returns `false` without touching any tier when the value cannot be
    /// serialized, exceeds the size cap, or `ttl` is zero.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        prefix: &str,
        key: &str,
        value: &T,
        ttl: Duration,
        user_id: Option<&str>,
    ) -> bool {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.set_raw(prefix, key, bytes, ttl, user_id).await,
            Err(e) => {
                warn!(prefix = prefix, key = key, error = %e, "Cache value failed to serialize");
                false
            }
        }
    }

    pub async fn set_raw(
        &self,
        prefix: &str,
        key: &str,
        bytes: Vec<u8>,
        ttl: Duration,
        user_id: Option<&str>,
    ) -> bool {
        let key = self.compose_key(prefix, key, user_id);

        if bytes.len() > self.max_value_bytes {
            self.counters
                .rejected_oversize
                .fetch_add(1, Ordering::Relaxed);
            warn!(
                key = %key,
                size_bytes = bytes.len(),
                limit_bytes = self.max_value_bytes,
                "Cache value exceeds size cap, not stored"
            );
            return false;
        }
        if ttl.is_zero() {
            log_cache_operation("set", key.as_str(), None, "skipped_zero_ttl");
            return false;
        }

        let now = self.clock.now();
        let entry = CacheEntry::new(key.as_str(), bytes, ttl, now);

        self.memory.insert(entry.clone(), now);

        if let Some(fast) = &self.fast {
            match fast.set(&entry).await {
                Ok(()) => self.mark_fast(true),
                Err(e) => self.fast_failed("set", &key, &e),
            }
        }

        if let Some(durable) = &self.durable {
            match durable.put_entry(&entry).await {
                Ok(()) => self.mark_durable(true),
                Err(e) => self.durable_failed("set", &key, &e),
            }
        }

        self.counters.sets.fetch_add(1, Ordering::Relaxed);
        log_cache_operation("set", key.as_str(), None, "stored");
        true
    }

    /// Remove a key from every tier
    ///
    /// Returns `false` when a configured tier could not be reached, in which
    /// case that tier may still hold the value until it expires.
    pub async fn delete(&self, prefix: &str, key: &str, user_id: Option<&str>) -> bool {
        let key = self.compose_key(prefix, key, user_id);
        let mut clean = true;

        self.memory.remove(key.as_str());

        if let Some(fast) = &self.fast {
            match fast.delete(key.as_str()).await {
                Ok(_) => self.mark_fast(true),
                Err(e) => {
                    clean = false;
                    self.fast_failed("delete", &key, &e);
                }
            }
        }

        if let Some(durable) = &self.durable {
            match durable.delete_entry(key.as_str()).await {
                Ok(_) => self.mark_durable(true),
                Err(e) => {
                    clean = false;
                    self.durable_failed("delete", &key, &e);
                }
            }
        }

        log_cache_operation("delete", key.as_str(), None, if clean { "deleted" } else { "partial" });
        clean
    }

    /// Drop every key under `prefix[:user_id]`
    ///
    /// Returns the number of in-process entries removed.
    pub async fn invalidate_pattern(&self, prefix: &str, user_id: Option<&str>) -> u64 {
        let pattern = invalidation_prefix(prefix, user_id);
        let removed = self.memory.remove_prefix(&pattern);

        let fast_removed = match &self.fast {
            Some(fast) => match fast.delete_prefix(&pattern).await {
                Ok(count) => {
                    self.mark_fast(true);
                    count
                }
                Err(e) => {
                    self.fast_failed("invalidate", &pattern, &e);
                    None
                }
            },
            None => None,
        };

        let durable_removed = match &self.durable {
            Some(durable) => match durable.delete_prefix(&pattern).await {
                Ok(count) => count,
                Err(e) => {
                    self.durable_failed("invalidate", &pattern, &e);
                    None
                }
            },
            None => None,
        };

        info!(
            pattern = %pattern,
            memory_removed = removed,
            fast_removed = ?fast_removed,
            durable_removed = ?durable_removed,
            "Cache pattern invalidated"
        );
        removed
    }

    pub fn get_stats(&self) -> CacheStats {
        CacheStats {
            size: self.memory.len(),
            limit: self.memory.limit(),
            tier_availability: self.tier_availability(),
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            fast_hits: self.counters.fast_hits.load(Ordering::Relaxed),
            durable_hits: self.counters.durable_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            rejected_oversize: self.counters.rejected_oversize.load(Ordering::Relaxed),
            evictions: self.memory.evictions(),
            expirations: self.memory.expirations(),
            tier_errors: self.counters.tier_errors.load(Ordering::Relaxed),
        }
    }

    pub fn tier_availability(&self) -> TierAvailability {
        TierAvailability {
            memory: true,
            fast: self
                .fast
                .as_ref()
                .map(|fast| {
                    fast.circuit_state() != Some(CircuitState::Open)
                        && self.fast_available.load(Ordering::Relaxed)
                }),
            durable: self
                .durable
                .as_ref()
                .map(|_| self.durable_available.load(Ordering::Relaxed)),
        }
    }

    /// Probe remote tiers and refresh availability
    pub async fn health(&self) -> CacheHealth {
        if let Some(fast) = &self.fast {
            self.mark_fast(fast.health_check().await);
        }
        if let Some(durable) = &self.durable {
            let healthy = durable.health_check().await.unwrap_or(false);
            self.mark_durable(healthy);
        }

        let tier_availability = self.tier_availability();
        CacheHealth {
            // Memory alone keeps the cache functional
            healthy: true,
            tier_availability,
            fast_provider: self.fast.as_ref().map(|f| f.provider_name().to_string()),
            fast_circuit: self.fast.as_ref().and_then(|f| f.circuit_state()),
            durable_provider: self
                .durable
                .as_ref()
                .map(|d| d.provider_name().to_string()),
            stats: self.get_stats(),
        }
    }

    /// Maintenance pass: purge expired, enforce the memory bound, purge durable rows
    pub async fn evict(&self) -> EvictionReport {
        let now = self.clock.now();
        let memory_removed = self.memory.enforce_limit(now);
        self.memory.shrink_to_fit();

        let durable_purged = match &self.durable {
            Some(durable) => match durable.purge_expired(now).await {
                Ok(purged) => purged,
                Err(e) => {
                    self.durable_failed("purge", &"*", &e);
                    0
                }
            },
            None => 0,
        };

        EvictionReport {
            memory_removed,
            durable_purged,
        }
    }

    /// Drop all in-process entries
    pub fn clear_memory(&self) {
        self.memory.clear();
    }

    fn mark_fast(&self, available: bool) {
        self.fast_available.store(available, Ordering::Relaxed);
    }

    fn mark_durable(&self, available: bool) {
        self.durable_available.store(available, Ordering::Relaxed);
    }

    fn fast_failed(&self, operation: &str, key: &dyn std::fmt::Display, error: &super::CacheError) {
        self.counters.tier_errors.fetch_add(1, Ordering::Relaxed);
        self.mark_fast(false);
        warn!(operation = operation, key = %key, tier = "fast", error = %error, "Cache tier unavailable, skipping");
    }

    fn durable_failed(&self, operation: &str, key: &dyn std::fmt::Display, error: &super::CacheError) {
        self.counters.tier_errors.fetch_add(1, Ordering::Relaxed);
        self.mark_durable(false);
        warn!(operation = operation, key = %key, tier = "durable", error = %error, "Cache tier unavailable, skipping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::providers::{InMemoryDurableStore, InMemoryFastTier};
    use crate::clock::{Clock, ManualClock};
    use serde_json::json;

    fn config() -> CacheConfig {
        CacheConfig {
            memory_limit: 100,
            max_value_bytes: 64,
            ..CacheConfig::default()
        }
    }

    #[tokio::test]
    async fn test_memory_round_trip_and_expiry() {
        let clock = ManualClock::starting_now();
        let cache = MultiTierCache::new(&config(), clock.shared());

        assert!(cache.set("files", "doc1", &json!({"name": "a.pdf"}), Duration::from_secs(2), Some("u1")).await);
        let value: Option<serde_json::Value> = cache.get("files", "doc1", Some("u1")).await;
        assert_eq!(value, Some(json!({"name": "a.pdf"})));

        clock.advance(Duration::from_secs(3));
        let value: Option<serde_json::Value> = cache.get("files", "doc1", Some("u1")).await;
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn test_durable_hit_is_promoted() {
        let clock = ManualClock::starting_now();
        let fast = InMemoryFastTier::new(clock.shared());
        let durable = InMemoryDurableStore::new();
        let cache = MultiTierCache::new(&config(), clock.shared())
            .with_fast_tier(FastTierProvider::new(Arc::new(fast.clone()), None, clock.shared()))
            .with_durable_store(Arc::new(durable.clone()));

        let entry = CacheEntry::new("quiz:u1:q1", b"7".to_vec(), Duration::from_secs(60), clock.now());
        durable.put_entry(&entry).await.unwrap();

        let value: Option<i32> = cache.get("quiz", "q1", Some("u1")).await;
        assert_eq!(value, Some(7));
        assert!(fast.contains("quiz:u1:q1"));

        let stats = cache.get_stats();
        assert_eq!(stats.durable_hits, 1);
        assert_eq!(stats.size, 1);

        let value: Option<i32> = cache.get("quiz", "q1", Some("u1")).await;
        assert_eq!(value, Some(7));
        assert_eq!(cache.get_stats().memory_hits, 1);
    }

    #[tokio::test]
    async fn test_oversized_value_is_rejected_everywhere() {
        let clock = ManualClock::starting_now();
        let durable = InMemoryDurableStore::new();
        let cache = MultiTierCache::new(&config(), clock.shared())
            .with_durable_store(Arc::new(durable.clone()));

        let big = "x".repeat(200);
        assert!(!cache.set("files", "big", &big, Duration::from_secs(60), None).await);
        assert!(durable.is_empty());
        assert_eq!(cache.get_stats().size, 0);
        assert_eq!(cache.get_stats().rejected_oversize, 1);
    }

    #[tokio::test]
    async fn test_unreachable_tiers_are_skipped() {
        let clock = ManualClock::starting_now();
        let fast = InMemoryFastTier::new(clock.shared());
        let durable = InMemoryDurableStore::new();
        fast.set_available(false);
        durable.set_available(false);

        let cache = MultiTierCache::new(&config(), clock.shared())
            .with_fast_tier(FastTierProvider::new(Arc::new(fast), None, clock.shared()))
            .with_durable_store(Arc::new(durable));

        assert!(cache.set("p", "k", &1, Duration::from_secs(10), None).await);
        assert_eq!(cache.get::<i32>("p", "k", None).await, Some(1));
        assert_eq!(
            cache.tier_availability(),
            TierAvailability {
                memory: true,
                fast: Some(false),
                durable: Some(false),
            }
        );
        assert!(!cache.delete("p", "k", None).await);
        assert_eq!(cache.get::<i32>("p", "k", None).await, None);
    }

    #[tokio::test]
    async fn test_zero_ttl_is_rejected() {
        let cache = MultiTierCache::new(&config(), ManualClock::starting_now().shared());
        assert!(!cache.set("p", "k", &1, Duration::ZERO, None).await);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn test_operations_emit_cache_events() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(logs.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let cache = MultiTierCache::new(&config(), ManualClock::starting_now().shared());
        cache.get::<i32>("p", "k", None).await;
        cache.set("p", "k", &1, Duration::from_secs(10), None).await;
        cache.get::<i32>("p", "k", None).await;

        let output = String::from_utf8(logs.0.lock().clone()).unwrap();
        let events: Vec<&str> = output
            .lines()
            .filter(|line| line.contains("CACHE_OPERATION"))
            .collect();
        assert_eq!(events.len(), 3, "{output}");
        assert!(events[0].contains("miss"));
        assert!(events[1].contains("stored"));
        assert!(events[2].contains("memory") && events[2].contains("hit"));
    }
}

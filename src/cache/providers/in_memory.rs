//! In-memory tier doubles.
//!
//! Stand-ins for the shared fast tier and the durable store in tests and
//! single-process deployments. Both can be switched offline to exercise the
//! cache's degraded paths.

use crate::cache::errors::{CacheError, CacheResult};
use crate::cache::traits::{DurableCacheStore, FastTier};
use crate::clock::SharedClock;
use crate::models::CacheEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct Store {
    entries: DashMap<String, CacheEntry>,
    available: AtomicBool,
}

impl Store {
    fn new() -> Self {
        Self {
            entries: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    fn ensure_available(&self, tier: &str) -> CacheResult<()> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CacheError::ConnectionError(format!("{tier} is offline")))
        }
    }

    fn get(&self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let hit = self.entries.get(key).map(|entry| entry.clone())?;
        if hit.is_expired(now) {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
            return None;
        }
        Some(hit)
    }

    fn delete_prefix(&self, prefix: &str) -> u64 {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        before.saturating_sub(self.entries.len()) as u64
    }
}

/// Shared-memory fast tier with pattern deletion
#[derive(Debug, Clone)]
pub struct InMemoryFastTier {
    store: Arc<Store>,
    clock: SharedClock,
}

impl InMemoryFastTier {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            store: Arc::new(Store::new()),
            clock,
        }
    }

    /// Simulate the tier going away or coming back
    pub fn set_available(&self, available: bool) {
        self.store.available.store(available, Ordering::Release);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.store.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.entries.is_empty()
    }
}

#[async_trait]
impl FastTier for InMemoryFastTier {
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        self.store.ensure_available("in-memory fast tier")?;
        Ok(self.store.get(key, self.clock.now()))
    }

    async fn set(&self, entry: &CacheEntry) -> CacheResult<()> {
        self.store.ensure_available("in-memory fast tier")?;
        self.store.entries.insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.store.ensure_available("in-memory fast tier")?;
        Ok(self.store.entries.remove(key).is_some())
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<Option<u64>> {
        self.store.ensure_available("in-memory fast tier")?;
        Ok(Some(self.store.delete_prefix(prefix)))
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(self.store.available.load(Ordering::Acquire))
    }

    fn provider_name(&self) -> &'static str {
        "in_memory_fast"
    }
}

/// Durable-store double keyed by composed cache key
///
/// Prefix deletion is off by default, matching durable stores that rely on
/// TTL expiry.
#[derive(Debug, Clone)]
pub struct InMemoryDurableStore {
    store: Arc<Store>,
    supports_prefix_delete: bool,
}

impl Default for InMemoryDurableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self {
            store: Arc::new(Store::new()),
            supports_prefix_delete: false,
        }
    }

    pub fn with_prefix_delete(mut self) -> Self {
        self.supports_prefix_delete = true;
        self
    }

    pub fn set_available(&self, available: bool) {
        self.store.available.store(available, Ordering::Release);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.store.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.entries.is_empty()
    }
}

#[async_trait]
impl DurableCacheStore for InMemoryDurableStore {
    async fn get_entry(&self, key: &str, now: DateTime<Utc>) -> CacheResult<Option<CacheEntry>> {
        self.store.ensure_available("in-memory durable store")?;
        Ok(self.store.get(key, now))
    }

    async fn put_entry(&self, entry: &CacheEntry) -> CacheResult<()> {
        self.store.ensure_available("in-memory durable store")?;
        self.store.entries.insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    async fn delete_entry(&self, key: &str) -> CacheResult<bool> {
        self.store.ensure_available("in-memory durable store")?;
        Ok(self.store.entries.remove(key).is_some())
    }

    async fn delete_prefix(&self, prefix: &str) -> CacheResult<Option<u64>> {
        if !self.supports_prefix_delete {
            return Ok(None);
        }
        self.store.ensure_available("in-memory durable store")?;
        Ok(Some(self.store.delete_prefix(prefix)))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> CacheResult<u64> {
        self.store.ensure_available("in-memory durable store")?;
        let before = self.store.entries.len();
        self.store.entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before.saturating_sub(self.store.entries.len()) as u64)
    }

    async fn health_check(&self) -> CacheResult<bool> {
        Ok(self.store.available.load(Ordering::Acquire))
    }

    fn provider_name(&self) -> &'static str {
        "in_memory_durable"
    }
}

//! In-process cache tier.
//!
//! A bounded map guarded by a `parking_lot::RwLock`. Expired entries are
//! dropped lazily on read and eagerly when capacity is needed. When the map is
//! full after purging, the entries closest to expiry are evicted first.

use crate::models::CacheEntry;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug)]
pub struct MemoryTier {
    entries: RwLock<HashMap<String, CacheEntry>>,
    limit: usize,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl MemoryTier {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            limit: limit.max(1),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => return Some(entry.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: re-check under the write lock, a concurrent set may have refreshed it
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    /// Store an entry, making room first so the new entry is never the one evicted
    pub fn insert(&self, entry: CacheEntry, now: DateTime<Utc>) {
        let mut entries = self.entries.write();
        if !entries.contains_key(&entry.key) && entries.len() >= self.limit {
            self.make_room(&mut entries, self.limit - 1, now);
        }
        entries.insert(entry.key.clone(), entry);
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Remove every entry whose key starts with `prefix`
    pub fn remove_prefix(&self, prefix: &str) -> u64 {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        (before - entries.len()) as u64
    }

    pub fn purge_expired(&self, now: DateTime<Utc>) -> u64 {
        let mut entries = self.entries.write();
        self.purge_locked(&mut entries, now)
    }

    /// Purge expired entries, then evict nearest-expiry entries down to the limit
    pub fn enforce_limit(&self, now: DateTime<Utc>) -> u64 {
        let mut entries = self.entries.write();
        self.make_room(&mut entries, self.limit, now)
    }

    /// Release spare map capacity after large purges
    pub fn shrink_to_fit(&self) {
        self.entries.write().shrink_to_fit();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    fn purge_locked(&self, entries: &mut HashMap<String, CacheEntry>, now: DateTime<Utc>) -> u64 {
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let purged = (before - entries.len()) as u64;
        self.expirations.fetch_add(purged, Ordering::Relaxed);
        purged
    }

    fn make_room(
        &self,
        entries: &mut HashMap<String, CacheEntry>,
        target: usize,
        now: DateTime<Utc>,
    ) -> u64 {
        let mut removed = self.purge_locked(entries, now);
        if entries.len() <= target {
            return removed;
        }

        let excess = entries.len() - target;
        let mut by_expiry: Vec<(DateTime<Utc>, String)> = entries
            .iter()
            .map(|(key, entry)| (entry.ttl_expiry, key.clone()))
            .collect();
        by_expiry.sort_unstable();

        for (_, key) in by_expiry.into_iter().take(excess) {
            entries.remove(&key);
        }
        self.evictions.fetch_add(excess as u64, Ordering::Relaxed);
        removed += excess as u64;

        debug!(evicted = excess, remaining = entries.len(), "Memory tier evicted entries nearest expiry");
        removed
    }
}

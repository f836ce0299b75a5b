use crate::clock::{remaining_until, to_chrono};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// A serialized value stored under a composed cache key
///
/// The payload is wrapped in `Arc` so hits and tier promotion share one buffer
/// instead of copying up to the value-size cap on every read.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: Arc<Vec<u8>>,
    /// Absolute expiry shared by every tier holding this entry
    pub ttl_expiry: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Create an entry expiring `ttl` after `now`
    pub fn new(key: impl Into<String>, value: Vec<u8>, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            value: Arc::new(value),
            ttl_expiry: now + to_chrono(ttl),
            created_at: now,
        }
    }

    /// Rebuild an entry read back from a remote tier
    pub fn restore(
        key: impl Into<String>,
        value: Vec<u8>,
        ttl_expiry: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key: key.into(),
            value: Arc::new(value),
            ttl_expiry,
            created_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.ttl_expiry
    }

    /// Time left before expiry, `None` once expired
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> Option<Duration> {
        remaining_until(self.ttl_expiry, now)
    }

    /// Serialized payload size in bytes
    pub fn size(&self) -> usize {
        self.value.len()
    }

    /// Expiry as unix seconds (the durable ledger's `ttl` column)
    ///
    /// Rounded up, so a sub-second remainder never makes the stored row
    /// expire before the entry itself.
    pub fn expiry_unix_seconds(&self) -> i64 {
        let seconds = self.ttl_expiry.timestamp();
        if self.ttl_expiry.timestamp_subsec_nanos() > 0 {
            seconds + 1
        } else {
            seconds
        }
    }
}

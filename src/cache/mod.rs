//! # Multi-Tier Cache
//!
//! [`MultiTierCache`] composes a bounded in-process [`MemoryTier`], an optional
//! shared [`FastTier`] behind a circuit breaker, and an optional
//! [`DurableCacheStore`].

pub mod errors;
pub mod keys;
pub mod manager;
pub mod memory;
pub mod provider;
pub mod providers;
pub mod traits;

pub use errors::{CacheError, CacheResult};
pub use keys::CacheKey;
pub use manager::{CacheHealth, CacheStats, EvictionReport, MultiTierCache, TierAvailability};
pub use memory::MemoryTier;
pub use provider::FastTierProvider;
pub use providers::{InMemoryDurableStore, InMemoryFastTier};
pub use traits::{DurableCacheStore, FastTier};

#[cfg(feature = "cache-redis")]
pub use providers::RedisFastTier;

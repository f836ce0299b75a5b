//! Shared fixtures for integration tests
#![allow(dead_code)]

pub mod strategies;

use perf_core::cache::{FastTierProvider, InMemoryDurableStore, InMemoryFastTier, MultiTierCache};
use perf_core::clock::ManualClock;
use perf_core::config::{CacheConfig, CircuitBreakerConfig, PerformanceConfig};
use std::sync::Arc;
use tracing::Level;

/// Install a test subscriber once; later calls are no-ops
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A cache wired to all three tiers, with handles to the in-memory doubles
pub struct TieredCache {
    pub clock: ManualClock,
    pub cache: MultiTierCache,
    pub fast: InMemoryFastTier,
    pub durable: InMemoryDurableStore,
}

pub fn tiered_cache(config: CacheConfig) -> TieredCache {
    tiered_cache_with(config, InMemoryDurableStore::new())
}

pub fn tiered_cache_with(config: CacheConfig, durable: InMemoryDurableStore) -> TieredCache {
    let clock = ManualClock::starting_now();
    let fast = InMemoryFastTier::new(clock.shared());
    let provider = FastTierProvider::new(
        Arc::new(fast.clone()),
        Some(&CircuitBreakerConfig::for_cache_tier()),
        clock.shared(),
    );
    let cache = MultiTierCache::new(&config, clock.shared())
        .with_fast_tier(provider)
        .with_durable_store(Arc::new(durable.clone()));

    TieredCache {
        clock,
        cache,
        fast,
        durable,
    }
}

/// Configuration suitable for in-process tests
pub fn test_config() -> PerformanceConfig {
    PerformanceConfig {
        environment: "test".to_string(),
        ..Default::default()
    }
}

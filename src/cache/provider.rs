//! Fast tier provider with integrated circuit breaker.
//!
//! Consumers hold a `FastTierProvider` and get fail-fast behavior when the
//! shared tier is unavailable: while the breaker is open every call returns
//! [`CacheError::Unavailable`] without touching the network.

use super::errors::{CacheError, CacheResult};
use super::traits::FastTier;
use crate::clock::SharedClock;
use crate::config::{CacheConfig, CircuitBreakerConfig};
use crate::models::CacheEntry;
use crate::resilience::{CircuitBreaker, CircuitState};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct FastTierProvider {
    tier: Arc<dyn FastTier>,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
}

impl std::fmt::Debug for FastTierProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastTierProvider")
            .field("tier", &self.tier.provider_name())
            .field(
                "circuit_breaker",
                &self.circuit_breaker.as_ref().map(|cb| cb.state()),
            )
            .finish()
    }
}

impl FastTierProvider {
    /// Wrap a tier, optionally guarded by a breaker
    pub fn new(
        tier: Arc<dyn FastTier>,
        cb_config: Option<&CircuitBreakerConfig>,
        clock: SharedClock,
    ) -> Self {
        let circuit_breaker = cb_config.filter(|cfg| cfg.enabled).map(|cfg| {
            Arc::new(CircuitBreaker::new(
                format!("cache_{}", tier.provider_name()),
                cfg.clone(),
                clock,
            ))
        });
        Self {
            tier,
            circuit_breaker,
        }
    }

    /// Build the configured shared tier, or `None` when absent or unreachable
    ///
    /// Startup never fails because of the fast tier; a failed connection is
    /// logged and the cache runs with its remaining tiers.
    pub async fn from_config_graceful(
        config: &CacheConfig,
        cb_config: &CircuitBreakerConfig,
        clock: SharedClock,
    ) -> Option<Self> {
        let url = config.redis_url.as_deref().filter(|url| !url.is_empty())?;
        Self::connect_redis(url, cb_config, clock).await
    }

    #[cfg(feature = "cache-redis")]
    async fn connect_redis(
        url: &str,
        cb_config: &CircuitBreakerConfig,
        clock: SharedClock,
    ) -> Option<Self> {
        match super::providers::RedisFastTier::connect(url, clock.clone()).await {
            Ok(tier) => {
                info!(backend = "redis", "Shared fast cache tier initialized successfully");
                Some(Self::new(Arc::new(tier), Some(cb_config), clock))
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to connect to Redis, continuing without fast tier (graceful degradation)"
                );
                None
            }
        }
    }

    #[cfg(not(feature = "cache-redis"))]
    async fn connect_redis(
        _url: &str,
        _cb_config: &CircuitBreakerConfig,
        _clock: SharedClock,
    ) -> Option<Self> {
        warn!("Redis URL configured but 'cache-redis' feature not enabled, continuing without fast tier");
        None
    }

    pub fn provider_name(&self) -> &'static str {
        self.tier.provider_name()
    }

    /// Current breaker state, `None` when unguarded
    pub fn circuit_state(&self) -> Option<CircuitState> {
        self.circuit_breaker.as_ref().map(|cb| cb.state())
    }

    pub fn circuit_breaker(&self) -> Option<&Arc<CircuitBreaker>> {
        self.circuit_breaker.as_ref()
    }

    async fn guarded<T, Fut>(&self, operation: &str, call: Fut) -> CacheResult<T>
    where
        Fut: Future<Output = CacheResult<T>>,
    {
        let Some(cb) = &self.circuit_breaker else {
            return call.await;
        };

        if !cb.should_allow() {
            debug!(operation = operation, "Fast tier circuit open, skipping");
            return Err(CacheError::Unavailable(format!(
                "circuit open for {}",
                cb.name()
            )));
        }

        let start = Instant::now();
        let result = call.await;
        match &result {
            Ok(_) => cb.record_success(start.elapsed()),
            Err(_) => cb.record_failure(start.elapsed()),
        }
        result
    }

    pub async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        self.guarded("get", self.tier.get(key)).await
    }

    pub async fn set(&self, entry: &CacheEntry) -> CacheResult<()> {
        self.guarded("set", self.tier.set(entry)).await
    }

    pub async fn delete(&self, key: &str) -> CacheResult<bool> {
        self.guarded("delete", self.tier.delete(key)).await
    }

    pub async fn delete_prefix(&self, prefix: &str) -> CacheResult<Option<u64>> {
        self.guarded("delete_prefix", self.tier.delete_prefix(prefix))
            .await
    }

    /// Health probe; bypasses the breaker so recovery is still observable
    pub async fn health_check(&self) -> bool {
        match self.tier.health_check().await {
            Ok(healthy) => healthy,
            Err(e) => {
                debug!(error = %e, "Fast tier health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::providers::InMemoryFastTier;
    use crate::clock::{Clock, ManualClock};
    use std::time::Duration;

    #[tokio::test]
    async fn test_breaker_opens_and_short_circuits() {
        let clock = ManualClock::starting_now();
        let tier = InMemoryFastTier::new(clock.shared());
        let cb_config = CircuitBreakerConfig {
            enabled: true,
            failure_threshold: 2,
            timeout_seconds: 5,
            success_threshold: 1,
        };
        let provider = FastTierProvider::new(Arc::new(tier.clone()), Some(&cb_config), clock.shared());

        tier.set_available(false);
        assert!(provider.get("k").await.is_err());
        assert!(provider.get("k").await.is_err());
        assert_eq!(provider.circuit_state(), Some(CircuitState::Open));

        // Backend is back, but the breaker still fails fast until the timeout
        tier.set_available(true);
        assert!(matches!(
            provider.get("k").await,
            Err(CacheError::Unavailable(_))
        ));

        clock.advance(Duration::from_secs(5));
        assert_eq!(provider.get("k").await.unwrap(), None);
        assert_eq!(provider.circuit_state(), Some(CircuitState::Closed));
    }

    #[tokio::test]
    async fn test_unguarded_provider_passes_through() {
        let clock = ManualClock::starting_now();
        let tier = InMemoryFastTier::new(clock.shared());
        let provider = FastTierProvider::new(Arc::new(tier), None, clock.shared());
        assert_eq!(provider.circuit_state(), None);

        let entry = CacheEntry::new("k", b"v".to_vec(), Duration::from_secs(5), clock.now());
        provider.set(&entry).await.unwrap();
        assert!(provider.get("k").await.unwrap().is_some());
        assert!(provider.health_check().await);
    }
}

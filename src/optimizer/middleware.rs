//! Higher-order wrappers for handlers: cache-aside with an explicit policy,
//! and request timing.

use super::coordinator::PerformanceOptimizer;
use crate::cache::MultiTierCache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::debug;

/// Where and for how long a handler's result is cached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub prefix: String,
    pub key: String,
    /// `None` uses the cache's default TTL
    pub ttl: Option<Duration>,
    pub user_id: Option<String>,
}

impl CachePolicy {
    pub fn new(prefix: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            key: key.into(),
            ttl: None,
            user_id: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Serve `handler`'s result from `cache` when present, otherwise run it and
/// store a successful result
///
/// Errors from the handler pass through uncached. Cache failures never
/// surface; at worst the handler runs.
pub async fn cached<T, E, F, Fut>(cache: &MultiTierCache, policy: &CachePolicy, handler: F) -> Result<T, E>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let user_id = policy.user_id.as_deref();
    if let Some(hit) = cache.get::<T>(&policy.prefix, &policy.key, user_id).await {
        debug!(prefix = %policy.prefix, key = %policy.key, "⚡ Served from cache");
        return Ok(hit);
    }

    let value = handler().await?;
    let ttl = policy.ttl.unwrap_or_else(|| cache.default_ttl());
    cache
        .set(&policy.prefix, &policy.key, &value, ttl, user_id)
        .await;
    Ok(value)
}

impl PerformanceOptimizer {
    /// [`cached`] over this optimizer's cache; runs `handler` directly when
    /// caching is disabled
    pub async fn cached<T, E, F, Fut>(&self, policy: &CachePolicy, handler: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.cache() {
            Some(cache) => cached(cache, policy, handler).await,
            None => handler().await,
        }
    }

    /// Run `handler` and record its duration and outcome against `endpoint`
    pub async fn timed<T, E, Fut>(&self, endpoint: &str, handler: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let result = handler.await;
        self.record_request(endpoint, started.elapsed(), result.is_ok());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{CacheConfig, PerformanceConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_cached_runs_handler_once() {
        let clock = ManualClock::starting_now();
        let cache = MultiTierCache::new(&CacheConfig::default(), clock.shared());
        let calls = AtomicUsize::new(0);
        let policy = CachePolicy::new("quiz", "q-1")
            .for_user("u1")
            .with_ttl(Duration::from_secs(60));

        for _ in 0..3 {
            let value: Result<Vec<String>, String> = cached(&cache, &policy, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec!["what is 2+2?".to_string()])
            })
            .await;
            assert_eq!(value.unwrap().len(), 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(61));
        let _: Result<Vec<String>, String> = cached(&cache, &policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_handler_errors_are_not_cached() {
        let cache = MultiTierCache::new(&CacheConfig::default(), ManualClock::starting_now().shared());
        let policy = CachePolicy::new("p", "k");

        let failed: Result<u32, &str> = cached(&cache, &policy, || async { Err("upstream down") }).await;
        assert_eq!(failed, Err("upstream down"));

        let ok: Result<u32, &str> = cached(&cache, &policy, || async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));
    }

    #[tokio::test]
    async fn test_timed_records_outcome() {
        let optimizer = PerformanceOptimizer::builder(PerformanceConfig::default())
            .clock(ManualClock::starting_now().shared())
            .build()
            .unwrap();

        let _ = optimizer.timed("/ok", async { Ok::<_, String>(1) }).await;
        let _ = optimizer.timed("/err", async { Err::<u8, _>("x".to_string()) }).await;

        let report = optimizer.performance_report();
        assert_eq!(report.total_requests, 2);
        assert_eq!(
            report.endpoints.iter().find(|e| e.endpoint == "/err").map(|e| e.errors),
            Some(1)
        );
    }
}

//! # Client Pool
//!
//! One live client per service name, reused until it is older than the reuse
//! TTL and then replaced wholesale. Construction for a given service is
//! serialized behind a per-service async mutex, so concurrent callers share a
//! single handle instead of racing to build two.
//!
//! Each external service category (document store, inference endpoint, ...)
//! gets its own `ClientPool`; pools share nothing.

pub mod errors;

use crate::clock::SharedClock;
use crate::models::ClientHandle;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

pub use errors::{PoolError, PoolResult};

/// Builds a client for a service name
#[async_trait]
pub trait ClientFactory<C>: Send + Sync {
    async fn create(&self, service_name: &str) -> anyhow::Result<C>;
}

#[async_trait]
impl<C, F, Fut> ClientFactory<C> for F
where
    C: Send + 'static,
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<C>> + Send,
{
    async fn create(&self, service_name: &str) -> anyhow::Result<C> {
        (self)(service_name.to_string()).await
    }
}

type Slot<C> = Arc<Mutex<Option<ClientHandle<C>>>>;

#[derive(Debug, Default)]
struct PoolCounters {
    created: AtomicU64,
    reused: AtomicU64,
    expired: AtomicU64,
    failures: AtomicU64,
}

/// Pool statistics for health reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub category: String,
    pub live_clients: usize,
    pub created: u64,
    pub reused: u64,
    pub expired: u64,
    pub failures: u64,
    pub reuse_ttl_seconds: u64,
}

pub struct ClientPool<C> {
    category: String,
    slots: DashMap<String, Slot<C>>,
    factory: Arc<dyn ClientFactory<C>>,
    reuse_ttl: Duration,
    clock: SharedClock,
    counters: PoolCounters,
}

impl<C> std::fmt::Debug for ClientPool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPool")
            .field("category", &self.category)
            .field("services", &self.slots.len())
            .field("reuse_ttl", &self.reuse_ttl)
            .finish()
    }
}

impl<C: Send + Sync + 'static> ClientPool<C> {
    pub fn new(
        category: impl Into<String>,
        factory: impl ClientFactory<C> + 'static,
        reuse_ttl: Duration,
        clock: SharedClock,
    ) -> Self {
        let category = category.into();
        info!(
            category = %category,
            reuse_ttl_seconds = reuse_ttl.as_secs(),
            "Client pool initialized"
        );
        Self {
            category,
            slots: DashMap::new(),
            factory: Arc::new(factory),
            reuse_ttl,
            clock,
            counters: PoolCounters::default(),
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Current client for `service_name`, building a fresh one if absent or expired
    pub async fn get_client(&self, service_name: &str) -> PoolResult<Arc<C>> {
        if service_name.is_empty() {
            return Err(PoolError::InvalidServiceName(service_name.to_string()));
        }

        let mut guard = self.locked_slot(service_name).await;
        let now = self.clock.now();

        if let Some(handle) = guard.as_ref() {
            if !handle.is_expired(now, self.reuse_ttl) {
                self.counters.reused.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(&handle.handle));
            }
            debug!(
                category = %self.category,
                service = service_name,
                age_seconds = handle.age(now).as_secs(),
                "Pooled client expired, replacing"
            );
            self.counters.expired.fetch_add(1, Ordering::Relaxed);
        }

        let client = match self.factory.create(service_name).await {
            Ok(client) => client,
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!(category = %self.category, service = service_name, error = %e, "Client creation failed");
                return Err(PoolError::client_creation(service_name, e.to_string()));
            }
        };

        let handle = ClientHandle::new(service_name, client, self.clock.now());
        let shared = Arc::clone(&handle.handle);
        *guard = Some(handle);
        self.counters.created.fetch_add(1, Ordering::Relaxed);

        debug!(category = %self.category, service = service_name, "Pooled client created");
        Ok(shared)
    }

    /// Locked slot for `service_name`
    ///
    /// Cleanup may unlink an empty slot between lookup and lock, so the slot
    /// is re-checked against the map while its lock is held.
    async fn locked_slot(&self, service_name: &str) -> OwnedMutexGuard<Option<ClientHandle<C>>> {
        loop {
            let slot = self
                .slots
                .entry(service_name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(None)))
                .clone();

            let guard = Arc::clone(&slot).lock_owned().await;
            let current = self
                .slots
                .get(service_name)
                .is_some_and(|registered| Arc::ptr_eq(registered.value(), &slot));

            if current {
                return guard;
            }
            debug!(category = %self.category, service = service_name, "Pool slot unlinked during lookup, retrying");
        }
    }

    /// Drop handles older than the reuse TTL without rebuilding them
    ///
    /// Slots currently locked by a `get_client` call are skipped.
    pub fn cleanup_expired_clients(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;

        for slot in self.slots.iter() {
            let Ok(mut guard) = slot.value().try_lock() else {
                continue;
            };
            if guard
                .as_ref()
                .is_some_and(|handle| handle.is_expired(now, self.reuse_ttl))
            {
                *guard = None;
                removed += 1;
            }
        }

        self.slots.retain(|_, slot| match slot.try_lock() {
            Ok(guard) => guard.is_some(),
            Err(_) => true,
        });

        if removed > 0 {
            self.counters
                .expired
                .fetch_add(removed as u64, Ordering::Relaxed);
            info!(category = %self.category, removed = removed, "Expired pooled clients dropped");
        }
        removed
    }

    pub fn live_clients(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| match slot.value().try_lock() {
                Ok(guard) => guard.is_some(),
                Err(_) => true,
            })
            .count()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            category: self.category.clone(),
            live_clients: self.live_clients(),
            created: self.counters.created.load(Ordering::Relaxed),
            reused: self.counters.reused.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            reuse_ttl_seconds: self.reuse_ttl.as_secs(),
        }
    }
}

/// Type-erased view of a pool for maintenance and health reporting
pub trait PoolMaintenance: Send + Sync + std::fmt::Debug {
    fn category(&self) -> &str;
    fn cleanup(&self) -> usize;
    fn stats(&self) -> PoolStats;
}

impl<C: Send + Sync + 'static> PoolMaintenance for ClientPool<C> {
    fn category(&self) -> &str {
        ClientPool::category(self)
    }

    fn cleanup(&self) -> usize {
        self.cleanup_expired_clients()
    }

    fn stats(&self) -> PoolStats {
        ClientPool::stats(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug)]
    struct FakeClient {
        serial: usize,
    }

    fn counting_pool(clock: &ManualClock) -> (ClientPool<FakeClient>, Arc<AtomicUsize>) {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let factory = move |_service: String| {
            let counter = Arc::clone(&counter);
            async move {
                let serial = counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(FakeClient { serial })
            }
        };
        let pool = ClientPool::new("documents", factory, Duration::from_secs(300), clock.shared());
        (pool, built)
    }

    #[tokio::test]
    async fn test_reuse_within_ttl() {
        let clock = ManualClock::starting_now();
        let (pool, built) = counting_pool(&clock);

        let a = pool.get_client("storage").await.unwrap();
        let b = pool.get_client("storage").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert_eq!(pool.stats().reused, 1);
    }

    #[tokio::test]
    async fn test_replaced_after_ttl() {
        let clock = ManualClock::starting_now();
        let (pool, _built) = counting_pool(&clock);

        let a = pool.get_client("storage").await.unwrap();
        clock.advance(Duration::from_secs(300));
        let b = pool.get_client("storage").await.unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(b.serial, 1);
    }

    #[tokio::test]
    async fn test_cleanup_drops_without_recreating() {
        let clock = ManualClock::starting_now();
        let (pool, built) = counting_pool(&clock);

        pool.get_client("storage").await.unwrap();
        pool.get_client("inference").await.unwrap();
        clock.advance(Duration::from_secs(301));

        assert_eq!(pool.cleanup_expired_clients(), 2);
        assert_eq!(pool.live_clients(), 0);
        assert_eq!(built.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_factory_failure_is_reported() {
        let clock = ManualClock::starting_now();
        let factory = |service: String| async move {
            Err::<FakeClient, _>(anyhow::anyhow!("{service} refused connection"))
        };
        let pool = ClientPool::new("inference", factory, Duration::from_secs(60), clock.shared());

        let err = pool.get_client("model").await.unwrap_err();
        assert!(matches!(err, PoolError::ClientCreation { .. }));
        assert_eq!(pool.stats().failures, 1);
        assert!(matches!(
            pool.get_client("").await,
            Err(PoolError::InvalidServiceName(_))
        ));
    }
}

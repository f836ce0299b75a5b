//! # Performance Optimizer
//!
//! Request-scoped entry point over the cache, client pools, task manager and
//! background queue, plus the periodic maintenance sweep.
//!
//! ## Bootstrap
//!
//! [`PerformanceOptimizer::from_config`] wires every component from
//! [`PerformanceConfig`] and degrades instead of failing: an unreachable
//! database leaves the cache memory-only, the task manager without a ledger,
//! and the background queue on an in-process transport. Tests and embedders
//! assemble components themselves through [`PerformanceOptimizer::builder`].
//!
//! ```rust,no_run
//! use perf_core::config::PerformanceConfig;
//! use perf_core::optimizer::PerformanceOptimizer;
//! use perf_core::queue::HandlerRegistry;
//!
//! # async fn example() -> perf_core::error::PerfResult<()> {
//! let config = PerformanceConfig::from_env()?;
//! let optimizer = PerformanceOptimizer::from_config(config, HandlerRegistry::builder().build()).await?;
//!
//! if optimizer.optimize_request("req-1", "/files", Some("u1"), Some("doc1")).await.is_none() {
//!     let response = serde_json::json!({"name": "a.pdf"});
//!     optimizer.cache_response("req-1", "doc1", &response, Some("u1"), None).await;
//! }
//! # Ok(())
//! # }
//! ```

use super::metrics::{PerformanceReport, RequestMetrics};
use crate::cache::{CacheHealth, EvictionReport, FastTierProvider, MultiTierCache};
use crate::clock::{system_clock, SharedClock};
use crate::config::PerformanceConfig;
use crate::constants::{cache_prefixes, components, HealthStatus};
use crate::database::PostgresStore;
use crate::error::PerfResult;
use crate::pool::{PoolMaintenance, PoolStats};
use crate::queue::{
    BackgroundTaskQueue, HandlerRegistry, InMemoryMessageQueue, MessageId, MessageQueueService,
    PgmqMessageQueue, QueueStats,
};
use crate::tasks::{AsyncTaskManager, TaskContext, TaskManagerHealth};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct QueueHealth {
    pub healthy: bool,
    pub stats: QueueStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub cache: Option<CacheHealth>,
    pub client_pools: Vec<PoolStats>,
    pub task_manager: Option<TaskManagerHealth>,
    pub background_queue: Option<QueueHealth>,
}

/// Aggregated health; thresholds are not consulted
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checked_at: DateTime<Utc>,
    pub components: ComponentHealth,
}

impl HealthReport {
    /// `{status, components: {...}}` keyed by component name
    pub fn to_json(&self) -> serde_json::Value {
        let mut components = serde_json::Map::new();
        if let Some(cache) = &self.components.cache {
            components.insert(components::CACHE.into(), serde_json::json!(cache));
        }
        components.insert(
            components::CLIENT_POOLS.into(),
            serde_json::json!(self.components.client_pools),
        );
        if let Some(tasks) = &self.components.task_manager {
            components.insert(components::TASK_MANAGER.into(), serde_json::json!(tasks));
        }
        if let Some(queue) = &self.components.background_queue {
            components.insert(components::BACKGROUND_QUEUE.into(), serde_json::json!(queue));
        }

        serde_json::json!({
            "status": self.status,
            "checked_at": self.checked_at,
            "components": components,
        })
    }
}

/// Outcome of one maintenance sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MaintenanceReport {
    pub cache: Option<EvictionReport>,
    pub cache_size_after: Option<usize>,
    pub clients_removed: usize,
    pub tasks_purged: usize,
    pub ledger_purged: u64,
    pub duration_ms: u64,
}

pub struct PerformanceOptimizer {
    config: PerformanceConfig,
    clock: SharedClock,
    cache: Option<Arc<MultiTierCache>>,
    task_manager: Option<AsyncTaskManager>,
    background: Option<BackgroundTaskQueue>,
    pools: RwLock<Vec<Arc<dyn PoolMaintenance>>>,
    metrics: RequestMetrics,
    shutdown_tx: watch::Sender<bool>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for PerformanceOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceOptimizer")
            .field("environment", &self.config.environment)
            .field("caching", &self.cache.is_some())
            .field("async_tasks", &self.task_manager.is_some())
            .field("background_tasks", &self.background.is_some())
            .field("pools", &self.pools.read().len())
            .finish()
    }
}

/// Assembles a [`PerformanceOptimizer`] from caller-supplied components
///
/// Components left unset are created memory-only when their enable flag is
/// on. The background queue has no default; without one it stays disabled.
pub struct OptimizerBuilder {
    config: PerformanceConfig,
    clock: Option<SharedClock>,
    cache: Option<MultiTierCache>,
    task_manager: Option<AsyncTaskManager>,
    background: Option<BackgroundTaskQueue>,
    pools: Vec<Arc<dyn PoolMaintenance>>,
}

impl OptimizerBuilder {
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn cache(mut self, cache: MultiTierCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn task_manager(mut self, manager: AsyncTaskManager) -> Self {
        self.task_manager = Some(manager);
        self
    }

    pub fn background_queue(mut self, queue: BackgroundTaskQueue) -> Self {
        self.background = Some(queue);
        self
    }

    pub fn pool(mut self, pool: Arc<dyn PoolMaintenance>) -> Self {
        self.pools.push(pool);
        self
    }

    pub fn build(self) -> PerfResult<PerformanceOptimizer> {
        self.config.validate()?;
        let clock = self.clock.unwrap_or_else(system_clock);
        let config = self.config;

        let cache = config.enable_caching.then(|| {
            Arc::new(
                self.cache
                    .unwrap_or_else(|| MultiTierCache::new(&config.cache, clock.clone())),
            )
        });
        let task_manager = config.enable_async_tasks.then(|| {
            self.task_manager
                .unwrap_or_else(|| AsyncTaskManager::new(config.tasks.clone(), clock.clone()))
        });
        let background = if config.enable_background_tasks {
            self.background
        } else {
            None
        };
        let pools = if config.enable_client_pooling {
            self.pools
        } else {
            Vec::new()
        };

        let (shutdown_tx, _) = watch::channel(false);
        let optimizer = PerformanceOptimizer {
            config,
            clock,
            cache,
            task_manager,
            background,
            pools: RwLock::new(pools),
            metrics: RequestMetrics::new(),
            shutdown_tx,
            loops: Mutex::new(Vec::new()),
        };
        info!(optimizer = ?optimizer, "✅ Performance optimizer initialized");
        Ok(optimizer)
    }
}

impl PerformanceOptimizer {
    pub fn builder(config: PerformanceConfig) -> OptimizerBuilder {
        OptimizerBuilder {
            config,
            clock: None,
            cache: None,
            task_manager: None,
            background: None,
            pools: Vec::new(),
        }
    }

    /// Wire every enabled component from configuration
    ///
    /// Only invalid configuration is an error; unreachable backends are
    /// logged and the affected component runs degraded. Installs the crate's
    /// `tracing` subscriber unless the host already set one.
    pub async fn from_config(config: PerformanceConfig, registry: HandlerRegistry) -> PerfResult<Self> {
        crate::logging::init_structured_logging();
        config.validate()?;
        let clock = system_clock();
        info!(environment = %config.environment, "🚀 Bootstrapping performance optimizer");

        let store = Self::connect_store(&config, clock.clone()).await;
        let mut builder = Self::builder(config.clone()).clock(clock.clone());

        if config.enable_caching {
            let mut cache = MultiTierCache::new(&config.cache, clock.clone());
            if let Some(fast) =
                FastTierProvider::from_config_graceful(&config.cache, &config.circuit_breaker, clock.clone())
                    .await
            {
                cache = cache.with_fast_tier(fast);
            }
            if let (true, Some(store)) = (config.cache.enable_durable_tier, &store) {
                cache = cache.with_durable_store(store.clone());
            }
            builder = builder.cache(cache);
        }

        if config.enable_async_tasks {
            let manager = match &store {
                Some(store) => {
                    AsyncTaskManager::with_ledger(config.tasks.clone(), store.clone(), clock.clone())
                }
                None => AsyncTaskManager::new(config.tasks.clone(), clock.clone()),
            };
            builder = builder.task_manager(manager);
        }

        if config.enable_background_tasks {
            let transport: Arc<dyn MessageQueueService> = match &store {
                Some(store) => Arc::new(PgmqMessageQueue::new_with_pool(store.pool().clone()).await),
                None => {
                    warn!("⚠️ No database for the background queue; using a process-local queue");
                    Arc::new(InMemoryMessageQueue::new(clock.clone()))
                }
            };
            builder = builder.background_queue(BackgroundTaskQueue::new(
                transport,
                registry,
                config.queue.clone(),
                clock.clone(),
            ));
        }

        builder.build()
    }

    async fn connect_store(config: &PerformanceConfig, clock: SharedClock) -> Option<Arc<PostgresStore>> {
        if config.database.resolved_url().is_none() {
            info!("No database configured; durable tier, task ledger and pgmq disabled");
            return None;
        }

        let store = match PostgresStore::connect(&config.database, clock).await {
            Ok(store) => store,
            Err(e) => {
                warn!(error = %e, "⚠️ Database unreachable, continuing without durable components");
                return None;
            }
        };
        if let Err(e) = store.ensure_schema().await {
            warn!(error = %e, "⚠️ Durable schema setup failed, continuing without durable components");
            return None;
        }
        Some(Arc::new(store))
    }

    pub fn config(&self) -> &PerformanceConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&Arc<MultiTierCache>> {
        self.cache.as_ref()
    }

    pub fn task_manager(&self) -> Option<&AsyncTaskManager> {
        self.task_manager.as_ref()
    }

    pub fn background_queue(&self) -> Option<&BackgroundTaskQueue> {
        self.background.as_ref()
    }

    pub fn metrics(&self) -> &RequestMetrics {
        &self.metrics
    }

    /// Cache-aside read for a request
    ///
    /// `None` means the caller should run the real handler and then call
    /// [`Self::cache_response`].
    pub async fn optimize_request(
        &self,
        request_id: &str,
        endpoint: &str,
        user_id: Option<&str>,
        cache_key: Option<&str>,
    ) -> Option<serde_json::Value> {
        let cache = self.cache.as_ref()?;
        let cache_key = cache_key?;

        let cached = cache
            .get::<serde_json::Value>(cache_prefixes::RESPONSE, cache_key, user_id)
            .await;
        debug!(
            request_id = %request_id,
            endpoint = %endpoint,
            hit = cached.is_some(),
            "🔎 Response cache lookup"
        );
        cached
    }

    /// Write a handler's response back to the cache; `ttl` defaults to the
    /// cache's configured default
    pub async fn cache_response<T: Serialize + ?Sized>(
        &self,
        request_id: &str,
        cache_key: &str,
        data: &T,
        user_id: Option<&str>,
        ttl: Option<Duration>,
    ) -> bool {
        let Some(cache) = &self.cache else {
            return false;
        };
        let ttl = ttl.unwrap_or_else(|| cache.default_ttl());
        let stored = cache
            .set(cache_prefixes::RESPONSE, cache_key, data, ttl, user_id)
            .await;
        debug!(request_id = %request_id, stored = stored, "💾 Response cached");
        stored
    }

    /// Pass-through to the task manager; `None` when async tasks are disabled
    pub async fn submit_async_task<F, Fut, T, E>(&self, task_type: &str, user_id: &str, task: F) -> Option<Uuid>
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Serialize + Send + 'static,
        E: Display + Send + 'static,
    {
        let Some(manager) = &self.task_manager else {
            debug!(task_type = %task_type, "Async tasks disabled; submission ignored");
            return None;
        };
        Some(manager.submit_task(task_type, user_id, task).await)
    }

    pub async fn submit_blocking_task<F, T, E>(&self, task_type: &str, user_id: &str, task: F) -> Option<Uuid>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Serialize + Send + 'static,
        E: Display + Send + 'static,
    {
        let manager = self.task_manager.as_ref()?;
        Some(manager.submit_blocking_task(task_type, user_id, task).await)
    }

    /// Pass-through to the background queue; `None` when disabled or refused
    pub async fn submit_background_task(
        &self,
        task_type: &str,
        user_id: &str,
        task_data: HashMap<String, serde_json::Value>,
        delay: Duration,
    ) -> Option<MessageId> {
        let Some(queue) = &self.background else {
            debug!(task_type = %task_type, "Background tasks disabled; submission ignored");
            return None;
        };
        queue.enqueue_task(task_type, user_id, task_data, delay).await
    }

    /// Track a client pool for maintenance and health reporting
    pub fn register_pool(&self, pool: Arc<dyn PoolMaintenance>) {
        if !self.config.enable_client_pooling {
            debug!(category = pool.category(), "Client pooling disabled; pool not tracked");
            return;
        }
        self.pools.write().push(pool);
    }

    pub fn record_request(&self, endpoint: &str, duration: Duration, success: bool) {
        self.metrics.record_request(endpoint, duration, success);
    }

    pub fn performance_report(&self) -> PerformanceReport {
        let cache_stats = self.cache.as_ref().map(|cache| cache.get_stats());
        let report = self.metrics.performance_report(
            &self.config.thresholds,
            cache_stats.as_ref(),
            self.clock.now(),
        );
        for breach in &report.breaches {
            warn!(
                metric = ?breach.metric,
                endpoint = breach.endpoint.as_deref(),
                observed = breach.observed,
                threshold = breach.threshold,
                "📉 Performance threshold exceeded"
            );
        }
        report
    }

    pub async fn health_check(&self) -> HealthReport {
        let cache = match &self.cache {
            Some(cache) => Some(cache.health().await),
            None => None,
        };
        let task_manager = match &self.task_manager {
            Some(manager) => Some(manager.health().await),
            None => None,
        };
        let background_queue = match &self.background {
            Some(queue) => Some(QueueHealth {
                healthy: queue.health_check().await,
                stats: queue.stats(),
            }),
            None => None,
        };
        let client_pools: Vec<PoolStats> = self.pools.read().iter().map(|pool| pool.stats()).collect();

        let cache_degraded = cache.as_ref().is_some_and(|health| {
            let tiers = health.tier_availability;
            tiers.fast == Some(false) || tiers.durable == Some(false)
        });
        let tasks_degraded = task_manager
            .as_ref()
            .is_some_and(|health| !health.healthy || health.ledger_healthy == Some(false));
        let queue_degraded = background_queue.as_ref().is_some_and(|health| !health.healthy);

        let status = if cache_degraded || tasks_degraded || queue_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            checked_at: self.clock.now(),
            components: ComponentHealth {
                cache,
                client_pools,
                task_manager,
                background_queue,
            },
        }
    }

    /// Maintenance sweep: cache eviction, pool cleanup and task GC
    pub async fn optimize_system_performance(&self) -> MaintenanceReport {
        let started = Instant::now();
        let mut report = MaintenanceReport::default();

        if let Some(cache) = &self.cache {
            report.cache = Some(cache.evict().await);
            report.cache_size_after = Some(cache.get_stats().size);
        }

        let pools: Vec<Arc<dyn PoolMaintenance>> = self.pools.read().clone();
        report.clients_removed = pools.iter().map(|pool| pool.cleanup()).sum();

        if let Some(manager) = &self.task_manager {
            report.tasks_purged = manager.cleanup_expired_tasks();
            report.ledger_purged = manager.purge_ledger().await;
        }

        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            cache = ?report.cache,
            clients_removed = report.clients_removed,
            tasks_purged = report.tasks_purged,
            ledger_purged = report.ledger_purged,
            duration_ms = report.duration_ms,
            "🧹 Maintenance sweep complete"
        );
        report
    }

    /// Run [`Self::optimize_system_performance`] every `interval` until shutdown
    pub fn spawn_maintenance(self: &Arc<Self>, interval: Duration) {
        let optimizer = Arc::clone(self);
        let mut shutdown = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        optimizer.optimize_system_performance().await;
                    }
                }
            }
            debug!("Maintenance loop stopped");
        });
        self.loops.lock().push(handle);
    }

    /// Start polling the background queue; no-op when it is disabled
    pub fn start_background_worker(&self) -> bool {
        let Some(queue) = &self.background else {
            return false;
        };
        let handle = queue.spawn_worker(self.shutdown_tx.subscribe());
        self.loops.lock().push(handle);
        true
    }

    /// Stop background loops and drain the task manager
    ///
    /// Returns `false` if tasks were still running when the configured
    /// shutdown timeout elapsed.
    pub async fn shutdown(&self) -> bool {
        info!("🛑 Performance optimizer shutting down");
        self.shutdown_tx.send_replace(true);

        let loops: Vec<JoinHandle<()>> = std::mem::take(&mut *self.loops.lock());
        for handle in loops {
            if let Err(e) = handle.await {
                warn!(error = %e, "⚠️ Background loop ended abnormally");
            }
        }

        match &self.task_manager {
            Some(manager) => manager.shutdown(self.config.tasks.shutdown_timeout()).await,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn optimizer(config: PerformanceConfig) -> PerformanceOptimizer {
        PerformanceOptimizer::builder(config)
            .clock(ManualClock::starting_now().shared())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_cache_aside_round_trip() {
        let optimizer = optimizer(PerformanceConfig::default());

        assert!(optimizer
            .optimize_request("r1", "/files", Some("u1"), Some("doc1"))
            .await
            .is_none());
        assert!(optimizer
            .cache_response("r1", "doc1", &serde_json::json!({"name": "a.pdf"}), Some("u1"), None)
            .await);
        assert_eq!(
            optimizer
                .optimize_request("r2", "/files", Some("u1"), Some("doc1"))
                .await,
            Some(serde_json::json!({"name": "a.pdf"}))
        );
        assert!(optimizer
            .optimize_request("r3", "/files", Some("u2"), Some("doc1"))
            .await
            .is_none());
        assert!(optimizer
            .optimize_request("r4", "/files", Some("u1"), None)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_disabled_components_are_inert() {
        let config = PerformanceConfig {
            enable_caching: false,
            enable_async_tasks: false,
            enable_background_tasks: false,
            ..Default::default()
        };
        let optimizer = optimizer(config);

        assert!(!optimizer
            .cache_response("r", "k", &1, None, None)
            .await);
        assert!(optimizer
            .submit_async_task("t", "u", |_ctx| async { Ok::<_, String>(()) })
            .await
            .is_none());
        assert!(optimizer
            .submit_background_task("t", "u", HashMap::new(), Duration::ZERO)
            .await
            .is_none());

        let health = optimizer.health_check().await;
        assert_eq!(health.status, HealthStatus::Healthy);
        let json = health.to_json();
        assert!(json["components"].get(components::CACHE).is_none());
        assert!(json["components"].get(components::CLIENT_POOLS).is_some());
    }

    #[tokio::test]
    async fn test_shutdown_stops_maintenance_loop() {
        let optimizer = Arc::new(optimizer(PerformanceConfig::default()));
        optimizer.spawn_maintenance(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(optimizer.shutdown().await);
        assert!(optimizer.loops.lock().is_empty());
    }
}

#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Perf Core
//!
//! Performance layer for the learning platform's request path: caching,
//! client reuse, fire-and-forget tasks and durable background work.
//!
//! ## Overview
//!
//! Every component here is an accelerator. Backend failures are logged and
//! absorbed at the public boundary: a cache lookup that cannot reach a tier
//! falls through to the next one, a task that fails is recorded as failed,
//! and a queue hand-off that is refused returns `None`. Business logic never
//! sees a new failure mode because of this crate.
//!
//! ## Module Organization
//!
//! - [`cache`] - Multi-tier cache (in-process, shared fast tier, durable store)
//! - [`pool`] - Reusable clients for external services with a reuse TTL
//! - [`tasks`] - Async task manager with a durable task ledger
//! - [`queue`] - Background task queue over pgmq with a handler registry
//! - [`optimizer`] - Coordinator, request metrics and cache-aside middleware
//! - [`database`] - Postgres-backed durable cache and task ledger
//! - [`resilience`] - Circuit breaker guarding the shared fast tier
//! - [`config`] - Layered configuration (defaults, TOML file, `PERF__*` env)
//! - [`logging`] - Structured `tracing` setup
//! - [`error`] - Crate-level error type
//!
//! ## Quick Start
//!
//! ```rust
//! use perf_core::cache::MultiTierCache;
//! use perf_core::clock::system_clock;
//! use perf_core::config::CacheConfig;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache = MultiTierCache::new(&CacheConfig::default(), system_clock());
//!
//! cache
//!     .set("files", "doc1", &serde_json::json!({"name": "a.pdf"}), Duration::from_secs(60), Some("u1"))
//!     .await;
//! let hit: Option<serde_json::Value> = cache.get("files", "doc1", Some("u1")).await;
//! assert_eq!(hit, Some(serde_json::json!({"name": "a.pdf"})));
//! # }
//! ```
//!
//! ## Testing
//!
//! Unit tests live beside the code; integration and property tests are under
//! `tests/`. Postgres, pgmq and Redis tests run only when `TEST_DATABASE_URL`
//! or `REDIS_URL` is set.

pub mod cache;
pub mod clock;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod optimizer;
pub mod pool;
pub mod queue;
pub mod resilience;
pub mod tasks;

pub use cache::MultiTierCache;
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{ConfigManager, PerformanceConfig};
pub use constants::HealthStatus;
pub use error::{PerfError, PerfResult};
pub use models::{AsyncTask, CacheEntry, ClientHandle, QueueMessage, TaskStatus};
pub use optimizer::{CachePolicy, PerformanceOptimizer};
pub use pool::ClientPool;
pub use queue::{BackgroundTaskQueue, HandlerOutcome, HandlerRegistry};
pub use tasks::AsyncTaskManager;

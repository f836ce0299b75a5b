//! # Resilience Module
//!
//! Circuit breaking for remote tiers. A tier whose breaker is open is treated
//! as unreachable: callers skip it instead of waiting on timeouts.
//!
//! ```rust
//! use perf_core::clock::system_clock;
//! use perf_core::config::CircuitBreakerConfig;
//! use perf_core::resilience::{CircuitBreaker, CircuitState};
//! use std::time::Duration;
//!
//! let breaker = CircuitBreaker::new("fast_tier", CircuitBreakerConfig::for_cache_tier(), system_clock());
//! if breaker.should_allow() {
//!     breaker.record_failure(Duration::from_millis(3));
//! }
//! assert_eq!(breaker.state(), CircuitState::Closed);
//! ```

pub mod circuit_breaker;
pub mod metrics;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use metrics::CircuitBreakerMetrics;

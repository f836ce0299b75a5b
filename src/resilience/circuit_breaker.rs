//! # Circuit Breaker Implementation
//!
//! Classic three-state breaker: Closed (normal operation), Open (failing fast)
//! and Half-Open (testing recovery). State and counters are atomics so the
//! cache hot path never takes a lock. Open-state timing reads the injected
//! [`Clock`](crate::clock::Clock).

use crate::clock::SharedClock;
use crate::config::CircuitBreakerConfig;
use crate::resilience::CircuitBreakerMetrics;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - limited calls allowed to test system health
    HalfOpen = 2,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            2 => CircuitState::HalfOpen,
            // Unknown values map to the safest state
            _ => CircuitState::Open,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    total_calls: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    consecutive_failures: AtomicU64,
    half_open_calls: AtomicU64,
    half_open_successes: AtomicU64,
    rejected_calls: AtomicU64,
    total_duration_nanos: AtomicU64,
}

/// Lock-free circuit breaker with manual success/failure recording
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    state: AtomicU8,
    config: CircuitBreakerConfig,
    counters: Counters,
    /// Millis since epoch when the circuit opened (0 = not open)
    opened_at_millis: AtomicI64,
    clock: SharedClock,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig, clock: SharedClock) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            timeout_seconds = config.timeout_seconds,
            success_threshold = config.success_threshold,
            "Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            counters: Counters::default(),
            opened_at_millis: AtomicI64::new(0),
            clock,
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pre-flight check before attempting an operation
    ///
    /// An open circuit whose timeout has elapsed moves to half-open and admits
    /// up to `success_threshold` probe calls.
    pub fn should_allow(&self) -> bool {
        let allowed = match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let opened = self.opened_at_millis.load(Ordering::Acquire);
                let elapsed = self.clock.now().timestamp_millis().saturating_sub(opened);
                if elapsed >= self.config.timeout().as_millis() as i64 {
                    self.transition_to_half_open();
                    self.counters.half_open_calls.fetch_add(1, Ordering::Relaxed);
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                let calls = self.counters.half_open_calls.fetch_add(1, Ordering::Relaxed);
                calls < self.config.success_threshold as u64
            }
        };

        if !allowed {
            self.counters.rejected_calls.fetch_add(1, Ordering::Relaxed);
        }
        allowed
    }

    pub fn record_success(&self, duration: Duration) {
        self.counters.total_calls.fetch_add(1, Ordering::Relaxed);
        self.counters.success_count.fetch_add(1, Ordering::Relaxed);
        self.counters
            .total_duration_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);

        match self.state() {
            CircuitState::HalfOpen => {
                let successes = self
                    .counters
                    .half_open_successes
                    .fetch_add(1, Ordering::Relaxed)
                    + 1;
                if successes >= self.config.success_threshold as u64 {
                    self.transition_to_closed();
                }
            }
            CircuitState::Closed => {
                self.counters.consecutive_failures.store(0, Ordering::Relaxed);
            }
            CircuitState::Open => {
                debug!(component = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    pub fn record_failure(&self, duration: Duration) {
        self.counters.total_calls.fetch_add(1, Ordering::Relaxed);
        self.counters.failure_count.fetch_add(1, Ordering::Relaxed);
        self.counters
            .total_duration_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);

        match self.state() {
            CircuitState::Closed => {
                let failures = self
                    .counters
                    .consecutive_failures
                    .fetch_add(1, Ordering::Relaxed)
                    + 1;
                if failures >= self.config.failure_threshold as u64 {
                    self.transition_to_open();
                }
            }
            // Any failure while probing reopens the circuit
            CircuitState::HalfOpen => self.transition_to_open(),
            CircuitState::Open => {}
        }
    }

    fn transition_to_closed(&self) {
        self.counters.consecutive_failures.store(0, Ordering::Relaxed);
        self.counters.half_open_calls.store(0, Ordering::Relaxed);
        self.counters.half_open_successes.store(0, Ordering::Relaxed);
        self.opened_at_millis.store(0, Ordering::Release);
        self.state.store(CircuitState::Closed as u8, Ordering::Release);

        info!(component = %self.name, "Circuit breaker closed (recovered)");
    }

    fn transition_to_open(&self) {
        self.opened_at_millis
            .store(self.clock.now().timestamp_millis(), Ordering::Release);
        self.counters.half_open_calls.store(0, Ordering::Relaxed);
        self.counters.half_open_successes.store(0, Ordering::Relaxed);
        self.state.store(CircuitState::Open as u8, Ordering::Release);

        error!(
            component = %self.name,
            consecutive_failures = self.counters.consecutive_failures.load(Ordering::Relaxed),
            failure_threshold = self.config.failure_threshold,
            timeout_seconds = self.config.timeout_seconds,
            "Circuit breaker opened (failing fast)"
        );
    }

    fn transition_to_half_open(&self) {
        self.counters.half_open_calls.store(0, Ordering::Relaxed);
        self.counters.half_open_successes.store(0, Ordering::Relaxed);
        self.state
            .store(CircuitState::HalfOpen as u8, Ordering::Release);

        info!(
            component = %self.name,
            success_threshold = self.config.success_threshold,
            "Circuit breaker half-open (testing recovery)"
        );
    }

    /// Force circuit to open state
    pub fn force_open(&self) {
        warn!(component = %self.name, "Circuit breaker forced open");
        self.transition_to_open();
    }

    /// Force circuit to closed state
    pub fn force_closed(&self) {
        warn!(component = %self.name, "Circuit breaker forced closed");
        self.transition_to_closed();
    }

    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let total_calls = self.counters.total_calls.load(Ordering::Relaxed);
        let failure_count = self.counters.failure_count.load(Ordering::Relaxed);
        let total_nanos = self.counters.total_duration_nanos.load(Ordering::Relaxed);

        let (failure_rate, average_duration) = if total_calls > 0 {
            (
                failure_count as f64 / total_calls as f64,
                Duration::from_nanos(total_nanos / total_calls),
            )
        } else {
            (0.0, Duration::ZERO)
        };

        CircuitBreakerMetrics {
            total_calls,
            success_count: self.counters.success_count.load(Ordering::Relaxed),
            failure_count,
            consecutive_failures: self.counters.consecutive_failures.load(Ordering::Relaxed),
            rejected_calls: self.counters.rejected_calls.load(Ordering::Relaxed),
            current_state: self.state(),
            failure_rate,
            average_duration,
        }
    }

    /// Closed and not failing more than one call in ten
    pub fn is_healthy(&self) -> bool {
        if self.state() != CircuitState::Closed {
            return false;
        }
        let metrics = self.metrics();
        metrics.total_calls < 10 || metrics.failure_rate < 0.1
    }
}

//! # Circuit Breaker Metrics

use super::CircuitState;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Point-in-time view of one breaker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CircuitBreakerMetrics {
    /// Total number of calls attempted
    pub total_calls: u64,

    /// Number of successful calls
    pub success_count: u64,

    /// Number of failed calls
    pub failure_count: u64,

    /// Current consecutive failure count
    pub consecutive_failures: u64,

    /// Calls rejected while the circuit was open
    pub rejected_calls: u64,

    pub current_state: CircuitState,

    /// Calculated failure rate (0.0 to 1.0)
    pub failure_rate: f64,

    /// Average operation duration
    pub average_duration: Duration,
}

impl CircuitBreakerMetrics {
    /// Render for health payloads
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "state": self.current_state.as_str(),
            "total_calls": self.total_calls,
            "failure_count": self.failure_count,
            "consecutive_failures": self.consecutive_failures,
            "rejected_calls": self.rejected_calls,
            "failure_rate": self.failure_rate,
            "average_duration_ms": self.average_duration.as_millis() as u64,
        })
    }
}

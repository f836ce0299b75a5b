//! # Clock Abstraction
//!
//! Every TTL, reuse window and retention check in the crate reads time through
//! [`Clock`] so expiry behavior can be driven deterministically in tests.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Source of wall-clock time
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current instant in UTC
    fn now(&self) -> DateTime<Utc>;
}

/// Shared handle to a clock implementation
pub type SharedClock = Arc<dyn Clock>;

/// Real system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Shared system clock
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

/// Manually advanced clock for tests and simulations
///
/// Clones share the same underlying instant, so a clone handed to a component
/// can be advanced from the test body.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Create a clock frozen at the current system time
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += to_chrono(by);
    }

    /// Jump to an explicit instant
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock() = instant;
    }

    /// Wrap this clock as a [`SharedClock`]
    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Convert a std duration into a chrono duration, saturating at one century
pub fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

/// Time left until `deadline`, or `None` once it has passed
pub fn remaining_until(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
    (deadline - now).to_std().ok().filter(|d| !d.is_zero())
}

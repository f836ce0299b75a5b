//! Cache tier implementations

pub mod in_memory;

#[cfg(feature = "cache-redis")]
pub mod redis;

pub use in_memory::{InMemoryDurableStore, InMemoryFastTier};

#[cfg(feature = "cache-redis")]
pub use self::redis::RedisFastTier;

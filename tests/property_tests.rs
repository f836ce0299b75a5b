mod common;

use chrono::Utc;
use common::strategies::*;
use perf_core::cache::{CacheKey, MultiTierCache};
use perf_core::clock::ManualClock;
use perf_core::config::CacheConfig;
use perf_core::models::{AsyncTask, CacheEntry};
use proptest::prelude::*;
use std::time::Duration;

const MAX_KEY_LENGTH: usize = 250;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    /// Composed keys never exceed the bound and are stable across calls
    #[test]
    fn composed_keys_are_bounded_and_deterministic(
        prefix in prefix_strategy(),
        key in raw_key_strategy(),
        user in user_id_strategy(),
    ) {
        let a = CacheKey::compose(&prefix, &key, user.as_deref(), MAX_KEY_LENGTH);
        let b = CacheKey::compose(&prefix, &key, user.as_deref(), MAX_KEY_LENGTH);

        prop_assert!(a.as_str().len() <= MAX_KEY_LENGTH);
        prop_assert_eq!(&a, &b);
        let expected_prefix = format!("{prefix}:");
        prop_assert!(a.as_str().starts_with(&expected_prefix));
        prop_assert_eq!(a.is_digested(), format!("{}:{key}", a.namespace()).len() > MAX_KEY_LENGTH);
    }

    /// Two users never share a composed key
    #[test]
    fn user_namespaces_never_collide(
        prefix in prefix_strategy(),
        key in raw_key_strategy(),
        a in "u[0-9]{1,4}",
        b in "u[0-9]{1,4}",
    ) {
        prop_assume!(a != b);
        let left = CacheKey::compose(&prefix, &key, Some(&a), MAX_KEY_LENGTH);
        let right = CacheKey::compose(&prefix, &key, Some(&b), MAX_KEY_LENGTH);
        prop_assert_ne!(left, right);
    }

    /// Whatever is stored comes back unchanged until its TTL lapses
    #[test]
    fn cached_values_round_trip_until_expiry(
        prefix in prefix_strategy(),
        key in raw_key_strategy(),
        user in user_id_strategy(),
        value in json_value_strategy(),
        ttl in ttl_seconds_strategy(),
    ) {
        let clock = ManualClock::starting_now();
        let cache = MultiTierCache::new(&CacheConfig::default(), clock.shared());

        runtime().block_on(async {
            let ttl = Duration::from_secs(ttl);
            prop_assert!(cache.set(&prefix, &key, &value, ttl, user.as_deref()).await);

            let hit: Option<serde_json::Value> = cache.get(&prefix, &key, user.as_deref()).await;
            prop_assert_eq!(hit, Some(value.clone()));

            clock.advance(ttl);
            let expired: Option<serde_json::Value> = cache.get(&prefix, &key, user.as_deref()).await;
            prop_assert_eq!(expired, None);
            Ok(())
        })?;
    }

    /// The in-process tier never grows past its limit
    #[test]
    fn memory_tier_respects_limit(
        limit in 1usize..32,
        keys in prop::collection::vec("[a-z]{1,6}", 1..100),
    ) {
        let config = CacheConfig { memory_limit: limit, ..Default::default() };
        let cache = MultiTierCache::new(&config, ManualClock::starting_now().shared());

        runtime().block_on(async {
            for key in &keys {
                cache.set("p", key, &key, Duration::from_secs(60), None).await;
                prop_assert!(cache.get_stats().size <= limit);
            }
            Ok(())
        })?;
    }

    /// Entry expiry agrees with the remaining TTL
    #[test]
    fn entry_expiry_matches_remaining_ttl(ttl in ttl_seconds_strategy(), elapsed in 0u64..200_000) {
        let start = Utc::now();
        let entry = CacheEntry::new("k", b"v".to_vec(), Duration::from_secs(ttl), start);
        let now = start + chrono::Duration::seconds(elapsed as i64);

        prop_assert_eq!(entry.is_expired(now), entry.remaining_ttl(now).is_none());
        prop_assert_eq!(entry.is_expired(now), elapsed >= ttl);
    }

    /// Reported progress always lands in [0, 100]
    #[test]
    fn task_progress_is_clamped(updates in prop::collection::vec(progress_strategy(), 1..20)) {
        let mut task = AsyncTask::new("t", "u", None, Utc::now());
        for progress in updates {
            task.set_progress(progress);
            prop_assert!((0.0..=100.0).contains(&task.progress));
        }
    }
}

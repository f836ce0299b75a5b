use proptest::prelude::*;
use proptest::strategy::Just;

/// Cache namespace prefixes
pub fn prefix_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z_]{0,15}"
}

/// Raw keys, occasionally long enough to need digesting
pub fn raw_key_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9_./-]{1,40}",
        "[a-zA-Z0-9]{200,400}",
    ]
}

pub fn user_id_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of("u[0-9]{1,6}")
}

/// TTLs in whole seconds, never zero
pub fn ttl_seconds_strategy() -> impl Strategy<Value = u64> {
    1u64..=86_400
}

/// JSON values of the kind cached for request responses
pub fn json_value_strategy() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(serde_json::json!({})),
        Just(serde_json::json!({"name": "a.pdf"})),
        Just(serde_json::json!({"questions": ["q1", "q2"], "count": 2})),
        any::<i64>().prop_map(serde_json::Value::from),
        "[a-zA-Z0-9 ]{0,64}".prop_map(serde_json::Value::from),
        prop::collection::vec(any::<bool>(), 0..8).prop_map(|v| serde_json::json!(v)),
    ]
}

/// Progress values including out-of-range ones
pub fn progress_strategy() -> impl Strategy<Value = f64> {
    prop_oneof![-1_000.0f64..1_000.0, Just(0.0), Just(100.0)]
}

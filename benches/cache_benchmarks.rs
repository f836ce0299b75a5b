use criterion::{black_box, criterion_group, criterion_main, Criterion};
use perf_core::cache::{CacheKey, MultiTierCache};
use perf_core::clock::system_clock;
use perf_core::config::CacheConfig;
use std::time::Duration;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

fn benchmark_key_composition(c: &mut Criterion) {
    let long_key = "segment/".repeat(64);
    c.bench_function("compose_short_key", |b| {
        b.iter(|| CacheKey::compose(black_box("files"), black_box("doc-1"), Some("u1"), 250))
    });
    c.bench_function("compose_digested_key", |b| {
        b.iter(|| CacheKey::compose(black_box("files"), black_box(&long_key), Some("u1"), 250))
    });
}

fn benchmark_memory_tier(c: &mut Criterion) {
    let rt = runtime();
    let cache = MultiTierCache::new(&CacheConfig::default(), system_clock());
    let value = serde_json::json!({"name": "lecture.pdf", "pages": 42, "tags": ["week1", "intro"]});

    rt.block_on(async {
        for i in 0..1_000 {
            cache
                .set("files", &i.to_string(), &value, Duration::from_secs(600), Some("u1"))
                .await;
        }
    });

    c.bench_function("memory_get_hit", |b| {
        b.iter(|| {
            rt.block_on(async {
                let hit: Option<serde_json::Value> =
                    cache.get("files", black_box("500"), Some("u1")).await;
                black_box(hit)
            })
        })
    });

    c.bench_function("memory_get_miss", |b| {
        b.iter(|| {
            rt.block_on(async {
                let miss: Option<serde_json::Value> =
                    cache.get("files", black_box("absent"), Some("u1")).await;
                black_box(miss)
            })
        })
    });

    c.bench_function("memory_set", |b| {
        b.iter(|| {
            rt.block_on(async {
                cache
                    .set("files", black_box("hot"), &value, Duration::from_secs(600), Some("u1"))
                    .await
            })
        })
    });
}

fn benchmark_eviction_under_pressure(c: &mut Criterion) {
    let rt = runtime();
    let config = CacheConfig {
        memory_limit: 256,
        ..Default::default()
    };
    let cache = MultiTierCache::new(&config, system_clock());
    let mut counter = 0u64;

    c.bench_function("memory_set_at_limit", |b| {
        b.iter(|| {
            counter += 1;
            let key = counter.to_string();
            rt.block_on(async {
                cache
                    .set("quiz", &key, &counter, Duration::from_secs(60), None)
                    .await
            })
        })
    });
}

criterion_group!(
    benches,
    benchmark_key_composition,
    benchmark_memory_tier,
    benchmark_eviction_under_pressure
);
criterion_main!(benches);

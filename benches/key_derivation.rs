//! Benchmarks for the hot path of every request
//!
//! This benchmark measures:
//! - Cache key derivation (canonical JSON + SHA-256)
//! - Read-through hits against the in-process cache

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use readthrough_cache::cache::{CacheConfig, CacheManager, KeyDeriver, MemoryCache};
use readthrough_cache::payload::{IrisFeatures, UserQuery};
use readthrough_cache::source::{ModelSource, NearestCentroidClassifier};
use readthrough_cache::ReadThrough;

fn bench_key_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_derivation");
    let deriver = KeyDeriver::new();
    let salted = KeyDeriver::new().with_salt("model-v1");
    let user = UserQuery::new(1);
    let flower = IrisFeatures::new(5.1, 3.5, 1.4, 0.2);

    group.bench_function("user_query", |b| {
        b.iter(|| deriver.derive_for(black_box(&user)).unwrap())
    });
    group.bench_function("iris_features", |b| {
        b.iter(|| deriver.derive_for(black_box(&flower)).unwrap())
    });
    group.bench_function("iris_features_salted", |b| {
        b.iter(|| salted.derive_for(black_box(&flower)).unwrap())
    });
    group.finish();
}

fn bench_cache_hit(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let cache = Arc::new(CacheManager::new(
        CacheConfig::default(),
        Arc::new(MemoryCache::new()),
    ));
    let model = ModelSource::new(Arc::new(NearestCentroidClassifier::builtin_iris()));
    let rt = ReadThrough::new(cache, Arc::new(model));
    let flower = IrisFeatures::new(5.1, 3.5, 1.4, 0.2);
    runtime.block_on(rt.get(&flower)).unwrap();

    c.bench_function("predict_cache_hit", |b| {
        b.to_async(&runtime)
            .iter(|| async { rt.get(black_box(&flower)).await.unwrap() })
    });
}

criterion_group!(benches, bench_key_derivation, bench_cache_hit);
criterion_main!(benches);

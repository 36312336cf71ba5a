use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use http::{HeaderMap, StatusCode};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::time::Instant;
use ttl_cache::{CacheEntry, CacheStore};

fn entry(ttl: Duration) -> CacheEntry {
    CacheEntry::new(
        StatusCode::OK,
        HeaderMap::new(),
        Bytes::from(vec![b'x'; 256]),
        Instant::now(),
        ttl,
    )
}

fn filled(n: usize, ttl: Duration) -> CacheStore {
    let store = CacheStore::new();
    for i in 0..n {
        store.set(format!("GET:http://origin/items/{}", i), entry(ttl));
    }
    store
}

fn bench_get(c: &mut Criterion) {
    let store = filled(10_000, Duration::from_secs(60));
    let keys: Vec<String> = (0..10_000)
        .map(|i| format!("GET:http://origin/items/{}", i))
        .collect();

    c.bench_function("get_hit", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % keys.len();
            black_box(store.get(&keys[i]))
        })
    });

    c.bench_function("get_miss", |b| {
        b.iter(|| black_box(store.get("GET:http://origin/missing")))
    });
}

fn bench_set(c: &mut Criterion) {
    let store = CacheStore::new();
    c.bench_function("set_overwrite", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i = (i + 1) % 1024;
            store.set(format!("GET:http://origin/items/{}", i), entry(Duration::from_secs(60)));
        })
    });
}

fn bench_purge(c: &mut Criterion) {
    let mut group = c.benchmark_group("purge_expired");
    for n in [1_000usize, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                || filled(n, Duration::ZERO),
                |store| black_box(store.purge_expired(Instant::now())),
                criterion::BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

fn bench_contended_reads(c: &mut Criterion) {
    let store = Arc::new(filled(1_000, Duration::from_secs(60)));

    c.bench_function("get_with_4_readers", |b| {
        b.iter_custom(|iters| {
            let start = std::time::Instant::now();
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let store = Arc::clone(&store);
                    thread::spawn(move || {
                        for i in 0..iters {
                            black_box(store.get(&format!("GET:http://origin/items/{}", i % 1_000)));
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            start.elapsed()
        })
    });
}

criterion_group!(benches, bench_get, bench_set, bench_purge, bench_contended_reads);
criterion_main!(benches);

//! Criterion benchmarks for the response cache and request fingerprints.

use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use seaworthy::domain::models::{ResponsePayload, TargetDescriptor};
use seaworthy::domain::ports::ManualClock;
use seaworthy::services::ResponseCache;

const CAP: usize = 512;
const OPS: usize = 10_000;
const TTL: Duration = Duration::from_secs(60);

fn cache() -> ResponseCache {
    ResponseCache::with_clock(CAP, Arc::new(ManualClock::new()))
}

fn bench_put_with_eviction(c: &mut Criterion) {
    let payload = Arc::new(ResponsePayload::new(200, vec![0u8; 256]));
    c.bench_function("cache_put_10k_cap_512", |b| {
        b.iter(|| {
            let cache = cache();
            for i in 0..OPS {
                cache.put(format!("GET /charts/{i}"), Arc::clone(&payload), TTL);
            }
            black_box(cache.len());
        });
    });
}

fn bench_get_hits(c: &mut Criterion) {
    let payload = Arc::new(ResponsePayload::new(200, vec![0u8; 256]));
    let cache = cache();
    let keys: Vec<String> = (0..CAP).map(|i| format!("GET /charts/{i}")).collect();
    for key in &keys {
        cache.put(key.clone(), Arc::clone(&payload), TTL);
    }

    c.bench_function("cache_get_hit", |b| {
        let mut step = 0usize;
        b.iter(|| {
            step = step.wrapping_add(7);
            black_box(cache.get(&keys[step % keys.len()]));
        });
    });
}

fn bench_invalidate_prefix(c: &mut Criterion) {
    let payload = Arc::new(ResponsePayload::new(200, "ok"));
    c.bench_function("cache_invalidate_prefix", |b| {
        b.iter(|| {
            let cache = cache();
            for i in 0..CAP {
                let scope = if i % 2 == 0 { "vessels" } else { "ports" };
                cache.put(format!("GET /{scope}/{i}"), Arc::clone(&payload), TTL);
            }
            black_box(cache.invalidate_prefix("GET /vessels"));
        });
    });
}

fn bench_fingerprint(c: &mut Criterion) {
    let plain = TargetDescriptor::get("/weather?port=brest&units=metric&days=3");
    let json = TargetDescriptor::post("/reports").with_json(&serde_json::json!({
        "vessel": "aurora",
        "position": {"lat": 48.38, "lon": -4.49},
        "crew": ["ana", "bo", "chi"],
    }));

    c.bench_function("fingerprint_query", |b| b.iter(|| black_box(plain.fingerprint())));
    c.bench_function("fingerprint_json_body", |b| b.iter(|| black_box(json.fingerprint())));
}

criterion_group!(
    benches,
    bench_put_with_eviction,
    bench_get_hits,
    bench_invalidate_prefix,
    bench_fingerprint
);
criterion_main!(benches);

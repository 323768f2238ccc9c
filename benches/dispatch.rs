use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use fsnote::dispatch::route;
use fsnote::{decode, sink_fn, EventFlags, Subscriber, SubscriptionRegistry};

fn registry_with(paths: usize) -> SubscriptionRegistry {
    let registry = SubscriptionRegistry::new();
    // Nested project layout: /repo, /repo/pkg0, /repo/pkg0/src, ...
    registry.register("/repo", Subscriber::new(sink_fn(|_, _| Ok(())))).unwrap();
    for i in 0..paths {
        registry.register(format!("/repo/pkg{i}"), Subscriber::new(sink_fn(|_, _| Ok(())))).unwrap();
        registry.register(format!("/repo/pkg{i}/src"), Subscriber::new(sink_fn(|_, _| Ok(())))).unwrap();
    }
    registry
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(1));

    group.bench_function("single_flag", |b| b.iter(|| decode(black_box(EventFlags::ITEM_MODIFIED))));
    group.bench_function("typical_create", |b| {
        let flags = EventFlags::ITEM_CREATED | EventFlags::ITEM_IS_FILE;
        b.iter(|| decode(black_box(flags)));
    });
    group.bench_function("all_flags", |b| b.iter(|| decode(black_box(EventFlags::all()))));

    group.finish();
}

fn bench_route(c: &mut Criterion) {
    let mut group = c.benchmark_group("route");
    group.throughput(Throughput::Elements(1));

    for size in [1usize, 16, 256] {
        let registry = registry_with(size);
        let snapshot = registry.lookup();
        let path = format!("/repo/pkg{}/src/lib/mod.rs", size - 1);

        group.bench_with_input(BenchmarkId::new("nested", size), &path, |b, path| {
            b.iter(|| route(black_box(path), &snapshot));
        });
        group.bench_with_input(BenchmarkId::new("unmatched", size), "/elsewhere/file", |b, path| {
            b.iter(|| route(black_box(path), &snapshot));
        });
    }

    group.finish();
}

fn bench_register(c: &mut Criterion) {
    c.bench_function("registry/register_into_256", |b| {
        b.iter_batched(
            || registry_with(256),
            |registry| registry.register("/repo/new", Subscriber::new(sink_fn(|_, _| Ok(())))),
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_decode, bench_route, bench_register);
criterion_main!(benches);

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use primer_core::{ensure_initialized, mark_type_reached, InitRecord, RuntimeType};
use std::sync::Arc;

fn hierarchy(depth: usize) -> Arc<RuntimeType> {
    let mut ty = RuntimeType::builder("Level0").build().unwrap();
    for level in 1..depth {
        ty = RuntimeType::builder(format!("Level{}", level))
            .extends(&ty)
            .build()
            .unwrap();
    }
    ty
}

fn bench_fast_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("fast_path");

    let untracked = RuntimeType::builder("Untracked")
        .record(InitRecord::no_initializer(false))
        .build()
        .unwrap();
    group.bench_function("untracked_prebuilt", |b| {
        b.iter(|| black_box(&untracked).ensure_initialized().unwrap());
    });

    let initialized = hierarchy(1);
    initialized.ensure_initialized().unwrap();
    group.bench_function("initialized_at_run_time", |b| {
        b.iter(|| black_box(&initialized).ensure_initialized().unwrap());
    });

    group.finish();
}

fn bench_slow_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("slow_path");

    // Re-entering an initialized type through the coordinator
    let initialized = hierarchy(1);
    initialized.ensure_initialized().unwrap();
    group.bench_function("coordinator_initialized", |b| {
        b.iter(|| ensure_initialized(black_box(&initialized)).unwrap());
    });

    for depth in [1, 4, 16] {
        group.bench_with_input(
            BenchmarkId::new("first_initialization", depth),
            &depth,
            |b, &depth| {
                b.iter_with_setup(|| hierarchy(depth), |ty| ty.ensure_initialized().unwrap());
            },
        );
        group.bench_with_input(BenchmarkId::new("mark_reached", depth), &depth, |b, &depth| {
            b.iter_with_setup(|| hierarchy(depth), |ty| mark_type_reached(&ty));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fast_path, bench_slow_path);
criterion_main!(benches);

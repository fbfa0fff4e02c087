//! Microbenchmarks for the harness pieces that run outside timed regions.
//!
//! Pattern generation and cache flushing happen during setup, but their cost
//! decides how quickly a full experiment grid turns around, and the fence
//! cost bounds how finely a timed region can be bracketed.
//!
//! ## Running
//!
//! ```bash
//! cargo bench --bench harness
//! cargo bench --bench harness -- "pattern_generation"
//! ```

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use smtbench::{invalidate, serialize, AlignedBuffer, IndexSequence, Lcg};

fn bench_pattern_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("pattern_generation");

    group.throughput(Throughput::Elements(1_000_000));
    group.bench_function("lcg_next_index_1m", |b| {
        b.iter(|| {
            let mut lcg = Lcg::new(black_box(12345));
            let mut acc = 0usize;
            for _ in 0..1_000_000 {
                acc = acc.wrapping_add(lcg.next_index(1 << 20));
            }
            black_box(acc)
        });
    });

    for &accesses in &[100_000usize, 1_000_000] {
        group.throughput(Throughput::Elements(accesses as u64));
        group.bench_with_input(
            BenchmarkId::new("index_sequence_generate", accesses),
            &accesses,
            |b, &accesses| {
                b.iter(|| {
                    IndexSequence::generate(black_box(54321), accesses, 256, 1 << 20).unwrap()
                });
            },
        );
    }

    group.finish();
}

fn bench_cache_state(c: &mut Criterion) {
    const ELEMENTS: usize = 1024 * 1024 / std::mem::size_of::<u64>();

    let mut group = c.benchmark_group("cache_state");
    let mut buf = AlignedBuffer::<u64>::new(ELEMENTS).unwrap();
    buf.fill_sequential();

    group.throughput(Throughput::Bytes(
        (ELEMENTS * std::mem::size_of::<u64>()) as u64,
    ));
    group.bench_function("invalidate_1mib", |b| {
        b.iter(|| invalidate(black_box(buf.as_slice())));
    });

    group.finish();
}

fn bench_timing(c: &mut Criterion) {
    c.bench_function("serialize_fence", |b| {
        b.iter(serialize);
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default()
        .sample_size(60)
        .warm_up_time(Duration::from_secs(1))
        .measurement_time(Duration::from_secs(3));
    targets = bench_pattern_generation, bench_cache_state, bench_timing,
);

criterion_main!(benches);

//! Criterion benchmarks for whole simulation steps.

use std::hint::black_box;

use biofilm_bench::reference_simulation;
use criterion::{criterion_group, criterion_main, Criterion};

fn bench_step_32_200(c: &mut Criterion) {
    let mut sim = reference_simulation(32, 200, 42);

    // Warm up: the first step sizes every hierarchy.
    sim.step().unwrap();

    c.bench_function("step_32x32_200_agents", |b| {
        b.iter(|| {
            let metrics = sim.step().unwrap();
            black_box(&metrics);
        });
    });
}

criterion_group!(benches, bench_step_32_200);
criterion_main!(benches);

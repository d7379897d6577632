//! Criterion benchmarks for the agent container: shoving, index
//! rebuilds and grid coupling.

use std::hint::black_box;

use biofilm_agents::{AgentConfig, AgentContainer};
use biofilm_bench::{colony_positions, reference_domain, reference_reaction, reference_species};
use biofilm_core::SpeciesId;
use biofilm_grid::Domain;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

const N: usize = 32;

fn colony(domain: &Domain, count: usize) -> AgentContainer {
    let mut c =
        AgentContainer::new(domain, vec![reference_species()], AgentConfig::default()).unwrap();
    let mass = std::f64::consts::PI * 0.25 * 4.0;
    for p in colony_positions(N, count, 42) {
        c.create(domain, SpeciesId(0), p, vec![mass]).unwrap();
    }
    c
}

fn bench_shove_500(c: &mut Criterion) {
    let domain = reference_domain(N);
    c.bench_function("shove_500", |b| {
        b.iter_batched(
            || colony(&domain, 500),
            |mut agents| {
                let out = agents.shove_all(&domain).unwrap();
                black_box(out);
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_rebuild_index_2000(c: &mut Criterion) {
    let domain = reference_domain(N);
    let mut agents = colony(&domain, 2000);
    c.bench_function("rebuild_index_2000", |b| {
        b.iter(|| {
            agents.rebuild_index().unwrap();
            black_box(agents.index().registered());
        });
    });
}

fn bench_fit_mass_2000(c: &mut Criterion) {
    let domain = reference_domain(N);
    let agents = colony(&domain, 2000);
    let reactions = vec![reference_reaction()];
    c.bench_function("fit_mass_2000", |b| {
        b.iter(|| {
            let grids = agents
                .fit_mass_on_grid(&reactions, domain.domain_grid())
                .unwrap();
            black_box(&grids);
        });
    });
}

criterion_group!(
    benches,
    bench_shove_500,
    bench_rebuild_index_2000,
    bench_fit_mass_2000
);
criterion_main!(benches);

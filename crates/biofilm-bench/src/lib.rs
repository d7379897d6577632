//! Benchmark profiles for the biofilm simulator.
//!
//! - [`reference_domain`]: a square 2D slab with a carrier on the x-min
//!   face and a constant bulk on the x-max face.
//! - [`reference_simulation`]: that slab with one growing species, the
//!   multigrid and pressure solvers, and a seeded colony.
//! - [`colony_positions`]: deterministic agent placement near the carrier.

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use biofilm_agents::Species;
use biofilm_core::{ContinuousVector, ReactionId, SoluteId, SpeciesId};
use biofilm_engine::{Simulation, SimulationConfig, TimerConfig};
use biofilm_grid::{BoundaryCondition, BoundaryKind, Bulk, BulkSolute, Domain, Face};
use biofilm_kinetics::{Reaction, ReactionKind};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Cell side length of every profile.
pub const RESOLUTION: f64 = 4.0;

/// Square slab of `n × n` cells holding one solute at 1.0.
pub fn reference_domain(n: usize) -> Domain {
    Domain::builder("bench-slab")
        .grid(n, n, 1)
        .resolution(RESOLUTION)
        .solute("substrate", 1.0, 1.0)
        .bulk(Bulk::new("bulk", 0.0, vec![BulkSolute::constant(1.0)]))
        .boundary(BoundaryCondition::new(Face::XMin, BoundaryKind::ZeroFlux).support())
        .face(
            Face::XMax,
            BoundaryKind::Bulk {
                bulk: "bulk".into(),
            },
        )
        .face(Face::YMin, BoundaryKind::Cyclic)
        .face(Face::YMax, BoundaryKind::Cyclic)
        .build()
        .expect("reference domain is valid")
}

/// Monod uptake of the substrate, growing particle 0.
pub fn reference_reaction() -> Reaction {
    Reaction::builder("growth")
        .id(ReactionId(0))
        .kind(ReactionKind::Monod {
            mu_max: 1.0,
            ks: 0.5,
            solute: SoluteId(0),
        })
        .yield_of(SoluteId(0), -2.0)
        .particle_yield(0, 1.0)
        .build()
        .expect("reference reaction is valid")
}

/// One species catalysing [`reference_reaction`].
pub fn reference_species() -> Species {
    Species::builder("heterotroph")
        .particle("biomass", 1.0)
        .reaction(0)
        .build()
        .expect("reference species is valid")
}

/// `count` positions within three cells of the carrier, spread over the
/// whole y extent of a slab of `n` cells.
pub fn colony_positions(n: usize, count: usize, seed: u64) -> Vec<ContinuousVector> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let height = n as f64 * RESOLUTION;
    (0..count)
        .map(|_| {
            ContinuousVector::new(
                rng.random_range(0.5..3.0 * RESOLUTION),
                rng.random_range(0.0..height),
                0.5 * RESOLUTION,
            )
        })
        .collect()
}

/// Full simulation on an `n × n` slab with `agents` seeded agents.
pub fn reference_simulation(n: usize, agents: usize, seed: u64) -> Simulation {
    let config = SimulationConfig {
        timer: TimerConfig {
            end: 1e9,
            dt: 0.05,
            dt_min: 1e-3,
            dt_max: 1.0,
            adaptive: false,
        },
        pressure: true,
        ..SimulationConfig::default()
    };
    let mut sim = Simulation::new(
        config,
        reference_domain(n),
        vec![reference_reaction()],
        vec![reference_species()],
    )
    .expect("reference simulation is valid");
    // Radius 0.5 in a slab one cell thick.
    let mass = std::f64::consts::PI * 0.25 * RESOLUTION;
    for p in colony_positions(n, agents, seed) {
        sim.add_agent(SpeciesId(0), p, vec![mass])
            .expect("colony positions are inside the slab");
    }
    sim
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colony_is_deterministic_and_inside() {
        let a = colony_positions(32, 50, 7);
        let b = colony_positions(32, 50, 7);
        assert_eq!(a, b);
        let domain = reference_domain(32);
        assert!(a.iter().all(|p| domain.is_inside(p)));
    }

    #[test]
    fn reference_simulation_steps() {
        let mut sim = reference_simulation(16, 20, 42);
        let m = sim.step().unwrap();
        assert_eq!(m.agent_count, sim.agents().alive_count());
    }
}

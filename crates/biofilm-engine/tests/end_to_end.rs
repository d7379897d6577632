//! Whole-simulation scenarios with the real solvers.

use biofilm_agents::Species;
use biofilm_core::{ContinuousVector, SoluteId, SolverError, SpeciesId};
use biofilm_engine::{ConfigError, Simulation, SimulationConfig, SolverKind, TimerConfig};
use biofilm_grid::{BoundaryKind, Bulk, BulkSolute, Domain};
use biofilm_test_utils::{column_domain, monod_uptake, slab_domain};

const S: SoluteId = SoluteId(0);

fn timer(end: f64, dt: f64) -> TimerConfig {
    TimerConfig {
        end,
        dt,
        dt_min: 1e-3,
        dt_max: 1.0,
        adaptive: false,
    }
}

fn grower() -> Species {
    Species::builder("grower")
        .particle("biomass", 1.0)
        .reaction(0)
        .build()
        .unwrap()
}

// ── Column tests ────────────────────────────────────────────────

#[test]
fn column_between_fixed_ends_is_linear() {
    let n = 16;
    let (c0, c1) = (0.0, 4.0);
    let domain = column_domain(
        n,
        BoundaryKind::Constant { values: vec![c0] },
        BoundaryKind::Constant { values: vec![c1] },
        0.0,
    );
    let config = SimulationConfig {
        timer: timer(1.0, 0.1),
        ..SimulationConfig::default()
    };
    let mut sim = Simulation::new(config, domain, Vec::new(), Vec::new()).unwrap();

    let m = sim.step().unwrap();
    assert!(m.cycles > 0);
    let values = sim.domain().solute_grid(S).unwrap().interior_values();
    for (i, v) in values.iter().enumerate() {
        let expected = c0 + (c1 - c0) * (i as f64 + 0.5) / n as f64;
        assert!((v - expected).abs() < 1e-4, "cell {i}: {v} vs {expected}");
    }
}

#[test]
fn column_with_one_fixed_end_fills_to_boundary_value() {
    let domain = column_domain(
        32,
        BoundaryKind::Constant { values: vec![2.0] },
        BoundaryKind::ZeroFlux,
        0.0,
    );
    let config = SimulationConfig {
        timer: timer(0.3, 0.1),
        ..SimulationConfig::default()
    };
    let mut sim = Simulation::new(config, domain, Vec::new(), Vec::new()).unwrap();

    sim.run().unwrap();
    let values = sim.domain().solute_grid(S).unwrap().interior_values();
    assert!(values.iter().all(|v| (v - 2.0).abs() < 1e-4));
}

#[test]
fn grid_that_does_not_coarsen_fails_at_construction() {
    let domain = column_domain(17, BoundaryKind::ZeroFlux, BoundaryKind::ZeroFlux, 0.0);
    let config = SimulationConfig {
        timer: timer(1.0, 0.1),
        ..SimulationConfig::default()
    };
    match Simulation::new(config, domain, Vec::new(), Vec::new()) {
        Err(ConfigError::Solver {
            reason: SolverError::UnsupportedGrid { dims, .. },
            ..
        }) => assert_eq!(dims, [17, 1, 1]),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("17 cells cannot be coarsened"),
    }
}

// ── Chemostat tests ─────────────────────────────────────────────

#[test]
fn chemostat_population_consumes_feed() {
    let domain = Domain::builder("reactor")
        .grid(1, 1, 1)
        .resolution(1.0)
        .solute("s", 1.0, 1.0)
        .bulk(Bulk::new(
            "reactor",
            0.1,
            vec![BulkSolute::dynamic(1.0, 1.0)],
        ))
        .build()
        .unwrap();
    let config = SimulationConfig {
        timer: timer(1.0, 0.1),
        solver: SolverKind::Chemostat {
            bulk: "reactor".into(),
        },
        ..SimulationConfig::default()
    };
    let reactions = vec![monod_uptake(S, 1.0, 0.1, 1.0)];
    let mut sim = Simulation::new(config, domain, reactions, vec![grower()]).unwrap();
    let p = ContinuousVector::new(0.5, 0.5, 0.5);
    for _ in 0..20 {
        sim.add_agent(SpeciesId(0), p, vec![0.1]).unwrap();
    }

    sim.run().unwrap();

    let s = sim.domain().bulk("reactor").unwrap().value(0);
    assert!((0.0..1.0).contains(&s), "reactor concentration {s}");
    let records = sim.snapshot();
    assert!(!records.is_empty());
    for r in &records {
        assert_eq!(r.position, p);
        assert!(r.particle_mass.iter().all(|m| m.is_finite() && *m > 0.0));
    }
}

// ── Biofilm tests ───────────────────────────────────────────────

#[test]
fn biofilm_grows_and_is_pushed_from_support() {
    let domain = slab_domain(16, 4.0, 1.0);
    let config = SimulationConfig {
        timer: timer(0.3, 0.1),
        pressure: true,
        ..SimulationConfig::default()
    };
    let reactions = vec![monod_uptake(S, 1.0, 1.0, 1.0)];
    let mut sim = Simulation::new(config, domain, reactions, vec![grower()]).unwrap();
    let mass = std::f64::consts::PI * 0.25 * 4.0;
    for j in 0..10 {
        let p = ContinuousVector::new(2.0, 3.0 + 6.0 * j as f64, 2.0);
        sim.add_agent(SpeciesId(0), p, vec![mass]).unwrap();
    }
    let mean_x = |sim: &Simulation| {
        let r = sim.snapshot();
        r.iter().map(|a| a.position.x).sum::<f64>() / r.len() as f64
    };
    let before = mean_x(&sim);

    sim.run().unwrap();

    let m = sim.last_metrics();
    assert!(m.solver_us.iter().any(|(n, _)| n == "pressure"));
    assert_eq!(m.agent_count, sim.agents().alive_count());
    assert_eq!(sim.agents().index().registered(), m.agent_count);
    for r in sim.snapshot() {
        assert!(sim.domain().is_inside(&r.position));
        assert!(r.particle_mass[0] > mass);
    }
    assert!(mean_x(&sim) >= before - 1e-9);
    let s = sim.domain().solute_grid(S).unwrap();
    assert!(s.min() >= 0.0 && s.max() <= 1.0 + 1e-6);
}

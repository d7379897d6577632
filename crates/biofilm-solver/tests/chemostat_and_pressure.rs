//! Integration tests: well-mixed reactor and biomass pressure.

use biofilm_core::{SoluteId, SolverError, StepId};
use biofilm_grid::{Bulk, BulkSolute, Domain, Face, BoundaryKind};
use biofilm_solver::{
    ChemostatSolver, DiffusionSolver, MultigridConfig, PressureSolver, SolverContext,
};
use biofilm_test_utils::{column_domain, monod_uptake, slab_domain, uniform_grid};

const S: SoluteId = SoluteId(0);

fn reactor(dilution: f64, inflow: f64, start: f64) -> Domain {
    Domain::builder("reactor")
        .grid(1, 1, 1)
        .resolution(1.0)
        .solute("s", 1.0, start)
        .bulk(Bulk::new(
            "reactor",
            dilution,
            vec![BulkSolute::dynamic(start, inflow)],
        ))
        .build()
        .unwrap()
}

// ── Chemostat tests ─────────────────────────────────────────────

#[test]
fn chemostat_reaches_uptake_dilution_balance() {
    let (d, sin, x, mu, ks) = (0.5, 1.0, 0.2, 1.0, 0.1);
    let mut domain = reactor(d, sin, sin);
    let reactions = vec![monod_uptake(S, mu, ks, 1.0)];
    let catalysts = vec![uniform_grid(&domain, x)];
    let mut solver = ChemostatSolver::new("reactor");
    solver.initialize(&domain).unwrap();
    for step in 0..40 {
        let mut ctx = SolverContext::new(
            &mut domain,
            &reactions,
            &catalysts,
            StepId(step),
            step as f64,
            1.0,
        );
        solver.solve(&mut ctx).unwrap();
    }
    let s = domain.bulk("reactor").unwrap().value(0);
    let balance = d * (sin - s) - x * mu * s / (ks + s);
    assert!(balance.abs() < 1e-3, "S = {s}, imbalance {balance}");
    assert!(s > 0.0 && s < sin);
    // Grid mirrors the bulk.
    assert_eq!(domain.solute_grid(S).unwrap().at(0, 0, 0), s);
}

#[test]
fn chemostat_without_biomass_washes_in_feed() {
    let mut domain = reactor(1.0, 2.0, 0.0);
    let mut solver = ChemostatSolver::new("reactor");
    solver.initialize(&domain).unwrap();
    let mut ctx = SolverContext::new(&mut domain, &[], &[], StepId(1), 0.0, 10.0);
    let report = solver.solve(&mut ctx).unwrap();
    assert!(report.cycles >= 1);
    let s = domain.bulk("reactor").unwrap().value(0);
    assert!((s - 2.0).abs() < 1e-2, "S = {s}");
    assert!(solver.time_constraint().is_some());
}

#[test]
fn chemostat_needs_its_bulk() {
    let domain = reactor(1.0, 1.0, 1.0);
    let mut solver = ChemostatSolver::new("elsewhere");
    assert!(matches!(
        solver.initialize(&domain),
        Err(SolverError::ExecutionFailed { .. })
    ));
}

// ── Pressure tests ──────────────────────────────────────────────

#[test]
fn pressure_is_highest_at_the_carrier_and_zero_at_the_bulk() {
    let mut domain = slab_domain(16, 1.0, 1.0);
    let mut rate = uniform_grid(&domain, 0.0);
    let shape = rate.shape();
    for c in shape.interior() {
        if c.i < 5 {
            *rate.at_mut(c.i, c.j, c.k) = 0.01;
        }
    }
    let mut solver = PressureSolver::new(MultigridConfig {
        tolerance: 1e-10,
        max_cycles: 200,
        ..MultigridConfig::default()
    })
    .unwrap();
    solver.initialize(&domain).unwrap();
    let mut ctx = SolverContext::new(&mut domain, &[], &[], StepId(1), 0.0, 1.0)
        .with_volume_rate(&rate);
    solver.solve(&mut ctx).unwrap();

    let p = solver.pressure_grid().unwrap();
    for i in 0..15 {
        assert!(p.at(i, 3, 0) >= p.at(i + 1, 3, 0), "row not decreasing at {i}");
    }
    assert!(p.at(0, 3, 0) > 0.0);
    let face = 0.5 * (p.at(15, 3, 0) + p.at(16, 3, 0));
    assert!(face.abs() < 1e-12, "pressure on the open face is {face}");
    assert!(p.at(15, 3, 0) > 0.0);
    // Agents move down the gradient: towards the bulk.
    let g = p.gradient(biofilm_core::DiscreteVector::new(2, 3, 0)).unwrap();
    assert!(g.x < 0.0);
    assert!(g.y.abs() < 1e-6);
    // Solute fields are not touched.
    assert!(domain.solute_grid(S).unwrap().interior_values().iter().all(|v| *v == 1.0));
}

#[test]
fn closed_domain_pressure_has_zero_mean_source() {
    let mut domain = column_domain(8, BoundaryKind::ZeroFlux, BoundaryKind::ZeroFlux, 0.0);
    assert!(!PressureSolver::has_open_face(&domain));
    let rate = uniform_grid(&domain, 1.0);
    let mut solver = PressureSolver::new(MultigridConfig::default()).unwrap();
    let mut ctx = SolverContext::new(&mut domain, &[], &[], StepId(1), 0.0, 1.0)
        .with_volume_rate(&rate);
    let report = solver.solve(&mut ctx).unwrap();
    // A uniform source minus its mean is zero: nothing to solve.
    assert_eq!(report.cycles, 0);
    assert!(solver.pressure_grid().unwrap().interior_values().iter().all(|v| *v == 0.0));
}

#[test]
fn pressure_without_volume_rate_fails() {
    let mut domain = column_domain(
        5,
        BoundaryKind::Constant { values: vec![0.0] },
        BoundaryKind::ZeroFlux,
        0.0,
    );
    assert!(PressureSolver::has_open_face(&domain));
    assert_eq!(domain.boundary(Face::XMin).face, Face::XMin);
    let mut solver = PressureSolver::new(MultigridConfig::default()).unwrap();
    let mut ctx = SolverContext::new(&mut domain, &[], &[], StepId(1), 0.0, 1.0);
    assert!(matches!(
        solver.solve(&mut ctx),
        Err(SolverError::ExecutionFailed { .. })
    ));
}

#[test]
fn pressure_rejects_a_grid_that_does_not_coarsen() {
    let domain = slab_domain(17, 1.0, 1.0);
    let mut solver = PressureSolver::new(MultigridConfig::default()).unwrap();
    assert!(matches!(
        solver.initialize(&domain),
        Err(SolverError::UnsupportedGrid { dims: [17, 17, 1], .. })
    ));
}

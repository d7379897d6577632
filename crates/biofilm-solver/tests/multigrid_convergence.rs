//! Integration tests: multigrid reaction-diffusion on small domains.
//!
//! Each test builds a fixture domain, runs a single solve through the
//! public [`DiffusionSolver`] interface and checks the committed field
//! against a closed-form or conservation property.

use biofilm_core::{SoluteId, SolverError, StepId};
use biofilm_grid::{BoundaryKind, Domain, SpatialGrid};
use biofilm_kinetics::Reaction;
use biofilm_solver::{
    CycleShape, DiffusionSolver, Linearization, MultigridSolver, SolveMode, SolverContext,
};
use biofilm_test_utils::{column_domain, monod_uptake, slab_domain, uniform_grid};

const S: SoluteId = SoluteId(0);

fn solve(
    solver: &mut MultigridSolver,
    domain: &mut Domain,
    reactions: &[Reaction],
    catalysts: &[SpatialGrid],
    dt: f64,
) -> Result<biofilm_solver::SolveReport, SolverError> {
    solver.initialize(domain)?;
    let mut ctx = SolverContext::new(domain, reactions, catalysts, StepId(1), 0.0, dt);
    solver.solve(&mut ctx)
}

fn interior(domain: &Domain) -> Vec<f64> {
    domain.solute_grid(S).unwrap().interior_values()
}

// ── Pure diffusion tests ────────────────────────────────────────

#[test]
fn column_with_one_fixed_end_relaxes_to_that_value() {
    let mut domain = column_domain(
        32,
        BoundaryKind::Constant { values: vec![2.0] },
        BoundaryKind::ZeroFlux,
        0.0,
    );
    let mut solver = MultigridSolver::builder()
        .tolerance(1e-9)
        .max_cycles(200)
        .build()
        .unwrap();
    let report = solve(&mut solver, &mut domain, &[], &[], 1.0).unwrap();
    assert!(report.cycles > 0);
    assert!(solver.depth().unwrap() > 1, "32 cells should coarsen");
    for v in interior(&domain) {
        assert!((v - 2.0).abs() < 1e-5, "got {v}");
    }
}

#[test]
fn column_between_two_fixed_ends_is_linear() {
    let (c0, c1) = (1.0, 3.0);
    let n = 32;
    let mut domain = column_domain(
        n,
        BoundaryKind::Constant { values: vec![c0] },
        BoundaryKind::Constant { values: vec![c1] },
        0.0,
    );
    let mut solver = MultigridSolver::builder()
        .tolerance(1e-9)
        .max_cycles(200)
        .build()
        .unwrap();
    solve(&mut solver, &mut domain, &[], &[], 1.0).unwrap();
    let u = interior(&domain);
    for (i, v) in u.iter().enumerate() {
        // Faces sit half a cell outside the outermost centres.
        let exact = c0 + (c1 - c0) * (i as f64 + 0.5) / n as f64;
        assert!((v - exact).abs() < 1e-4, "cell {i}: {v} vs {exact}");
    }
}

#[test]
fn committed_field_satisfies_discrete_equation() {
    let mut domain = column_domain(
        16,
        BoundaryKind::Constant { values: vec![0.0] },
        BoundaryKind::Constant { values: vec![5.0] },
        1.0,
    );
    let tol = 1e-8;
    let mut solver = MultigridSolver::builder()
        .tolerance(tol)
        .max_cycles(200)
        .build()
        .unwrap();
    solve(&mut solver, &mut domain, &[], &[], 1.0).unwrap();
    let g = domain.solute_grid(S).unwrap();
    for i in 0..16 {
        let lap = g.at(i - 1, 0, 0) + g.at(i + 1, 0, 0) - 2.0 * g.at(i, 0, 0);
        assert!(lap.abs() / 2.0 <= tol * 1.0001, "cell {i}: {lap}");
    }
}

#[test]
fn steady_uniform_field_is_left_alone() {
    let mut domain = column_domain(
        8,
        BoundaryKind::Constant { values: vec![0.7] },
        BoundaryKind::Constant { values: vec![0.7] },
        0.7,
    );
    let mut solver = MultigridSolver::builder().build().unwrap();
    let report = solve(&mut solver, &mut domain, &[], &[], 1.0).unwrap();
    assert_eq!(report.cycles, 0);
    assert!(interior(&domain).iter().all(|v| *v == 0.7));
}

/// Closed column of `n` cells with the first four holding 4.0.
fn pulse_column(n: usize) -> Domain {
    let mut domain = column_domain(n, BoundaryKind::ZeroFlux, BoundaryKind::ZeroFlux, 0.0);
    let g = domain.solute_grid_mut(S).unwrap();
    for i in 0..4 {
        *g.at_mut(i, 0, 0) = 4.0;
    }
    domain
}

#[test]
fn steady_closed_domain_keeps_its_mass() {
    let mut domain = pulse_column(16);
    let before: f64 = interior(&domain).iter().sum();
    assert_eq!(before, 16.0);
    let mut solver = MultigridSolver::builder()
        .mode(SolveMode::Steady)
        .tolerance(1e-10)
        .max_cycles(200)
        .build()
        .unwrap();
    solve(&mut solver, &mut domain, &[], &[], 1.0).unwrap();
    let after = interior(&domain);
    let total: f64 = after.iter().sum();
    assert!((total - before).abs() < 1e-9, "{before} -> {total}");
    // With no source and no open face the steady state is the mean.
    for v in &after {
        assert!((v - 1.0).abs() < 1e-6, "got {v}");
    }
}

#[test]
fn transient_closed_domain_conserves_mass() {
    let mut domain = pulse_column(16);
    let before: f64 = interior(&domain).iter().sum();
    let mut solver = MultigridSolver::builder()
        .mode(SolveMode::Transient)
        .tolerance(1e-10)
        .max_cycles(200)
        .build()
        .unwrap();
    solve(&mut solver, &mut domain, &[], &[], 2.0).unwrap();
    let after = interior(&domain);
    let total: f64 = after.iter().sum();
    assert!((total - before).abs() < 1e-6, "{before} -> {total}");
    // Implicit diffusion spreads the pulse without overshoot.
    assert!(after[0] < 4.0 && after[15] > 0.0);
    assert!(after.windows(2).all(|w| w[0] >= w[1] - 1e-9));
}

// ── Reaction tests ──────────────────────────────────────────────

fn slab_with_biofilm(
    n: usize,
    res: f64,
    thickness: i32,
    density: f64,
) -> (Domain, Vec<SpatialGrid>) {
    let domain = slab_domain(n, res, 1.0);
    let mut catalyst = uniform_grid(&domain, 0.0);
    let shape = catalyst.shape();
    for c in shape.interior() {
        if c.i < thickness {
            *catalyst.at_mut(c.i, c.j, c.k) = density;
        }
    }
    (domain, vec![catalyst])
}

#[test]
fn monod_uptake_converges_to_bounded_monotone_profile() {
    let (mut domain, catalysts) = slab_with_biofilm(16, 4.0, 6, 5.0);
    let reactions = vec![monod_uptake(S, 1.0, 0.1, 1.0)];
    let mut solver = MultigridSolver::builder()
        .tolerance(1e-7)
        .max_cycles(200)
        .build()
        .unwrap();
    let report = solve(&mut solver, &mut domain, &reactions, &catalysts, 1.0).unwrap();
    assert!(report.reaction_rates[0] < 0.0, "substrate must be consumed");

    let g = domain.solute_grid(S).unwrap();
    for c in g.shape().interior() {
        let v = g.at(c.i, c.j, c.k);
        assert!((0.0..=1.0 + 1e-9).contains(&v), "{v} at {c:?}");
    }
    // Periodic in y and uniform biomass: every row matches, increasing
    // towards the bulk.
    for i in 0..15 {
        assert!(g.at(i, 0, 0) <= g.at(i + 1, 0, 0) + 1e-9);
        assert!((g.at(i, 0, 0) - g.at(i, 7, 0)).abs() < 1e-5);
    }
    assert!(g.at(0, 0, 0) < 0.5);
}

#[test]
fn lagged_linearization_and_w_cycles_agree_with_newton() {
    let reactions = vec![monod_uptake(S, 1.0, 0.5, 1.0)];
    let mut results = Vec::new();
    for (lin, cycle) in [
        (Linearization::Newton, CycleShape::V),
        (Linearization::Lagged, CycleShape::W),
    ] {
        let (mut domain, catalysts) = slab_with_biofilm(8, 1.0, 3, 1.0);
        let mut solver = MultigridSolver::builder()
            .linearization(lin)
            .cycle(cycle)
            .tolerance(1e-9)
            .max_cycles(300)
            .build()
            .unwrap();
        solve(&mut solver, &mut domain, &reactions, &catalysts, 1.0).unwrap();
        results.push(interior(&domain));
    }
    for (a, b) in results[0].iter().zip(&results[1]) {
        assert!((a - b).abs() < 1e-5, "{a} vs {b}");
    }
}

#[test]
fn zero_concentration_never_produces_nan() {
    let (mut domain, catalysts) = slab_with_biofilm(8, 4.0, 8, 50.0);
    domain.solute_grid_mut(S).unwrap().set_all(0.0);
    let reactions = vec![monod_uptake(S, 2.0, 1e-3, 1.0)];
    let mut solver = MultigridSolver::builder().max_cycles(200).build().unwrap();
    let report = solve(&mut solver, &mut domain, &reactions, &catalysts, 1.0);
    assert!(report.is_ok(), "{report:?}");
    let u = interior(&domain);
    assert!(u.iter().all(|v| v.is_finite() && *v >= 0.0), "{u:?}");
}

// ── Convergence rate tests ──────────────────────────────────────

/// Largest scaled residual left after exactly `cycles` cycles.
fn residual_after(n: usize, cycles: usize, shape: CycleShape) -> f64 {
    let mut domain = column_domain(
        n,
        BoundaryKind::Constant { values: vec![2.0] },
        BoundaryKind::ZeroFlux,
        0.0,
    );
    let mut solver = MultigridSolver::builder()
        .cycle(shape)
        .tolerance(1e-30)
        .max_cycles(cycles)
        .build()
        .unwrap();
    match solve(&mut solver, &mut domain, &[], &[], 1.0) {
        Err(SolverError::NonConvergence { residual, cycles: ran, .. }) => {
            assert_eq!(ran, cycles);
            residual
        }
        other => panic!("expected the cycle budget to run out: {other:?}"),
    }
}

#[test]
fn every_cycle_contracts_the_residual() {
    for shape in [CycleShape::V, CycleShape::W] {
        for n in [16, 32, 64] {
            let residuals: Vec<f64> = (1..=6).map(|k| residual_after(n, k, shape)).collect();
            for (k, w) in residuals.windows(2).enumerate() {
                assert!(
                    w[1] <= 0.5 * w[0],
                    "{shape:?} n={n} cycle {}: {:e} -> {:e}",
                    k + 2,
                    w[0],
                    w[1]
                );
            }
        }
    }
}

#[test]
fn default_config_converges_on_a_deep_grid() {
    let n = 64;
    let mut domain = column_domain(
        n,
        BoundaryKind::Constant { values: vec![0.0] },
        BoundaryKind::Constant { values: vec![4.0] },
        0.0,
    );
    let mut solver = MultigridSolver::builder().build().unwrap();
    let report = solve(&mut solver, &mut domain, &[], &[], 1.0).unwrap();
    assert_eq!(solver.depth(), Some(6), "64 -> 32 -> 16 -> 8 -> 4 -> 2");
    assert!(report.cycles <= 20, "took {} cycles", report.cycles);
    for (i, v) in interior(&domain).iter().enumerate() {
        let exact = 4.0 * (i as f64 + 0.5) / n as f64;
        assert!((v - exact).abs() < 5e-3, "cell {i}: {v} vs {exact}");
    }
}

// ── Failure tests ───────────────────────────────────────────────

#[test]
fn exhausted_cycle_budget_reports_non_convergence_and_commits_nothing() {
    let mut domain = column_domain(
        32,
        BoundaryKind::Constant { values: vec![1.0] },
        BoundaryKind::Constant { values: vec![9.0] },
        0.0,
    );
    let mut solver = MultigridSolver::builder()
        .max_cycles(1)
        .sweeps(1, 0)
        .tolerance(1e-12)
        .build()
        .unwrap();
    let err = solve(&mut solver, &mut domain, &[], &[], 1.0).unwrap_err();
    assert!(err.is_recoverable());
    match err {
        SolverError::NonConvergence {
            solver, solute, cycles, ..
        } => {
            assert_eq!(solver, "multigrid");
            assert_eq!(solute, "s");
            assert_eq!(cycles, 1);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(interior(&domain).iter().all(|v| *v == 0.0));
}

#[test]
fn unknown_selected_solute_is_rejected() {
    let mut domain = column_domain(5, BoundaryKind::ZeroFlux, BoundaryKind::ZeroFlux, 0.0);
    let mut solver = MultigridSolver::builder()
        .solute(SoluteId(3))
        .build()
        .unwrap();
    let err = solver.initialize(&domain).unwrap_err();
    assert!(matches!(err, SolverError::ExecutionFailed { .. }));
    let mut ctx = SolverContext::new(&mut domain, &[], &[], StepId(1), 0.0, 1.0);
    assert!(solver.solve(&mut ctx).is_err());
}

#[test]
fn grid_that_does_not_coarsen_is_rejected() {
    for n in [17, 100] {
        let domain = column_domain(n, BoundaryKind::ZeroFlux, BoundaryKind::ZeroFlux, 0.0);
        let mut solver = MultigridSolver::builder().build().unwrap();
        match solver.initialize(&domain).unwrap_err() {
            SolverError::UnsupportedGrid { dims, .. } => assert_eq!(dims, [n, 1, 1]),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(solver.depth().is_none());
    }
    let domain = column_domain(24, BoundaryKind::ZeroFlux, BoundaryKind::ZeroFlux, 0.0);
    let mut solver = MultigridSolver::builder().build().unwrap();
    solver.initialize(&domain).unwrap();
    assert_eq!(solver.depth(), Some(4), "24 -> 12 -> 6 -> 3");
}

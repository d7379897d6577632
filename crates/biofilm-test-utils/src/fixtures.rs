//! Mock solvers for engine testing.
//!
//! - [`CountingSolver`]: succeeds and leaves the domain alone.
//! - [`FailingSolver`]: reports non-convergence for a fixed number of
//!   calls, scribbling on the domain first so rollback can be checked.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use biofilm_core::{SoluteId, SolverError};
use biofilm_solver::{DiffusionSolver, SolveReport, SolverContext};

/// Counts calls and otherwise does nothing.
pub struct CountingSolver {
    pub name: String,
    calls: Arc<AtomicUsize>,
}

impl CountingSolver {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared handle to the call counter, usable after the solver has
    /// been moved into an engine.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl DiffusionSolver for CountingSolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn solutes(&self) -> &[SoluteId] {
        &[]
    }

    fn solve(&mut self, _ctx: &mut SolverContext<'_>) -> Result<SolveReport, SolverError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(SolveReport {
            cycles: 0,
            residual: 0.0,
            reaction_rates: Vec::new(),
        })
    }
}

/// Fails with [`SolverError::NonConvergence`] on the first `failures`
/// calls, then succeeds.
///
/// Before failing it overwrites solute 0 with `poison`, mimicking a
/// solver that gave up half way.
pub struct FailingSolver {
    pub name: String,
    failures: usize,
    poison: f64,
    calls: Arc<AtomicUsize>,
}

impl FailingSolver {
    pub fn new(name: impl Into<String>, failures: usize) -> Self {
        Self {
            name: name.into(),
            failures,
            poison: f64::NAN,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Value written into solute 0 before each failure.
    pub fn with_poison(mut self, value: f64) -> Self {
        self.poison = value;
        self
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl DiffusionSolver for FailingSolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn solutes(&self) -> &[SoluteId] {
        &[]
    }

    fn solve(&mut self, ctx: &mut SolverContext<'_>) -> Result<SolveReport, SolverError> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed);
        if n < self.failures {
            if let Some(g) = ctx.domain_mut().solute_grid_mut(SoluteId(0)) {
                g.set_all(self.poison);
            }
            return Err(SolverError::NonConvergence {
                solver: self.name.clone(),
                solute: "s".into(),
                residual: 1.0,
                tolerance: 1e-6,
                cycles: n + 1,
            });
        }
        Ok(SolveReport {
            cycles: 1,
            residual: 0.0,
            reaction_rates: Vec::new(),
        })
    }
}

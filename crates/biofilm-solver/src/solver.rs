//! The [`DiffusionSolver`] trait and its execution context.

use biofilm_core::{SoluteId, SolverError, StepId};
use biofilm_grid::{Domain, SpatialGrid};
use biofilm_kinetics::Reaction;

/// Everything a solver reads or writes during one step.
///
/// Catalyst grids are indexed like `reactions` and hold the catalyst mass
/// density of each reaction per cell, on the domain's grid shape.
pub struct SolverContext<'a> {
    domain: &'a mut Domain,
    reactions: &'a [Reaction],
    catalysts: &'a [SpatialGrid],
    volume_rate: Option<&'a SpatialGrid>,
    step: StepId,
    now: f64,
    dt: f64,
}

impl<'a> SolverContext<'a> {
    /// Construct a context.
    ///
    /// Typically called by the simulation driver; tests build one around a
    /// fixture domain.
    pub fn new(
        domain: &'a mut Domain,
        reactions: &'a [Reaction],
        catalysts: &'a [SpatialGrid],
        step: StepId,
        now: f64,
        dt: f64,
    ) -> Self {
        Self {
            domain,
            reactions,
            catalysts,
            volume_rate: None,
            step,
            now,
            dt,
        }
    }

    /// Attach the biomass volume-rate grid used by the pressure solver.
    pub fn with_volume_rate(mut self, volume_rate: &'a SpatialGrid) -> Self {
        self.volume_rate = Some(volume_rate);
        self
    }

    /// The domain.
    pub fn domain(&self) -> &Domain {
        &*self.domain
    }

    /// Mutable domain.
    pub fn domain_mut(&mut self) -> &mut Domain {
        &mut *self.domain
    }

    /// Every reaction in the simulation.
    pub fn reactions(&self) -> &'a [Reaction] {
        self.reactions
    }

    /// Catalyst density per reaction.
    pub fn catalysts(&self) -> &'a [SpatialGrid] {
        self.catalysts
    }

    /// Biomass volume rate, if the driver supplied one.
    pub fn volume_rate(&self) -> Option<&'a SpatialGrid> {
        self.volume_rate
    }

    /// Current step.
    pub fn step(&self) -> StepId {
        self.step
    }

    /// Simulation time at the start of the step.
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Step length.
    pub fn dt(&self) -> f64 {
        self.dt
    }
}

/// Outcome of a successful solve.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SolveReport {
    /// Cycles (multigrid) or accepted steps (ODE) taken.
    pub cycles: usize,
    /// Final residual or error estimate.
    pub residual: f64,
    /// Domain-averaged net reaction rate per solute after the solve.
    pub reaction_rates: Vec<f64>,
}

/// A solver that advances solute fields over one step.
///
/// # Contract
///
/// - `solve()` either commits a converged result into the domain and
///   returns `Ok`, or leaves the domain's solute grids untouched and
///   returns `Err`.
/// - [`SolverError::NonConvergence`] is the only error the driver
///   retries.
///
/// # Object safety
///
/// This trait is object-safe; the driver stores solvers as
/// `Vec<Box<dyn DiffusionSolver>>`.
pub trait DiffusionSolver {
    /// Human-readable name for error reporting and metrics.
    fn name(&self) -> &str;

    /// Solutes this solver updates.
    fn solutes(&self) -> &[SoluteId];

    /// Prepare working storage for `domain`. Called once before the first
    /// solve. Default: no-op.
    fn initialize(&mut self, _domain: &Domain) -> Result<(), SolverError> {
        Ok(())
    }

    /// Advance the solver's solutes over `ctx.dt()`.
    fn solve(&mut self, ctx: &mut SolverContext<'_>) -> Result<SolveReport, SolverError>;

    /// Largest step this solver allows. Default: no constraint.
    fn time_constraint(&self) -> Option<f64> {
        None
    }
}

//! General reaction-diffusion solver.
//!
//! Solves every registered solute at once, since reactions couple them,
//! and commits the fields only after the finest-level residual is within
//! tolerance. On success the bulks are advanced with the resulting
//! reaction rates.

use biofilm_core::{SoluteId, SolverError};
use biofilm_grid::{Domain, GridRole, SpatialGrid};
use log::debug;

use crate::config::{CycleShape, Linearization, MultigridConfig, SolveMode};
use crate::hierarchy::{FieldSpec, Hierarchy, Source};
use crate::solver::{DiffusionSolver, SolveReport, SolverContext};

/// FAS multigrid solver for coupled reaction-diffusion.
///
/// # Construction
///
/// ```
/// use biofilm_solver::{CycleShape, MultigridSolver};
///
/// let solver = MultigridSolver::builder()
///     .tolerance(1e-8)
///     .cycle(CycleShape::W)
///     .build()
///     .unwrap();
/// assert_eq!(solver.config().tolerance, 1e-8);
/// ```
#[derive(Debug)]
pub struct MultigridSolver {
    name: String,
    selected: Option<Vec<SoluteId>>,
    solutes: Vec<SoluteId>,
    config: MultigridConfig,
    hierarchy: Option<Hierarchy>,
    catalyst_count: usize,
}

/// Builder for [`MultigridSolver`].
///
/// All fields are optional: by default every domain solute is solved with
/// [`MultigridConfig::default`].
pub struct MultigridSolverBuilder {
    name: String,
    selected: Option<Vec<SoluteId>>,
    config: MultigridConfig,
}

impl MultigridSolver {
    /// Create a new builder.
    pub fn builder() -> MultigridSolverBuilder {
        MultigridSolverBuilder {
            name: "multigrid".to_string(),
            selected: None,
            config: MultigridConfig::default(),
        }
    }

    /// Active parameters.
    pub fn config(&self) -> &MultigridConfig {
        &self.config
    }

    /// Number of grid levels, once initialised.
    pub fn depth(&self) -> Option<usize> {
        self.hierarchy.as_ref().map(Hierarchy::depth)
    }

    fn prepare(&mut self, domain: &Domain, catalysts: usize) -> Result<(), SolverError> {
        let all: Vec<SoluteId> = (0..domain.solute_count())
            .map(|i| SoluteId(i as u32))
            .collect();
        let solved = match &self.selected {
            Some(ids) => {
                if let Some(bad) = ids.iter().find(|id| domain.solute(**id).is_none()) {
                    return Err(SolverError::ExecutionFailed {
                        reason: format!("solute {bad} is not registered in the domain"),
                    });
                }
                ids.clone()
            }
            None => all.clone(),
        };
        let fields = all
            .iter()
            .map(|&id| {
                let spec = &domain.solutes()[id.index()];
                FieldSpec {
                    name: spec.name.clone(),
                    role: GridRole::Solute(id),
                    diffusivity: spec.diffusivity,
                    signed: spec.signed,
                    solved: solved.contains(&id),
                    pinned: Some(domain.max_bulk_value(id)),
                }
            })
            .collect();
        self.hierarchy = Some(Hierarchy::new(
            domain.shape(),
            domain.resolution(),
            fields,
            catalysts,
        )?);
        self.solutes = solved;
        self.catalyst_count = catalysts;
        Ok(())
    }
}

impl MultigridSolverBuilder {
    /// Solver name used in reports. Default: `"multigrid"`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Restrict relaxation to this solute. May be called repeatedly.
    /// Unlisted solutes still take part in reactions at their current
    /// values.
    pub fn solute(mut self, id: SoluteId) -> Self {
        self.selected.get_or_insert_with(Vec::new).push(id);
        self
    }

    /// Replace every parameter at once.
    pub fn config(mut self, config: MultigridConfig) -> Self {
        self.config = config;
        self
    }

    /// Residual tolerance.
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.config.tolerance = tolerance;
        self
    }

    /// Cycle budget on the finest level.
    pub fn max_cycles(mut self, cycles: usize) -> Self {
        self.config.max_cycles = cycles;
        self
    }

    /// Pre- and post-smoothing sweeps.
    pub fn sweeps(mut self, pre: usize, post: usize) -> Self {
        self.config.n_pre = pre;
        self.config.n_post = post;
        self
    }

    /// Sweeps on the coarsest level.
    pub fn coarse_sweeps(mut self, sweeps: usize) -> Self {
        self.config.n_coarse = sweeps;
        self
    }

    /// Cycle recursion pattern.
    pub fn cycle(mut self, cycle: CycleShape) -> Self {
        self.config.cycle = cycle;
        self
    }

    /// Reaction term linearization.
    pub fn linearization(mut self, linearization: Linearization) -> Self {
        self.config.linearization = linearization;
        self
    }

    /// Steady or transient solve.
    pub fn mode(mut self, mode: SolveMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Build the solver.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the configuration fails
    /// [`MultigridConfig::validate`].
    pub fn build(self) -> Result<MultigridSolver, String> {
        self.config.validate()?;
        Ok(MultigridSolver {
            name: self.name,
            solutes: self.selected.clone().unwrap_or_default(),
            selected: self.selected,
            config: self.config,
            hierarchy: None,
            catalyst_count: 0,
        })
    }
}

impl DiffusionSolver for MultigridSolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn solutes(&self) -> &[SoluteId] {
        &self.solutes
    }

    fn initialize(&mut self, domain: &Domain) -> Result<(), SolverError> {
        self.prepare(domain, self.catalyst_count)
    }

    fn solve(&mut self, ctx: &mut SolverContext<'_>) -> Result<SolveReport, SolverError> {
        let catalysts = ctx.catalysts();
        if catalysts.len() != ctx.reactions().len() {
            return Err(SolverError::ExecutionFailed {
                reason: format!(
                    "{} catalyst grids for {} reactions",
                    catalysts.len(),
                    ctx.reactions().len()
                ),
            });
        }
        if self.hierarchy.is_none() || self.catalyst_count != catalysts.len() {
            self.prepare(ctx.domain(), catalysts.len())?;
        }
        let transient = match self.config.mode {
            SolveMode::Steady => None,
            SolveMode::Transient => Some(ctx.dt()),
        };
        let Some(h) = self.hierarchy.as_mut() else {
            return Err(SolverError::ExecutionFailed {
                reason: "multigrid hierarchy missing".into(),
            });
        };

        let outcome = {
            let domain = ctx.domain();
            for s in 0..domain.solute_count() {
                h.set_pinned(s, Some(domain.max_bulk_value(SoluteId(s as u32))));
            }
            let initial: Vec<&SpatialGrid> = domain.solute_grids().iter().collect();
            h.load(
                domain,
                &initial,
                catalysts,
                domain.diffusivity_grid(),
                domain.boundary_layer_grid(),
                None,
                transient,
            )?;
            h.cycle_to_tolerance(domain, Source::Reactions(ctx.reactions()), &self.config)?
        };

        if !outcome.converged {
            return Err(SolverError::NonConvergence {
                solver: self.name.clone(),
                solute: h.fields()[outcome.worst].name.clone(),
                residual: outcome.residual,
                tolerance: self.config.tolerance,
                cycles: outcome.cycles,
            });
        }
        debug!(
            "{}: converged in {} cycles over {} levels (residual {:e})",
            self.name,
            outcome.cycles,
            h.depth(),
            outcome.residual
        );

        let rates: Vec<f64> = (0..h.fields().len())
            .map(|s| h.finest_reaction(s).average())
            .collect();
        let (now, dt) = (ctx.now(), ctx.dt());
        let domain = ctx.domain_mut();
        for &id in &self.solutes {
            if let Some(g) = domain.solute_grid_mut(id) {
                g.copy_values_from(h.finest(id.index()))?;
            }
        }
        domain.update_bulks(now, dt, &rates);
        Ok(SolveReport {
            cycles: outcome.cycles,
            residual: outcome.residual,
            reaction_rates: rates,
        })
    }
}

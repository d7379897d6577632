//! Pressure field driving biomass advection.
//!
//! Solves the Poisson problem `∇²p + V = 0`, where `V` is the biomass
//! volume growth rate per cell. Agents then move down the pressure
//! gradient. Pressure is held at zero on open faces (bulk and constant)
//! and mirrored elsewhere; when no face is open the source is shifted to
//! zero mean so that the problem stays solvable.

use biofilm_core::{SoluteId, SolverError};
use biofilm_grid::{BoundaryKind, Domain, GridRole, SpatialGrid};
use log::{debug, warn};

use crate::config::{MultigridConfig, SolveMode};
use crate::hierarchy::{FieldSpec, Hierarchy, Source};
use crate::solver::{DiffusionSolver, SolveReport, SolverContext};

/// Multigrid Poisson solver for biomass pressure.
///
/// The pressure is not a solute: it is kept here and read through
/// [`PressureSolver::pressure_grid`].
#[derive(Debug)]
pub struct PressureSolver {
    name: String,
    config: MultigridConfig,
    hierarchy: Option<Hierarchy>,
    pressure: Option<SpatialGrid>,
    source: Option<SpatialGrid>,
    unit: Option<SpatialGrid>,
}

impl PressureSolver {
    /// Create a solver with the given multigrid parameters. Transient mode
    /// is ignored: pressure is always solved to steady state.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the configuration fails
    /// [`MultigridConfig::validate`].
    pub fn new(config: MultigridConfig) -> Result<Self, String> {
        config.validate()?;
        Ok(Self {
            name: "pressure".to_string(),
            config: MultigridConfig {
                mode: SolveMode::Steady,
                ..config
            },
            hierarchy: None,
            pressure: None,
            source: None,
            unit: None,
        })
    }

    /// Last accepted pressure field, if any solve has succeeded.
    pub fn pressure_grid(&self) -> Option<&SpatialGrid> {
        self.pressure.as_ref()
    }

    /// Whether any active face lets biomass leave the domain.
    pub fn has_open_face(domain: &Domain) -> bool {
        domain.boundaries().iter().any(|bc| {
            domain.shape().is_active(bc.face.axis())
                && matches!(
                    bc.kind,
                    BoundaryKind::Bulk { .. } | BoundaryKind::Constant { .. }
                )
        })
    }

    fn prepare(&mut self, domain: &Domain) -> Result<(), SolverError> {
        let field = FieldSpec {
            name: self.name.clone(),
            role: GridRole::Pressure,
            diffusivity: 1.0,
            signed: true,
            solved: true,
            pinned: None,
        };
        self.hierarchy = Some(Hierarchy::new(
            domain.shape(),
            domain.resolution(),
            vec![field],
            0,
        )?);
        let mut unit = SpatialGrid::new("unit", domain.shape(), domain.resolution())?;
        unit.set_all(1.0);
        self.pressure = Some(unit.zeros_like("pressure"));
        self.source = Some(unit.zeros_like("volume-rate"));
        self.unit = Some(unit);
        Ok(())
    }
}

impl DiffusionSolver for PressureSolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn solutes(&self) -> &[SoluteId] {
        &[]
    }

    fn initialize(&mut self, domain: &Domain) -> Result<(), SolverError> {
        self.prepare(domain)
    }

    fn solve(&mut self, ctx: &mut SolverContext<'_>) -> Result<SolveReport, SolverError> {
        let Some(rate) = ctx.volume_rate() else {
            return Err(SolverError::ExecutionFailed {
                reason: "pressure solve needs a volume-rate grid".into(),
            });
        };
        let domain = ctx.domain();
        if self.hierarchy.is_none() || self.unit.as_ref().map(SpatialGrid::shape) != Some(domain.shape()) {
            self.prepare(domain)?;
        }
        let (Some(h), Some(pressure), Some(source), Some(unit)) = (
            self.hierarchy.as_mut(),
            self.pressure.as_mut(),
            self.source.as_mut(),
            self.unit.as_ref(),
        ) else {
            return Err(SolverError::ExecutionFailed {
                reason: "pressure buffers missing".into(),
            });
        };

        source.copy_values_from(rate)?;
        if !Self::has_open_face(domain) {
            let mean = source.average();
            let shape = source.shape();
            for c in shape.interior() {
                *source.at_mut(c.i, c.j, c.k) -= mean;
            }
        }
        h.load(
            domain,
            &[&*pressure],
            &[],
            unit,
            unit,
            Some(std::slice::from_ref(&*source)),
            None,
        )?;
        let outcome = h.cycle_to_tolerance(domain, Source::Fixed, &self.config)?;
        if !outcome.converged {
            warn!(
                "{}: no convergence after {} cycles (residual {:e})",
                self.name, outcome.cycles, outcome.residual
            );
            return Err(SolverError::NonConvergence {
                solver: self.name.clone(),
                solute: self.name.clone(),
                residual: outcome.residual,
                tolerance: self.config.tolerance,
                cycles: outcome.cycles,
            });
        }
        pressure.copy_values_from(h.finest(0))?;
        debug!(
            "{}: converged in {} cycles, range [{:e}, {:e}]",
            self.name,
            outcome.cycles,
            pressure.min(),
            pressure.max()
        );
        Ok(SolveReport {
            cycles: outcome.cycles,
            residual: outcome.residual,
            reaction_rates: Vec::new(),
        })
    }
}

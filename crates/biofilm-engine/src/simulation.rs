//! The step driver.
//!
//! [`Simulation`] owns the domain, the reactions, the solvers and the
//! agent container, and advances them together one step at a time:
//!
//! 1. spread agent biomass and catalyst mass on the grid;
//! 2. run every solute solver, rolling the domain back and retrying with
//!    half the step on non-convergence;
//! 3. solve the pressure field, if configured, and move agents along it;
//! 4. grow, divide, kill, dilute and shove agents;
//! 5. advance the clock and adapt the next step.
//!
//! A step whose solvers still fail after the retry budget is rolled back
//! and counts as a failed step; after `max_consecutive_failures` failed
//! steps in a row the simulation refuses to step until
//! [`reset_failures`](Simulation::reset_failures) is called.

use std::fmt;
use std::time::Instant;

use biofilm_agents::{AgentContainer, AgentError, AgentRecord, Species};
use biofilm_core::{AgentId, ContinuousVector, SolverError, SpeciesId, StepError, StepId};
use biofilm_grid::{Domain, SpatialGrid};
use biofilm_kinetics::Reaction;
use biofilm_solver::{
    ChemostatSolver, DiffusionSolver, MultigridSolver, PressureSolver, SolverContext,
};
use log::{debug, info, warn};

use crate::config::{ConfigError, SimulationConfig, SolverKind};
use crate::metrics::StepMetrics;
use crate::timer::SimTimer;

// ── Simulation ───────────────────────────────────────────────────

/// A running simulation.
pub struct Simulation {
    config: SimulationConfig,
    domain: Domain,
    reactions: Vec<Reaction>,
    solvers: Vec<Box<dyn DiffusionSolver>>,
    pressure: Option<PressureSolver>,
    agents: AgentContainer,
    timer: SimTimer,
    consecutive_failures: u32,
    disabled: bool,
    last_metrics: StepMetrics,
}

/// Solver timings, summed cycles and worst residual of one attempt.
type SolveOutcome = (Vec<(String, u64)>, usize, f64);

fn agent_error(e: AgentError) -> StepError {
    StepError::Agents {
        reason: e.to_string(),
    }
}

impl Simulation {
    /// Build a simulation with the solver selected by
    /// [`SimulationConfig::solver`].
    ///
    /// `species[i]` must carry `SpeciesId(i)`; reaction indices in the
    /// species refer to positions in `reactions`.
    pub fn new(
        config: SimulationConfig,
        domain: Domain,
        reactions: Vec<Reaction>,
        species: Vec<Species>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let solver: Box<dyn DiffusionSolver> = match &config.solver {
            SolverKind::Multigrid => Box::new(
                MultigridSolver::builder()
                    .config(config.multigrid)
                    .build()
                    .map_err(|reason| ConfigError::InvalidMultigrid { reason })?,
            ),
            SolverKind::Chemostat { bulk } => {
                if domain.bulk(bulk).is_none() {
                    return Err(ConfigError::MissingBulk { name: bulk.clone() });
                }
                Box::new(
                    ChemostatSolver::new(bulk.clone())
                        .with_config(config.chemostat.clone())
                        .map_err(|reason| ConfigError::InvalidChemostat { reason })?,
                )
            }
        };
        Self::with_solvers(config, domain, reactions, species, vec![solver])
    }

    /// Build a simulation around caller-supplied solute solvers, run in
    /// the given order each step. The pressure solver is still created
    /// from the configuration.
    pub fn with_solvers(
        config: SimulationConfig,
        domain: Domain,
        reactions: Vec<Reaction>,
        species: Vec<Species>,
        mut solvers: Vec<Box<dyn DiffusionSolver>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if solvers.is_empty() {
            return Err(ConfigError::NoSolvers);
        }
        for solver in &mut solvers {
            solver
                .initialize(&domain)
                .map_err(|reason| ConfigError::Solver {
                    name: solver.name().to_string(),
                    reason,
                })?;
        }
        let pressure = if config.pressure && config.solver == SolverKind::Multigrid {
            let mut p = PressureSolver::new(config.multigrid)
                .map_err(|reason| ConfigError::InvalidMultigrid { reason })?;
            p.initialize(&domain).map_err(|reason| ConfigError::Solver {
                name: p.name().to_string(),
                reason,
            })?;
            Some(p)
        } else {
            None
        };
        let agents = AgentContainer::new(&domain, species, config.resolved_agents())?;
        let timer = SimTimer::new(&config.timer)?;
        Ok(Self {
            config,
            domain,
            reactions,
            solvers,
            pressure,
            agents,
            timer,
            consecutive_failures: 0,
            disabled: false,
            last_metrics: StepMetrics::default(),
        })
    }

    // ── Accessors ────────────────────────────────────────────────

    /// Active configuration.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The domain with the current solute fields.
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Mutable domain, e.g. to adjust bulk values between steps.
    pub fn domain_mut(&mut self) -> &mut Domain {
        &mut self.domain
    }

    /// Every reaction.
    pub fn reactions(&self) -> &[Reaction] {
        &self.reactions
    }

    /// The agent container.
    pub fn agents(&self) -> &AgentContainer {
        &self.agents
    }

    /// The clock.
    pub fn timer(&self) -> &SimTimer {
        &self.timer
    }

    /// Last accepted pressure field, if pressure is solved.
    pub fn pressure_grid(&self) -> Option<&SpatialGrid> {
        self.pressure.as_ref().and_then(PressureSolver::pressure_grid)
    }

    /// Whether stepping is disabled after consecutive failures.
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Failed steps since the last successful one.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Metrics of the last successful step.
    pub fn last_metrics(&self) -> &StepMetrics {
        &self.last_metrics
    }

    /// Exported state of every live agent.
    pub fn snapshot(&self) -> Vec<AgentRecord> {
        self.agents.snapshot()
    }

    /// Create an agent of `species` at `position` with the given particle
    /// masses.
    pub fn add_agent(
        &mut self,
        species: SpeciesId,
        position: ContinuousVector,
        masses: Vec<f64>,
    ) -> Result<AgentId, AgentError> {
        self.agents.create(&self.domain, species, position, masses)
    }

    /// Clear the failure counter and allow stepping again.
    pub fn reset_failures(&mut self) {
        self.consecutive_failures = 0;
        self.disabled = false;
    }

    // ── Stepping ─────────────────────────────────────────────────

    /// Advance the simulation by one step.
    ///
    /// # Errors
    ///
    /// - [`StepError::Disabled`] after too many consecutive failures.
    /// - [`StepError::Finished`] once the end time is reached.
    /// - [`StepError::SolverFailed`] when a solver fails beyond the retry
    ///   budget; the domain is left as it was before the step.
    /// - [`StepError::Agents`] when the agent update fails.
    pub fn step(&mut self) -> Result<StepMetrics, StepError> {
        let start = Instant::now();
        if self.disabled {
            return Err(StepError::Disabled);
        }
        if self.timer.is_finished() {
            return Err(StepError::Finished);
        }

        // 1. Register agents on the grid.
        let biomass = self
            .agents
            .fit_biomass_on_grid(self.domain.domain_grid())
            .map_err(agent_error)?;
        self.domain
            .refresh_biofilm_grids(&biomass)
            .map_err(|e| agent_error(e.into()))?;
        let catalysts = self
            .agents
            .fit_mass_on_grid(&self.reactions, self.domain.domain_grid())
            .map_err(agent_error)?;

        // 2. Solute fields, retried with a shrinking step.
        let checkpoint = self.domain.checkpoint();
        let mut retries = 0;
        let (mut solver_us, mut cycles, mut residual) = loop {
            match self.solve_fields(&catalysts) {
                Ok(outcome) => break outcome,
                Err((name, reason)) => {
                    self.domain.restore(&checkpoint);
                    if reason.is_recoverable()
                        && retries < self.config.max_retries
                        && self.timer.shrink()
                    {
                        retries += 1;
                        warn!(
                            "solver '{name}' did not converge ({reason}); retrying with dt = {}",
                            self.timer.dt()
                        );
                        continue;
                    }
                    return Err(self.fail(name, reason));
                }
            }
        };
        let step = self.timer.iteration().next();
        let (now, dt) = (self.timer.now(), self.timer.dt());

        // 3. Pressure-driven movement.
        let mut removed = 0;
        if let Some(pressure) = self.pressure.as_mut() {
            let rate = self
                .agents
                .fit_volume_rate_on_grid(self.domain.domain_grid())
                .map_err(agent_error)?;
            let t = Instant::now();
            let mut ctx =
                SolverContext::new(&mut self.domain, &self.reactions, &catalysts, step, now, dt)
                    .with_volume_rate(&rate);
            match pressure.solve(&mut ctx) {
                Ok(report) => {
                    cycles += report.cycles;
                    residual = residual.max(report.residual);
                    solver_us.push((pressure.name().to_string(), t.elapsed().as_micros() as u64));
                }
                Err(reason) => {
                    let name = pressure.name().to_string();
                    self.domain.restore(&checkpoint);
                    return Err(self.fail(name, reason));
                }
            }
            if let Some(p) = pressure.pressure_grid() {
                let (_, exited) = self
                    .agents
                    .follow_pressure(&self.domain, p, dt)
                    .map_err(agent_error)?;
                removed += exited;
            }
        }

        // 4. Agents.
        let t = Instant::now();
        let report = self
            .agents
            .step(&self.domain, &self.reactions, now, dt)
            .map_err(agent_error)?;
        let agent_us = t.elapsed().as_micros() as u64;
        removed += report.deaths + report.flushed + report.exited;

        // 5. Clock.
        let constraint = self
            .solvers
            .iter()
            .filter_map(|s| s.time_constraint())
            .fold(self.domain.time_constraint(), f64::min);
        self.timer.advance();
        self.timer.update(constraint);
        self.consecutive_failures = 0;

        let metrics = StepMetrics {
            total_us: start.elapsed().as_micros() as u64,
            solver_us,
            agent_us,
            cycles,
            residual,
            agent_count: report.population,
            removed,
            divisions: report.divisions,
            dt,
            retries,
        };
        debug!(
            "step {step}: t = {:.4}, dt = {dt}, {cycles} cycles, residual {residual:e}, {} agents",
            self.timer.now(),
            metrics.agent_count
        );
        if self.timer.is_finished() {
            info!(
                "simulation finished at t = {} after {} steps",
                self.timer.now(),
                self.timer.iteration()
            );
        }
        self.last_metrics = metrics.clone();
        Ok(metrics)
    }

    /// Step until the end time. Returns the number of completed steps.
    pub fn run(&mut self) -> Result<StepId, StepError> {
        while !self.timer.is_finished() {
            self.step()?;
        }
        Ok(self.timer.iteration())
    }

    /// Run every solute solver once at the current step length.
    fn solve_fields(
        &mut self,
        catalysts: &[SpatialGrid],
    ) -> Result<SolveOutcome, (String, SolverError)> {
        let step = self.timer.iteration().next();
        let (now, dt) = (self.timer.now(), self.timer.dt());
        let mut timings = Vec::with_capacity(self.solvers.len());
        let mut cycles = 0;
        let mut residual = 0.0_f64;
        for solver in &mut self.solvers {
            let t = Instant::now();
            let mut ctx =
                SolverContext::new(&mut self.domain, &self.reactions, catalysts, step, now, dt);
            let report = solver
                .solve(&mut ctx)
                .map_err(|e| (solver.name().to_string(), e))?;
            cycles += report.cycles;
            residual = residual.max(report.residual);
            timings.push((solver.name().to_string(), t.elapsed().as_micros() as u64));
        }
        Ok((timings, cycles, residual))
    }

    /// Record a failed step.
    fn fail(&mut self, name: String, reason: SolverError) -> StepError {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.config.max_consecutive_failures {
            self.disabled = true;
            warn!(
                "stepping disabled after {} consecutive failed steps (last: solver '{name}': {reason})",
                self.consecutive_failures
            );
        }
        StepError::SolverFailed { name, reason }
    }
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("domain", &self.domain.name())
            .field("reactions", &self.reactions.len())
            .field(
                "solvers",
                &self.solvers.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("pressure", &self.pressure.is_some())
            .field("agents", &self.agents.len())
            .field("now", &self.timer.now())
            .field("dt", &self.timer.dt())
            .field("disabled", &self.disabled)
            .finish()
    }
}

//! Simulation configuration, validation, and error types.
//!
//! [`SimulationConfig`] gathers the parameters of every layer. Its
//! [`validate()`](SimulationConfig::validate) checks them once at
//! startup; the domain-dependent checks (named bulks exist) run in
//! [`Simulation::new`](crate::Simulation::new).

use std::error::Error;
use std::fmt;

use biofilm_agents::{AgentConfig, AgentError};
use biofilm_core::SolverError;
use biofilm_grid::GridError;
use biofilm_solver::{ChemostatConfig, MultigridConfig};

use crate::timer::TimerConfig;

// ── SolverKind ─────────────────────────────────────────────────────

/// How solute fields are advanced.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum SolverKind {
    /// Reaction-diffusion on the domain grid with the multigrid solver.
    #[default]
    Multigrid,
    /// One well-mixed compartment backed by the named bulk.
    Chemostat {
        /// Bulk holding the reactor liquid.
        bulk: String,
    },
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while validating a configuration or assembling a
/// simulation.
#[derive(Debug, PartialEq)]
pub enum ConfigError {
    /// Clock parameters are inconsistent.
    InvalidTimer {
        /// Description of the violated constraint.
        reason: String,
    },
    /// Multigrid parameters are invalid.
    InvalidMultigrid {
        /// Description of the violated constraint.
        reason: String,
    },
    /// Chemostat integrator parameters are invalid.
    InvalidChemostat {
        /// Description of the violated constraint.
        reason: String,
    },
    /// Agent layer parameters are invalid.
    InvalidAgents {
        /// Description of the violated constraint.
        reason: String,
    },
    /// Retry policy is unusable.
    InvalidRetryPolicy {
        /// Description of the violated constraint.
        reason: String,
    },
    /// A named bulk is not part of the domain.
    MissingBulk {
        /// The bulk name.
        name: String,
    },
    /// No solver would run.
    NoSolvers,
    /// A solver could not prepare its working storage.
    Solver {
        /// Name of the solver.
        name: String,
        /// The underlying error.
        reason: SolverError,
    },
    /// The domain rejected a grid operation.
    Grid(GridError),
    /// The agent container could not be built.
    Agents(AgentError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTimer { reason } => write!(f, "invalid timer config: {reason}"),
            Self::InvalidMultigrid { reason } => write!(f, "invalid multigrid config: {reason}"),
            Self::InvalidChemostat { reason } => write!(f, "invalid chemostat config: {reason}"),
            Self::InvalidAgents { reason } => write!(f, "invalid agent config: {reason}"),
            Self::InvalidRetryPolicy { reason } => write!(f, "invalid retry policy: {reason}"),
            Self::MissingBulk { name } => write!(f, "bulk '{name}' is not in the domain"),
            Self::NoSolvers => write!(f, "no solver configured"),
            Self::Solver { name, reason } => {
                write!(f, "solver '{name}' failed to initialize: {reason}")
            }
            Self::Grid(e) => write!(f, "grid: {e}"),
            Self::Agents(e) => write!(f, "agents: {e}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Solver { reason, .. } => Some(reason),
            Self::Grid(e) => Some(e),
            Self::Agents(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GridError> for ConfigError {
    fn from(e: GridError) -> Self {
        Self::Grid(e)
    }
}

impl From<AgentError> for ConfigError {
    fn from(e: AgentError) -> Self {
        Self::Agents(e)
    }
}

// ── SimulationConfig ───────────────────────────────────────────────

/// Complete configuration of a simulation run.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    /// Clock parameters.
    pub timer: TimerConfig,
    /// Solute field solver.
    pub solver: SolverKind,
    /// Multigrid parameters, used by the multigrid and pressure solvers.
    pub multigrid: MultigridConfig,
    /// Rosenbrock parameters, used by the chemostat solver.
    pub chemostat: ChemostatConfig,
    /// Agent layer parameters.
    pub agents: AgentConfig,
    /// Whether agents are advected by a biomass pressure field after the
    /// solute solve. Ignored in chemostat mode. Default: false.
    pub pressure: bool,
    /// Retries with a halved step before a step is reported failed.
    /// Default: 4.
    pub max_retries: u32,
    /// Consecutive failed steps after which stepping is disabled.
    /// Default: 3.
    pub max_consecutive_failures: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            timer: TimerConfig::default(),
            solver: SolverKind::default(),
            multigrid: MultigridConfig::default(),
            chemostat: ChemostatConfig::default(),
            agents: AgentConfig::default(),
            pressure: false,
            max_retries: 4,
            max_consecutive_failures: 3,
        }
    }
}

impl SimulationConfig {
    /// Validate every layer's parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 1. Clock.
        self.timer.validate()?;
        // 2. Multigrid.
        self.multigrid
            .validate()
            .map_err(|reason| ConfigError::InvalidMultigrid { reason })?;
        // 3. Chemostat integrator.
        self.chemostat
            .validate()
            .map_err(|reason| ConfigError::InvalidChemostat { reason })?;
        // 4. Agents.
        self.agents
            .validate()
            .map_err(|reason| ConfigError::InvalidAgents { reason })?;
        // 5. Agents must dilute in the same bulk the chemostat solver uses.
        if let (SolverKind::Chemostat { bulk }, Some(agent_bulk)) =
            (&self.solver, &self.agents.chemostat_bulk)
        {
            if bulk != agent_bulk {
                return Err(ConfigError::InvalidAgents {
                    reason: format!(
                        "agents dilute in bulk '{agent_bulk}' but the chemostat uses '{bulk}'"
                    ),
                });
            }
        }
        if let (SolverKind::Multigrid, Some(agent_bulk)) = (&self.solver, &self.agents.chemostat_bulk)
        {
            return Err(ConfigError::InvalidAgents {
                reason: format!("agents dilute in bulk '{agent_bulk}' without a chemostat solver"),
            });
        }
        // 6. Retry policy.
        if self.max_consecutive_failures == 0 {
            return Err(ConfigError::InvalidRetryPolicy {
                reason: "max_consecutive_failures must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Agent parameters with the chemostat bulk filled in from the solver
    /// selection.
    pub(crate) fn resolved_agents(&self) -> AgentConfig {
        let mut agents = self.agents.clone();
        if let SolverKind::Chemostat { bulk } = &self.solver {
            agents.chemostat_bulk = Some(bulk.clone());
        }
        agents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = SimulationConfig::default();
        assert_eq!(cfg.max_retries, 4);
        assert_eq!(cfg.max_consecutive_failures, 3);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_failure_budget_is_rejected() {
        let cfg = SimulationConfig {
            max_consecutive_failures: 0,
            ..SimulationConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidRetryPolicy { .. })
        ));
    }

    #[test]
    fn bad_multigrid_is_reported() {
        let mut cfg = SimulationConfig::default();
        cfg.multigrid.tolerance = -1.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidMultigrid { .. })
        ));
    }

    #[test]
    fn bad_timer_is_reported_first() {
        let mut cfg = SimulationConfig::default();
        cfg.timer.dt = 0.0;
        cfg.multigrid.tolerance = -1.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidTimer { .. })));
    }

    #[test]
    fn agent_bulk_must_match_chemostat() {
        let mut cfg = SimulationConfig {
            solver: SolverKind::Chemostat {
                bulk: "reactor".into(),
            },
            ..SimulationConfig::default()
        };
        cfg.agents.chemostat_bulk = Some("other".into());
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidAgents { .. })));

        cfg.agents.chemostat_bulk = None;
        assert!(cfg.validate().is_ok());
        assert_eq!(
            cfg.resolved_agents().chemostat_bulk.as_deref(),
            Some("reactor")
        );
    }

    #[test]
    fn dilution_without_chemostat_is_rejected() {
        let mut cfg = SimulationConfig::default();
        cfg.agents.chemostat_bulk = Some("reactor".into());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn solver_error_is_exposed_as_source() {
        let err = ConfigError::Solver {
            name: "mg".into(),
            reason: SolverError::ExecutionFailed {
                reason: "boom".into(),
            },
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("mg"));
    }
}

//! Error types shared across the simulation layers.
//!
//! Grid-level errors live in `biofilm-grid`; this module holds the
//! errors that cross from the solvers into the step driver.

use std::error::Error;
use std::fmt;

/// Errors from a diffusion or bulk solver.
#[derive(Clone, Debug, PartialEq)]
pub enum SolverError {
    /// The multigrid cycle budget was exhausted before the residual fell
    /// below tolerance. Recoverable: the driver may retry with a smaller
    /// step.
    NonConvergence {
        /// Name of the failing solver.
        solver: String,
        /// Name of the solute with the largest residual.
        solute: String,
        /// Largest residual reached.
        residual: f64,
        /// Configured tolerance.
        tolerance: f64,
        /// Number of cycles run on the finest level.
        cycles: usize,
    },
    /// A reaction produced a non-finite rate or derivative.
    InvalidKinetics {
        /// Name of the reaction.
        reaction: String,
        /// The offending value.
        value: f64,
    },
    /// The domain grid does not coarsen into a usable multigrid
    /// hierarchy.
    UnsupportedGrid {
        /// Interior cell counts of the finest grid.
        dims: [usize; 3],
        /// Which axis is at fault and why.
        reason: String,
    },
    /// The solver could not run (inconsistent setup, missing grid).
    ExecutionFailed {
        /// Human-readable description of the failure.
        reason: String,
    },
}

impl SolverError {
    /// Whether the driver may retry the step after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NonConvergence { .. })
    }
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonConvergence {
                solver,
                solute,
                residual,
                tolerance,
                cycles,
            } => write!(
                f,
                "solver '{solver}' did not converge on '{solute}' after {cycles} cycles \
                 (residual {residual:e} > tolerance {tolerance:e})"
            ),
            Self::InvalidKinetics { reaction, value } => {
                write!(f, "reaction '{reaction}' produced non-finite value {value}")
            }
            Self::UnsupportedGrid { dims, reason } => write!(
                f,
                "grid of {}x{}x{} cells is unsupported: {reason}",
                dims[0], dims[1], dims[2]
            ),
            Self::ExecutionFailed { reason } => write!(f, "solver failed: {reason}"),
        }
    }
}

impl Error for SolverError {}

/// Errors from the simulation driver during `step()`.
#[derive(Clone, Debug, PartialEq)]
pub enum StepError {
    /// A solver failed and the retry budget for this step is spent, or the
    /// failure was not recoverable.
    SolverFailed {
        /// Name of the failing solver.
        name: String,
        /// The underlying solver error.
        reason: SolverError,
    },
    /// Stepping is disabled after too many consecutive failed steps.
    Disabled,
    /// The simulation clock has reached its end time.
    Finished,
    /// The agent update could not complete.
    Agents {
        /// Human-readable description of the failure.
        reason: String,
    },
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SolverFailed { name, reason } => {
                write!(f, "solver '{name}' failed: {reason}")
            }
            Self::Disabled => write!(f, "stepping disabled after consecutive failures"),
            Self::Finished => write!(f, "simulation already reached its end time"),
            Self::Agents { reason } => write!(f, "agent step failed: {reason}"),
        }
    }
}

impl Error for StepError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::SolverFailed { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_non_convergence_is_recoverable() {
        let nc = SolverError::NonConvergence {
            solver: "mg".into(),
            solute: "o2".into(),
            residual: 1.0,
            tolerance: 1e-6,
            cycles: 20,
        };
        assert!(nc.is_recoverable());
        let bad = SolverError::InvalidKinetics {
            reaction: "growth".into(),
            value: f64::NAN,
        };
        assert!(!bad.is_recoverable());
    }

    #[test]
    fn unsupported_grid_names_dims_and_is_fatal() {
        let err = SolverError::UnsupportedGrid {
            dims: [17, 1, 1],
            reason: "axis 0 of 17 cells only coarsens to 17 cells".into(),
        };
        assert!(!err.is_recoverable());
        let text = err.to_string();
        assert!(text.contains("17x1x1"), "{text}");
        assert!(text.contains("axis 0"), "{text}");
    }

    #[test]
    fn step_error_exposes_source() {
        let err = StepError::SolverFailed {
            name: "mg".into(),
            reason: SolverError::ExecutionFailed {
                reason: "no grid".into(),
            },
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("no grid"));
        assert!(StepError::Disabled.source().is_none());
    }
}

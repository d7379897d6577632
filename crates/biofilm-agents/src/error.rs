//! Error type for agent operations.

use std::fmt;

use biofilm_core::{AgentId, SolverError, SpeciesId};
use biofilm_grid::GridError;

/// Errors arising from agent creation, movement or growth.
#[derive(Clone, Debug, PartialEq)]
pub enum AgentError {
    /// An agent refers to a species that is not registered.
    UnknownSpecies {
        /// The missing species.
        species: SpeciesId,
    },
    /// An agent id is not (or no longer) held by the container.
    UnknownAgent {
        /// The missing agent.
        agent: AgentId,
    },
    /// Agent state violates an invariant (wrong mass count, non-finite
    /// position, missing capability block).
    InvalidAgent {
        /// What went wrong.
        reason: String,
    },
    /// Agent layer parameters are inconsistent.
    InvalidConfig {
        /// What went wrong.
        reason: String,
    },
    /// Grid access or boundary resolution failed.
    Grid(GridError),
    /// A rate law produced a non-finite value.
    Kinetics(SolverError),
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSpecies { species } => write!(f, "unknown species {species}"),
            Self::UnknownAgent { agent } => write!(f, "unknown agent {agent}"),
            Self::InvalidAgent { reason } => write!(f, "invalid agent: {reason}"),
            Self::InvalidConfig { reason } => write!(f, "invalid agent config: {reason}"),
            Self::Grid(e) => write!(f, "grid error: {e}"),
            Self::Kinetics(e) => write!(f, "kinetics error: {e}"),
        }
    }
}

impl std::error::Error for AgentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Grid(e) => Some(e),
            Self::Kinetics(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GridError> for AgentError {
    fn from(e: GridError) -> Self {
        Self::Grid(e)
    }
}

impl From<SolverError> for AgentError {
    fn from(e: SolverError) -> Self {
        Self::Kinetics(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn grid_errors_are_wrapped_with_source() {
        let e: AgentError = GridError::EmptyGrid.into();
        assert!(matches!(e, AgentError::Grid(GridError::EmptyGrid)));
        assert!(e.source().is_some());
        assert!(e.to_string().starts_with("grid error"));
    }

    #[test]
    fn plain_variants_have_no_source() {
        let e = AgentError::UnknownSpecies {
            species: SpeciesId(4),
        };
        assert!(e.source().is_none());
        assert_eq!(e.to_string(), "unknown species 4");
    }
}

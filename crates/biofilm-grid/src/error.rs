//! Error types for grid and domain operations.

use biofilm_core::{DiscreteVector, SolverError};
use std::fmt;

use crate::boundary::Face;

/// Errors arising from grid access, domain construction or boundary
/// resolution.
#[derive(Clone, Debug, PartialEq)]
pub enum GridError {
    /// An index lies outside the padded extent of a grid.
    OutOfBounds {
        /// The offending index.
        coord: DiscreteVector,
        /// Human-readable description of the valid range.
        bounds: String,
    },
    /// Two grids taking part in an element-wise operation differ in shape.
    ShapeMismatch {
        /// Padded dimensions of the receiving grid.
        expected: [usize; 3],
        /// Padded dimensions of the other grid.
        found: [usize; 3],
    },
    /// Attempted to construct a grid with zero cells on some axis.
    EmptyGrid,
    /// The resolution is not a positive finite number.
    InvalidResolution {
        /// The rejected value.
        value: f64,
    },
    /// More than one boundary condition claims a face, or a position could
    /// not be resolved to a single face.
    BoundaryAmbiguity {
        /// The contested face.
        face: Face,
    },
    /// An active face has no boundary condition.
    MissingBoundary {
        /// The uncovered face.
        face: Face,
    },
    /// A domain or boundary parameter is invalid.
    InvalidParameter {
        /// What went wrong.
        reason: String,
    },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds { coord, bounds } => {
                write!(f, "index {coord} out of bounds: {bounds}")
            }
            Self::ShapeMismatch { expected, found } => {
                write!(f, "grid shape mismatch: expected {expected:?}, found {found:?}")
            }
            Self::EmptyGrid => write!(f, "grid must have at least one cell per axis"),
            Self::InvalidResolution { value } => {
                write!(f, "resolution must be positive and finite, got {value}")
            }
            Self::BoundaryAmbiguity { face } => {
                write!(f, "face {face:?} resolves to more than one boundary condition")
            }
            Self::MissingBoundary { face } => {
                write!(f, "face {face:?} has no boundary condition")
            }
            Self::InvalidParameter { reason } => write!(f, "invalid parameter: {reason}"),
        }
    }
}

impl std::error::Error for GridError {}

impl From<GridError> for SolverError {
    fn from(e: GridError) -> Self {
        SolverError::ExecutionFailed {
            reason: e.to_string(),
        }
    }
}

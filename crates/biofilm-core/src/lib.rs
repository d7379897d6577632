//! Core types for the biofilm simulation engine.
//!
//! This is the leaf crate with no internal dependencies. It defines the
//! identifiers, the continuous and discrete vectors shared by the grid,
//! agent and solver layers, and the error enums that cross crate
//! boundaries.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod id;
pub mod vector;

pub use error::{SolverError, StepError};
pub use id::{AgentId, ReactionId, SoluteId, SpeciesId, StepId};
pub use vector::{ContinuousVector, DiscreteVector};

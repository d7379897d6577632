//! Spatial grids, boundary conditions and domain geometry.
//!
//! - [`SpatialGrid`]: a padded 3D array of doubles with checked discrete
//!   and continuous accessors.
//! - [`BoundaryCondition`]: one of the five face behaviours
//!   (bulk, constant, cyclic, gas membrane, zero flux), used both to fill
//!   ghost layers and to correct agent positions.
//! - [`Bulk`]: a well-mixed reservoir advanced once per step.
//! - [`Domain`]: owns the solute grids, the boundary layout and the bulks.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod boundary;
pub mod bulk;
pub mod domain;
pub mod error;
pub mod grid;

pub use boundary::{
    wrap_coordinate, AgentCrossing, BoundaryCondition, BoundaryKind, Face, GhostInputs, GridRole,
};
pub use bulk::{Bulk, BulkSolute, BulkUpdateMode, Pulse};
pub use domain::{Domain, DomainBuilder, DomainCheckpoint, SoluteSpec};
pub use error::GridError;
pub use grid::{GridShape, SpatialGrid};

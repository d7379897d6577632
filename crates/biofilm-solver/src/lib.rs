//! Field solvers for biofilm simulations.
//!
//! Three implementations of [`DiffusionSolver`] are provided:
//!
//! - [`MultigridSolver`]: coupled reaction-diffusion of every solute on
//!   the domain grid, steady or implicit-transient, using a
//!   full-approximation-scheme multigrid with red-black Gauss-Seidel
//!   smoothing.
//! - [`ChemostatSolver`]: a single well-mixed compartment integrated with
//!   a Rosenbrock method.
//! - [`PressureSolver`]: the Poisson problem for biomass pressure.
//!
//! A solver never leaves a partially updated field behind: results are
//! written into the domain only after the solve has met its tolerance,
//! otherwise [`SolverError::NonConvergence`](biofilm_core::SolverError)
//! is returned and the domain is untouched.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod chemostat;
pub mod config;
mod hierarchy;
pub mod levels;
pub mod multigrid;
pub mod pressure;
pub mod solver;

pub use chemostat::{ChemostatConfig, ChemostatSolver};
pub use config::{CycleShape, Linearization, MultigridConfig, SolveMode};
pub use multigrid::{MultigridSolver, MultigridSolverBuilder};
pub use pressure::PressureSolver;
pub use solver::{DiffusionSolver, SolveReport, SolverContext};

//! Simulation clock and step driver for biofilm simulations.
//!
//! [`Simulation`] couples the solute solvers of `biofilm-solver` with the
//! agents of `biofilm-agents` under one [`SimTimer`]. Each step is
//! atomic with respect to solver failure: a step that does not converge
//! leaves the domain as it found it.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod metrics;
pub mod simulation;
pub mod timer;

pub use config::{ConfigError, SimulationConfig, SolverKind};
pub use metrics::StepMetrics;
pub use simulation::Simulation;
pub use timer::{SimTimer, TimerConfig};

//! Individual-based biofilm simulation.
//!
//! This is the top-level facade crate that re-exports the public API of
//! the biofilm sub-crates. For most users, adding `biofilm` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use biofilm::prelude::*;
//!
//! // A 1D column held at 1.0 on the left and reflective on the right.
//! let domain = Domain::builder("column")
//!     .grid(16, 1, 1)
//!     .resolution(1.0)
//!     .solute("oxygen", 1.0, 0.0)
//!     .face(Face::XMin, BoundaryKind::Constant { values: vec![1.0] })
//!     .face(Face::XMax, BoundaryKind::ZeroFlux)
//!     .build()
//!     .unwrap();
//!
//! let config = SimulationConfig {
//!     timer: TimerConfig { end: 0.2, dt: 0.1, ..TimerConfig::default() },
//!     ..SimulationConfig::default()
//! };
//! let mut sim = Simulation::new(config, domain, vec![], vec![]).unwrap();
//! assert_eq!(sim.run().unwrap(), StepId(2));
//!
//! let oxygen = sim.domain().solute_grid(SoluteId(0)).unwrap();
//! assert!((oxygen.min() - 1.0).abs() < 1e-4);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the
//! prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `biofilm-core` | IDs, vectors, shared error enums |
//! | [`grid`] | `biofilm-grid` | Spatial grids, boundary conditions, bulks, domain |
//! | [`kinetics`] | `biofilm-kinetics` | Kinetic factors, reactions, rate evaluation |
//! | [`solver`] | `biofilm-solver` | Multigrid, chemostat and pressure solvers |
//! | [`agents`] | `biofilm-agents` | Species, agents, container, per-cell index |
//! | [`engine`] | `biofilm-engine` | Clock, configuration, step driver |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core IDs, vectors and errors (`biofilm-core`).
pub use biofilm_core as types;

/// Spatial grids, boundary conditions, bulks and the domain
/// (`biofilm-grid`).
///
/// [`grid::Domain`] owns the solute grids; [`grid::BoundaryKind`] lists
/// the face behaviours.
pub use biofilm_grid as grid;

/// Kinetic factors and reactions (`biofilm-kinetics`).
pub use biofilm_kinetics as kinetics;

/// Field solvers (`biofilm-solver`).
///
/// The [`solver::DiffusionSolver`] trait is the extension point for
/// user-defined field updates.
pub use biofilm_solver as solver;

/// Species, agents and the agent container (`biofilm-agents`).
pub use biofilm_agents as agents;

/// Clock, configuration and step driver (`biofilm-engine`).
pub use biofilm_engine as engine;

/// Common imports for typical usage.
///
/// ```rust
/// use biofilm::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use biofilm_core::{
        AgentId, ContinuousVector, DiscreteVector, ReactionId, SoluteId, SpeciesId, StepId,
    };

    // Errors
    pub use biofilm_core::{SolverError, StepError};
    pub use biofilm_grid::GridError;

    // Grid and domain
    pub use biofilm_grid::{
        BoundaryCondition, BoundaryKind, Bulk, BulkSolute, Domain, Face, SpatialGrid,
    };

    // Kinetics
    pub use biofilm_kinetics::{KineticFactor, Reaction, ReactionKind};

    // Solvers
    pub use biofilm_solver::{
        ChemostatSolver, DiffusionSolver, MultigridConfig, MultigridSolver, PressureSolver,
        SolverContext,
    };

    // Agents
    pub use biofilm_agents::{AgentConfig, AgentContainer, AgentRecord, Species};

    // Engine
    pub use biofilm_engine::{
        SimTimer, Simulation, SimulationConfig, SolverKind, StepMetrics, TimerConfig,
    };
}

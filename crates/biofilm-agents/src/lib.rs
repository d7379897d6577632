//! Agents of an individual-based biofilm model.
//!
//! - [`Species`]: shared parameters of a group of agents.
//! - [`Agent`]: one cell with particle masses and a position.
//! - [`AgentContainer`]: the arena owning every agent, the per-cell
//!   [`AgentGrid`] index and the seeded random number generator.
//!
//! Movement is deferred. Shoving, division and pressure-following each
//! queue displacements in a [`MovementBuffer`]; the container commits
//! the sums in agent-id order, so the result does not depend on the
//! order in which pairs were visited. Agents leaving the system are
//! flagged and purged between passes; the index is rebuilt after every
//! commit or purge.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod agent;
pub mod container;
pub mod error;
pub mod index;
pub mod movement;
pub mod species;

pub use agent::{ActiveState, Agent, LocatedState, Status};
pub use container::{AgentConfig, AgentContainer, AgentRecord, AgentStepReport};
pub use error::AgentError;
pub use index::{AgentGrid, LocatedGroup};
pub use movement::MovementBuffer;
pub use species::{Species, SpeciesBuilder};

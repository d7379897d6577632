//! Reaction kinetics.
//!
//! A [`Reaction`] is an immutable rate law shared by every agent that
//! catalyses it. It maps local concentrations to a specific rate (per
//! unit catalyst mass) and to the analytic derivative of that rate with
//! respect to each controlling solute (the marginal rate). The solvers
//! use both through [`apply_reactions`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod apply;
pub mod factor;
pub mod reaction;

pub use apply::{apply_reactions, net_production};
pub use factor::KineticFactor;
pub use reaction::{FactorTerm, RateEvaluation, Reaction, ReactionBuilder, ReactionKind};

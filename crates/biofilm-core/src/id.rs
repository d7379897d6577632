//! Strongly-typed identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies a solute registered in a domain.
///
/// `SoluteId(n)` is the n-th solute in registration order and doubles as
/// the index into every per-solute vector (yields, bulk values, grids).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SoluteId(pub u32);

impl SoluteId {
    /// Index into per-solute storage.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SoluteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SoluteId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a reaction within a simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReactionId(pub u32);

impl ReactionId {
    /// Index into the reaction table.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ReactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ReactionId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a species (the shared parameter set of a group of agents).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpeciesId(pub u32);

impl SpeciesId {
    /// Index into the species table.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SpeciesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SpeciesId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Counter for unique [`AgentId`] allocation.
static AGENT_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identity of an agent.
///
/// Allocated from a monotonic atomic counter via [`AgentId::next`], so
/// identities are never reused even after an agent is purged. Agent ids
/// also provide the canonical ordering for deterministic movement commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(pub u64);

impl AgentId {
    /// Allocate a fresh, unique agent id.
    pub fn next() -> Self {
        Self(AGENT_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for AgentId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Monotonically increasing simulation step counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepId(pub u64);

impl StepId {
    /// The following step.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for StepId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_ids_are_unique() {
        let a = AgentId::next();
        let b = AgentId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn step_id_advances() {
        assert_eq!(StepId(4).next(), StepId(5));
        assert_eq!(StepId::default(), StepId(0));
    }

    #[test]
    fn display_is_bare_number() {
        assert_eq!(SoluteId(3).to_string(), "3");
        assert_eq!(SpeciesId::from(7).to_string(), "7");
    }
}

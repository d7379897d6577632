//! The agent record and the free functions over its capability blocks.
//!
//! An [`Agent`] is a flat record. What an agent can do is decided by
//! which blocks it carries: [`ActiveState`] (particle masses, growth) and
//! [`LocatedState`] (position, size, pending movement). Functions in this
//! module take exactly the blocks they need.

use biofilm_core::{AgentId, ContinuousVector, SpeciesId};
use biofilm_kinetics::Reaction;

use crate::error::AgentError;
use crate::species::Species;

/// Lifecycle of an agent.
///
/// Only `Alive` agents take part in a step. The other two states are
/// terminal and are removed at the next purge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Status {
    /// Taking part in the simulation.
    #[default]
    Alive,
    /// Died (starved or lost all mass).
    Dead,
    /// Removed by dilution or by crossing an open boundary.
    FlushedAway,
}

/// Mass and growth of an agent that catalyses reactions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActiveState {
    /// Mass of each particle type, indexed like the species' particles.
    pub particle_mass: Vec<f64>,
    /// Specific rate of each of the species' reactions at the last growth.
    pub growth_rates: Vec<f64>,
    /// Net mass production rate at the last growth.
    pub net_growth_rate: f64,
    /// Net volume production rate at the last growth.
    pub net_volume_rate: f64,
}

impl ActiveState {
    /// Sum of all particle masses.
    pub fn total_mass(&self) -> f64 {
        self.particle_mass.iter().sum()
    }
}

/// Position and size of an agent that occupies space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LocatedState {
    /// Continuous position.
    pub position: ContinuousVector,
    /// Body volume.
    pub volume: f64,
    /// Body radius.
    pub radius: f64,
    /// Whether the agent is close enough to a support face to stick.
    pub attached: bool,
}

/// One agent.
#[derive(Clone, Debug, PartialEq)]
pub struct Agent {
    /// Unique identity, never reused.
    pub id: AgentId,
    /// Species the agent belongs to.
    pub species: SpeciesId,
    /// Lifecycle state.
    pub status: Status,
    /// Number of divisions since the founding agent.
    pub generation: u32,
    /// Simulation time of birth.
    pub birthday: f64,
    /// Mass and growth, if the agent is active.
    pub active: Option<ActiveState>,
    /// Position and size, if the agent is located.
    pub located: Option<LocatedState>,
}

impl Agent {
    /// A located, active agent at `position` with the given masses.
    pub fn new(species: SpeciesId, position: ContinuousVector, masses: Vec<f64>) -> Self {
        Self {
            id: AgentId::next(),
            species,
            status: Status::Alive,
            generation: 0,
            birthday: 0.0,
            active: Some(ActiveState {
                particle_mass: masses,
                ..ActiveState::default()
            }),
            located: Some(LocatedState {
                position,
                ..LocatedState::default()
            }),
        }
    }

    /// Whether the agent takes part in the simulation.
    pub fn is_alive(&self) -> bool {
        self.status == Status::Alive
    }

    /// Position, if located.
    pub fn position(&self) -> Option<ContinuousVector> {
        self.located.as_ref().map(|l| l.position)
    }

    /// Radius, zero if not located.
    pub fn radius(&self) -> f64 {
        self.located.as_ref().map_or(0.0, |l| l.radius)
    }

    /// Total mass, zero if not active.
    pub fn total_mass(&self) -> f64 {
        self.active.as_ref().map_or(0.0, ActiveState::total_mass)
    }
}

/// Integrate the growth of every reaction the species catalyses over
/// `dt`, given the local concentrations.
///
/// Reactions whose catalyst particle also appears among its particle
/// yields are autocatalytic and grow exponentially; the others add
/// `rate · dt`. All deltas are computed before any mass changes.
pub fn grow(
    active: &mut ActiveState,
    species: &Species,
    reactions: &[Reaction],
    conc: &[f64],
    dt: f64,
) -> Result<(), AgentError> {
    let n = active.particle_mass.len();
    let mut delta = vec![0.0; n];
    active.net_growth_rate = 0.0;
    active.net_volume_rate = 0.0;
    active.growth_rates.clear();
    for &r in species.reactions() {
        let reaction = reactions.get(r).ok_or_else(|| AgentError::InvalidAgent {
            reason: format!("species '{}' refers to reaction {r}", species.name()),
        })?;
        let mu = reaction.check_finite(reaction.compute_rate(conc))?;
        active.growth_rates.push(mu);
        let cat = reaction.catalyst();
        let cat_mass = active.particle_mass.get(cat).copied().unwrap_or(0.0);
        let cat_yield = reaction
            .particle_yields()
            .iter()
            .find(|(p, _)| *p == cat)
            .map_or(0.0, |(_, y)| *y);
        for &(p, y) in reaction.particle_yields() {
            if p >= n {
                continue;
            }
            let rate = cat_mass * y * mu;
            active.net_growth_rate += rate;
            active.net_volume_rate += rate / species.particle_density()[p];
            delta[p] += if cat_yield != 0.0 {
                cat_mass * (y / cat_yield) * (cat_yield * mu * dt).exp_m1()
            } else {
                rate * dt
            };
        }
    }
    for (m, d) in active.particle_mass.iter_mut().zip(delta) {
        *m += d;
    }
    Ok(())
}

/// Recompute volume and radius from the particle masses.
pub fn update_size(
    located: &mut LocatedState,
    active: &ActiveState,
    species: &Species,
    is_3d: bool,
    thickness: f64,
) {
    located.volume = species.volume_of(&active.particle_mass);
    located.radius = Species::radius_of(located.volume, is_3d, thickness);
}

/// Whether the agent has outgrown its species' division radius.
pub fn will_divide(located: &LocatedState, species: &Species) -> bool {
    located.radius > species.division_radius()
}

/// Whether the agent has shrunk to its death radius or lost mass.
pub fn will_die(located: &LocatedState, active: &ActiveState, species: &Species) -> bool {
    active.particle_mass.iter().any(|m| *m < 0.0) || located.radius <= species.death_radius()
}

/// Split the masses of `parent`, handing `frac` of each to a new state.
pub fn split_masses(parent: &mut ActiveState, frac: f64) -> ActiveState {
    let baby: Vec<f64> = parent.particle_mass.iter().map(|m| m * frac).collect();
    for m in &mut parent.particle_mass {
        *m *= 1.0 - frac;
    }
    ActiveState {
        particle_mass: baby,
        growth_rates: parent.growth_rates.clone(),
        net_growth_rate: 0.0,
        net_volume_rate: 0.0,
    }
}

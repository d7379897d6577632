//! The agent arena.
//!
//! [`AgentContainer`] is the sole owner of every agent. Agents are
//! stored in insertion order in a `Vec`; removal is lazy: agents are
//! first flagged ([`Status::Dead`] or [`Status::FlushedAway`]) and only
//! dropped by [`AgentContainer::purge`], which runs between passes and
//! never while the arena is being iterated.

use biofilm_core::{AgentId, ContinuousVector, SpeciesId};
use biofilm_grid::{AgentCrossing, Domain, SpatialGrid};
use biofilm_kinetics::Reaction;
use indexmap::IndexMap;
use log::{debug, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::agent::{self, Agent, Status};
use crate::error::AgentError;
use crate::index::AgentGrid;
use crate::movement::{push_displacement, spring_displacement, MovementBuffer};
use crate::species::Species;

/// Agent layer parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentConfig {
    /// Seed of the container's random number generator. Default: 42.
    pub seed: u64,
    /// Name of the bulk holding the well-mixed liquid in chemostat mode.
    /// `None` for a spatial biofilm. Default: `None`.
    pub chemostat_bulk: Option<String>,
    /// Shoving stops once fewer than this fraction of agents move in a
    /// pass. Default: 0.025.
    pub shove_fraction: f64,
    /// Upper bound on shoving passes per step. Default: 250.
    pub max_shove_iterations: usize,
    /// Whether neighbouring agents of one species are held by springs.
    /// Default: false.
    pub springs: bool,
    /// Agents within this many radii of a support face are attached.
    /// Default: 3.
    pub attachment_radii: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            chemostat_bulk: None,
            shove_fraction: 0.025,
            max_shove_iterations: 250,
            springs: false,
            attachment_radii: 3.0,
        }
    }
}

impl AgentConfig {
    /// Check that all fields are usable.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.shove_fraction >= 0.0 && self.shove_fraction <= 1.0) {
            return Err(format!(
                "shove_fraction must be in [0, 1], got {}",
                self.shove_fraction
            ));
        }
        if self.max_shove_iterations == 0 {
            return Err("max_shove_iterations must be at least 1".into());
        }
        if !(self.attachment_radii >= 0.0) || !self.attachment_radii.is_finite() {
            return Err(format!(
                "attachment_radii must be finite and >= 0, got {}",
                self.attachment_radii
            ));
        }
        Ok(())
    }
}

/// Exported state of one agent.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentRecord {
    /// Agent identity.
    pub id: AgentId,
    /// Species.
    pub species: SpeciesId,
    /// Divisions since the founder.
    pub generation: u32,
    /// Position.
    pub position: ContinuousVector,
    /// Body radius.
    pub radius: f64,
    /// Mass of each particle type.
    pub particle_mass: Vec<f64>,
    /// Net growth rate at the last step.
    pub net_growth_rate: f64,
}

/// What happened during one agent step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AgentStepReport {
    /// Agents that divided.
    pub divisions: usize,
    /// Agents that died.
    pub deaths: usize,
    /// Agents removed by dilution.
    pub flushed: usize,
    /// Agents pushed out through an open face.
    pub exited: usize,
    /// Shoving passes run.
    pub shove_iterations: usize,
    /// Agents alive after the step.
    pub population: usize,
}

/// Owner of every agent, with the per-cell index and the seeded RNG.
#[derive(Debug)]
pub struct AgentContainer {
    config: AgentConfig,
    species: Vec<Species>,
    agents: Vec<Agent>,
    slots: IndexMap<AgentId, usize>,
    index: AgentGrid,
    movement: MovementBuffer,
    rng: ChaCha8Rng,
    dilution_tally: f64,
    is_3d: bool,
    thickness: f64,
}

impl AgentContainer {
    /// An empty container for `domain`.
    ///
    /// Species must be given in id order: `species[i].id() == SpeciesId(i)`.
    pub fn new(
        domain: &Domain,
        species: Vec<Species>,
        config: AgentConfig,
    ) -> Result<Self, AgentError> {
        config
            .validate()
            .map_err(|reason| AgentError::InvalidConfig { reason })?;
        for (i, s) in species.iter().enumerate() {
            if s.id() != SpeciesId(i as u32) {
                return Err(AgentError::InvalidConfig {
                    reason: format!("species '{}' has id {} at position {i}", s.name(), s.id()),
                });
            }
        }
        if let Some(name) = &config.chemostat_bulk {
            if domain.bulk(name).is_none() {
                return Err(AgentError::InvalidConfig {
                    reason: format!("chemostat bulk '{name}' is not in the domain"),
                });
            }
        }
        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            species,
            agents: Vec::new(),
            slots: IndexMap::new(),
            index: AgentGrid::new(domain),
            movement: MovementBuffer::new(),
            dilution_tally: 0.0,
            is_3d: domain.is_3d(),
            thickness: domain.lengths().z,
        })
    }

    /// Active parameters.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Registered species.
    pub fn species(&self) -> &[Species] {
        &self.species
    }

    /// Every agent still held, including flagged ones not yet purged.
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// Number of agents held.
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether no agent is held.
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Number of agents with [`Status::Alive`].
    pub fn alive_count(&self) -> usize {
        self.agents.iter().filter(|a| a.is_alive()).count()
    }

    /// An agent by id.
    pub fn get(&self, id: AgentId) -> Option<&Agent> {
        self.slots.get(&id).map(|&s| &self.agents[s])
    }

    /// The per-cell index as of the last rebuild.
    pub fn index(&self) -> &AgentGrid {
        &self.index
    }

    fn is_chemostat(&self) -> bool {
        self.config.chemostat_bulk.is_some()
    }

    fn species_of(&self, id: SpeciesId) -> Result<&Species, AgentError> {
        self.species
            .get(id.index())
            .ok_or(AgentError::UnknownSpecies { species: id })
    }

    fn resize(&mut self, slot: usize) -> Result<(), AgentError> {
        let sphere = self.is_3d || self.is_chemostat();
        let thickness = self.thickness;
        let a = &mut self.agents[slot];
        let species = self
            .species
            .get(a.species.index())
            .ok_or(AgentError::UnknownSpecies { species: a.species })?;
        if let (Some(active), Some(located)) = (a.active.as_ref(), a.located.as_mut()) {
            agent::update_size(located, active, species, sphere, thickness);
        }
        Ok(())
    }

    // ── Population management ───────────────────────────────────

    /// Insert an agent and register it in the index.
    ///
    /// # Errors
    ///
    /// Fails if the species is unknown, the mass vector does not match
    /// the species' particles, or the position is not inside the domain.
    pub fn add(&mut self, domain: &Domain, agent: Agent) -> Result<AgentId, AgentError> {
        let species = self.species_of(agent.species)?;
        if let Some(active) = &agent.active {
            if active.particle_mass.len() != species.particle_count() {
                return Err(AgentError::InvalidAgent {
                    reason: format!(
                        "{} masses for {} particles of species '{}'",
                        active.particle_mass.len(),
                        species.particle_count(),
                        species.name()
                    ),
                });
            }
        }
        if let Some(p) = agent.position() {
            if !p.is_finite() || !domain.is_inside(&p) {
                return Err(AgentError::InvalidAgent {
                    reason: format!("position {p} is outside the domain"),
                });
            }
        }
        let id = agent.id;
        let slot = self.agents.len();
        self.agents.push(agent);
        self.slots.insert(id, slot);
        self.resize(slot)?;
        if let Some(p) = self.agents[slot].position() {
            self.index.insert(slot, &p)?;
        }
        Ok(id)
    }

    /// Create and insert a located, active agent.
    pub fn create(
        &mut self,
        domain: &Domain,
        species: SpeciesId,
        position: ContinuousVector,
        masses: Vec<f64>,
    ) -> Result<AgentId, AgentError> {
        self.add(domain, Agent::new(species, position, masses))
    }

    fn set_status(&mut self, id: AgentId, status: Status) -> Result<(), AgentError> {
        let slot = *self
            .slots
            .get(&id)
            .ok_or(AgentError::UnknownAgent { agent: id })?;
        let a = &mut self.agents[slot];
        if a.is_alive() {
            a.status = status;
        }
        Ok(())
    }

    /// Flag an agent as flushed away. It stays in the arena until the
    /// next [`purge`](Self::purge).
    pub fn mark_flushed(&mut self, id: AgentId) -> Result<(), AgentError> {
        self.set_status(id, Status::FlushedAway)
    }

    /// Flag an agent as dead.
    pub fn mark_dead(&mut self, id: AgentId) -> Result<(), AgentError> {
        self.set_status(id, Status::Dead)
    }

    /// Drop every flagged agent and rebuild the index. Returns how many
    /// were dropped.
    pub fn purge(&mut self) -> Result<usize, AgentError> {
        let before = self.agents.len();
        self.agents.retain(Agent::is_alive);
        self.slots = self
            .agents
            .iter()
            .enumerate()
            .map(|(slot, a)| (a.id, slot))
            .collect();
        self.rebuild_index()?;
        Ok(before - self.agents.len())
    }

    /// Clear the per-cell index and register every live located agent
    /// at its current position.
    pub fn rebuild_index(&mut self) -> Result<(), AgentError> {
        self.index.clear();
        for (slot, a) in self.agents.iter().enumerate() {
            if !a.is_alive() {
                continue;
            }
            if let Some(p) = a.position() {
                self.index.insert(slot, &p)?;
            }
        }
        Ok(())
    }

    // ── Grid coupling ───────────────────────────────────────────

    fn spread<F>(&self, template: &SpatialGrid, name: &str, value: F) -> Result<SpatialGrid, AgentError>
    where
        F: Fn(&Agent) -> f64,
    {
        let mut g = template.zeros_like(name);
        let vv = g.voxel_volume();
        for a in self.agents.iter().filter(|a| a.is_alive()) {
            let Some(p) = a.position() else { continue };
            let v = value(a) / vv;
            let v = if v.is_finite() { v } else { 0.0 };
            g.add_value_at_point(&p, v)?;
        }
        Ok(g)
    }

    /// Catalyst concentration of each reaction: the mass of the
    /// reaction's catalyst particle in every agent whose species carries
    /// the reaction, divided by the voxel volume.
    pub fn fit_mass_on_grid(
        &self,
        reactions: &[Reaction],
        template: &SpatialGrid,
    ) -> Result<Vec<SpatialGrid>, AgentError> {
        reactions
            .iter()
            .enumerate()
            .map(|(r, reaction)| {
                let cat = reaction.catalyst();
                self.spread(template, reaction.name(), |a| {
                    let carries = self
                        .species
                        .get(a.species.index())
                        .is_some_and(|s| s.reactions().contains(&r));
                    if !carries {
                        return 0.0;
                    }
                    a.active
                        .as_ref()
                        .and_then(|s| s.particle_mass.get(cat).copied())
                        .unwrap_or(0.0)
                })
            })
            .collect()
    }

    /// Total biomass concentration per cell.
    pub fn fit_biomass_on_grid(&self, template: &SpatialGrid) -> Result<SpatialGrid, AgentError> {
        self.spread(template, "biomass", Agent::total_mass)
    }

    /// Net volume production rate per cell, the source of the pressure
    /// field.
    pub fn fit_volume_rate_on_grid(
        &self,
        template: &SpatialGrid,
    ) -> Result<SpatialGrid, AgentError> {
        self.spread(template, "volume-rate", |a| {
            a.active.as_ref().map_or(0.0, |s| s.net_volume_rate)
        })
    }

    // ── Movement ────────────────────────────────────────────────

    /// Apply every pending displacement, resolving each target through
    /// the domain's boundary conditions. Agents pushed through an open
    /// face are flagged as flushed away. Returns `(moved, exited)`.
    pub fn commit_movement(&mut self, domain: &Domain) -> Result<(usize, usize), AgentError> {
        let mut moved = 0;
        let mut exited = 0;
        for (id, mut delta) in self.movement.drain_totals() {
            let Some(&slot) = self.slots.get(&id) else {
                continue;
            };
            let a = &mut self.agents[slot];
            if !a.is_alive() {
                continue;
            }
            let Some(located) = a.located.as_mut() else {
                continue;
            };
            if !self.is_3d {
                delta.z = 0.0;
            }
            if !delta.is_finite() {
                warn!("agent {id}: dropping non-finite movement {delta}");
                continue;
            }
            if delta.is_zero() {
                continue;
            }
            match domain.apply_agent_boundary(&(located.position + delta), located.radius)? {
                AgentCrossing::Moved(p) => {
                    located.position = p;
                    moved += 1;
                }
                AgentCrossing::Removed => {
                    a.status = Status::FlushedAway;
                    exited += 1;
                }
            }
        }
        Ok((moved, exited))
    }

    /// One shoving pass: queue a push for every overlapping pair, then
    /// commit. Returns `(moved, exited)`.
    fn shove_pass(&mut self, domain: &Domain) -> Result<(usize, usize), AgentError> {
        let reach = self
            .agents
            .iter()
            .filter(|a| a.is_alive())
            .filter_map(|a| {
                let s = self.species.get(a.species.index())?;
                Some(2.0 * s.shove_radius(a.radius()) + s.shove_limit())
            })
            .fold(0.0, f64::max);
        for slot in 0..self.agents.len() {
            let a = &self.agents[slot];
            let (Some(p), true) = (a.position(), a.is_alive()) else {
                continue;
            };
            let Some(sa) = self.species.get(a.species.index()) else {
                continue;
            };
            for other in self.index.candidates(&p, reach) {
                if other <= slot {
                    continue;
                }
                let b = &self.agents[other];
                let (Some(q), true) = (b.position(), b.is_alive()) else {
                    continue;
                };
                let Some(sb) = self.species.get(b.species.index()) else {
                    continue;
                };
                let diff = self.index.difference(&p, &q);
                let span = sa.shove_radius(a.radius()) + sb.shove_radius(b.radius()) + sa.shove_limit();
                let fallback = if diff.is_zero() {
                    ContinuousVector::random_direction(&mut self.rng, self.is_3d)
                } else {
                    ContinuousVector::ZERO
                };
                if let Some(d) = push_displacement(diff, span, fallback) {
                    self.movement.add_mutual(a.id, b.id, d);
                }
            }
        }
        self.commit_movement(domain)
    }

    /// Shove until fewer than `shove_fraction` of the agents move or the
    /// pass budget is spent. Returns `(passes, exited)`.
    pub fn shove_all(&mut self, domain: &Domain) -> Result<(usize, usize), AgentError> {
        let mut exited = 0;
        for pass in 1..=self.config.max_shove_iterations {
            self.rebuild_index()?;
            let population = self.alive_count();
            let (moved, out) = self.shove_pass(domain)?;
            exited += out;
            if (moved as f64) <= self.config.shove_fraction * population as f64 {
                self.rebuild_index()?;
                return Ok((pass, exited));
            }
        }
        self.rebuild_index()?;
        Ok((self.config.max_shove_iterations, exited))
    }

    /// Pull or push neighbouring agents of the same species towards
    /// contact with springs. Returns `(moved, exited)`.
    pub fn apply_springs(&mut self, domain: &Domain) -> Result<(usize, usize), AgentError> {
        self.rebuild_index()?;
        for slot in 0..self.agents.len() {
            let a = &self.agents[slot];
            let (Some(p), true) = (a.position(), a.is_alive()) else {
                continue;
            };
            let Some(sa) = self.species.get(a.species.index()) else {
                continue;
            };
            let lmax = a.radius();
            let search = 2.0 * sa.shove_radius(lmax) + sa.shove_limit() + lmax;
            for other in self.index.candidates(&p, search) {
                if other <= slot {
                    continue;
                }
                let b = &self.agents[other];
                let (Some(q), true) = (b.position(), b.is_alive() && b.species == a.species) else {
                    continue;
                };
                let rest = sa.shove_radius(a.radius()) + sa.shove_radius(b.radius()) + sa.shove_limit();
                let d = spring_displacement(self.index.difference(&p, &q), rest, lmax, sa.spring_gain());
                self.movement.add_mutual(a.id, b.id, d);
            }
        }
        let out = self.commit_movement(domain)?;
        self.rebuild_index()?;
        Ok(out)
    }

    /// Advect agents with the velocity `-∇p` of a pressure field over
    /// `dt`. Returns `(moved, exited)`.
    pub fn follow_pressure(
        &mut self,
        domain: &Domain,
        pressure: &SpatialGrid,
        dt: f64,
    ) -> Result<(usize, usize), AgentError> {
        for a in self.agents.iter().filter(|a| a.is_alive()) {
            let Some(p) = a.position() else { continue };
            let v = -pressure.gradient_at_point(&p)?;
            self.movement.add(a.id, a.id, v.scale(dt));
        }
        let out = self.commit_movement(domain)?;
        self.rebuild_index()?;
        Ok(out)
    }

    /// Flag agents touching a support face as attached.
    pub fn update_attachment(&mut self, domain: &Domain) {
        let lengths = domain.lengths();
        let supports: Vec<_> = domain
            .boundaries()
            .iter()
            .filter(|bc| bc.is_support && domain.shape().is_active(bc.face.axis()))
            .map(|bc| bc.face)
            .collect();
        let reach = self.config.attachment_radii;
        for a in &mut self.agents {
            let Some(l) = a.located.as_mut() else { continue };
            l.attached = supports.iter().any(|f| {
                let axis = f.axis();
                let d = if f.is_max() {
                    lengths.axis(axis) - l.position.axis(axis)
                } else {
                    l.position.axis(axis)
                };
                d <= reach * l.radius
            });
        }
    }

    // ── Step ────────────────────────────────────────────────────

    /// Randomly flag `floor(D·dt·N + carry)` live agents as flushed
    /// away, carrying the fractional part to the next call.
    pub fn flush_by_dilution(&mut self, dilution: f64, dt: f64) -> usize {
        let mut alive: Vec<usize> = (0..self.agents.len())
            .filter(|&s| self.agents[s].is_alive())
            .collect();
        let expected = dilution.max(0.0) * dt * alive.len() as f64 + self.dilution_tally;
        let n = (expected.floor() as usize).min(alive.len());
        self.dilution_tally = expected - n as f64;
        for i in 0..n {
            let j = self.rng.random_range(i..alive.len());
            alive.swap(i, j);
            self.agents[alive[i]].status = Status::FlushedAway;
        }
        n
    }

    /// Advance every live agent by `dt`: grow from the local
    /// concentrations, divide, die, dilute (chemostat), purge, then relax
    /// overlaps (biofilm) and rebuild the index.
    pub fn step(
        &mut self,
        domain: &Domain,
        reactions: &[Reaction],
        now: f64,
        dt: f64,
    ) -> Result<AgentStepReport, AgentError> {
        let mut report = AgentStepReport::default();
        let chemostat = self.is_chemostat();
        let mut born: Vec<Agent> = Vec::new();

        for slot in 0..self.agents.len() {
            if !self.agents[slot].is_alive() {
                continue;
            }
            let Some(p) = self.agents[slot].position() else {
                continue;
            };
            let conc = domain.concentrations_at(&p)?;
            {
                let a = &mut self.agents[slot];
                let species = self
                    .species
                    .get(a.species.index())
                    .ok_or(AgentError::UnknownSpecies { species: a.species })?;
                if let Some(active) = a.active.as_mut() {
                    agent::grow(active, species, reactions, &conc, dt)?;
                }
            }
            self.resize(slot)?;

            let a = &self.agents[slot];
            let species = self.species_of(a.species)?;
            let (Some(active), Some(located)) = (a.active.as_ref(), a.located.as_ref()) else {
                continue;
            };
            if agent::will_die(located, active, species) {
                self.agents[slot].status = Status::Dead;
                report.deaths += 1;
                continue;
            }
            if agent::will_divide(located, species) {
                let baby = self.divide(slot, now, chemostat)?;
                born.push(baby);
                report.divisions += 1;
            }
        }
        for baby in born {
            let slot = self.agents.len();
            self.slots.insert(baby.id, slot);
            self.agents.push(baby);
            self.resize(slot)?;
        }
        let (_, exited) = self.commit_movement(domain)?;
        report.exited += exited;

        if let Some(name) = self.config.chemostat_bulk.clone() {
            let dilution = domain.bulk(&name).map_or(0.0, |b| b.dilution());
            report.flushed = self.flush_by_dilution(dilution, dt);
        }
        self.purge()?;

        if !chemostat {
            self.update_attachment(domain);
            let (passes, out) = self.shove_all(domain)?;
            report.shove_iterations = passes;
            report.exited += out;
            if self.config.springs {
                let (_, out) = self.apply_springs(domain)?;
                report.exited += out;
            }
            self.purge()?;
        }
        report.population = self.alive_count();
        debug!(
            "agents: {} divisions, {} deaths, {} flushed, {} exited, {} shove passes, {} alive",
            report.divisions,
            report.deaths,
            report.flushed,
            report.exited,
            report.shove_iterations,
            report.population
        );
        Ok(report)
    }

    /// Split the agent in `slot`, queueing the separating movement of the
    /// pair unless in chemostat mode. Returns the offspring, not yet
    /// inserted.
    fn divide(&mut self, slot: usize, now: f64, chemostat: bool) -> Result<Agent, AgentError> {
        let frac = self.species_of(self.agents[slot].species)?.baby_mass_frac();
        let parent = &mut self.agents[slot];
        let Some(active) = parent.active.as_mut() else {
            return Err(AgentError::InvalidAgent {
                reason: format!("agent {} divides without masses", parent.id),
            });
        };
        let baby_state = agent::split_masses(active, frac);
        let mut baby = Agent {
            id: AgentId::next(),
            species: parent.species,
            status: Status::Alive,
            generation: parent.generation + 1,
            birthday: now,
            active: Some(baby_state),
            located: parent.located,
        };
        self.resize(slot)?;
        let species = self
            .species
            .get(baby.species.index())
            .ok_or(AgentError::UnknownSpecies { species: baby.species })?;
        let sphere = self.is_3d || chemostat;
        if let (Some(active), Some(located)) = (baby.active.as_ref(), baby.located.as_mut()) {
            agent::update_size(located, active, species, sphere, self.thickness);
        }
        if !chemostat {
            let parent = &self.agents[slot];
            let distance = species.shove_radius(parent.radius())
                + species.shove_radius(baby.radius())
                + species.shove_limit();
            let dir = ContinuousVector::random_direction(&mut self.rng, self.is_3d)
                .scale(0.5 * distance);
            self.movement.add(parent.id, parent.id, dir);
            self.movement.add(baby.id, parent.id, -dir);
        }
        Ok(baby)
    }

    /// Export the state of every live agent.
    pub fn snapshot(&self) -> Vec<AgentRecord> {
        self.agents
            .iter()
            .filter(|a| a.is_alive())
            .map(|a| AgentRecord {
                id: a.id,
                species: a.species,
                generation: a.generation,
                position: a.position().unwrap_or_default(),
                radius: a.radius(),
                particle_mass: a
                    .active
                    .as_ref()
                    .map(|s| s.particle_mass.clone())
                    .unwrap_or_default(),
                net_growth_rate: a.active.as_ref().map_or(0.0, |s| s.net_growth_rate),
            })
            .collect()
    }
}

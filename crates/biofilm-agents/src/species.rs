//! Species: the parameter set shared by a group of agents.

use std::f64::consts::PI;

use biofilm_core::SpeciesId;

/// Parameters shared by every agent of a species.
///
/// Each agent carries one mass per particle type (biomass, inert, EPS,
/// ...); `particle_density` gives the density of each so that volume and
/// radius follow from the masses.
#[derive(Clone, Debug, PartialEq)]
pub struct Species {
    id: SpeciesId,
    name: String,
    particle_names: Vec<String>,
    particle_density: Vec<f64>,
    division_radius: f64,
    death_radius: f64,
    baby_mass_frac: f64,
    shove_factor: f64,
    shove_limit: f64,
    spring_gain: f64,
    reactions: Vec<usize>,
}

/// Builder for [`Species`].
///
/// Required: at least one particle. Defaults: division radius 0.97,
/// death radius 0.2, baby mass fraction 0.5, shove factor 1.15, shove
/// limit 0, spring gain 0.1.
pub struct SpeciesBuilder {
    id: SpeciesId,
    name: String,
    particles: Vec<(String, f64)>,
    division_radius: f64,
    death_radius: f64,
    baby_mass_frac: f64,
    shove_factor: f64,
    shove_limit: f64,
    spring_gain: f64,
    reactions: Vec<usize>,
}

impl Species {
    /// Start building a species.
    pub fn builder(name: impl Into<String>) -> SpeciesBuilder {
        SpeciesBuilder {
            id: SpeciesId(0),
            name: name.into(),
            particles: Vec::new(),
            division_radius: 0.97,
            death_radius: 0.2,
            baby_mass_frac: 0.5,
            shove_factor: 1.15,
            shove_limit: 0.0,
            spring_gain: 0.1,
            reactions: Vec::new(),
        }
    }

    /// Species id.
    pub fn id(&self) -> SpeciesId {
        self.id
    }

    /// Species name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of particle types.
    pub fn particle_count(&self) -> usize {
        self.particle_density.len()
    }

    /// Particle type names.
    pub fn particle_names(&self) -> &[String] {
        &self.particle_names
    }

    /// Density of each particle type.
    pub fn particle_density(&self) -> &[f64] {
        &self.particle_density
    }

    /// Radius above which an agent divides.
    pub fn division_radius(&self) -> f64 {
        self.division_radius
    }

    /// Radius at or below which an agent dies.
    pub fn death_radius(&self) -> f64 {
        self.death_radius
    }

    /// Fraction of the mass handed to the offspring on division.
    pub fn baby_mass_frac(&self) -> f64 {
        self.baby_mass_frac
    }

    /// Ratio of shoving radius to body radius.
    pub fn shove_factor(&self) -> f64 {
        self.shove_factor
    }

    /// Extra gap kept between shoving agents.
    pub fn shove_limit(&self) -> f64 {
        self.shove_limit
    }

    /// Spring stiffness for attached pairs.
    pub fn spring_gain(&self) -> f64 {
        self.spring_gain
    }

    /// Indices into the simulation's reaction table of the reactions this
    /// species catalyses.
    pub fn reactions(&self) -> &[usize] {
        &self.reactions
    }

    /// Volume of an agent with the given particle masses.
    pub fn volume_of(&self, masses: &[f64]) -> f64 {
        masses
            .iter()
            .zip(&self.particle_density)
            .map(|(m, rho)| m / rho)
            .sum()
    }

    /// Radius of a sphere (3D) or of a cylinder spanning `thickness`
    /// (2D) with the given volume.
    pub fn radius_of(volume: f64, is_3d: bool, thickness: f64) -> f64 {
        let v = volume.max(0.0);
        if is_3d {
            (0.75 * v / PI).cbrt()
        } else {
            (v / (PI * thickness)).sqrt()
        }
    }

    /// Shoving radius for a body radius.
    pub fn shove_radius(&self, radius: f64) -> f64 {
        radius * self.shove_factor
    }
}

impl SpeciesBuilder {
    /// Species id. Default: 0.
    pub fn id(mut self, id: SpeciesId) -> Self {
        self.id = id;
        self
    }

    /// Add a particle type with its density.
    pub fn particle(mut self, name: impl Into<String>, density: f64) -> Self {
        self.particles.push((name.into(), density));
        self
    }

    /// Division radius.
    pub fn division_radius(mut self, r: f64) -> Self {
        self.division_radius = r;
        self
    }

    /// Death radius.
    pub fn death_radius(mut self, r: f64) -> Self {
        self.death_radius = r;
        self
    }

    /// Baby mass fraction.
    pub fn baby_mass_frac(mut self, frac: f64) -> Self {
        self.baby_mass_frac = frac;
        self
    }

    /// Shove factor.
    pub fn shove_factor(mut self, factor: f64) -> Self {
        self.shove_factor = factor;
        self
    }

    /// Shove limit.
    pub fn shove_limit(mut self, limit: f64) -> Self {
        self.shove_limit = limit;
        self
    }

    /// Spring gain.
    pub fn spring_gain(mut self, gain: f64) -> Self {
        self.spring_gain = gain;
        self
    }

    /// Register a catalysed reaction by its index in the reaction table.
    pub fn reaction(mut self, index: usize) -> Self {
        self.reactions.push(index);
        self
    }

    /// Build the species.
    ///
    /// # Errors
    ///
    /// Returns `Err` if no particle is declared, a density is not
    /// positive, the radii are not ordered `0 <= death < division`, the
    /// baby fraction is outside `(0, 1)`, or a shoving parameter is
    /// negative.
    pub fn build(self) -> Result<Species, String> {
        if self.particles.is_empty() {
            return Err(format!("species '{}' needs at least one particle", self.name));
        }
        for (name, rho) in &self.particles {
            if !(*rho > 0.0) || !rho.is_finite() {
                return Err(format!("density of particle '{name}' must be > 0, got {rho}"));
            }
        }
        if !(self.death_radius >= 0.0) || !(self.division_radius > self.death_radius) {
            return Err(format!(
                "radii must satisfy 0 <= death ({}) < division ({})",
                self.death_radius, self.division_radius
            ));
        }
        if !self.division_radius.is_finite() {
            return Err("division radius must be finite".into());
        }
        if !(self.baby_mass_frac > 0.0 && self.baby_mass_frac < 1.0) {
            return Err(format!(
                "baby mass fraction must be in (0, 1), got {}",
                self.baby_mass_frac
            ));
        }
        for (what, v) in [
            ("shove factor", self.shove_factor),
            ("shove limit", self.shove_limit),
            ("spring gain", self.spring_gain),
        ] {
            if !(v >= 0.0) || !v.is_finite() {
                return Err(format!("{what} must be finite and >= 0, got {v}"));
            }
        }
        let (particle_names, particle_density) = self.particles.into_iter().unzip();
        Ok(Species {
            id: self.id,
            name: self.name,
            particle_names,
            particle_density,
            division_radius: self.division_radius,
            death_radius: self.death_radius,
            baby_mass_frac: self.baby_mass_frac,
            shove_factor: self.shove_factor,
            shove_limit: self.shove_limit,
            spring_gain: self.spring_gain,
            reactions: self.reactions,
        })
    }
}

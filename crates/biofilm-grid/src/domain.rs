//! The computational domain: grid geometry, solutes, boundaries, bulks.
//!
//! A [`Domain`] owns the current concentration grid of every registered
//! solute. Solvers compute into their own working buffers and commit
//! into these grids only once a solve has succeeded, so the domain
//! always holds the last accepted state.
//!
//! Besides the solute grids the domain keeps four derived grids:
//!
//! - the domain grid (`-1` outside, `0` carrier cell next to a support
//!   face, `1` otherwise),
//! - the biomass grid, copied from the agent layer,
//! - the boundary-layer grid (`1` where diffusion is resolved, `0`
//!   where the concentration is pinned to the bulk),
//! - the relative diffusivity grid (biofilm cells diffuse slower).

use biofilm_core::{ContinuousVector, DiscreteVector, SoluteId};
use indexmap::IndexMap;
use log::debug;

use crate::boundary::{AgentCrossing, BoundaryCondition, BoundaryKind, Face, GhostInputs, GridRole};
use crate::bulk::{Bulk, BulkUpdateMode};
use crate::error::GridError;
use crate::grid::{GridShape, SpatialGrid};

/// A solute registered in a domain.
#[derive(Clone, Debug, PartialEq)]
pub struct SoluteSpec {
    /// Unique solute name.
    pub name: String,
    /// Diffusivity in bulk liquid.
    pub diffusivity: f64,
    /// Concentration the grid starts from.
    pub initial: f64,
    /// Whether negative values are meaningful. Unsigned solutes are
    /// truncated at zero by the solvers.
    pub signed: bool,
}

/// Saved solute and bulk state for rolling back a failed step.
#[derive(Clone, Debug, PartialEq)]
pub struct DomainCheckpoint {
    solutes: Vec<Vec<f64>>,
    bulks: IndexMap<String, Bulk>,
}

/// Builder for [`Domain`].
///
/// Required: grid size, resolution, and a boundary condition for every
/// face of an active axis. Faces of flat axes default to zero flux.
#[derive(Clone, Debug)]
pub struct DomainBuilder {
    name: String,
    dims: [usize; 3],
    resolution: f64,
    padding: usize,
    boundaries: Vec<BoundaryCondition>,
    bulks: Vec<Bulk>,
    solutes: Vec<SoluteSpec>,
    specific_area: f64,
    boundary_layer: Option<f64>,
    biofilm_diffusivity: f64,
}

impl DomainBuilder {
    /// Start a builder with a one-cell grid and unit resolution.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dims: [1, 1, 1],
            resolution: 1.0,
            padding: 1,
            boundaries: Vec::new(),
            bulks: Vec::new(),
            solutes: Vec::new(),
            specific_area: 0.0,
            boundary_layer: None,
            biofilm_diffusivity: 1.0,
        }
    }

    /// Interior cell counts. Use `nk = 1` for a 2D domain.
    pub fn grid(mut self, ni: usize, nj: usize, nk: usize) -> Self {
        self.dims = [ni, nj, nk];
        self
    }

    /// Cell side length.
    pub fn resolution(mut self, resolution: f64) -> Self {
        self.resolution = resolution;
        self
    }

    /// Ghost layers on every side. Default: 1.
    pub fn padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    /// Register a boundary condition.
    pub fn boundary(mut self, condition: BoundaryCondition) -> Self {
        self.boundaries.push(condition);
        self
    }

    /// Shorthand for a non-support boundary condition.
    pub fn face(self, face: Face, kind: BoundaryKind) -> Self {
        self.boundary(BoundaryCondition::new(face, kind))
    }

    /// Register a bulk reservoir.
    pub fn bulk(mut self, bulk: Bulk) -> Self {
        self.bulks.push(bulk);
        self
    }

    /// Register an unsigned solute. Ids follow registration order.
    pub fn solute(mut self, name: impl Into<String>, diffusivity: f64, initial: f64) -> Self {
        self.solutes.push(SoluteSpec {
            name: name.into(),
            diffusivity,
            initial,
            signed: false,
        });
        self
    }

    /// Register a solute from a full spec.
    pub fn solute_spec(mut self, spec: SoluteSpec) -> Self {
        self.solutes.push(spec);
        self
    }

    /// Carrier area per reactor volume. Default: 0.
    pub fn specific_area(mut self, area: f64) -> Self {
        self.specific_area = area;
        self
    }

    /// Thickness of the diffusion boundary layer around the biofilm.
    /// Without one, diffusion is resolved over the whole domain.
    pub fn boundary_layer(mut self, thickness: f64) -> Self {
        self.boundary_layer = Some(thickness);
        self
    }

    /// Diffusivity inside biofilm relative to bulk liquid. Default: 1.
    pub fn biofilm_diffusivity(mut self, ratio: f64) -> Self {
        self.biofilm_diffusivity = ratio;
        self
    }

    /// Validate and build the domain.
    pub fn build(self) -> Result<Domain, GridError> {
        // 1. Geometry.
        if !(self.resolution > 0.0) || !self.resolution.is_finite() {
            return Err(GridError::InvalidResolution {
                value: self.resolution,
            });
        }
        if self.padding == 0 {
            return Err(GridError::InvalidParameter {
                reason: "padding must be at least 1".into(),
            });
        }
        let [ni, nj, nk] = self.dims;
        let shape = GridShape::new(ni, nj, nk, self.padding)?;

        // 2. Solutes.
        for (idx, s) in self.solutes.iter().enumerate() {
            if !(s.diffusivity >= 0.0) || !s.diffusivity.is_finite() {
                return Err(GridError::InvalidParameter {
                    reason: format!("solute '{}' diffusivity must be >= 0", s.name),
                });
            }
            if !s.initial.is_finite() {
                return Err(GridError::InvalidParameter {
                    reason: format!("solute '{}' initial value must be finite", s.name),
                });
            }
            if self.solutes[..idx].iter().any(|o| o.name == s.name) {
                return Err(GridError::InvalidParameter {
                    reason: format!("solute '{}' registered twice", s.name),
                });
            }
        }

        // 3. Bulks.
        let mut bulks = IndexMap::new();
        for b in self.bulks {
            if b.solute_count() != self.solutes.len() {
                return Err(GridError::InvalidParameter {
                    reason: format!(
                        "bulk '{}' tracks {} solutes, domain has {}",
                        b.name(),
                        b.solute_count(),
                        self.solutes.len()
                    ),
                });
            }
            let name = b.name().to_string();
            if bulks.insert(name.clone(), b).is_some() {
                return Err(GridError::InvalidParameter {
                    reason: format!("bulk '{name}' registered twice"),
                });
            }
        }

        // 4. One condition per face.
        let mut boundaries = Vec::with_capacity(6);
        for face in Face::ALL {
            let mut claims = self.boundaries.iter().filter(|b| b.face == face);
            let bc = match (claims.next(), claims.next()) {
                (Some(_), Some(_)) => return Err(GridError::BoundaryAmbiguity { face }),
                (Some(bc), None) => bc.clone(),
                (None, _) if !shape.is_active(face.axis()) => {
                    BoundaryCondition::new(face, BoundaryKind::ZeroFlux)
                }
                (None, _) => return Err(GridError::MissingBoundary { face }),
            };
            boundaries.push(bc);
        }

        // 5. Per-condition consistency.
        for bc in &boundaries {
            if bc.is_cyclic() && !boundaries[index_of(bc.face.opposite())].is_cyclic() {
                return Err(GridError::InvalidParameter {
                    reason: format!("cyclic face {:?} has a non-cyclic opposite", bc.face),
                });
            }
            if let Some(name) = bc.bulk_name() {
                if !bulks.contains_key(name) {
                    return Err(GridError::InvalidParameter {
                        reason: format!("face {:?} refers to unknown bulk '{name}'", bc.face),
                    });
                }
            }
            let per_solute = match &bc.kind {
                BoundaryKind::Constant { values } => Some(values.len()),
                BoundaryKind::GasMembrane { permeability, .. } => Some(permeability.len()),
                _ => None,
            };
            if let Some(len) = per_solute {
                if len != self.solutes.len() {
                    return Err(GridError::InvalidParameter {
                        reason: format!(
                            "face {:?} gives {len} values for {} solutes",
                            bc.face,
                            self.solutes.len()
                        ),
                    });
                }
            }
        }

        // 6. Biofilm parameters.
        if !(self.specific_area >= 0.0) || !self.specific_area.is_finite() {
            return Err(GridError::InvalidParameter {
                reason: "specific area must be >= 0".into(),
            });
        }
        if !(self.biofilm_diffusivity > 0.0) || !self.biofilm_diffusivity.is_finite() {
            return Err(GridError::InvalidParameter {
                reason: "biofilm diffusivity ratio must be > 0".into(),
            });
        }
        if let Some(t) = self.boundary_layer {
            if !(t >= 0.0) || !t.is_finite() {
                return Err(GridError::InvalidParameter {
                    reason: "boundary layer thickness must be >= 0".into(),
                });
            }
        }

        let res = self.resolution;
        let mut solute_grids = Vec::with_capacity(self.solutes.len());
        for s in &self.solutes {
            let mut g = SpatialGrid::new(s.name.clone(), shape, res)?;
            g.set_all(s.initial);
            solute_grids.push(g);
        }
        let blank = SpatialGrid::new("domain", shape, res)?;
        let mut domain = Domain {
            name: self.name,
            shape,
            resolution: res,
            boundaries,
            bulks,
            solutes: self.solutes,
            solute_grids,
            specific_area: self.specific_area,
            boundary_layer: self.boundary_layer,
            biofilm_diffusivity: self.biofilm_diffusivity,
            domain_grid: blank.clone(),
            biomass_grid: blank.zeros_like("biomass"),
            boundary_layer_grid: blank.zeros_like("boundary-layer"),
            diffusivity_grid: blank.zeros_like("diffusivity"),
        };
        domain.mark_domain_grid();
        let empty = blank.zeros_like("biomass");
        domain.refresh_biofilm_grids(&empty)?;
        domain.refresh_solute_boundaries();
        Ok(domain)
    }
}

fn index_of(face: Face) -> usize {
    Face::ALL.iter().position(|f| *f == face).unwrap_or(0)
}

/// Grid geometry, solutes, boundary conditions and bulk reservoirs of a
/// simulation.
#[derive(Clone, Debug)]
pub struct Domain {
    name: String,
    shape: GridShape,
    resolution: f64,
    boundaries: Vec<BoundaryCondition>,
    bulks: IndexMap<String, Bulk>,
    solutes: Vec<SoluteSpec>,
    solute_grids: Vec<SpatialGrid>,
    specific_area: f64,
    boundary_layer: Option<f64>,
    biofilm_diffusivity: f64,
    domain_grid: SpatialGrid,
    biomass_grid: SpatialGrid,
    boundary_layer_grid: SpatialGrid,
    diffusivity_grid: SpatialGrid,
}

impl Domain {
    /// Start building a domain.
    pub fn builder(name: impl Into<String>) -> DomainBuilder {
        DomainBuilder::new(name)
    }

    // ── Geometry ────────────────────────────────────────────────

    /// Domain name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Grid shape shared by every domain grid.
    pub fn shape(&self) -> GridShape {
        self.shape
    }

    /// Cell side length.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Physical extent along each axis.
    pub fn lengths(&self) -> ContinuousVector {
        ContinuousVector::new(
            self.shape.ni as f64 * self.resolution,
            self.shape.nj as f64 * self.resolution,
            self.shape.nk as f64 * self.resolution,
        )
    }

    /// Whether the z axis is resolved.
    pub fn is_3d(&self) -> bool {
        self.shape.nk > 1
    }

    /// Carrier area per reactor volume.
    pub fn specific_area(&self) -> f64 {
        self.specific_area
    }

    /// Interior cell containing `p`.
    pub fn cell_of(&self, p: &ContinuousVector) -> Result<DiscreteVector, GridError> {
        let c = p.to_discrete(self.resolution);
        if !self.shape.is_interior(c) {
            return Err(GridError::OutOfBounds {
                coord: c,
                bounds: format!("interior of {:?}", self.shape.dims()),
            });
        }
        Ok(c)
    }

    /// Whether `p` lies inside the domain box.
    pub fn is_inside(&self, p: &ContinuousVector) -> bool {
        let c = p.to_discrete(self.resolution);
        self.shape.is_interior(c) && self.domain_grid.at(c.i, c.j, c.k) >= 0.0
    }

    // ── Solutes ─────────────────────────────────────────────────

    /// Number of registered solutes.
    pub fn solute_count(&self) -> usize {
        self.solutes.len()
    }

    /// Solute description.
    pub fn solute(&self, id: SoluteId) -> Option<&SoluteSpec> {
        self.solutes.get(id.index())
    }

    /// Every solute, indexed by id.
    pub fn solutes(&self) -> &[SoluteSpec] {
        &self.solutes
    }

    /// Look up a solute id by name.
    pub fn solute_id(&self, name: &str) -> Option<SoluteId> {
        self.solutes
            .iter()
            .position(|s| s.name == name)
            .map(|i| SoluteId(i as u32))
    }

    /// Current concentration grid of a solute.
    pub fn solute_grid(&self, id: SoluteId) -> Option<&SpatialGrid> {
        self.solute_grids.get(id.index())
    }

    /// Mutable concentration grid of a solute.
    pub fn solute_grid_mut(&mut self, id: SoluteId) -> Option<&mut SpatialGrid> {
        self.solute_grids.get_mut(id.index())
    }

    /// Every concentration grid, indexed by solute id.
    pub fn solute_grids(&self) -> &[SpatialGrid] {
        &self.solute_grids
    }

    /// Local concentration of every solute at `p` (nearest cell).
    pub fn concentrations_at(&self, p: &ContinuousVector) -> Result<Vec<f64>, GridError> {
        self.solute_grids
            .iter()
            .map(|g| g.value_at_point(p))
            .collect()
    }

    // ── Derived grids ───────────────────────────────────────────

    /// `-1` outside, `0` carrier, `1` elsewhere.
    pub fn domain_grid(&self) -> &SpatialGrid {
        &self.domain_grid
    }

    /// Biomass density from the last refresh.
    pub fn biomass_grid(&self) -> &SpatialGrid {
        &self.biomass_grid
    }

    /// `1` where diffusion is resolved, `0` where pinned to the bulk.
    pub fn boundary_layer_grid(&self) -> &SpatialGrid {
        &self.boundary_layer_grid
    }

    /// Diffusivity relative to bulk liquid.
    pub fn diffusivity_grid(&self) -> &SpatialGrid {
        &self.diffusivity_grid
    }

    fn mark_domain_grid(&mut self) {
        self.domain_grid.set_all(-1.0);
        let supports: Vec<Face> = self
            .boundaries
            .iter()
            .filter(|b| b.is_support && self.shape.is_active(b.face.axis()))
            .map(|b| b.face)
            .collect();
        for c in self.shape.interior() {
            let carrier = supports.iter().any(|f| {
                let v = c.axis(f.axis());
                if f.is_max() {
                    v == self.shape.n(f.axis()) as i32 - 1
                } else {
                    v == 0
                }
            });
            *self.domain_grid.at_mut(c.i, c.j, c.k) = if carrier { 0.0 } else { 1.0 };
        }
    }

    /// Rebuild the biomass, boundary-layer and diffusivity grids from a
    /// biomass density grid of the domain's shape.
    ///
    /// A cell is in the boundary layer when it holds biomass, or when
    /// biomass or a carrier cell lies within the boundary-layer
    /// thickness of it. Biomass cells take the biofilm diffusivity.
    pub fn refresh_biofilm_grids(&mut self, biomass: &SpatialGrid) -> Result<(), GridError> {
        self.biomass_grid.copy_values_from(biomass)?;
        let band = self
            .boundary_layer
            .map(|t| (t / self.resolution).ceil() as i32);
        let cells: Vec<DiscreteVector> = self.shape.interior().collect();
        for c in cells {
            let (layer, diff) = if self.biomass_grid.at(c.i, c.j, c.k) > 0.0 {
                (1.0, self.biofilm_diffusivity)
            } else {
                let in_layer = match band {
                    None => true,
                    Some(r) => self.within_band(c, r),
                };
                (if in_layer { 1.0 } else { 0.0 }, 1.0)
            };
            *self.boundary_layer_grid.at_mut(c.i, c.j, c.k) = layer;
            *self.diffusivity_grid.at_mut(c.i, c.j, c.k) = diff;
        }
        let mut layer = std::mem::replace(&mut self.boundary_layer_grid, self.domain_grid.zeros_like(""));
        let mut diff = std::mem::replace(&mut self.diffusivity_grid, self.domain_grid.zeros_like(""));
        self.refresh_boundary(&mut layer, GridRole::Auxiliary);
        self.refresh_boundary(&mut diff, GridRole::Auxiliary);
        self.boundary_layer_grid = layer;
        self.diffusivity_grid = diff;
        Ok(())
    }

    fn within_band(&self, c: DiscreteVector, r: i32) -> bool {
        let span = |axis: usize| if self.shape.is_active(axis) { r } else { 0 };
        let (ri, rj, rk) = (span(0), span(1), span(2));
        let r2 = r * r;
        for di in -ri..=ri {
            for dj in -rj..=rj {
                for dk in -rk..=rk {
                    if di * di + dj * dj + dk * dk > r2 {
                        continue;
                    }
                    let Some(d) = self.wrap_interior(c.offset(di, dj, dk)) else {
                        continue;
                    };
                    if self.biomass_grid.at(d.i, d.j, d.k) > 0.0
                        || self.domain_grid.at(d.i, d.j, d.k) == 0.0
                    {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Map an index onto the interior, wrapping cyclic axes. `None` if the
    /// index leaves the domain through a non-cyclic face.
    fn wrap_interior(&self, mut c: DiscreteVector) -> Option<DiscreteVector> {
        for axis in 0..3 {
            let n = self.shape.n(axis) as i32;
            let v = c.axis(axis);
            if (0..n).contains(&v) {
                continue;
            }
            let face = if v < 0 { Face::ALL[2 * axis] } else { Face::ALL[2 * axis + 1] };
            if !self.boundary(face).is_cyclic() {
                return None;
            }
            *c.axis_mut(axis) = v.rem_euclid(n);
        }
        Some(c)
    }

    // ── Boundaries ──────────────────────────────────────────────

    /// The condition bound to a face.
    pub fn boundary(&self, face: Face) -> &BoundaryCondition {
        &self.boundaries[index_of(face)]
    }

    /// Every condition, in face resolution order.
    pub fn boundaries(&self) -> &[BoundaryCondition] {
        &self.boundaries
    }

    fn ghost_inputs(&self, bc: &BoundaryCondition, role: GridRole) -> GhostInputs {
        match role {
            GridRole::Solute(s) => GhostInputs {
                bulk_value: bc
                    .bulk_name()
                    .and_then(|n| self.bulks.get(n))
                    .map(|b| b.value(s.index())),
                diffusivity: self.solute(s).map_or(0.0, |spec| spec.diffusivity),
            },
            _ => GhostInputs::default(),
        }
    }

    /// Rewrite the ghost layers of any grid with this domain's boundary
    /// conditions. Works on coarser multigrid levels as well, since only
    /// the grid's own shape and resolution are used.
    pub fn refresh_boundary(&self, grid: &mut SpatialGrid, role: GridRole) {
        for bc in &self.boundaries {
            bc.fill_ghosts(grid, role, self.ghost_inputs(bc, role));
        }
    }

    /// Whether no active face exchanges a `role` field with the outside.
    /// Without reactions, the total of such a field is fixed.
    pub fn is_closed(&self, role: GridRole) -> bool {
        self.boundaries
            .iter()
            .filter(|bc| self.shape.is_active(bc.face.axis()))
            .all(|bc| !bc.is_open_for(role, self.ghost_inputs(bc, role)))
    }

    /// Rewrite the ghost layers of every solute grid.
    pub fn refresh_solute_boundaries(&mut self) {
        let mut grids = std::mem::take(&mut self.solute_grids);
        for (idx, g) in grids.iter_mut().enumerate() {
            self.refresh_boundary(g, GridRole::Solute(SoluteId(idx as u32)));
        }
        self.solute_grids = grids;
    }

    /// First face, in resolution order, that `p` lies beyond.
    pub fn test_crossed_boundary(&self, p: &ContinuousVector) -> Option<&BoundaryCondition> {
        let lengths = self.lengths();
        self.boundaries
            .iter()
            .find(|bc| bc.face.is_outside(p, &lengths))
    }

    /// Resolve an agent's target position against every crossed face.
    ///
    /// Faces are applied one at a time in resolution order until the
    /// position is inside. Fails with [`GridError::BoundaryAmbiguity`] if
    /// the position cannot be resolved within one pass per face.
    pub fn apply_agent_boundary(
        &self,
        target: &ContinuousVector,
        radius: f64,
    ) -> Result<AgentCrossing, GridError> {
        let lengths = self.lengths();
        let mut p = *target;
        for _ in 0..Face::ALL.len() {
            let Some(bc) = self.test_crossed_boundary(&p) else {
                return Ok(AgentCrossing::Moved(p));
            };
            match bc.apply_to_agent(&p, radius, &lengths) {
                AgentCrossing::Removed => return Ok(AgentCrossing::Removed),
                AgentCrossing::Moved(q) => p = q,
            }
        }
        match self.test_crossed_boundary(&p) {
            None => Ok(AgentCrossing::Moved(p)),
            Some(bc) => Err(GridError::BoundaryAmbiguity { face: bc.face }),
        }
    }

    // ── Bulks ───────────────────────────────────────────────────

    /// A bulk by name.
    pub fn bulk(&self, name: &str) -> Option<&Bulk> {
        self.bulks.get(name)
    }

    /// Mutable bulk by name.
    pub fn bulk_mut(&mut self, name: &str) -> Option<&mut Bulk> {
        self.bulks.get_mut(name)
    }

    /// Every bulk in registration order.
    pub fn bulks(&self) -> impl Iterator<Item = &Bulk> {
        self.bulks.values()
    }

    /// Highest concentration of a solute imposed anywhere on the domain
    /// boundary. Falls back to the solute's initial value when no face
    /// imposes one.
    pub fn max_bulk_value(&self, id: SoluteId) -> f64 {
        let mut best: Option<f64> = None;
        for bc in &self.boundaries {
            let v = match &bc.kind {
                BoundaryKind::Constant { values } => values.get(id.index()).copied(),
                _ => bc
                    .bulk_name()
                    .and_then(|n| self.bulks.get(n))
                    .map(|b| b.value(id.index())),
            };
            if let Some(v) = v {
                best = Some(best.map_or(v, |b: f64| b.max(v)));
            }
        }
        best.unwrap_or_else(|| self.solute(id).map_or(0.0, |s| s.initial))
    }

    /// Mean inward diffusive flux per unit area across the faces joined
    /// to `bulk`.
    fn face_flux(&self, bulk: &str, id: SoluteId) -> f64 {
        let Some(grid) = self.solute_grids.get(id.index()) else {
            return 0.0;
        };
        let d = self.solute(id).map_or(0.0, |s| s.diffusivity);
        let h = self.resolution;
        let mut total = 0.0;
        let mut count = 0usize;
        for bc in &self.boundaries {
            let axis = bc.face.axis();
            if bc.bulk_name() != Some(bulk) || !self.shape.is_active(axis) {
                continue;
            }
            let n = self.shape.n(axis) as i32;
            let (border, ghost) = if bc.face.is_max() { (n - 1, n) } else { (0, -1) };
            for c in self.shape.interior().filter(|c| c.axis(axis) == border) {
                let mut g = c;
                *g.axis_mut(axis) = ghost;
                let coverage = self.diffusivity_grid.at(c.i, c.j, c.k);
                total += coverage * d * (grid.at(g.i, g.j, g.k) - grid.at(c.i, c.j, c.k)) / h;
                count += 1;
            }
        }
        if count == 0 {
            0.0
        } else {
            total / count as f64
        }
    }

    /// Advance every bulk by `dt` and refresh solute ghosts with the new
    /// bulk values.
    ///
    /// `reaction_rates` holds the domain-averaged net volumetric
    /// production rate of each solute. Reaction-mode bulks scale it by
    /// the domain thickness along x and the specific area; gradient-mode
    /// bulks use the face flux instead.
    pub fn update_bulks(&mut self, now: f64, dt: f64, reaction_rates: &[f64]) {
        let thickness = self.lengths().x;
        let mut exchanges = Vec::with_capacity(self.bulks.len());
        for bulk in self.bulks.values() {
            let exchange: Vec<f64> = (0..self.solutes.len())
                .map(|s| match bulk.mode() {
                    BulkUpdateMode::Reaction => {
                        reaction_rates.get(s).copied().unwrap_or(0.0)
                            * thickness
                            * self.specific_area
                    }
                    BulkUpdateMode::Gradient => {
                        -self.face_flux(bulk.name(), SoluteId(s as u32)) * self.specific_area
                    }
                })
                .collect();
            exchanges.push(exchange);
        }
        for (bulk, exchange) in self.bulks.values_mut().zip(&exchanges) {
            bulk.update(now, dt, exchange);
            debug!("bulk '{}' updated: {:?}", bulk.name(), bulk.values());
        }
        self.refresh_solute_boundaries();
    }

    /// Smallest step any bulk allows.
    pub fn time_constraint(&self) -> f64 {
        self.bulks
            .values()
            .map(Bulk::time_constraint)
            .fold(f64::MAX, f64::min)
    }

    // ── Checkpointing ───────────────────────────────────────────

    /// Save solute grids and bulk state.
    pub fn checkpoint(&self) -> DomainCheckpoint {
        DomainCheckpoint {
            solutes: self.solute_grids.iter().map(|g| g.values().to_vec()).collect(),
            bulks: self.bulks.clone(),
        }
    }

    /// Restore state saved by [`Domain::checkpoint`].
    pub fn restore(&mut self, cp: &DomainCheckpoint) {
        for (g, saved) in self.solute_grids.iter_mut().zip(&cp.solutes) {
            g.values_mut().copy_from_slice(saved);
        }
        self.bulks = cp.bulks.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::BulkSolute;

    fn column(n: usize) -> Domain {
        Domain::builder("column")
            .grid(n, 1, 1)
            .resolution(1.0)
            .solute("s", 1.0, 0.5)
            .face(Face::XMin, BoundaryKind::Constant { values: vec![2.0] })
            .face(Face::XMax, BoundaryKind::ZeroFlux)
            .build()
            .unwrap()
    }

    fn slab() -> DomainBuilder {
        Domain::builder("slab")
            .grid(8, 8, 1)
            .resolution(2.0)
            .solute("o2", 2.0, 1.0)
            .bulk(Bulk::new("tank", 0.1, vec![BulkSolute::dynamic(1.0, 1.0)]))
            .boundary(BoundaryCondition::new(Face::XMin, BoundaryKind::ZeroFlux).support())
            .face(Face::XMax, BoundaryKind::Bulk { bulk: "tank".into() })
            .face(Face::YMin, BoundaryKind::Cyclic)
            .face(Face::YMax, BoundaryKind::Cyclic)
    }

    // ── Builder tests ───────────────────────────────────────────

    #[test]
    fn missing_active_face_is_rejected() {
        let r = Domain::builder("d")
            .grid(4, 4, 1)
            .face(Face::XMin, BoundaryKind::ZeroFlux)
            .face(Face::XMax, BoundaryKind::ZeroFlux)
            .face(Face::YMin, BoundaryKind::ZeroFlux)
            .build();
        assert!(matches!(r, Err(GridError::MissingBoundary { face: Face::YMax })));
    }

    #[test]
    fn duplicate_face_is_ambiguous() {
        let r = slab().face(Face::XMin, BoundaryKind::ZeroFlux).build();
        assert!(matches!(r, Err(GridError::BoundaryAmbiguity { face: Face::XMin })));
    }

    #[test]
    fn unpaired_cyclic_is_rejected() {
        let r = Domain::builder("d")
            .grid(4, 1, 1)
            .face(Face::XMin, BoundaryKind::Cyclic)
            .face(Face::XMax, BoundaryKind::ZeroFlux)
            .build();
        assert!(matches!(r, Err(GridError::InvalidParameter { .. })));
    }

    #[test]
    fn unknown_bulk_is_rejected() {
        let r = Domain::builder("d")
            .grid(4, 1, 1)
            .solute("s", 1.0, 0.0)
            .face(Face::XMin, BoundaryKind::Bulk { bulk: "nope".into() })
            .face(Face::XMax, BoundaryKind::ZeroFlux)
            .build();
        assert!(matches!(r, Err(GridError::InvalidParameter { .. })));
    }

    #[test]
    fn flat_faces_default_to_zero_flux() {
        let d = column(4);
        assert_eq!(d.boundary(Face::ZMax).kind, BoundaryKind::ZeroFlux);
        assert_eq!(d.boundaries().len(), 6);
    }

    #[test]
    fn ghosts_refreshed_at_build() {
        let d = column(4);
        let g = d.solute_grid(SoluteId(0)).unwrap();
        // Odd reflection about the face value 2.0.
        assert_eq!(g.at(-1, 0, 0), 3.5);
        assert_eq!(g.at(4, 0, 0), 0.5);
    }

    #[test]
    fn closed_only_without_open_faces() {
        let s = GridRole::Solute(SoluteId(0));
        assert!(!column(4).is_closed(s));
        let sealed = Domain::builder("sealed")
            .grid(4, 1, 1)
            .solute("s", 1.0, 0.0)
            .face(Face::XMin, BoundaryKind::ZeroFlux)
            .face(Face::XMax, BoundaryKind::ZeroFlux)
            .build()
            .unwrap();
        assert!(sealed.is_closed(s));
        assert!(sealed.is_closed(GridRole::Pressure));
        let slab = slab().build().unwrap();
        assert!(!slab.is_closed(GridRole::Pressure));
        assert!(slab.is_closed(GridRole::Auxiliary));
    }

    // ── Biofilm grid tests ──────────────────────────────────────

    #[test]
    fn carrier_cells_marked_next_to_support() {
        let d = slab().build().unwrap();
        assert_eq!(d.domain_grid().at(0, 3, 0), 0.0);
        assert_eq!(d.domain_grid().at(1, 3, 0), 1.0);
        assert_eq!(d.domain_grid().at(-1, 3, 0), -1.0);
    }

    #[test]
    fn boundary_layer_dilates_biomass() {
        let mut d = slab().boundary_layer(4.0).biofilm_diffusivity(0.5).build().unwrap();
        let mut biomass = d.biomass_grid().zeros_like("b");
        *biomass.at_mut(4, 4, 0) = 1.0;
        d.refresh_biofilm_grids(&biomass).unwrap();
        let layer = d.boundary_layer_grid();
        // Band of ceil(4 / 2) = 2 cells.
        assert_eq!(layer.at(4, 6, 0), 1.0);
        assert_eq!(layer.at(4, 4, 0), 1.0);
        assert_eq!(layer.at(7, 4, 0), 0.0);
        // Carrier cells are always in the layer.
        assert_eq!(layer.at(0, 0, 0), 1.0);
        assert_eq!(d.diffusivity_grid().at(4, 4, 0), 0.5);
        assert_eq!(d.diffusivity_grid().at(4, 5, 0), 1.0);
    }

    #[test]
    fn dilation_wraps_cyclic_axes() {
        let mut d = slab().boundary_layer(2.0).build().unwrap();
        let mut biomass = d.biomass_grid().zeros_like("b");
        *biomass.at_mut(5, 0, 0) = 1.0;
        d.refresh_biofilm_grids(&biomass).unwrap();
        assert_eq!(d.boundary_layer_grid().at(5, 7, 0), 1.0);
    }

    // ── Agent boundary tests ────────────────────────────────────

    #[test]
    fn corner_resolves_in_face_order() {
        let d = slab().build().unwrap();
        // Outside x-min (zero flux) and y-min (cyclic) at once.
        let p = ContinuousVector::new(-0.5, -0.25, 1.0);
        let r = d.apply_agent_boundary(&p, 0.5).unwrap();
        assert_eq!(r, AgentCrossing::Moved(ContinuousVector::new(0.5, 15.75, 1.0)));
    }

    #[test]
    fn crossing_bulk_face_removes() {
        let d = slab().build().unwrap();
        let p = ContinuousVector::new(16.5, 3.0, 1.0);
        assert_eq!(d.apply_agent_boundary(&p, 0.5).unwrap(), AgentCrossing::Removed);
        assert_eq!(d.test_crossed_boundary(&p).unwrap().face, Face::XMax);
    }

    // ── Bulk tests ──────────────────────────────────────────────

    #[test]
    fn max_bulk_value_prefers_boundary() {
        let d = column(4);
        assert_eq!(d.max_bulk_value(SoluteId(0)), 2.0);
        let s = slab().build().unwrap();
        assert_eq!(s.max_bulk_value(SoluteId(0)), 1.0);
    }

    #[test]
    fn reaction_mode_bulk_consumes() {
        let mut d = slab().specific_area(0.5).build().unwrap();
        d.update_bulks(0.0, 1.0, &[-0.1]);
        let v = d.bulk("tank").unwrap().value(0);
        assert!(v < 1.0);
        let g = d.solute_grid(SoluteId(0)).unwrap();
        let face = 0.5 * (g.at(7, 2, 0) + g.at(8, 2, 0));
        assert!((face - v).abs() < 1e-12);
    }

    #[test]
    fn checkpoint_restores_grids_and_bulks() {
        let mut d = slab().specific_area(1.0).build().unwrap();
        let cp = d.checkpoint();
        d.solute_grid_mut(SoluteId(0)).unwrap().set_all(9.0);
        d.update_bulks(0.0, 1.0, &[-0.2]);
        d.restore(&cp);
        assert_eq!(d.solute_grid(SoluteId(0)).unwrap().at(3, 3, 0), 1.0);
        assert_eq!(d.bulk("tank").unwrap().value(0), 1.0);
    }
}

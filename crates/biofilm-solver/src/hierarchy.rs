//! Full-approximation-scheme multigrid over a stack of grid levels.
//!
//! Every field of the problem lives on every level. Fields are coupled
//! only through the reaction term, so each relaxation sweep first
//! refreshes the reaction grids of the level from all current field
//! values and then relaxes each solved field in red-black order.
//!
//! The discrete operator on level `l` for field `s` at cell `c` is
//!
//! ```text
//! L(u)_c = Σ_n w_cn (u_n - u_c) + R_c - u_c / dt
//! w_cn   = D_s · (rd_c + rd_n) / 2 / h_l²
//! ```
//!
//! where `rd` is the relative diffusivity, `R` the reaction grid and the
//! last term is present only for transient solves. Level 0 solves
//! `L(u) = f` with `f = 0` (steady) or `f = -u_old / dt` (transient);
//! coarser levels solve the FAS correction problem.
//!
//! Unknowns sit at cell centres and the domain faces lie half a cell
//! outside the outermost centres on every level, so the coarse operator
//! sees the same walls as the fine one. The boundary layer is restricted
//! by its maximum so a coarse cell is pinned only when all of its
//! children are.
//!
//! A steady solve of a field with no open face and no reaction only
//! determines the field up to a constant. After cycling, such a field is
//! shifted back onto the total it was loaded with.

use biofilm_core::SolverError;
use biofilm_grid::{Domain, GridError, GridRole, GridShape, SpatialGrid};
use log::debug;
use biofilm_kinetics::{apply_reactions, Reaction};

use crate::config::{Linearization, MultigridConfig};
use crate::levels::{check_coarsening, interpolate, restrict, restrict_max};

/// Boundary-layer values at or below this are outside the layer.
const LAYER_THRESHOLD: f64 = 0.1;

/// How one field is treated by the hierarchy.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct FieldSpec {
    /// Display name for reports.
    pub name: String,
    /// Ghost-cell role.
    pub role: GridRole,
    /// Diffusivity in bulk liquid.
    pub diffusivity: f64,
    /// Whether negative values are kept.
    pub signed: bool,
    /// Whether the field is relaxed. Unsolved fields only feed reactions.
    pub solved: bool,
    /// Value imposed outside the boundary layer, if the layer applies.
    pub pinned: Option<f64>,
}

/// Where the reaction term comes from.
#[derive(Clone, Copy)]
pub(crate) enum Source<'a> {
    /// Recompute from rate laws and catalyst grids on every sweep.
    Reactions(&'a [Reaction]),
    /// Use the reaction grids as loaded, with zero derivative.
    Fixed,
}

/// Result of cycling the finest level towards tolerance.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct CycleOutcome {
    pub cycles: usize,
    pub residual: f64,
    pub worst: usize,
    pub converged: bool,
}

#[derive(Clone, Debug)]
struct Level {
    conc: Vec<SpatialGrid>,
    rhs: Vec<SpatialGrid>,
    reac: Vec<SpatialGrid>,
    diff: Vec<SpatialGrid>,
    saved: Vec<SpatialGrid>,
    work: Vec<SpatialGrid>,
    catalysts: Vec<SpatialGrid>,
    rel_diff: SpatialGrid,
    layer: SpatialGrid,
}

impl Level {
    fn new(
        shape: GridShape,
        resolution: f64,
        fields: usize,
        catalysts: usize,
    ) -> Result<Self, GridError> {
        let blank = SpatialGrid::new("level", shape, resolution)?;
        let many = |n: usize| vec![blank.clone(); n];
        Ok(Self {
            conc: many(fields),
            rhs: many(fields),
            reac: many(fields),
            diff: many(fields),
            saved: many(fields),
            work: many(fields),
            catalysts: many(catalysts),
            rel_diff: blank.clone(),
            layer: blank,
        })
    }
}

/// Working storage and cycling logic for one multigrid problem.
#[derive(Clone, Debug)]
pub(crate) struct Hierarchy {
    levels: Vec<Level>,
    fields: Vec<FieldSpec>,
    dt_inv: f64,
    /// Interior total of each field as loaded.
    initial_mass: Vec<f64>,
    /// Whether each field has no open face on an active axis.
    closed: Vec<bool>,
}

fn pair(levels: &mut [Level], l: usize) -> (&mut Level, &mut Level) {
    let (fine, coarse) = levels.split_at_mut(l + 1);
    (&mut fine[l], &mut coarse[0])
}

impl Hierarchy {
    /// Allocate every level for `fields` fields and `catalysts` catalyst
    /// grids over a finest grid of `shape`.
    ///
    /// # Errors
    ///
    /// [`SolverError::UnsupportedGrid`] when an active axis does not
    /// coarsen down to a handful of cells.
    pub fn new(
        shape: GridShape,
        resolution: f64,
        fields: Vec<FieldSpec>,
        catalysts: usize,
    ) -> Result<Self, SolverError> {
        let shapes = check_coarsening(shape).map_err(|reason| SolverError::UnsupportedGrid {
            dims: shape.dims(),
            reason,
        })?;
        let mut levels = Vec::new();
        let mut h = resolution;
        for s in shapes {
            levels.push(Level::new(s, h, fields.len(), catalysts)?);
            h *= 2.0;
        }
        debug!(
            "multigrid hierarchy over {:?}: {} levels down to {:?}",
            shape.dims(),
            levels.len(),
            levels[levels.len() - 1].layer.shape().dims()
        );
        let n = fields.len();
        Ok(Self {
            levels,
            fields,
            dt_inv: 0.0,
            initial_mass: vec![0.0; n],
            closed: vec![false; n],
        })
    }

    /// Number of levels, finest included.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Field descriptions.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Update the pinned value of a field.
    pub fn set_pinned(&mut self, field: usize, value: Option<f64>) {
        if let Some(f) = self.fields.get_mut(field) {
            f.pinned = value;
        }
    }

    /// Finest-level solution of a field.
    pub fn finest(&self, field: usize) -> &SpatialGrid {
        &self.levels[0].conc[field]
    }

    /// Finest-level reaction grid of a field.
    pub fn finest_reaction(&self, field: usize) -> &SpatialGrid {
        &self.levels[0].reac[field]
    }

    /// Copy the initial state into level 0 and restrict the static grids
    /// (catalysts, relative diffusivity, boundary layer) to every level.
    ///
    /// `sources` pre-loads the level-0 reaction grids when the problem
    /// uses [`Source::Fixed`]. A `transient_dt` switches on the implicit
    /// Euler term with the loaded state as `u_old`.
    #[allow(clippy::too_many_arguments)]
    pub fn load(
        &mut self,
        domain: &Domain,
        initial: &[&SpatialGrid],
        catalysts: &[SpatialGrid],
        rel_diff: &SpatialGrid,
        layer: &SpatialGrid,
        sources: Option<&[SpatialGrid]>,
        transient_dt: Option<f64>,
    ) -> Result<(), GridError> {
        self.dt_inv = transient_dt.map_or(0.0, |dt| 1.0 / dt);
        let fine = &mut self.levels[0];
        for (dst, src) in fine.conc.iter_mut().zip(initial) {
            dst.copy_values_from(src)?;
        }
        for (dst, src) in fine.catalysts.iter_mut().zip(catalysts) {
            dst.copy_values_from(src)?;
            domain.refresh_boundary(dst, GridRole::Auxiliary);
        }
        fine.rel_diff.copy_values_from(rel_diff)?;
        fine.layer.copy_values_from(layer)?;
        for g in fine.reac.iter_mut().chain(fine.diff.iter_mut()) {
            g.set_all(0.0);
        }
        if let Some(src) = sources {
            for (dst, s) in fine.reac.iter_mut().zip(src) {
                dst.copy_values_from(s)?;
                domain.refresh_boundary(dst, GridRole::Auxiliary);
            }
        }
        for s in 0..self.fields.len() {
            let g = &mut self.levels[0].rhs[s];
            if self.dt_inv > 0.0 {
                g.copy_values_from(initial[s])?;
                for v in g.values_mut() {
                    *v *= -self.dt_inv;
                }
            } else {
                g.set_all(0.0);
            }
        }
        for s in 0..self.fields.len() {
            self.pin(0, s);
            self.refresh(0, s, domain);
            self.initial_mass[s] = self.levels[0].conc[s].sum();
            self.closed[s] = domain.is_closed(self.fields[s].role);
        }
        for l in 0..self.levels.len() - 1 {
            let (fine, coarse) = pair(&mut self.levels, l);
            for (f, c) in fine.catalysts.iter().zip(coarse.catalysts.iter_mut()) {
                restrict(f, c);
                domain.refresh_boundary(c, GridRole::Auxiliary);
            }
            for (f, c) in fine.reac.iter().zip(coarse.reac.iter_mut()) {
                restrict(f, c);
            }
            restrict(&fine.rel_diff, &mut coarse.rel_diff);
            domain.refresh_boundary(&mut coarse.rel_diff, GridRole::Auxiliary);
            restrict_max(&fine.layer, &mut coarse.layer);
            domain.refresh_boundary(&mut coarse.layer, GridRole::Auxiliary);
        }
        Ok(())
    }

    fn refresh(&mut self, l: usize, s: usize, domain: &Domain) {
        let role = self.fields[s].role;
        domain.refresh_boundary(&mut self.levels[l].conc[s], role);
    }

    fn is_pinned(&self, l: usize, s: usize, i: i32, j: i32, k: i32) -> Option<f64> {
        let pinned = self.fields[s].pinned?;
        if self.levels[l].layer.at(i, j, k) <= LAYER_THRESHOLD {
            Some(pinned)
        } else {
            None
        }
    }

    fn pin(&mut self, l: usize, s: usize) {
        if self.fields[s].pinned.is_none() {
            return;
        }
        let shape = self.levels[l].conc[s].shape();
        for c in shape.interior() {
            if let Some(v) = self.is_pinned(l, s, c.i, c.j, c.k) {
                *self.levels[l].conc[s].at_mut(c.i, c.j, c.k) = v;
            }
        }
    }

    fn update_reac(&mut self, l: usize, source: Source<'_>) -> Result<(), SolverError> {
        if let Source::Reactions(reactions) = source {
            let lvl = &mut self.levels[l];
            apply_reactions(
                reactions,
                &lvl.catalysts,
                &lvl.conc,
                &mut lvl.reac,
                &mut lvl.diff,
            )?;
        }
        Ok(())
    }

    /// `(L(u)_c, Σ w_cn)` for field `s` at cell `(i, j, k)` of level `l`.
    fn operator(&self, l: usize, s: usize, i: i32, j: i32, k: i32) -> (f64, f64) {
        let lvl = &self.levels[l];
        let u = &lvl.conc[s];
        let shape = u.shape();
        let h = u.resolution();
        let scale = self.fields[s].diffusivity / (h * h);
        let uc = u.at(i, j, k);
        let rdc = lvl.rel_diff.at(i, j, k);
        let mut flux = 0.0;
        let mut diag = 0.0;
        for axis in 0..3 {
            if !shape.is_active(axis) {
                continue;
            }
            for d in [-1, 1] {
                let mut n = [i, j, k];
                n[axis] += d;
                let w = scale * 0.5 * (rdc + lvl.rel_diff.at(n[0], n[1], n[2]));
                flux += w * (u.at(n[0], n[1], n[2]) - uc);
                diag += w;
            }
        }
        (flux + lvl.reac[s].at(i, j, k) - self.dt_inv * uc, diag)
    }

    fn relax(
        &mut self,
        l: usize,
        sweeps: usize,
        domain: &Domain,
        source: Source<'_>,
        linearization: Linearization,
    ) -> Result<(), SolverError> {
        let shape = self.levels[l].conc[0].shape();
        for _ in 0..sweeps {
            self.update_reac(l, source)?;
            for colour in 0..2 {
                for s in 0..self.fields.len() {
                    if !self.fields[s].solved {
                        continue;
                    }
                    for c in shape.interior() {
                        if (c.i + c.j + c.k).rem_euclid(2) != colour {
                            continue;
                        }
                        if let Some(v) = self.is_pinned(l, s, c.i, c.j, c.k) {
                            *self.levels[l].conc[s].at_mut(c.i, c.j, c.k) = v;
                            continue;
                        }
                        let (lu, diag) = self.operator(l, s, c.i, c.j, c.k);
                        let lvl = &self.levels[l];
                        let r = lvl.rhs[s].at(c.i, c.j, c.k) - lu;
                        let base = diag + self.dt_inv;
                        let mut denom = match linearization {
                            Linearization::Newton => base - lvl.diff[s].at(c.i, c.j, c.k),
                            Linearization::Lagged => base,
                        };
                        if denom <= 0.0 {
                            denom = base;
                        }
                        if denom <= 0.0 {
                            continue;
                        }
                        let mut next = lvl.conc[s].at(c.i, c.j, c.k) - r / denom;
                        if !self.fields[s].signed && next < 0.0 {
                            next = 0.0;
                        }
                        *self.levels[l].conc[s].at_mut(c.i, c.j, c.k) = next;
                    }
                    self.refresh(l, s, domain);
                }
            }
        }
        Ok(())
    }

    /// Store `f - L(u)` of every solved field in the level's work grids and
    /// return the largest scaled residual with the field it occurs in.
    fn residual(&mut self, l: usize) -> (f64, usize) {
        let shape = self.levels[l].conc[0].shape();
        let mut worst = (0.0, 0);
        for s in 0..self.fields.len() {
            self.levels[l].work[s].set_all(0.0);
            if !self.fields[s].solved {
                continue;
            }
            for c in shape.interior() {
                if self.is_pinned(l, s, c.i, c.j, c.k).is_some() {
                    continue;
                }
                let (lu, diag) = self.operator(l, s, c.i, c.j, c.k);
                let lvl = &mut self.levels[l];
                let r = lvl.rhs[s].at(c.i, c.j, c.k) - lu;
                *lvl.work[s].at_mut(c.i, c.j, c.k) = r;
                let scale = diag + self.dt_inv + lvl.diff[s].at(c.i, c.j, c.k).abs();
                if scale > 0.0 {
                    let scaled = r.abs() / scale;
                    if scaled > worst.0 || !scaled.is_finite() {
                        worst = (scaled, s);
                    }
                }
            }
        }
        worst
    }

    fn cycle(
        &mut self,
        l: usize,
        domain: &Domain,
        source: Source<'_>,
        cfg: &MultigridConfig,
    ) -> Result<(), SolverError> {
        if l + 1 == self.levels.len() {
            return self.relax(l, cfg.n_coarse, domain, source, cfg.linearization);
        }
        self.relax(l, cfg.n_pre, domain, source, cfg.linearization)?;
        self.update_reac(l, source)?;
        self.residual(l);

        let n = self.fields.len();
        {
            let (fine, coarse) = pair(&mut self.levels, l);
            for s in 0..n {
                restrict(&fine.conc[s], &mut coarse.conc[s]);
                domain.refresh_boundary(&mut coarse.conc[s], self.fields[s].role);
                coarse.saved[s].copy_values_from(&coarse.conc[s])?;
                restrict(&fine.work[s], &mut coarse.work[s]);
            }
        }
        self.update_reac(l + 1, source)?;
        let coarse_shape = self.levels[l + 1].conc[0].shape();
        for s in 0..n {
            if !self.fields[s].solved {
                continue;
            }
            for c in coarse_shape.interior() {
                let (lu, _) = self.operator(l + 1, s, c.i, c.j, c.k);
                let pinned = self.is_pinned(l + 1, s, c.i, c.j, c.k).is_some();
                let lvl = &mut self.levels[l + 1];
                let r = if pinned {
                    0.0
                } else {
                    lvl.work[s].at(c.i, c.j, c.k)
                };
                *lvl.rhs[s].at_mut(c.i, c.j, c.k) = lu + r;
            }
        }

        for _ in 0..cfg.cycle.visits() {
            self.cycle(l + 1, domain, source, cfg)?;
        }

        for s in 0..n {
            if !self.fields[s].solved {
                continue;
            }
            {
                let (fine, coarse) = pair(&mut self.levels, l);
                for (e, u) in coarse.saved[s]
                    .values_mut()
                    .iter_mut()
                    .zip(coarse.conc[s].values())
                {
                    *e = *u - *e;
                }
                interpolate(&coarse.saved[s], &mut fine.work[s]);
                let shape = fine.conc[s].shape();
                let signed = self.fields[s].signed;
                for c in shape.interior() {
                    let u = fine.conc[s].at_mut(c.i, c.j, c.k);
                    *u += fine.work[s].at(c.i, c.j, c.k);
                    if !signed && *u < 0.0 {
                        *u = 0.0;
                    }
                }
            }
            self.pin(l, s);
            self.refresh(l, s, domain);
        }
        self.relax(l, cfg.n_post, domain, source, cfg.linearization)
    }

    /// Shift a steady, closed, reaction-free field back onto its loaded
    /// total. Leaves every other field alone.
    fn restore_mass(&mut self, s: usize, domain: &Domain) {
        let spec = &self.fields[s];
        if !spec.solved || !self.closed[s] || self.dt_inv > 0.0 {
            return;
        }
        let fine = &self.levels[0];
        let shape = fine.conc[s].shape();
        let reacting = shape
            .interior()
            .any(|c| fine.reac[s].at(c.i, c.j, c.k) != 0.0 || fine.diff[s].at(c.i, c.j, c.k) != 0.0);
        let pinned = shape
            .interior()
            .any(|c| self.is_pinned(0, s, c.i, c.j, c.k).is_some());
        if reacting || pinned {
            return;
        }
        let shift = (self.initial_mass[s] - fine.conc[s].sum()) / shape.interior_len() as f64;
        if shift == 0.0 {
            return;
        }
        let signed = spec.signed;
        let grid = &mut self.levels[0].conc[s];
        for c in shape.interior() {
            let u = grid.at_mut(c.i, c.j, c.k);
            *u += shift;
            if !signed && *u < 0.0 {
                *u = 0.0;
            }
        }
        self.refresh(0, s, domain);
    }

    /// Run cycles on the finest level until the largest scaled residual is
    /// within tolerance or the cycle budget is spent.
    pub fn cycle_to_tolerance(
        &mut self,
        domain: &Domain,
        source: Source<'_>,
        cfg: &MultigridConfig,
    ) -> Result<CycleOutcome, SolverError> {
        self.update_reac(0, source)?;
        let (mut residual, mut worst) = self.residual(0);
        let mut cycles = 0;
        while !(residual <= cfg.tolerance) && cycles < cfg.max_cycles {
            self.cycle(0, domain, source, cfg)?;
            cycles += 1;
            self.update_reac(0, source)?;
            (residual, worst) = self.residual(0);
        }
        for s in 0..self.fields.len() {
            self.restore_mass(s, domain);
        }
        Ok(CycleOutcome {
            cycles,
            residual,
            worst,
            converged: residual <= cfg.tolerance,
        })
    }
}

//! Padded 3D scalar grids.
//!
//! A [`SpatialGrid`] stores `(ni + 2p) × (nj + 2p) × (nk + 2p)` doubles,
//! where `p` is the ghost padding. Interior indices run from `0` to
//! `n - 1`; ghost indices run from `-p` to `-1` and from `n` to
//! `n + p - 1`. Every checked accessor rejects indices outside that
//! padded extent with [`GridError::OutOfBounds`]. No clamping happens
//! here: boundary policy is applied by the caller before indexing.

use biofilm_core::{ContinuousVector, DiscreteVector};

use crate::error::GridError;

/// Dimensions and padding of a grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridShape {
    /// Interior cells along x.
    pub ni: usize,
    /// Interior cells along y.
    pub nj: usize,
    /// Interior cells along z.
    pub nk: usize,
    /// Ghost layers on every side.
    pub padding: usize,
}

impl GridShape {
    /// Create a shape, rejecting zero-length axes.
    pub fn new(ni: usize, nj: usize, nk: usize, padding: usize) -> Result<Self, GridError> {
        if ni == 0 || nj == 0 || nk == 0 {
            return Err(GridError::EmptyGrid);
        }
        Ok(Self { ni, nj, nk, padding })
    }

    /// Interior cell counts as an array.
    pub fn dims(&self) -> [usize; 3] {
        [self.ni, self.nj, self.nk]
    }

    /// Interior cell count along `axis`.
    pub fn n(&self, axis: usize) -> usize {
        self.dims()[axis]
    }

    /// Padded cell counts as an array.
    pub fn padded_dims(&self) -> [usize; 3] {
        let p = 2 * self.padding;
        [self.ni + p, self.nj + p, self.nk + p]
    }

    /// Total number of stored values, ghosts included.
    pub fn len(&self) -> usize {
        let [a, b, c] = self.padded_dims();
        a * b * c
    }

    /// Always false: a valid shape has at least one cell.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Number of interior cells.
    pub fn interior_len(&self) -> usize {
        self.ni * self.nj * self.nk
    }

    /// Whether diffusion acts along `axis`. Axes with one cell are flat.
    pub fn is_active(&self, axis: usize) -> bool {
        self.n(axis) > 1
    }

    /// Number of active axes (1 for a column, 2 for a slab, 3 for a box).
    pub fn active_axes(&self) -> usize {
        (0..3).filter(|&a| self.is_active(a)).count()
    }

    /// Whether `c` lies within the padded extent.
    pub fn contains(&self, c: DiscreteVector) -> bool {
        let p = self.padding as i32;
        (0..3).all(|a| {
            let v = c.axis(a);
            v >= -p && v < self.n(a) as i32 + p
        })
    }

    /// Whether `c` is an interior (non-ghost) cell.
    pub fn is_interior(&self, c: DiscreteVector) -> bool {
        (0..3).all(|a| {
            let v = c.axis(a);
            v >= 0 && v < self.n(a) as i32
        })
    }

    /// Flat storage index of `c`, checked against the padded extent.
    pub fn flat_index(&self, c: DiscreteVector) -> Result<usize, GridError> {
        if !self.contains(c) {
            return Err(GridError::OutOfBounds {
                coord: c,
                bounds: self.bounds_description(),
            });
        }
        Ok(self.flat(c.i, c.j, c.k))
    }

    /// Flat storage index without a bounds check.
    ///
    /// The caller guarantees `(i, j, k)` lies within the padded extent;
    /// out-of-range input produces an index that may alias another cell
    /// or overrun the storage.
    #[inline]
    pub fn flat(&self, i: i32, j: i32, k: i32) -> usize {
        let p = self.padding as i32;
        let [_, pj, pk] = self.padded_dims();
        let ii = (i + p) as usize;
        let jj = (j + p) as usize;
        let kk = (k + p) as usize;
        (ii * pj + jj) * pk + kk
    }

    /// Iterate interior cells in storage order.
    pub fn interior(&self) -> impl Iterator<Item = DiscreteVector> {
        let (ni, nj, nk) = (self.ni as i32, self.nj as i32, self.nk as i32);
        (0..ni).flat_map(move |i| {
            (0..nj).flat_map(move |j| (0..nk).map(move |k| DiscreteVector::new(i, j, k)))
        })
    }

    fn bounds_description(&self) -> String {
        let p = self.padding as i32;
        format!(
            "[{}, {}) x [{}, {}) x [{}, {})",
            -p,
            self.ni as i32 + p,
            -p,
            self.nj as i32 + p,
            -p,
            self.nk as i32 + p
        )
    }
}

/// A dense padded 3D array of doubles at a fixed resolution.
///
/// The grid owns no knowledge of what quantity it holds; the association
/// between grids and solutes lives in the [`Domain`](crate::Domain).
#[derive(Clone, Debug, PartialEq)]
pub struct SpatialGrid {
    name: String,
    shape: GridShape,
    resolution: f64,
    values: Vec<f64>,
}

impl SpatialGrid {
    /// Create a zero-filled grid.
    pub fn new(
        name: impl Into<String>,
        shape: GridShape,
        resolution: f64,
    ) -> Result<Self, GridError> {
        if !(resolution > 0.0) || !resolution.is_finite() {
            return Err(GridError::InvalidResolution { value: resolution });
        }
        Ok(Self {
            name: name.into(),
            shape,
            resolution,
            values: vec![0.0; shape.len()],
        })
    }

    /// Create a grid with the same shape and resolution as `self`.
    pub fn zeros_like(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shape: self.shape,
            resolution: self.resolution,
            values: vec![0.0; self.values.len()],
        }
    }

    /// Label used in logs and snapshots.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shape of the grid.
    pub fn shape(&self) -> GridShape {
        self.shape
    }

    /// Side length of a cell.
    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    /// Volume of one cell.
    pub fn voxel_volume(&self) -> f64 {
        self.resolution.powi(3)
    }

    /// Raw storage, ghosts included.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Mutable raw storage, ghosts included.
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    // ── Discrete access ─────────────────────────────────────────

    /// Value at a discrete index.
    pub fn value_at(&self, c: DiscreteVector) -> Result<f64, GridError> {
        Ok(self.values[self.shape.flat_index(c)?])
    }

    /// Overwrite the value at a discrete index.
    pub fn set_value_at(&mut self, c: DiscreteVector, value: f64) -> Result<(), GridError> {
        let idx = self.shape.flat_index(c)?;
        self.values[idx] = value;
        Ok(())
    }

    /// Add `delta` to the value at a discrete index.
    pub fn add_value_at(&mut self, c: DiscreteVector, delta: f64) -> Result<(), GridError> {
        let idx = self.shape.flat_index(c)?;
        self.values[idx] += delta;
        Ok(())
    }

    /// Unchecked read for inner loops; see [`GridShape::flat`].
    #[inline]
    pub fn at(&self, i: i32, j: i32, k: i32) -> f64 {
        self.values[self.shape.flat(i, j, k)]
    }

    /// Unchecked mutable access for inner loops; see [`GridShape::flat`].
    #[inline]
    pub fn at_mut(&mut self, i: i32, j: i32, k: i32) -> &mut f64 {
        let idx = self.shape.flat(i, j, k);
        &mut self.values[idx]
    }

    // ── Continuous access ───────────────────────────────────────

    /// Value of the cell containing `p` (nearest cell center).
    pub fn value_at_point(&self, p: &ContinuousVector) -> Result<f64, GridError> {
        self.value_at(p.to_discrete(self.resolution))
    }

    /// Overwrite the value of the cell containing `p`.
    pub fn set_value_at_point(&mut self, p: &ContinuousVector, value: f64) -> Result<(), GridError> {
        self.set_value_at(p.to_discrete(self.resolution), value)
    }

    /// Add `delta` to the cell containing `p`.
    pub fn add_value_at_point(&mut self, p: &ContinuousVector, delta: f64) -> Result<(), GridError> {
        self.add_value_at(p.to_discrete(self.resolution), delta)
    }

    /// Trilinear interpolation between the cell centers around `p`.
    ///
    /// Flat axes contribute no interpolation. The stencil is clamped to
    /// the padded extent, so positions in the outer half of the last
    /// ghost layer take the ghost value.
    pub fn interpolate(&self, p: &ContinuousVector) -> Result<f64, GridError> {
        let cell = p.to_discrete(self.resolution);
        if !self.shape.contains(cell) {
            return Err(GridError::OutOfBounds {
                coord: cell,
                bounds: self.shape.bounds_description(),
            });
        }
        let pad = self.shape.padding as i32;
        let mut base = [0i32; 3];
        let mut frac = [0.0f64; 3];
        for axis in 0..3 {
            if !self.shape.is_active(axis) {
                base[axis] = 0;
                continue;
            }
            let u = p.axis(axis) / self.resolution - 0.5;
            let lo = -pad;
            let hi = self.shape.n(axis) as i32 + pad - 2;
            let i0 = (u.floor() as i32).clamp(lo, hi);
            base[axis] = i0;
            frac[axis] = (u - i0 as f64).clamp(0.0, 1.0);
        }
        let mut acc = 0.0;
        for corner in 0..8u8 {
            let mut w = 1.0;
            let mut idx = base;
            for (axis, slot) in idx.iter_mut().enumerate() {
                if !self.shape.is_active(axis) {
                    if corner & (1 << axis) != 0 {
                        w = 0.0;
                    }
                    continue;
                }
                if corner & (1 << axis) != 0 {
                    *slot += 1;
                    w *= frac[axis];
                } else {
                    w *= 1.0 - frac[axis];
                }
            }
            if w != 0.0 {
                acc += w * self.at(idx[0], idx[1], idx[2]);
            }
        }
        Ok(acc)
    }

    /// Centred-difference gradient at a cell. Flat axes have zero
    /// gradient. Requires both neighbours along each active axis to be
    /// inside the padded extent.
    pub fn gradient(&self, c: DiscreteVector) -> Result<ContinuousVector, GridError> {
        let mut g = ContinuousVector::ZERO;
        for axis in 0..3 {
            if !self.shape.is_active(axis) {
                continue;
            }
            let mut lo = c;
            let mut hi = c;
            *lo.axis_mut(axis) -= 1;
            *hi.axis_mut(axis) += 1;
            let d = (self.value_at(hi)? - self.value_at(lo)?) / (2.0 * self.resolution);
            *g.axis_mut(axis) = d;
        }
        Ok(g)
    }

    /// Gradient at the cell containing `p`.
    pub fn gradient_at_point(&self, p: &ContinuousVector) -> Result<ContinuousVector, GridError> {
        self.gradient(p.to_discrete(self.resolution))
    }

    // ── Whole-grid operations ───────────────────────────────────

    fn check_same_shape(&self, other: &SpatialGrid) -> Result<(), GridError> {
        if self.shape != other.shape {
            return Err(GridError::ShapeMismatch {
                expected: self.shape.padded_dims(),
                found: other.shape.padded_dims(),
            });
        }
        Ok(())
    }

    /// Element-wise `self += other`, ghosts included.
    pub fn add_all_values(&mut self, other: &SpatialGrid) -> Result<(), GridError> {
        self.check_same_shape(other)?;
        for (a, b) in self.values.iter_mut().zip(&other.values) {
            *a += *b;
        }
        Ok(())
    }

    /// Element-wise copy from `other`, ghosts included.
    pub fn copy_values_from(&mut self, other: &SpatialGrid) -> Result<(), GridError> {
        self.check_same_shape(other)?;
        self.values.copy_from_slice(&other.values);
        Ok(())
    }

    /// Set every value, ghosts included.
    pub fn set_all(&mut self, value: f64) {
        self.values.fill(value);
    }

    /// Replace every negative value with zero.
    pub fn truncate_negative(&mut self) {
        for v in &mut self.values {
            if *v < 0.0 {
                *v = 0.0;
            }
        }
    }

    /// Sum over interior cells.
    pub fn sum(&self) -> f64 {
        self.shape.interior().map(|c| self.at(c.i, c.j, c.k)).sum()
    }

    /// Mean over interior cells.
    pub fn average(&self) -> f64 {
        self.sum() / self.shape.interior_len() as f64
    }

    /// Maximum over interior cells.
    pub fn max(&self) -> f64 {
        self.shape
            .interior()
            .map(|c| self.at(c.i, c.j, c.k))
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Minimum over interior cells.
    pub fn min(&self) -> f64 {
        self.shape
            .interior()
            .map(|c| self.at(c.i, c.j, c.k))
            .fold(f64::INFINITY, f64::min)
    }

    /// Interior values in storage order, for export.
    pub fn interior_values(&self) -> Vec<f64> {
        self.shape.interior().map(|c| self.at(c.i, c.j, c.k)).collect()
    }
}

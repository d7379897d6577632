//! Continuous and discrete 3D vectors.
//!
//! [`ContinuousVector`] holds a physical position or displacement in the
//! same length unit as the grid resolution. [`DiscreteVector`] holds a
//! grid index triple. Index `(i, j, k)` owns the half-open physical cell
//! `[i·res, (i+1)·res)` along each axis, so the cell center is at
//! `(i + 0.5)·res` and the nearest center to a position is found by
//! flooring.

use rand::Rng;
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// A real-valued 3D vector.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ContinuousVector {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

impl ContinuousVector {
    /// The zero vector.
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Create a vector from its components.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Component along `axis` (0 = x, 1 = y, otherwise z).
    pub fn axis(&self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    /// Mutable component along `axis` (0 = x, 1 = y, otherwise z).
    pub fn axis_mut(&mut self, axis: usize) -> &mut f64 {
        match axis {
            0 => &mut self.x,
            1 => &mut self.y,
            _ => &mut self.z,
        }
    }

    /// Multiply every component by `factor`.
    pub fn scale(&self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor, self.z * factor)
    }

    /// Dot product.
    pub fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Euclidean length.
    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Self) -> f64 {
        (*self - *other).norm()
    }

    /// Unit vector in the same direction. The zero vector stays zero.
    pub fn normalized(&self) -> Self {
        let n = self.norm();
        if n > 0.0 {
            self.scale(1.0 / n)
        } else {
            Self::ZERO
        }
    }

    /// Whether every component is finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Whether this is exactly the zero vector.
    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }

    /// A uniformly distributed unit vector.
    ///
    /// With `is_3d == false` the z component is zero and the direction is
    /// uniform on the unit circle.
    pub fn random_direction<R: Rng + ?Sized>(rng: &mut R, is_3d: bool) -> Self {
        loop {
            let x = rng.random_range(-1.0..1.0);
            let y = rng.random_range(-1.0..1.0);
            let z = if is_3d { rng.random_range(-1.0..1.0) } else { 0.0 };
            let v = Self::new(x, y, z);
            let n = v.norm();
            if n > 1e-6 && n <= 1.0 {
                return v.scale(1.0 / n);
            }
        }
    }

    /// Add a uniform random offset in `[-amplitude, amplitude)` to each
    /// active component.
    pub fn perturb<R: Rng + ?Sized>(&self, rng: &mut R, amplitude: f64, is_3d: bool) -> Self {
        if amplitude <= 0.0 {
            return *self;
        }
        let mut out = *self;
        out.x += rng.random_range(-amplitude..amplitude);
        out.y += rng.random_range(-amplitude..amplitude);
        if is_3d {
            out.z += rng.random_range(-amplitude..amplitude);
        }
        out
    }

    /// Index of the grid cell whose center is nearest to this position.
    ///
    /// Performs no bounds check; callers resolve boundary policy first.
    pub fn to_discrete(&self, resolution: f64) -> DiscreteVector {
        DiscreteVector::new(
            (self.x / resolution).floor() as i32,
            (self.y / resolution).floor() as i32,
            (self.z / resolution).floor() as i32,
        )
    }
}

impl fmt::Display for ContinuousVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl Add for ContinuousVector {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for ContinuousVector {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for ContinuousVector {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        self.scale(rhs)
    }
}

impl Neg for ContinuousVector {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl AddAssign for ContinuousVector {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl SubAssign for ContinuousVector {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
        self.z -= rhs.z;
    }
}

/// An integer grid index triple.
///
/// Interior cells run from `0` to `n - 1` on each axis; ghost cells use
/// negative indices and indices `>= n`, up to the grid padding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiscreteVector {
    /// Index along x.
    pub i: i32,
    /// Index along y.
    pub j: i32,
    /// Index along z.
    pub k: i32,
}

impl DiscreteVector {
    /// Create an index triple.
    pub const fn new(i: i32, j: i32, k: i32) -> Self {
        Self { i, j, k }
    }

    /// Component along `axis` (0 = i, 1 = j, otherwise k).
    pub fn axis(&self, axis: usize) -> i32 {
        match axis {
            0 => self.i,
            1 => self.j,
            _ => self.k,
        }
    }

    /// Mutable component along `axis`.
    pub fn axis_mut(&mut self, axis: usize) -> &mut i32 {
        match axis {
            0 => &mut self.i,
            1 => &mut self.j,
            _ => &mut self.k,
        }
    }

    /// Translate by the given deltas.
    pub fn offset(&self, di: i32, dj: i32, dk: i32) -> Self {
        Self::new(self.i + di, self.j + dj, self.k + dk)
    }

    /// The six face neighbours, in axis order (-x, +x, -y, +y, -z, +z).
    pub fn neighbours(&self) -> [Self; 6] {
        [
            self.offset(-1, 0, 0),
            self.offset(1, 0, 0),
            self.offset(0, -1, 0),
            self.offset(0, 1, 0),
            self.offset(0, 0, -1),
            self.offset(0, 0, 1),
        ]
    }

    /// Physical position of this cell's center.
    pub fn to_continuous(&self, resolution: f64) -> ContinuousVector {
        ContinuousVector::new(
            (self.i as f64 + 0.5) * resolution,
            (self.j as f64 + 0.5) * resolution,
            (self.k as f64 + 0.5) * resolution,
        )
    }
}

impl fmt::Display for DiscreteVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.i, self.j, self.k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    // ── Arithmetic tests ────────────────────────────────────────

    #[test]
    fn add_sub_scale() {
        let a = ContinuousVector::new(1.0, 2.0, 3.0);
        let b = ContinuousVector::new(0.5, -1.0, 2.0);
        assert_eq!(a + b, ContinuousVector::new(1.5, 1.0, 5.0));
        assert_eq!(a - b, ContinuousVector::new(0.5, 3.0, 1.0));
        assert_eq!(a * 2.0, ContinuousVector::new(2.0, 4.0, 6.0));
        assert_eq!(-a, ContinuousVector::new(-1.0, -2.0, -3.0));
    }

    #[test]
    fn distance_and_norm() {
        let a = ContinuousVector::new(0.0, 3.0, 0.0);
        let b = ContinuousVector::new(4.0, 0.0, 0.0);
        assert_eq!(a.distance(&b), 5.0);
        assert_eq!(b.norm(), 4.0);
    }

    #[test]
    fn normalized_zero_stays_zero() {
        assert_eq!(ContinuousVector::ZERO.normalized(), ContinuousVector::ZERO);
        let n = ContinuousVector::new(3.0, 4.0, 0.0).normalized();
        assert!((n.norm() - 1.0).abs() < 1e-12);
    }

    // ── Conversion tests ────────────────────────────────────────

    #[test]
    fn continuous_to_discrete_floors() {
        let p = ContinuousVector::new(4.9, 0.1, 10.0);
        assert_eq!(p.to_discrete(2.0), DiscreteVector::new(2, 0, 5));
        let neg = ContinuousVector::new(-0.1, 0.0, 0.0);
        assert_eq!(neg.to_discrete(1.0).i, -1);
    }

    #[test]
    fn cell_center() {
        let c = DiscreteVector::new(1, 0, 2).to_continuous(4.0);
        assert_eq!(c, ContinuousVector::new(6.0, 2.0, 10.0));
    }

    // ── Random tests ────────────────────────────────────────────

    #[test]
    fn random_direction_is_unit() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..100 {
            let d = ContinuousVector::random_direction(&mut rng, true);
            assert!((d.norm() - 1.0).abs() < 1e-9);
        }
        let flat = ContinuousVector::random_direction(&mut rng, false);
        assert_eq!(flat.z, 0.0);
    }

    #[test]
    fn perturb_stays_within_amplitude() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let p = ContinuousVector::new(5.0, 5.0, 5.0);
        for _ in 0..50 {
            let q = p.perturb(&mut rng, 0.5, false);
            assert!((q.x - 5.0).abs() <= 0.5);
            assert!((q.y - 5.0).abs() <= 0.5);
            assert_eq!(q.z, 5.0);
        }
    }

    proptest! {
        #[test]
        fn center_maps_back_to_same_cell(i in -4i32..64, j in -4i32..64, k in -4i32..64) {
            let d = DiscreteVector::new(i, j, k);
            prop_assert_eq!(d.to_continuous(1.5).to_discrete(1.5), d);
        }
    }
}

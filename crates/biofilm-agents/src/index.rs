//! Per-cell spatial index of located agents.
//!
//! The index is derived data: it is cleared and rebuilt from the
//! container after every pass that moves agents, never patched in
//! place, so it always matches the committed positions.

use biofilm_core::{ContinuousVector, DiscreteVector};
use biofilm_grid::{Domain, Face, GridError};
use smallvec::SmallVec;

/// Agents registered in one grid cell, as slot indices into the
/// container's arena.
pub type LocatedGroup = SmallVec<[usize; 8]>;

/// Grid of [`LocatedGroup`]s over the domain, one per interior cell.
#[derive(Clone, Debug)]
pub struct AgentGrid {
    dims: [usize; 3],
    resolution: f64,
    lengths: [f64; 3],
    cyclic: [bool; 3],
    cells: Vec<LocatedGroup>,
}

impl AgentGrid {
    /// An empty index matching the domain's interior cells.
    pub fn new(domain: &Domain) -> Self {
        let dims = domain.shape().dims();
        let l = domain.lengths();
        let cyclic = [Face::XMin, Face::YMin, Face::ZMin]
            .map(|f| domain.shape().is_active(f.axis()) && domain.boundary(f).is_cyclic());
        Self {
            dims,
            resolution: domain.resolution(),
            lengths: [l.x, l.y, l.z],
            cyclic,
            cells: vec![LocatedGroup::new(); dims[0] * dims[1] * dims[2]],
        }
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the index has no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Which axes wrap around.
    pub fn cyclic(&self) -> [bool; 3] {
        self.cyclic
    }

    fn flat(&self, c: DiscreteVector) -> usize {
        (c.i as usize * self.dims[1] + c.j as usize) * self.dims[2] + c.k as usize
    }

    /// Cell containing `p`.
    ///
    /// # Errors
    ///
    /// [`GridError::OutOfBounds`] if `p` lies outside the domain.
    pub fn cell_of(&self, p: &ContinuousVector) -> Result<usize, GridError> {
        let c = p.to_discrete(self.resolution);
        let inside = (0..3).all(|a| (0..self.dims[a] as i32).contains(&c.axis(a)));
        if !inside {
            return Err(GridError::OutOfBounds {
                coord: c,
                bounds: format!("agent grid {:?}", self.dims),
            });
        }
        Ok(self.flat(c))
    }

    /// Drop every registration.
    pub fn clear(&mut self) {
        for g in &mut self.cells {
            g.clear();
        }
    }

    /// Register arena slot `slot` at position `p`. Returns the cell.
    pub fn insert(&mut self, slot: usize, p: &ContinuousVector) -> Result<usize, GridError> {
        let cell = self.cell_of(p)?;
        self.cells[cell].push(slot);
        Ok(cell)
    }

    /// Agents registered in a cell.
    pub fn group(&self, cell: usize) -> &[usize] {
        self.cells.get(cell).map_or(&[], |g| g.as_slice())
    }

    /// Number of agents registered overall.
    pub fn registered(&self) -> usize {
        self.cells.iter().map(SmallVec::len).sum()
    }

    /// Slots registered in every cell within `radius` of the cell holding
    /// `p`, wrapping cyclic axes. Each slot appears once, in ascending
    /// order.
    pub fn candidates(&self, p: &ContinuousVector, radius: f64) -> Vec<usize> {
        let centre = p.to_discrete(self.resolution);
        let reach = (radius / self.resolution).ceil().max(0.0) as i32;
        let mut cells: Vec<usize> = Vec::new();
        let span = |a: usize| if self.dims[a] > 1 { reach } else { 0 };
        for di in -span(0)..=span(0) {
            for dj in -span(1)..=span(1) {
                for dk in -span(2)..=span(2) {
                    let mut c = centre.offset(di, dj, dk);
                    let mut ok = true;
                    for a in 0..3 {
                        let n = self.dims[a] as i32;
                        let v = c.axis_mut(a);
                        if (0..n).contains(&*v) {
                            continue;
                        }
                        if self.cyclic[a] {
                            *v = v.rem_euclid(n);
                        } else {
                            ok = false;
                        }
                    }
                    if ok {
                        cells.push(self.flat(c));
                    }
                }
            }
        }
        cells.sort_unstable();
        cells.dedup();
        let mut out: Vec<usize> = cells
            .into_iter()
            .flat_map(|c| self.cells[c].iter().copied())
            .collect();
        out.sort_unstable();
        out
    }

    /// `a - b`, taking the shortest image on cyclic axes.
    pub fn difference(&self, a: &ContinuousVector, b: &ContinuousVector) -> ContinuousVector {
        let mut d = *a - *b;
        for axis in 0..3 {
            if !self.cyclic[axis] {
                continue;
            }
            let len = self.lengths[axis];
            let v = d.axis_mut(axis);
            if v.abs() > 0.5 * len {
                *v -= v.signum() * len;
            }
        }
        d
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biofilm_grid::BoundaryKind;

    fn domain(cyclic_y: bool) -> Domain {
        let y = if cyclic_y {
            BoundaryKind::Cyclic
        } else {
            BoundaryKind::ZeroFlux
        };
        Domain::builder("d")
            .grid(4, 4, 1)
            .resolution(2.0)
            .face(Face::XMin, BoundaryKind::ZeroFlux)
            .face(Face::XMax, BoundaryKind::ZeroFlux)
            .face(Face::YMin, y.clone())
            .face(Face::YMax, y)
            .build()
            .unwrap()
    }

    #[test]
    fn insert_and_group() {
        let mut g = AgentGrid::new(&domain(false));
        assert_eq!(g.len(), 16);
        let cell = g.insert(7, &ContinuousVector::new(3.0, 5.0, 0.5)).unwrap();
        assert_eq!(g.group(cell), &[7]);
        assert_eq!(g.registered(), 1);
        g.clear();
        assert_eq!(g.registered(), 0);
    }

    #[test]
    fn outside_position_is_rejected() {
        let mut g = AgentGrid::new(&domain(false));
        let err = g.insert(0, &ContinuousVector::new(-0.1, 1.0, 0.0)).unwrap_err();
        assert!(matches!(err, GridError::OutOfBounds { .. }));
    }

    #[test]
    fn candidates_wrap_only_on_cyclic_axes() {
        for cyclic in [false, true] {
            let mut g = AgentGrid::new(&domain(cyclic));
            g.insert(1, &ContinuousVector::new(1.0, 1.0, 0.0)).unwrap();
            g.insert(2, &ContinuousVector::new(1.0, 7.0, 0.0)).unwrap();
            let near = g.candidates(&ContinuousVector::new(1.0, 1.0, 0.0), 2.0);
            if cyclic {
                assert_eq!(near, vec![1, 2]);
            } else {
                assert_eq!(near, vec![1]);
            }
        }
    }

    #[test]
    fn minimum_image_difference() {
        let g = AgentGrid::new(&domain(true));
        let d = g.difference(
            &ContinuousVector::new(1.0, 0.5, 0.0),
            &ContinuousVector::new(1.0, 7.5, 0.0),
        );
        assert!((d.y - 1.0).abs() < 1e-12);
        let open = AgentGrid::new(&domain(false));
        let d = open.difference(
            &ContinuousVector::new(1.0, 0.5, 0.0),
            &ContinuousVector::new(1.0, 7.5, 0.0),
        );
        assert!((d.y + 7.0).abs() < 1e-12);
    }
}

//! Grid hierarchy construction and inter-level transfer.
//!
//! Levels are cell-centred: on every active axis the fine cells `2I` and
//! `2I + 1` make up coarse cell `I`, so the faces of the domain stay in
//! place on every level. Flat axes stay flat.

use biofilm_grid::{GridShape, SpatialGrid};

/// Largest number of cells an active axis of the coarsest level may
/// keep. Relaxation alone has to settle that level.
pub const MAX_COARSE_CELLS: usize = 8;

/// Shapes of every level, finest first.
///
/// Coarsening continues while every active axis has an even length of
/// at least 4, so the coarsest level keeps at least 2 cells per active
/// axis.
pub fn level_shapes(fine: GridShape) -> Vec<GridShape> {
    let mut out = vec![fine];
    loop {
        let cur = out[out.len() - 1];
        let coarsenable = cur.active_axes() > 0
            && (0..3)
                .filter(|&a| cur.is_active(a))
                .all(|a| cur.n(a) % 2 == 0 && cur.n(a) >= 4);
        if !coarsenable {
            return out;
        }
        let half = |a: usize| {
            if cur.is_active(a) {
                cur.n(a) / 2
            } else {
                1
            }
        };
        out.push(GridShape {
            ni: half(0),
            nj: half(1),
            nk: half(2),
            padding: cur.padding,
        });
    }
}

/// Check that a fine grid coarsens far enough for multigrid to pay off.
///
/// # Errors
///
/// Returns a description of the offending axis when the coarsest level
/// keeps more than [`MAX_COARSE_CELLS`] cells along it, i.e. when the
/// axis length is not a power of two times at most 8.
pub fn check_coarsening(fine: GridShape) -> Result<Vec<GridShape>, String> {
    let shapes = level_shapes(fine);
    let coarsest = shapes[shapes.len() - 1];
    if let Some(axis) = (0..3).find(|&a| coarsest.is_active(a) && coarsest.n(a) > MAX_COARSE_CELLS) {
        return Err(format!(
            "axis {axis} of {} cells only coarsens to {} cells; use a length of the form k·2^m with k <= {MAX_COARSE_CELLS}",
            fine.n(axis),
            coarsest.n(axis)
        ));
    }
    Ok(shapes)
}

/// The fine cells making up coarse index `c` along one axis.
fn children(c: i32, active: bool) -> [i32; 2] {
    if active {
        [2 * c, 2 * c + 1]
    } else {
        [c, c]
    }
}

fn reduce<F>(fine: &SpatialGrid, coarse: &mut SpatialGrid, init: f64, fold: F, average: bool)
where
    F: Fn(f64, f64) -> f64,
{
    let fs = fine.shape();
    let count = (0..3).filter(|&a| fs.is_active(a)).fold(1.0, |n, _| 2.0 * n);
    let cs = coarse.shape();
    for c in cs.interior() {
        let [i0, i1] = children(c.i, fs.is_active(0));
        let [j0, j1] = children(c.j, fs.is_active(1));
        let [k0, k1] = children(c.k, fs.is_active(2));
        let mut acc = init;
        for i in i0..=i1 {
            for j in j0..=j1 {
                for k in k0..=k1 {
                    acc = fold(acc, fine.at(i, j, k));
                }
            }
        }
        *coarse.at_mut(c.i, c.j, c.k) = if average { acc / count } else { acc };
    }
}

/// Restrict `fine` into the interior of `coarse` by averaging the
/// children of each coarse cell.
pub fn restrict(fine: &SpatialGrid, coarse: &mut SpatialGrid) {
    reduce(fine, coarse, 0.0, |a, v| a + v, true);
}

/// Restrict `fine` into the interior of `coarse` keeping the largest
/// child of each coarse cell.
pub fn restrict_max(fine: &SpatialGrid, coarse: &mut SpatialGrid) {
    reduce(fine, coarse, f64::NEG_INFINITY, f64::max, false);
}

/// Weights of the two coarse cells nearest to fine index `f` along one
/// axis: `3/4` for the parent and `1/4` for its neighbour on the side of
/// the child.
fn parents(f: i32, active: bool) -> [(i32, f64); 2] {
    if !active {
        return [(f, 1.0), (f, 0.0)];
    }
    let parent = f.div_euclid(2);
    let side = if f.rem_euclid(2) == 0 { -1 } else { 1 };
    [(parent, 0.75), (parent + side, 0.25)]
}

/// Prolong `coarse` into the interior of `fine` by cell-centred
/// (bi/tri)linear interpolation. Reads coarse ghost cells, so refresh
/// them first.
pub fn interpolate(coarse: &SpatialGrid, fine: &mut SpatialGrid) {
    let fs = fine.shape();
    for c in fs.interior() {
        let mut v = 0.0;
        for (i, wi) in parents(c.i, fs.is_active(0)) {
            for (j, wj) in parents(c.j, fs.is_active(1)) {
                for (k, wk) in parents(c.k, fs.is_active(2)) {
                    let w = wi * wj * wk;
                    if w != 0.0 {
                        v += w * coarse.at(i, j, k);
                    }
                }
            }
        }
        *fine.at_mut(c.i, c.j, c.k) = v;
    }
}

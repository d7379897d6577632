//! Deferred agent movement.
//!
//! Displacements are accumulated into a [`MovementBuffer`] while agents
//! look at each other, then committed in one pass. Contributions are
//! summed per target in `(target, source)` order, so the committed
//! totals do not depend on the order in which pairs were visited.

use std::cmp::Ordering;

use biofilm_core::{AgentId, ContinuousVector};

/// One displacement contribution.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Contribution {
    target: AgentId,
    source: AgentId,
    delta: ContinuousVector,
}

fn total_order(a: &Contribution, b: &Contribution) -> Ordering {
    a.target
        .cmp(&b.target)
        .then(a.source.cmp(&b.source))
        .then(a.delta.x.total_cmp(&b.delta.x))
        .then(a.delta.y.total_cmp(&b.delta.y))
        .then(a.delta.z.total_cmp(&b.delta.z))
}

/// Pending displacements awaiting a commit.
#[derive(Clone, Debug, Default)]
pub struct MovementBuffer {
    pending: Vec<Contribution>,
}

impl MovementBuffer {
    /// An empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a displacement of `target` caused by `source`.
    pub fn add(&mut self, target: AgentId, source: AgentId, delta: ContinuousVector) {
        if delta.is_zero() {
            return;
        }
        self.pending.push(Contribution {
            target,
            source,
            delta,
        });
    }

    /// Queue an equal and opposite pair: `a` moves by `delta`, `b` by
    /// `-delta`.
    pub fn add_mutual(&mut self, a: AgentId, b: AgentId, delta: ContinuousVector) {
        self.add(a, b, delta);
        self.add(b, a, -delta);
    }

    /// Number of queued contributions.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drain the buffer into one total displacement per target, sorted by
    /// target id.
    pub fn drain_totals(&mut self) -> Vec<(AgentId, ContinuousVector)> {
        self.pending.sort_by(total_order);
        let mut out: Vec<(AgentId, ContinuousVector)> = Vec::new();
        for c in self.pending.drain(..) {
            match out.last_mut() {
                Some((id, acc)) if *id == c.target => *acc += c.delta,
                _ => out.push((c.target, c.delta)),
            }
        }
        out
    }
}

/// Displacement of the first agent of an overlapping pair.
///
/// `diff` is the shortest vector from the second agent to the first and
/// `reach` the sum of their shoving radii plus the shove limit. Each
/// agent moves half the overlap away from the other; `None` when they
/// do not overlap. Coincident agents need a direction from the caller
/// through `fallback`.
pub fn push_displacement(
    diff: ContinuousVector,
    reach: f64,
    fallback: ContinuousVector,
) -> Option<ContinuousVector> {
    let d = diff.norm();
    let (dir, d) = if d == 0.0 {
        (fallback.normalized(), 0.0)
    } else {
        (diff.scale(1.0 / d), d)
    };
    let gap = d - reach;
    if gap <= 0.0 {
        Some(dir.scale(0.5 * gap.abs()))
    } else {
        None
    }
}

/// Displacement of the first agent of an attached pair.
///
/// The spring pulls towards separation `rest` with strength `gain`,
/// weakened by `exp(-5δ/lmax)` when stretched by `δ` and broken beyond
/// `lmax`. Each agent takes half.
pub fn spring_displacement(
    diff: ContinuousVector,
    rest: f64,
    lmax: f64,
    gain: f64,
) -> ContinuousVector {
    let d = diff.norm();
    if d == 0.0 || lmax <= 0.0 {
        return ContinuousVector::ZERO;
    }
    let delta = d - rest;
    let mut g = gain;
    if delta > 0.0 {
        g *= (-delta * 5.0 / lmax).exp();
    }
    if delta > lmax {
        g = 0.0;
    }
    diff.scale(-0.5 * delta * g / d)
}

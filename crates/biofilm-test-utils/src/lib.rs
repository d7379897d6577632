//! Test fixtures for biofilm development.
//!
//! Small ready-made domains and reactions ([`column_domain`],
//! [`slab_domain`], [`monod_uptake`]) plus the mock solvers in
//! [`fixtures`] for driving the engine without real numerics.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use biofilm_core::{ReactionId, SoluteId};
use biofilm_grid::{
    BoundaryCondition, BoundaryKind, Bulk, BulkSolute, Domain, Face, SpatialGrid,
};
use biofilm_kinetics::{Reaction, ReactionKind};

pub use fixtures::{CountingSolver, FailingSolver};

/// One-solute column of `n` unit cells along x.
///
/// The solute is named `"s"`, has unit diffusivity and starts at
/// `initial`. `left` and `right` close the x faces.
pub fn column_domain(n: usize, left: BoundaryKind, right: BoundaryKind, initial: f64) -> Domain {
    Domain::builder("column")
        .grid(n, 1, 1)
        .resolution(1.0)
        .solute("s", 1.0, initial)
        .face(Face::XMin, left)
        .face(Face::XMax, right)
        .build()
        .unwrap()
}

/// Square 2D slab of `n × n` cells of side `res`.
///
/// The carrier sits on the x-min face (zero flux), the x-max face opens
/// onto a constant bulk `"bulk"` holding `bulk_value` of the single
/// solute `"s"`, and y is periodic.
pub fn slab_domain(n: usize, res: f64, bulk_value: f64) -> Domain {
    slab_builder(n, res, bulk_value).build().unwrap()
}

/// Builder behind [`slab_domain`], for tests that need to tweak it.
pub fn slab_builder(n: usize, res: f64, bulk_value: f64) -> biofilm_grid::DomainBuilder {
    Domain::builder("slab")
        .grid(n, n, 1)
        .resolution(res)
        .solute("s", 1.0, bulk_value)
        .bulk(Bulk::new("bulk", 0.0, vec![BulkSolute::constant(bulk_value)]))
        .boundary(BoundaryCondition::new(Face::XMin, BoundaryKind::ZeroFlux).support())
        .face(
            Face::XMax,
            BoundaryKind::Bulk {
                bulk: "bulk".into(),
            },
        )
        .face(Face::YMin, BoundaryKind::Cyclic)
        .face(Face::YMax, BoundaryKind::Cyclic)
}

/// Monod uptake of `solute` catalysed by particle 0, growing particle 0
/// with unit yield.
pub fn monod_uptake(solute: SoluteId, mu_max: f64, ks: f64, uptake_yield: f64) -> Reaction {
    Reaction::builder("monod-uptake")
        .id(ReactionId(0))
        .kind(ReactionKind::Monod {
            mu_max,
            ks,
            solute,
        })
        .yield_of(solute, -uptake_yield)
        .particle_yield(0, 1.0)
        .build()
        .unwrap()
}

/// A grid on the domain's shape with every interior cell set to `value`.
pub fn uniform_grid(domain: &Domain, value: f64) -> SpatialGrid {
    let mut g = domain.domain_grid().zeros_like("uniform");
    let shape = g.shape();
    for c in shape.interior() {
        *g.at_mut(c.i, c.j, c.k) = value;
    }
    g
}

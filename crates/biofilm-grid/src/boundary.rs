//! Boundary conditions on the six faces of a box domain.
//!
//! A boundary condition does two jobs:
//!
//! - **Ghost refresh**: write the ghost layers of a grid so the
//!   diffusion stencil sees the right closure at the face
//!   ([`BoundaryCondition::fill_ghosts`]).
//! - **Agent correction**: relocate or remove an agent whose position
//!   lies beyond the face ([`BoundaryCondition::apply_to_agent`]).
//!
//! Faces are processed in the order given by [`Face::ALL`] (x, then y,
//! then z; min before max), which is also the tie-break when an agent
//! sits beyond several faces at once.

use biofilm_core::{ContinuousVector, SoluteId};

use crate::grid::SpatialGrid;

/// One face of the box domain.
///
/// The derived `Ord` is the deterministic resolution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Face {
    /// The `x = 0` face.
    XMin,
    /// The `x = Lx` face.
    XMax,
    /// The `y = 0` face.
    YMin,
    /// The `y = Ly` face.
    YMax,
    /// The `z = 0` face.
    ZMin,
    /// The `z = Lz` face.
    ZMax,
}

impl Face {
    /// Every face in resolution order.
    pub const ALL: [Face; 6] = [
        Face::XMin,
        Face::XMax,
        Face::YMin,
        Face::YMax,
        Face::ZMin,
        Face::ZMax,
    ];

    /// Axis normal to this face (0 = x, 1 = y, 2 = z).
    pub fn axis(self) -> usize {
        match self {
            Face::XMin | Face::XMax => 0,
            Face::YMin | Face::YMax => 1,
            Face::ZMin | Face::ZMax => 2,
        }
    }

    /// Whether this is the high-coordinate face of its axis.
    pub fn is_max(self) -> bool {
        matches!(self, Face::XMax | Face::YMax | Face::ZMax)
    }

    /// The face across the domain.
    pub fn opposite(self) -> Face {
        match self {
            Face::XMin => Face::XMax,
            Face::XMax => Face::XMin,
            Face::YMin => Face::YMax,
            Face::YMax => Face::YMin,
            Face::ZMin => Face::ZMax,
            Face::ZMax => Face::ZMin,
        }
    }

    /// Whether `p` lies beyond this face for a domain of the given
    /// physical lengths. Max faces are exclusive: `x == Lx` is outside.
    pub fn is_outside(self, p: &ContinuousVector, lengths: &ContinuousVector) -> bool {
        let axis = self.axis();
        if self.is_max() {
            p.axis(axis) >= lengths.axis(axis)
        } else {
            p.axis(axis) < 0.0
        }
    }
}

/// The closed set of boundary behaviours.
#[derive(Clone, Debug, PartialEq)]
pub enum BoundaryKind {
    /// Dirichlet condition at the concentration of a well-mixed bulk
    /// reservoir. Agents crossing the face are removed.
    Bulk {
        /// Name of the bulk reservoir.
        bulk: String,
    },
    /// Fixed concentration per solute. Agents crossing the face are
    /// removed.
    Constant {
        /// Concentration per solute, indexed by [`SoluteId`].
        values: Vec<f64>,
    },
    /// Periodic: the face is glued to the opposite face.
    Cyclic,
    /// Transfer across a membrane into a bulk reservoir, scaled by a
    /// per-solute permeability. Solutes with no permeability see a
    /// zero-flux face. Agents are kept inside.
    GasMembrane {
        /// Name of the bulk reservoir across the membrane.
        bulk: String,
        /// Permeability per solute, indexed by [`SoluteId`].
        permeability: Vec<Option<f64>>,
    },
    /// Reflective: ghost cells mirror the interior. Agents are kept
    /// inside.
    ZeroFlux,
}

/// What a grid represents, which decides how ghosts are filled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GridRole {
    /// A solute concentration field.
    Solute(SoluteId),
    /// The pressure field. Open faces (bulk or constant) hold zero
    /// pressure; closed faces mirror.
    Pressure,
    /// Any other per-cell quantity (biomass, diffusivity). Cyclic faces
    /// wrap, all others mirror.
    Auxiliary,
}

/// Resolved outside state used while filling solute ghosts.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GhostInputs {
    /// Concentration of the bulk reservoir behind the face, if any.
    pub bulk_value: Option<f64>,
    /// Diffusivity of the solute being refreshed.
    pub diffusivity: f64,
}

/// Result of pushing an agent through [`BoundaryCondition::apply_to_agent`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AgentCrossing {
    /// The agent stays, at this corrected position.
    Moved(ContinuousVector),
    /// The agent left through an open face and must be removed.
    Removed,
}

/// A boundary condition bound to one face.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundaryCondition {
    /// The face this condition closes.
    pub face: Face,
    /// Behaviour of the face.
    pub kind: BoundaryKind,
    /// Whether the face is a carrier surface biomass can attach to.
    pub is_support: bool,
}

enum GhostRule {
    Mirror,
    Wrap,
    Fixed(f64),
    Robin { outside: f64, weight: f64 },
}

impl BoundaryCondition {
    /// Create a condition that is not a support surface.
    pub fn new(face: Face, kind: BoundaryKind) -> Self {
        Self {
            face,
            kind,
            is_support: false,
        }
    }

    /// Mark the face as a carrier surface.
    pub fn support(mut self) -> Self {
        self.is_support = true;
        self
    }

    /// Name of the bulk reservoir this face exchanges with, if any.
    pub fn bulk_name(&self) -> Option<&str> {
        match &self.kind {
            BoundaryKind::Bulk { bulk } | BoundaryKind::GasMembrane { bulk, .. } => Some(bulk),
            _ => None,
        }
    }

    /// Whether the face is periodic.
    pub fn is_cyclic(&self) -> bool {
        matches!(self.kind, BoundaryKind::Cyclic)
    }

    fn ghost_rule(&self, role: GridRole, inputs: GhostInputs, resolution: f64) -> GhostRule {
        match (&self.kind, role) {
            (BoundaryKind::Cyclic, _) => GhostRule::Wrap,
            (_, GridRole::Auxiliary) => GhostRule::Mirror,
            (BoundaryKind::Bulk { .. } | BoundaryKind::Constant { .. }, GridRole::Pressure) => {
                GhostRule::Fixed(0.0)
            }
            (_, GridRole::Pressure) => GhostRule::Mirror,
            (BoundaryKind::ZeroFlux, GridRole::Solute(_)) => GhostRule::Mirror,
            (BoundaryKind::Constant { values }, GridRole::Solute(s)) => {
                GhostRule::Fixed(values.get(s.index()).copied().unwrap_or(0.0))
            }
            (BoundaryKind::Bulk { .. }, GridRole::Solute(_)) => {
                GhostRule::Fixed(inputs.bulk_value.unwrap_or(0.0))
            }
            (BoundaryKind::GasMembrane { permeability, .. }, GridRole::Solute(s)) => {
                match permeability.get(s.index()).copied().flatten() {
                    Some(k) if inputs.diffusivity > 0.0 => GhostRule::Robin {
                        outside: inputs.bulk_value.unwrap_or(0.0),
                        weight: (k * resolution / inputs.diffusivity).min(1.0),
                    },
                    _ => GhostRule::Mirror,
                }
            }
        }
    }

    /// Whether ghosts of a `role` grid on this face follow an outside
    /// value, letting the field in or out through the face.
    pub fn is_open_for(&self, role: GridRole, inputs: GhostInputs) -> bool {
        matches!(
            self.ghost_rule(role, inputs, 1.0),
            GhostRule::Fixed(_) | GhostRule::Robin { .. }
        )
    }

    /// Write the ghost layers on this face of `grid`.
    ///
    /// Each ghost layer `g` (1-based distance from the face) takes its
    /// value from the interior layer `g` cells inside the face (mirror),
    /// from the interior near the opposite face (wrap), or is the odd
    /// reflection of that interior value about a fixed face value, so
    /// the face itself sits halfway between the cell centres. Flat axes
    /// always mirror. Ghosts span the full padded extent of the other
    /// axes, so refreshing faces in [`Face::ALL`] order also fills edges
    /// and corners deterministically.
    pub fn fill_ghosts(
        &self,
        grid: &mut SpatialGrid,
        role: GridRole,
        inputs: GhostInputs,
    ) {
        let shape = grid.shape();
        let axis = self.face.axis();
        let n = shape.n(axis) as i32;
        let pad = shape.padding as i32;
        if pad == 0 {
            return;
        }
        let rule = if shape.is_active(axis) {
            self.ghost_rule(role, inputs, grid.resolution())
        } else {
            GhostRule::Mirror
        };
        let [a1, a2] = match axis {
            0 => [1, 2],
            1 => [0, 2],
            _ => [0, 1],
        };
        let n1 = shape.n(a1) as i32;
        let n2 = shape.n(a2) as i32;
        for g in 1..=pad {
            let (ghost, mirror, wrap) = if self.face.is_max() {
                (n - 1 + g, (n - g).max(0), (g - 1).min(n - 1))
            } else {
                (-g, (g - 1).min(n - 1), (n - g).max(0))
            };
            for u in -pad..n1 + pad {
                for v in -pad..n2 + pad {
                    let mut at = [0i32; 3];
                    at[a1] = u;
                    at[a2] = v;
                    at[axis] = mirror;
                    let inner = grid.at(at[0], at[1], at[2]);
                    let value = match rule {
                        GhostRule::Mirror => inner,
                        GhostRule::Wrap => {
                            at[axis] = wrap;
                            grid.at(at[0], at[1], at[2])
                        }
                        GhostRule::Fixed(c) => 2.0 * c - inner,
                        GhostRule::Robin { outside, weight } => inner + weight * (outside - inner),
                    };
                    at[axis] = ghost;
                    *grid.at_mut(at[0], at[1], at[2]) = value;
                }
            }
        }
    }

    /// Correct the position of an agent that lies beyond this face.
    ///
    /// Cyclic faces remap the coordinate into `[0, L)`; zero-flux and
    /// membrane faces project the agent back onto the face and then one
    /// radius inward; bulk and constant faces remove it.
    pub fn apply_to_agent(
        &self,
        p: &ContinuousVector,
        radius: f64,
        lengths: &ContinuousVector,
    ) -> AgentCrossing {
        let axis = self.face.axis();
        let len = lengths.axis(axis);
        let mut out = *p;
        match self.kind {
            BoundaryKind::Cyclic => {
                *out.axis_mut(axis) = wrap_coordinate(p.axis(axis), len);
                AgentCrossing::Moved(out)
            }
            BoundaryKind::ZeroFlux | BoundaryKind::GasMembrane { .. } => {
                let inset = radius.clamp(0.0, 0.5 * len);
                let v = if self.face.is_max() {
                    // Keep strictly below the exclusive max face.
                    (len - inset).min(len * (1.0 - f64::EPSILON))
                } else {
                    inset
                };
                *out.axis_mut(axis) = v;
                AgentCrossing::Moved(out)
            }
            BoundaryKind::Bulk { .. } | BoundaryKind::Constant { .. } => AgentCrossing::Removed,
        }
    }
}

/// Map `x` onto the periodic interval `[0, len)`.
///
/// Idempotent: a value already in range is returned unchanged.
pub fn wrap_coordinate(x: f64, len: f64) -> f64 {
    if (0.0..len).contains(&x) {
        return x;
    }
    let r = x.rem_euclid(len);
    // rem_euclid rounds tiny negatives up to exactly `len`.
    if r >= len {
        0.0
    } else {
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GridShape;
    use proptest::prelude::*;

    fn row(n: usize) -> SpatialGrid {
        let mut g = SpatialGrid::new("row", GridShape::new(n, 1, 1, 1).unwrap(), 1.0).unwrap();
        for i in 0..n as i32 {
            *g.at_mut(i, 0, 0) = (i + 1) as f64;
        }
        g
    }

    fn lengths() -> ContinuousVector {
        ContinuousVector::new(10.0, 10.0, 1.0)
    }

    // ── Ghost refresh tests ─────────────────────────────────────

    #[test]
    fn zero_flux_mirrors_interior() {
        let mut g = row(4);
        let bc = BoundaryCondition::new(Face::XMin, BoundaryKind::ZeroFlux);
        bc.fill_ghosts(&mut g, GridRole::Solute(SoluteId(0)), GhostInputs::default());
        assert_eq!(g.at(-1, 0, 0), 1.0);
    }

    #[test]
    fn cyclic_copies_opposite_interior() {
        let mut g = row(4);
        BoundaryCondition::new(Face::XMin, BoundaryKind::Cyclic).fill_ghosts(
            &mut g,
            GridRole::Solute(SoluteId(0)),
            GhostInputs::default(),
        );
        BoundaryCondition::new(Face::XMax, BoundaryKind::Cyclic).fill_ghosts(
            &mut g,
            GridRole::Solute(SoluteId(0)),
            GhostInputs::default(),
        );
        assert_eq!(g.at(-1, 0, 0), 4.0);
        assert_eq!(g.at(4, 0, 0), 1.0);
    }

    #[test]
    fn constant_writes_fixed_value_per_solute() {
        let mut g = row(4);
        let bc = BoundaryCondition::new(
            Face::XMax,
            BoundaryKind::Constant {
                values: vec![0.0, 7.5],
            },
        );
        bc.fill_ghosts(&mut g, GridRole::Solute(SoluteId(1)), GhostInputs::default());
        // The face midway between cell 3 and the ghost holds 7.5.
        assert_eq!(g.at(4, 0, 0), 11.0);
        assert_eq!(0.5 * (g.at(3, 0, 0) + g.at(4, 0, 0)), 7.5);
        bc.fill_ghosts(&mut g, GridRole::Pressure, GhostInputs::default());
        assert_eq!(g.at(4, 0, 0), -4.0);
    }

    #[test]
    fn bulk_uses_reservoir_value() {
        let mut g = row(4);
        let bc = BoundaryCondition::new(Face::XMin, BoundaryKind::Bulk { bulk: "tank".into() });
        let inputs = GhostInputs {
            bulk_value: Some(9.0),
            diffusivity: 1.0,
        };
        bc.fill_ghosts(&mut g, GridRole::Solute(SoluteId(0)), inputs);
        assert_eq!(g.at(-1, 0, 0), 17.0);
        bc.fill_ghosts(&mut g, GridRole::Auxiliary, inputs);
        assert_eq!(g.at(-1, 0, 0), 1.0);
    }

    #[test]
    fn gas_membrane_blends_towards_bulk() {
        let mut g = row(4);
        let bc = BoundaryCondition::new(
            Face::XMin,
            BoundaryKind::GasMembrane {
                bulk: "gas".into(),
                permeability: vec![Some(0.5), None],
            },
        );
        let inputs = GhostInputs {
            bulk_value: Some(5.0),
            diffusivity: 1.0,
        };
        bc.fill_ghosts(&mut g, GridRole::Solute(SoluteId(0)), inputs);
        // weight = min(1, 0.5 * 1 / 1) = 0.5
        assert_eq!(g.at(-1, 0, 0), 3.0);
        bc.fill_ghosts(&mut g, GridRole::Solute(SoluteId(1)), inputs);
        assert_eq!(g.at(-1, 0, 0), 1.0);
    }

    #[test]
    fn openness_follows_the_ghost_rule() {
        let s = GridRole::Solute(SoluteId(0));
        let membrane = BoundaryCondition::new(
            Face::XMin,
            BoundaryKind::GasMembrane {
                bulk: "gas".into(),
                permeability: vec![None],
            },
        );
        let inputs = GhostInputs {
            bulk_value: Some(1.0),
            diffusivity: 1.0,
        };
        assert!(!membrane.is_open_for(s, inputs));
        assert!(!BoundaryCondition::new(Face::XMin, BoundaryKind::ZeroFlux).is_open_for(s, inputs));
        let tank = BoundaryCondition::new(Face::XMin, BoundaryKind::Bulk { bulk: "t".into() });
        assert!(tank.is_open_for(s, inputs));
        assert!(tank.is_open_for(GridRole::Pressure, inputs));
        assert!(!tank.is_open_for(GridRole::Auxiliary, inputs));
    }

    #[test]
    fn flat_axis_always_mirrors() {
        let mut g = row(4);
        let bc = BoundaryCondition::new(Face::YMin, BoundaryKind::Constant { values: vec![42.0] });
        bc.fill_ghosts(&mut g, GridRole::Solute(SoluteId(0)), GhostInputs::default());
        // j is flat (nj = 1): the ghost copies the interior.
        assert_eq!(g.at(2, -1, 0), 3.0);
    }

    // ── Agent correction tests ──────────────────────────────────

    #[test]
    fn cyclic_remaps_negative_epsilon() {
        let bc = BoundaryCondition::new(Face::XMin, BoundaryKind::Cyclic);
        let eps = 1e-3;
        let p = ContinuousVector::new(-eps, 5.0, 0.5);
        match bc.apply_to_agent(&p, 0.5, &lengths()) {
            AgentCrossing::Moved(q) => assert!((q.x - (10.0 - eps)).abs() < 1e-12),
            AgentCrossing::Removed => panic!("cyclic face removed an agent"),
        }
    }

    #[test]
    fn cyclic_maps_upper_edge_to_zero() {
        assert_eq!(wrap_coordinate(10.0, 10.0), 0.0);
        assert_eq!(wrap_coordinate(-1e-18, 10.0), 0.0);
    }

    #[test]
    fn zero_flux_pushes_back_by_radius() {
        let bc = BoundaryCondition::new(Face::XMax, BoundaryKind::ZeroFlux);
        let p = ContinuousVector::new(11.0, 5.0, 0.5);
        assert_eq!(
            bc.apply_to_agent(&p, 0.5, &lengths()),
            AgentCrossing::Moved(ContinuousVector::new(9.5, 5.0, 0.5))
        );
    }

    #[test]
    fn open_faces_remove_agents() {
        let bc = BoundaryCondition::new(Face::YMax, BoundaryKind::Bulk { bulk: "b".into() });
        let p = ContinuousVector::new(1.0, 12.0, 0.5);
        assert_eq!(bc.apply_to_agent(&p, 0.5, &lengths()), AgentCrossing::Removed);
    }

    #[test]
    fn faces_order_x_then_y_then_z() {
        let mut faces = Face::ALL.to_vec();
        faces.reverse();
        faces.sort();
        assert_eq!(faces, Face::ALL.to_vec());
    }

    proptest! {
        #[test]
        fn wrap_is_idempotent(x in -100.0f64..100.0, len in 0.5f64..50.0) {
            let once = wrap_coordinate(x, len);
            prop_assert!((0.0..len).contains(&once));
            prop_assert_eq!(wrap_coordinate(once, len), once);
        }

        #[test]
        fn cyclic_remap_of_negative_offset(eps in 1e-6f64..1.0, len in 2.0f64..50.0) {
            let w = wrap_coordinate(-eps, len);
            prop_assert!((w - (len - eps)).abs() < 1e-9);
        }
    }
}

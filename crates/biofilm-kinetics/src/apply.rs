//! Turning rate laws into solver source terms.

use biofilm_core::SolverError;
use biofilm_grid::SpatialGrid;
use smallvec::SmallVec;

use crate::reaction::Reaction;

/// Fill the net reaction-rate grid and its diagonal derivative grid of
/// every solute.
///
/// `catalysts[r]` holds the catalyst mass density of reaction `r` per
/// cell; `concentrations`, `reac` and `diff_reac` are indexed by solute
/// id. For each interior cell and each reaction with catalyst present,
/// `reac[s] += m·rate·yield_s` and `diff_reac[s] += m·yield_s·∂rate/∂C_s`.
/// Ghost cells of the outputs are left at zero.
pub fn apply_reactions(
    reactions: &[Reaction],
    catalysts: &[SpatialGrid],
    concentrations: &[SpatialGrid],
    reac: &mut [SpatialGrid],
    diff_reac: &mut [SpatialGrid],
) -> Result<(), SolverError> {
    if catalysts.len() != reactions.len() {
        return Err(SolverError::ExecutionFailed {
            reason: format!(
                "{} catalyst grids for {} reactions",
                catalysts.len(),
                reactions.len()
            ),
        });
    }
    let n = concentrations.len();
    if reac.len() != n || diff_reac.len() != n {
        return Err(SolverError::ExecutionFailed {
            reason: format!("rate grids do not match {n} solutes"),
        });
    }
    for g in reac.iter_mut().chain(diff_reac.iter_mut()) {
        g.set_all(0.0);
    }
    let Some(first) = concentrations.first() else {
        return Ok(());
    };
    let shape = first.shape();
    let mut conc: SmallVec<[f64; 8]> = SmallVec::from_elem(0.0, n);
    for c in shape.interior() {
        let mut any = false;
        for (r, cat) in catalysts.iter().enumerate() {
            if cat.at(c.i, c.j, c.k) > 0.0 && !reactions[r].yields().is_empty() {
                any = true;
                break;
            }
        }
        if !any {
            continue;
        }
        for (slot, g) in conc.iter_mut().zip(concentrations) {
            *slot = g.at(c.i, c.j, c.k);
        }
        for (reaction, cat) in reactions.iter().zip(catalysts) {
            let mass = cat.at(c.i, c.j, c.k);
            if mass <= 0.0 {
                continue;
            }
            let eval = reaction.update_marginal_mu(&conc);
            reaction.check_finite(eval.rate)?;
            for &(s, y) in reaction.yields() {
                let Some(out) = reac.get_mut(s.index()) else {
                    continue;
                };
                *out.at_mut(c.i, c.j, c.k) += mass * eval.rate * y;
                let d = reaction.check_finite(eval.marginal_for(s))?;
                *diff_reac[s.index()].at_mut(c.i, c.j, c.k) += mass * y * d;
            }
        }
    }
    Ok(())
}

/// Net production rates and their Jacobian for a well-mixed volume.
///
/// `catalysts[r]` is the catalyst mass concentration of reaction `r`.
/// Returns `(rates, jacobian)` where `rates[s]` is the net production of
/// solute `s` and `jacobian[s·n + t]` is `∂rates[s]/∂C_t`.
pub fn net_production(
    reactions: &[Reaction],
    catalysts: &[f64],
    conc: &[f64],
) -> Result<(Vec<f64>, Vec<f64>), SolverError> {
    let n = conc.len();
    let mut rates = vec![0.0; n];
    let mut jacobian = vec![0.0; n * n];
    for (reaction, &mass) in reactions.iter().zip(catalysts) {
        if mass <= 0.0 {
            continue;
        }
        let eval = reaction.update_marginal_mu(conc);
        reaction.check_finite(eval.rate)?;
        for &(s, y) in reaction.yields() {
            if s.index() >= n {
                continue;
            }
            rates[s.index()] += mass * eval.rate * y;
            for &(t, d) in &eval.marginal {
                if t.index() < n {
                    jacobian[s.index() * n + t.index()] += mass * y * reaction.check_finite(d)?;
                }
            }
        }
    }
    Ok((rates, jacobian))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reaction::ReactionKind;
    use biofilm_core::SoluteId;
    use biofilm_grid::GridShape;

    fn grid() -> SpatialGrid {
        SpatialGrid::new("g", GridShape::new(3, 1, 1, 1).unwrap(), 1.0).unwrap()
    }

    fn monod() -> Reaction {
        Reaction::builder("growth")
            .kind(ReactionKind::Monod {
                mu_max: 1.0,
                ks: 1.0,
                solute: SoluteId(0),
            })
            .yield_of(SoluteId(0), -2.0)
            .build()
            .unwrap()
    }

    #[test]
    fn rates_only_where_catalyst_present() {
        let mut cat = grid();
        *cat.at_mut(1, 0, 0) = 3.0;
        let mut conc = grid();
        conc.set_all(1.0);
        let mut reac = vec![grid()];
        let mut diff = vec![grid()];
        apply_reactions(&[monod()], &[cat], &[conc], &mut reac, &mut diff).unwrap();
        assert_eq!(reac[0].at(0, 0, 0), 0.0);
        assert!((reac[0].at(1, 0, 0) - 3.0 * 0.5 * -2.0).abs() < 1e-12);
        assert!((diff[0].at(1, 0, 0) - 3.0 * -2.0 * 0.25).abs() < 1e-12);
    }

    #[test]
    fn mismatched_catalysts_fail() {
        let conc = grid();
        let mut reac = vec![grid()];
        let mut diff = vec![grid()];
        let r = apply_reactions(&[monod()], &[], &[conc], &mut reac, &mut diff);
        assert!(matches!(r, Err(SolverError::ExecutionFailed { .. })));
    }

    #[test]
    fn zero_concentration_stays_finite() {
        let mut cat = grid();
        cat.set_all(1.0);
        let conc = grid();
        let mut reac = vec![grid()];
        let mut diff = vec![grid()];
        apply_reactions(&[monod()], &[cat], &[conc], &mut reac, &mut diff).unwrap();
        assert_eq!(reac[0].at(2, 0, 0), 0.0);
        assert!(diff[0].at(2, 0, 0).is_finite());
    }

    #[test]
    fn well_mixed_jacobian() {
        let (rates, jac) = net_production(&[monod()], &[2.0], &[1.0]).unwrap();
        assert!((rates[0] + 2.0).abs() < 1e-12);
        assert!((jac[0] + 1.0).abs() < 1e-12);
    }
}

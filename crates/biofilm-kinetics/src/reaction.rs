//! Rate laws and their marginal rates.

use biofilm_core::{ReactionId, SoluteId, SolverError};
use smallvec::SmallVec;

use crate::factor::KineticFactor;

/// One limitation term of a factor-product reaction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FactorTerm {
    /// Controlling solute. `None` evaluates the factor at zero
    /// concentration (growth-fitness reactions only).
    pub solute: Option<SoluteId>,
    /// Limitation factor.
    pub factor: KineticFactor,
}

impl FactorTerm {
    /// A term controlled by `solute`.
    pub fn new(solute: SoluteId, factor: KineticFactor) -> Self {
        Self {
            solute: Some(solute),
            factor,
        }
    }
}

/// The closed set of rate laws.
#[derive(Clone, Debug, PartialEq)]
pub enum ReactionKind {
    /// `rate = k·C`, or the constant `k` when no solute is given.
    FirstOrder {
        /// Rate constant.
        k: f64,
        /// Controlling solute.
        solute: Option<SoluteId>,
    },
    /// `rate = μmax·C / (Ks + C)`.
    Monod {
        /// Maximum specific rate.
        mu_max: f64,
        /// Half-saturation constant.
        ks: f64,
        /// Controlling solute.
        solute: SoluteId,
    },
    /// `rate = μmax·Π fᵢ(Cᵢ)`, each factor clamped to `[0, 1]`.
    Factor {
        /// Maximum specific rate.
        mu_max: f64,
        /// Limitation terms.
        terms: Vec<FactorTerm>,
    },
    /// `rate = μmax·Π fᵢ(Cᵢ) + constant`.
    FactorWithConstant {
        /// Maximum specific rate.
        mu_max: f64,
        /// Limitation terms.
        terms: Vec<FactorTerm>,
        /// Concentration-independent term.
        constant: f64,
    },
    /// Factor product whose terms may have no controlling solute.
    GrowthFitness {
        /// Maximum specific rate.
        mu_max: f64,
        /// Limitation terms.
        terms: Vec<FactorTerm>,
    },
}

/// Specific rate and its derivative with respect to each controlling
/// solute.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RateEvaluation {
    /// Specific rate per unit catalyst mass.
    pub rate: f64,
    /// `(solute, ∂rate/∂C)` for each controlling solute, each solute at
    /// most once.
    pub marginal: SmallVec<[(SoluteId, f64); 4]>,
}

impl RateEvaluation {
    fn add_marginal(&mut self, solute: SoluteId, d: f64) {
        match self.marginal.iter_mut().find(|(s, _)| *s == solute) {
            Some((_, acc)) => *acc += d,
            None => self.marginal.push((solute, d)),
        }
    }

    /// Derivative with respect to `solute`, zero if it does not control
    /// the rate.
    pub fn marginal_for(&self, solute: SoluteId) -> f64 {
        self.marginal
            .iter()
            .find(|(s, _)| *s == solute)
            .map_or(0.0, |(_, d)| *d)
    }
}

/// A reaction: rate law, catalyst, and stoichiometry.
///
/// Immutable once built and shared by every agent catalysing it.
///
/// ```
/// use biofilm_core::{ReactionId, SoluteId};
/// use biofilm_kinetics::{Reaction, ReactionKind};
///
/// let growth = Reaction::builder("growth")
///     .id(ReactionId(0))
///     .kind(ReactionKind::Monod { mu_max: 1.0, ks: 0.2, solute: SoluteId(0) })
///     .yield_of(SoluteId(0), -2.0)
///     .particle_yield(0, 1.0)
///     .build()
///     .unwrap();
/// assert_eq!(growth.compute_rate(&[0.0]), 0.0);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Reaction {
    id: ReactionId,
    name: String,
    kind: ReactionKind,
    catalyst: usize,
    yields: Vec<(SoluteId, f64)>,
    particle_yields: Vec<(usize, f64)>,
}

/// Builder for [`Reaction`].
///
/// Required: `kind`. The catalyst defaults to particle 0.
pub struct ReactionBuilder {
    id: ReactionId,
    name: String,
    kind: Option<ReactionKind>,
    catalyst: usize,
    yields: Vec<(SoluteId, f64)>,
    particle_yields: Vec<(usize, f64)>,
}

impl Reaction {
    /// Start building a reaction.
    pub fn builder(name: impl Into<String>) -> ReactionBuilder {
        ReactionBuilder {
            id: ReactionId(0),
            name: name.into(),
            kind: None,
            catalyst: 0,
            yields: Vec::new(),
            particle_yields: Vec::new(),
        }
    }

    /// Reaction id.
    pub fn id(&self) -> ReactionId {
        self.id
    }

    /// Reaction name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rate law.
    pub fn kind(&self) -> &ReactionKind {
        &self.kind
    }

    /// Index of the particle type whose mass catalyses the reaction.
    pub fn catalyst(&self) -> usize {
        self.catalyst
    }

    /// Solute yields per unit catalysed rate (negative for uptake).
    pub fn yields(&self) -> &[(SoluteId, f64)] {
        &self.yields
    }

    /// Yield of one solute, zero if not involved.
    pub fn yield_of(&self, solute: SoluteId) -> f64 {
        self.yields
            .iter()
            .filter(|(s, _)| *s == solute)
            .map(|(_, y)| *y)
            .sum()
    }

    /// Particle mass produced per unit catalysed rate.
    pub fn particle_yields(&self) -> &[(usize, f64)] {
        &self.particle_yields
    }

    /// Specific rate at the given concentrations (indexed by solute id).
    pub fn compute_rate(&self, conc: &[f64]) -> f64 {
        self.update_marginal_mu(conc).rate
    }

    /// Specific rate and its analytic derivative with respect to each
    /// controlling solute.
    pub fn update_marginal_mu(&self, conc: &[f64]) -> RateEvaluation {
        let at = |s: SoluteId| conc.get(s.index()).copied().unwrap_or(0.0).max(0.0);
        let mut out = RateEvaluation::default();
        match &self.kind {
            ReactionKind::FirstOrder { k, solute } => match solute {
                Some(s) => {
                    out.rate = k * at(*s);
                    out.add_marginal(*s, *k);
                }
                None => out.rate = *k,
            },
            ReactionKind::Monod { mu_max, ks, solute } => {
                let (f, d) = KineticFactor::Monod { ks: *ks }.evaluate(at(*solute));
                out.rate = mu_max * f;
                out.add_marginal(*solute, mu_max * d);
            }
            ReactionKind::Factor { mu_max, terms }
            | ReactionKind::GrowthFitness { mu_max, terms } => {
                factor_product(*mu_max, terms, &at, &mut out);
            }
            ReactionKind::FactorWithConstant {
                mu_max,
                terms,
                constant,
            } => {
                factor_product(*mu_max, terms, &at, &mut out);
                out.rate += constant;
            }
        }
        out
    }

    /// Net production of each involved solute by `catalyst_mass` of
    /// catalyst: `mass · rate · yield`.
    pub fn compute_uptake_rate(&self, conc: &[f64], catalyst_mass: f64) -> Vec<(SoluteId, f64)> {
        let rate = self.compute_rate(conc);
        self.yields
            .iter()
            .map(|(s, y)| (*s, catalyst_mass * rate * y))
            .collect()
    }

    /// Mass produced of each particle type by `catalyst_mass` of catalyst
    /// over one time unit.
    pub fn particle_growth(&self, conc: &[f64], catalyst_mass: f64) -> Vec<(usize, f64)> {
        let rate = self.compute_rate(conc);
        self.particle_yields
            .iter()
            .map(|(p, y)| (*p, catalyst_mass * rate * y))
            .collect()
    }

    /// Reject a non-finite value produced by this reaction.
    pub fn check_finite(&self, value: f64) -> Result<f64, SolverError> {
        if value.is_finite() {
            Ok(value)
        } else {
            Err(SolverError::InvalidKinetics {
                reaction: self.name.clone(),
                value,
            })
        }
    }
}

fn factor_product(
    mu_max: f64,
    terms: &[FactorTerm],
    at: &dyn Fn(SoluteId) -> f64,
    out: &mut RateEvaluation,
) {
    let evaluated: SmallVec<[(f64, f64); 4]> = terms
        .iter()
        .map(|t| {
            let s = t.solute.map_or(0.0, at);
            let (v, d) = t.factor.evaluate(s);
            if v > 1.0 {
                (1.0, 0.0)
            } else if v < 0.0 {
                (0.0, 0.0)
            } else {
                (v, d)
            }
        })
        .collect();
    out.rate = mu_max * evaluated.iter().map(|(v, _)| v).product::<f64>();
    for (i, term) in terms.iter().enumerate() {
        let Some(solute) = term.solute else {
            continue;
        };
        let others: f64 = evaluated
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, (v, _))| v)
            .product();
        out.add_marginal(solute, mu_max * evaluated[i].1 * others);
    }
}

impl ReactionBuilder {
    /// Reaction id. Default: 0.
    pub fn id(mut self, id: ReactionId) -> Self {
        self.id = id;
        self
    }

    /// Rate law.
    pub fn kind(mut self, kind: ReactionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Particle type whose mass catalyses the reaction. Default: 0.
    pub fn catalyst(mut self, particle: usize) -> Self {
        self.catalyst = particle;
        self
    }

    /// Solute yield (negative for uptake).
    pub fn yield_of(mut self, solute: SoluteId, y: f64) -> Self {
        self.yields.push((solute, y));
        self
    }

    /// Particle mass yield.
    pub fn particle_yield(mut self, particle: usize, y: f64) -> Self {
        self.particle_yields.push((particle, y));
        self
    }

    /// Build the reaction.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the kind is missing, a rate constant or yield is
    /// not finite, a factor parameter is invalid, a factor reaction has no
    /// terms, or a non-fitness factor term lacks a solute.
    pub fn build(self) -> Result<Reaction, String> {
        let kind = self.kind.ok_or_else(|| "kind is required".to_string())?;
        let finite = |name: &str, v: f64| {
            if v.is_finite() {
                Ok(())
            } else {
                Err(format!("{name} must be finite, got {v}"))
            }
        };
        match &kind {
            ReactionKind::FirstOrder { k, .. } => finite("k", *k)?,
            ReactionKind::Monod { mu_max, ks, .. } => {
                finite("mu_max", *mu_max)?;
                KineticFactor::Monod { ks: *ks }.validate()?;
            }
            ReactionKind::Factor { mu_max, terms }
            | ReactionKind::FactorWithConstant { mu_max, terms, .. }
            | ReactionKind::GrowthFitness { mu_max, terms } => {
                finite("mu_max", *mu_max)?;
                if terms.is_empty() {
                    return Err("factor reactions need at least one term".into());
                }
                let fitness = matches!(kind, ReactionKind::GrowthFitness { .. });
                for t in terms {
                    t.factor.validate()?;
                    if t.solute.is_none() && !fitness {
                        return Err("factor term requires a solute".into());
                    }
                }
                if let ReactionKind::FactorWithConstant { constant, .. } = &kind {
                    finite("constant", *constant)?;
                }
            }
        }
        for (s, y) in &self.yields {
            finite(&format!("yield of solute {s}"), *y)?;
        }
        for (p, y) in &self.particle_yields {
            finite(&format!("yield of particle {p}"), *y)?;
        }
        Ok(Reaction {
            id: self.id,
            name: self.name,
            kind,
            catalyst: self.catalyst,
            yields: self.yields,
            particle_yields: self.particle_yields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const S0: SoluteId = SoluteId(0);
    const S1: SoluteId = SoluteId(1);

    fn monod(mu_max: f64, ks: f64) -> Reaction {
        Reaction::builder("monod")
            .kind(ReactionKind::Monod {
                mu_max,
                ks,
                solute: S0,
            })
            .yield_of(S0, -1.5)
            .particle_yield(0, 1.0)
            .build()
            .unwrap()
    }

    // ── Builder tests ───────────────────────────────────────────

    #[test]
    fn builder_requires_kind() {
        let r = Reaction::builder("x").build();
        assert!(r.unwrap_err().contains("kind"));
    }

    #[test]
    fn builder_rejects_non_positive_ks() {
        let r = Reaction::builder("x")
            .kind(ReactionKind::Monod {
                mu_max: 1.0,
                ks: 0.0,
                solute: S0,
            })
            .build();
        assert!(r.unwrap_err().contains("ks"));
    }

    #[test]
    fn builder_rejects_solute_free_factor_outside_fitness() {
        let term = FactorTerm {
            solute: None,
            factor: KineticFactor::FirstOrder,
        };
        let r = Reaction::builder("x")
            .kind(ReactionKind::Factor {
                mu_max: 1.0,
                terms: vec![term],
            })
            .build();
        assert!(r.is_err());
        let ok = Reaction::builder("x")
            .kind(ReactionKind::GrowthFitness {
                mu_max: 1.0,
                terms: vec![term],
            })
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn builder_rejects_nan_yield() {
        let r = Reaction::builder("x")
            .kind(ReactionKind::FirstOrder { k: 1.0, solute: None })
            .yield_of(S0, f64::NAN)
            .build();
        assert!(r.unwrap_err().contains("yield"));
    }

    // ── Rate tests ──────────────────────────────────────────────

    #[test]
    fn first_order_rate() {
        let r = Reaction::builder("decay")
            .kind(ReactionKind::FirstOrder {
                k: 0.3,
                solute: Some(S0),
            })
            .build()
            .unwrap();
        let e = r.update_marginal_mu(&[2.0]);
        assert!((e.rate - 0.6).abs() < 1e-12);
        assert_eq!(e.marginal_for(S0), 0.3);
        let zero = Reaction::builder("zero")
            .kind(ReactionKind::FirstOrder { k: 0.3, solute: None })
            .build()
            .unwrap();
        assert_eq!(zero.compute_rate(&[]), 0.3);
        assert!(zero.update_marginal_mu(&[]).marginal.is_empty());
    }

    #[test]
    fn monod_zero_concentration_gives_zero_rate() {
        let r = monod(2.0, 0.25);
        let e = r.update_marginal_mu(&[0.0]);
        assert_eq!(e.rate, 0.0);
        assert!(e.marginal_for(S0).is_finite());
        assert_eq!(e.marginal_for(S0), 2.0 / 0.25);
    }

    #[test]
    fn factor_product_and_marginals() {
        let r = Reaction::builder("dual")
            .kind(ReactionKind::Factor {
                mu_max: 2.0,
                terms: vec![
                    FactorTerm::new(S0, KineticFactor::Monod { ks: 1.0 }),
                    FactorTerm::new(S1, KineticFactor::Monod { ks: 1.0 }),
                ],
            })
            .build()
            .unwrap();
        let e = r.update_marginal_mu(&[1.0, 3.0]);
        assert!((e.rate - 2.0 * 0.5 * 0.75).abs() < 1e-12);
        // d/ds0 = 2 · (1/4) · 0.75
        assert!((e.marginal_for(S0) - 0.375).abs() < 1e-12);
        // d/ds1 = 2 · 0.5 · (1/16)
        assert!((e.marginal_for(S1) - 0.0625).abs() < 1e-12);
    }

    #[test]
    fn factors_are_clamped_to_unit_interval() {
        let r = Reaction::builder("lin")
            .kind(ReactionKind::Factor {
                mu_max: 1.0,
                terms: vec![
                    FactorTerm::new(S0, KineticFactor::Linear { k: 10.0 }),
                    FactorTerm::new(S1, KineticFactor::Linear { k: -1.0 }),
                ],
            })
            .build()
            .unwrap();
        let e = r.update_marginal_mu(&[1.0, 0.5]);
        assert_eq!(e.rate, 0.0);
        assert_eq!(e.marginal_for(S0), 0.0);
        let e = r.update_marginal_mu(&[1.0, 0.0]);
        assert_eq!(e.rate, 0.0);
    }

    #[test]
    fn factor_with_constant_adds_offset() {
        let r = Reaction::builder("c")
            .kind(ReactionKind::FactorWithConstant {
                mu_max: 1.0,
                terms: vec![FactorTerm::new(S0, KineticFactor::Monod { ks: 1.0 })],
                constant: -0.1,
            })
            .build()
            .unwrap();
        assert!((r.compute_rate(&[1.0]) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn uptake_scales_with_mass_and_yield() {
        let r = monod(1.0, 1.0);
        let up = r.compute_uptake_rate(&[1.0], 4.0);
        assert_eq!(up, vec![(S0, 4.0 * 0.5 * -1.5)]);
        let growth = r.particle_growth(&[1.0], 4.0);
        assert_eq!(growth, vec![(0, 2.0)]);
    }

    #[test]
    fn check_finite_flags_nan() {
        let r = monod(1.0, 1.0);
        assert!(matches!(
            r.check_finite(f64::NAN),
            Err(SolverError::InvalidKinetics { .. })
        ));
        assert_eq!(r.check_finite(1.0), Ok(1.0));
    }

    proptest! {
        #[test]
        fn monod_rate_bounded_and_finite(
            mu in 0.0f64..10.0,
            ks in 1e-6f64..100.0,
            s in 0.0f64..1e4,
        ) {
            let e = monod(mu, ks).update_marginal_mu(&[s]);
            prop_assert!(e.rate.is_finite());
            prop_assert!(e.rate >= 0.0 && e.rate <= mu + 1e-12);
            prop_assert!(e.marginal_for(S0).is_finite());
        }
    }
}

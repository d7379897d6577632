//! Well-mixed reactor solver.
//!
//! In chemostat mode the whole liquid is one compartment: the solute
//! concentrations are the bulk values, and they obey
//!
//! ```text
//! dS/dt = D·(Sin - S) + Σ_r m_r · μ_r(S) · y_rs
//! ```
//!
//! The system is stiff whenever uptake is fast compared with dilution,
//! so it is integrated with a second-order Rosenbrock method (with a
//! third-order error estimate) and adaptive internal steps.

use biofilm_core::{SoluteId, SolverError};
use biofilm_grid::{Bulk, Domain};
use biofilm_kinetics::{net_production, Reaction};
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};

use crate::solver::{DiffusionSolver, SolveReport, SolverContext};

/// `1 / (2 + √2)`.
const GAMMA: f64 = 0.292_893_218_813_452_4;
/// `6 + √2`.
const E32: f64 = 7.414_213_562_373_095;
/// Condition number above which the step matrix is reported.
const ILL_CONDITIONED: f64 = 1e8;

/// Integration parameters for [`ChemostatSolver`].
#[derive(Clone, Debug, PartialEq)]
pub struct ChemostatConfig {
    /// Relative tolerance of the local error estimate.
    pub rtol: f64,
    /// Absolute floor used when scaling the error.
    pub threshold: f64,
    /// Internal steps smaller than this fraction of the outer step abort
    /// the solve.
    pub min_step_fraction: f64,
    /// Upper bound on internal steps per outer step.
    pub max_steps: usize,
}

impl Default for ChemostatConfig {
    fn default() -> Self {
        Self {
            rtol: 1e-3,
            threshold: 1e-6,
            min_step_fraction: 1e-10,
            max_steps: 10_000,
        }
    }
}

impl ChemostatConfig {
    /// Check that all fields are usable.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.rtol > 0.0) || !self.rtol.is_finite() {
            return Err(format!("rtol must be finite and > 0, got {}", self.rtol));
        }
        if !(self.threshold > 0.0) || !self.threshold.is_finite() {
            return Err(format!(
                "threshold must be finite and > 0, got {}",
                self.threshold
            ));
        }
        if !(self.min_step_fraction > 0.0 && self.min_step_fraction < 1.0) {
            return Err(format!(
                "min_step_fraction must be in (0, 1), got {}",
                self.min_step_fraction
            ));
        }
        if self.max_steps == 0 {
            return Err("max_steps must be at least 1".into());
        }
        Ok(())
    }
}

/// Right-hand side of the reactor balance for a fixed catalyst load.
struct Balance<'a> {
    reactions: &'a [Reaction],
    catalysts: Vec<f64>,
    dilution: f64,
    inflow: Vec<f64>,
    frozen: Vec<bool>,
}

impl Balance<'_> {
    fn rates(&self, y: &DVector<f64>) -> Result<DVector<f64>, SolverError> {
        let conc: Vec<f64> = y.iter().map(|v| v.max(0.0)).collect();
        let (prod, _) = net_production(self.reactions, &self.catalysts, &conc)?;
        Ok(DVector::from_fn(y.len(), |s, _| {
            if self.frozen[s] {
                0.0
            } else {
                self.dilution * (self.inflow[s] - y[s]) + prod[s]
            }
        }))
    }

    fn jacobian(&self, y: &DVector<f64>) -> Result<DMatrix<f64>, SolverError> {
        let n = y.len();
        let conc: Vec<f64> = y.iter().map(|v| v.max(0.0)).collect();
        let (_, jac) = net_production(self.reactions, &self.catalysts, &conc)?;
        Ok(DMatrix::from_fn(n, n, |s, t| {
            if self.frozen[s] {
                0.0
            } else if s == t {
                jac[s * n + t] - self.dilution
            } else {
                jac[s * n + t]
            }
        }))
    }
}

/// Outcome of integrating over one outer step.
#[derive(Clone, Debug, PartialEq)]
struct Integration {
    y: DVector<f64>,
    steps: usize,
    max_error: f64,
}

/// Rosenbrock integrator for a single well-mixed compartment.
#[derive(Debug)]
pub struct ChemostatSolver {
    name: String,
    bulk: String,
    config: ChemostatConfig,
    solutes: Vec<SoluteId>,
    last_step: Option<f64>,
}

impl ChemostatSolver {
    /// Solver for the compartment held by bulk `bulk`.
    pub fn new(bulk: impl Into<String>) -> Self {
        Self {
            name: "chemostat".to_string(),
            bulk: bulk.into(),
            config: ChemostatConfig::default(),
            solutes: Vec::new(),
            last_step: None,
        }
    }

    /// Replace the integration parameters.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the configuration fails
    /// [`ChemostatConfig::validate`].
    pub fn with_config(mut self, config: ChemostatConfig) -> Result<Self, String> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Name of the bulk this solver integrates.
    pub fn bulk_name(&self) -> &str {
        &self.bulk
    }

    fn integrate(
        &mut self,
        balance: &Balance<'_>,
        y0: DVector<f64>,
        span: f64,
    ) -> Result<Integration, SolverError> {
        let n = y0.len();
        let min_step = span * self.config.min_step_fraction;
        let mut y = y0;
        let mut t = 0.0;
        let mut h = self.last_step.unwrap_or(span).min(span);
        let mut steps = 0;
        let mut max_error: f64 = 0.0;
        let identity = DMatrix::<f64>::identity(n, n);

        while t < span {
            if steps >= self.config.max_steps || h < min_step {
                return Err(SolverError::NonConvergence {
                    solver: self.name.clone(),
                    solute: self.bulk.clone(),
                    residual: max_error,
                    tolerance: self.config.rtol,
                    cycles: steps,
                });
            }
            h = h.min(span - t);
            let f0 = balance.rates(&y)?;
            let jac = balance.jacobian(&y)?;
            let w = &identity - &jac * (h * GAMMA);
            let singular = w.singular_values();
            let (smax, smin) = (singular.max(), singular.min());
            if smin == 0.0 || smax / smin > ILL_CONDITIONED {
                warn!(
                    "{}: step matrix is ill conditioned (σmax {:e}, σmin {:e})",
                    self.name, smax, smin
                );
            }
            let lu = w.lu();
            let solve = |b: DVector<f64>| {
                lu.solve(&b).ok_or_else(|| SolverError::ExecutionFailed {
                    reason: "singular Rosenbrock step matrix".into(),
                })
            };

            let k1 = solve(f0.clone())?;
            let f1 = balance.rates(&(&y + &k1 * (0.5 * h)))?;
            let k2 = solve(&f1 - &k1)? + &k1;
            let y_new = &y + &k2 * h;
            let f2 = balance.rates(&y_new)?;
            let k3 = solve(&f2 - (&k2 - &f1) * E32 - (&k1 - &f0) * 2.0)?;

            let mut err: f64 = 0.0;
            for s in 0..n {
                let scale = y[s].abs().max(y_new[s].abs()).max(self.config.threshold);
                let e = (k1[s] - 2.0 * k2[s] + k3[s]).abs() / scale;
                err = err.max(e);
            }
            err *= h / 6.0;
            steps += 1;

            if err <= self.config.rtol {
                t += h;
                y = y_new;
                max_error = max_error.max(err);
                let grow = if err == 0.0 {
                    5.0
                } else {
                    (0.8 * (self.config.rtol / err).cbrt()).min(5.0)
                };
                self.last_step = Some(h);
                h *= grow;
            } else {
                h *= (0.8 * (self.config.rtol / err).cbrt()).max(0.1);
            }
        }
        Ok(Integration {
            y,
            steps,
            max_error,
        })
    }
}

impl DiffusionSolver for ChemostatSolver {
    fn name(&self) -> &str {
        &self.name
    }

    fn solutes(&self) -> &[SoluteId] {
        &self.solutes
    }

    fn initialize(&mut self, domain: &Domain) -> Result<(), SolverError> {
        let bulk = domain.bulk(&self.bulk).ok_or_else(|| SolverError::ExecutionFailed {
            reason: format!("no bulk named '{}'", self.bulk),
        })?;
        if bulk.solute_count() != domain.solute_count() {
            return Err(SolverError::ExecutionFailed {
                reason: format!(
                    "bulk '{}' tracks {} solutes, domain has {}",
                    self.bulk,
                    bulk.solute_count(),
                    domain.solute_count()
                ),
            });
        }
        self.solutes = (0..domain.solute_count())
            .map(|s| SoluteId(s as u32))
            .collect();
        Ok(())
    }

    fn solve(&mut self, ctx: &mut SolverContext<'_>) -> Result<SolveReport, SolverError> {
        if self.solutes.len() != ctx.domain().solute_count() {
            self.initialize(ctx.domain())?;
        }
        let bulk: &Bulk = ctx
            .domain()
            .bulk(&self.bulk)
            .ok_or_else(|| SolverError::ExecutionFailed {
                reason: format!("no bulk named '{}'", self.bulk),
            })?;
        let n = self.solutes.len();
        let frozen: Vec<bool> = (0..n)
            .map(|s| bulk.is_constant() || bulk.solute(s).is_some_and(|b| b.is_constant))
            .collect();
        let balance = Balance {
            reactions: ctx.reactions(),
            catalysts: ctx.catalysts().iter().map(|g| g.average()).collect(),
            dilution: bulk.dilution(),
            inflow: (0..n)
                .map(|s| bulk.solute(s).map_or(0.0, |b| b.inflow))
                .collect(),
            frozen,
        };
        let y0 = DVector::from_vec(bulk.values());
        let dt = ctx.dt();

        let out = self.integrate(&balance, y0, dt)?;
        let (rates, _) = net_production(
            balance.reactions,
            &balance.catalysts,
            out.y.as_slice(),
        )?;

        let domain = ctx.domain_mut();
        if let Some(bulk) = domain.bulk_mut(&self.bulk) {
            for (s, v) in out.y.iter().enumerate() {
                if *v < 0.0 {
                    warn!("{}: solute {} went negative ({:e}), clamped", self.name, s, v);
                }
                bulk.set_value(s, v.max(0.0));
            }
        }
        for (s, v) in out.y.iter().enumerate() {
            if let Some(g) = domain.solute_grid_mut(SoluteId(s as u32)) {
                g.set_all(v.max(0.0));
            }
        }
        domain.refresh_solute_boundaries();
        debug!(
            "{}: {} internal steps, max local error {:e}",
            self.name, out.steps, out.max_error
        );
        Ok(SolveReport {
            cycles: out.steps,
            residual: out.max_error,
            reaction_rates: rates,
        })
    }

    fn time_constraint(&self) -> Option<f64> {
        self.last_step
    }
}

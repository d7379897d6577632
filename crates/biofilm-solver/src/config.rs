//! Multigrid tuning parameters.

/// Recursion pattern of one multigrid cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CycleShape {
    /// Visit each coarser level once per cycle.
    #[default]
    V,
    /// Visit each coarser level twice per cycle.
    W,
}

impl CycleShape {
    /// Number of recursive visits to the next coarser level.
    pub fn visits(self) -> usize {
        match self {
            CycleShape::V => 1,
            CycleShape::W => 2,
        }
    }
}

/// Treatment of the reaction term inside a relaxation sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Linearization {
    /// Include the marginal rate in the local Newton update.
    #[default]
    Newton,
    /// Hold the reaction rate fixed at its value from the start of the
    /// sweep.
    Lagged,
}

/// Whether the diffusion equation includes a time derivative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SolveMode {
    /// Quasi-steady state: `∇·(D∇u) + R(u) = 0`.
    #[default]
    Steady,
    /// One implicit Euler step of length `dt`:
    /// `∇·(D∇u) + R(u) = (u - u_old) / dt`.
    Transient,
}

/// Multigrid parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MultigridConfig {
    /// Relaxation sweeps before restriction. Default: 2.
    pub n_pre: usize,
    /// Relaxation sweeps after prolongation. Default: 2.
    pub n_post: usize,
    /// Relaxation sweeps on the coarsest level. Default: 20.
    pub n_coarse: usize,
    /// Cycles allowed on the finest level before reporting
    /// non-convergence. Default: 50.
    pub max_cycles: usize,
    /// Largest accepted scaled residual, in concentration units.
    /// Default: 1e-6.
    pub tolerance: f64,
    /// Cycle recursion pattern. Default: V.
    pub cycle: CycleShape,
    /// Reaction term linearization. Default: Newton.
    pub linearization: Linearization,
    /// Steady or implicit-Euler solve. Default: steady.
    pub mode: SolveMode,
}

impl Default for MultigridConfig {
    fn default() -> Self {
        Self {
            n_pre: 2,
            n_post: 2,
            n_coarse: 20,
            max_cycles: 50,
            tolerance: 1e-6,
            cycle: CycleShape::V,
            linearization: Linearization::Newton,
            mode: SolveMode::Steady,
        }
    }
}

impl MultigridConfig {
    /// Check parameter ranges.
    pub fn validate(&self) -> Result<(), String> {
        if self.n_pre + self.n_post == 0 {
            return Err("n_pre + n_post must be at least 1".into());
        }
        if self.n_coarse == 0 {
            return Err("n_coarse must be at least 1".into());
        }
        if self.max_cycles == 0 {
            return Err("max_cycles must be at least 1".into());
        }
        if !(self.tolerance > 0.0) || !self.tolerance.is_finite() {
            return Err(format!(
                "tolerance must be finite and > 0, got {}",
                self.tolerance
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(MultigridConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_sweeps() {
        let cfg = MultigridConfig {
            n_pre: 0,
            n_post: 0,
            ..Default::default()
        };
        assert!(cfg.validate().unwrap_err().contains("n_pre"));
    }

    #[test]
    fn rejects_bad_tolerance() {
        let cfg = MultigridConfig {
            tolerance: f64::NAN,
            ..Default::default()
        };
        assert!(cfg.validate().unwrap_err().contains("tolerance"));
    }

    #[test]
    fn w_cycle_visits_twice() {
        assert_eq!(CycleShape::W.visits(), 2);
        assert_eq!(CycleShape::default().visits(), 1);
    }
}

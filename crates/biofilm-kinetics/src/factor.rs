//! Single-solute limitation factors.

/// A limitation factor `f(s)` with its analytic derivative.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum KineticFactor {
    /// `f = 1`.
    FirstOrder,
    /// `f = k·s`.
    Linear {
        /// Slope.
        k: f64,
    },
    /// `f = s / (Ks + s)`.
    Monod {
        /// Half-saturation constant.
        ks: f64,
    },
    /// `f = Ki / (Ki + s)`.
    SimpleInhibition {
        /// Inhibition constant.
        ki: f64,
    },
    /// `f = s / (Ks + s + s²/Ki)`.
    Haldane {
        /// Half-saturation constant.
        ks: f64,
        /// Inhibition constant.
        ki: f64,
    },
    /// `f = sʰ / (Ksʰ + sʰ)`.
    Hill {
        /// Half-saturation constant.
        ks: f64,
        /// Hill coefficient, at least 1.
        h: f64,
    },
}

impl KineticFactor {
    /// Check the parameters.
    pub fn validate(&self) -> Result<(), String> {
        let positive = |name: &str, v: f64| {
            if !(v > 0.0) || !v.is_finite() {
                Err(format!("{name} must be finite and > 0, got {v}"))
            } else {
                Ok(())
            }
        };
        match *self {
            KineticFactor::FirstOrder => Ok(()),
            KineticFactor::Linear { k } => {
                if k.is_finite() {
                    Ok(())
                } else {
                    Err(format!("k must be finite, got {k}"))
                }
            }
            KineticFactor::Monod { ks } => positive("ks", ks),
            KineticFactor::SimpleInhibition { ki } => positive("ki", ki),
            KineticFactor::Haldane { ks, ki } => {
                positive("ks", ks)?;
                positive("ki", ki)
            }
            KineticFactor::Hill { ks, h } => {
                positive("ks", ks)?;
                if !(h >= 1.0) || !h.is_finite() {
                    return Err(format!("hill coefficient must be finite and >= 1, got {h}"));
                }
                Ok(())
            }
        }
    }

    /// Value and derivative at concentration `s`.
    ///
    /// Negative concentrations are read as zero. A vanishing denominator
    /// yields `(0, 0)` instead of NaN.
    pub fn evaluate(&self, s: f64) -> (f64, f64) {
        let s = s.max(0.0);
        match *self {
            KineticFactor::FirstOrder => (1.0, 0.0),
            KineticFactor::Linear { k } => (k * s, k),
            KineticFactor::Monod { ks } => {
                let den = ks + s;
                if den <= 0.0 {
                    return (0.0, 0.0);
                }
                (s / den, ks / (den * den))
            }
            KineticFactor::SimpleInhibition { ki } => {
                let den = ki + s;
                if den <= 0.0 {
                    return (0.0, 0.0);
                }
                (ki / den, -ki / (den * den))
            }
            KineticFactor::Haldane { ks, ki } => {
                let den = ks + s + s * s / ki;
                if den <= 0.0 {
                    return (0.0, 0.0);
                }
                (s / den, (ks - s * s / ki) / (den * den))
            }
            KineticFactor::Hill { ks, h } => {
                let sh = s.powf(h);
                let ksh = ks.powf(h);
                let den = ksh + sh;
                if den <= 0.0 {
                    return (0.0, 0.0);
                }
                (sh / den, ksh * h * s.powf(h - 1.0) / (den * den))
            }
        }
    }

    /// Value at `s`.
    pub fn value(&self, s: f64) -> f64 {
        self.evaluate(s).0
    }

    /// Derivative at `s`.
    pub fn derivative(&self, s: f64) -> f64 {
        self.evaluate(s).1
    }
}

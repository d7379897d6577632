//! Well-mixed bulk reservoirs.
//!
//! A bulk holds one concentration per solute and is advanced once per
//! step by an implicit dilution update:
//!
//! ```text
//! S ← (S + dt·(D·Sin + r)) / (1 + dt·D)      clamped at 0
//! ```
//!
//! where `D` is the dilution rate, `Sin` the inflow concentration and
//! `r` the net exchange rate with the biofilm (computed by the domain
//! from either the reaction rates or the face flux, see
//! [`BulkUpdateMode`]).

/// How a bulk measures its exchange with the biofilm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BulkUpdateMode {
    /// Net reaction rate averaged over the domain and scaled by the
    /// reactor specific area.
    #[default]
    Reaction,
    /// Diffusive flux across the faces connected to the bulk.
    Gradient,
}

/// A periodic step change of a bulk concentration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pulse {
    /// Concentration the bulk is reset to at each pulse.
    pub concentration: f64,
    /// Pulses per unit time.
    pub rate: f64,
}

/// Per-solute state of a bulk.
#[derive(Clone, Debug, PartialEq)]
pub struct BulkSolute {
    /// Current concentration.
    pub value: f64,
    /// Inflow concentration.
    pub inflow: f64,
    /// Whether the concentration is held fixed.
    pub is_constant: bool,
    /// Optional periodic reset.
    pub pulse: Option<Pulse>,
    last_pulse: f64,
    rate: f64,
}

impl BulkSolute {
    /// A solute at a fixed concentration with matching inflow.
    pub fn constant(value: f64) -> Self {
        Self {
            value,
            inflow: value,
            is_constant: true,
            pulse: None,
            last_pulse: 0.0,
            rate: 0.0,
        }
    }

    /// A solute that evolves from `value`, fed at `inflow`.
    pub fn dynamic(value: f64, inflow: f64) -> Self {
        Self {
            value,
            inflow,
            is_constant: false,
            pulse: None,
            last_pulse: 0.0,
            rate: 0.0,
        }
    }

    /// Attach a periodic pulse.
    pub fn with_pulse(mut self, concentration: f64, rate: f64) -> Self {
        self.pulse = Some(Pulse {
            concentration,
            rate,
        });
        self
    }

    /// Rate of change measured at the last update.
    pub fn rate(&self) -> f64 {
        self.rate
    }
}

/// A well-mixed reservoir connected to one or more domain faces.
#[derive(Clone, Debug, PartialEq)]
pub struct Bulk {
    name: String,
    is_constant: bool,
    dilution: f64,
    mode: BulkUpdateMode,
    solutes: Vec<BulkSolute>,
}

/// Fraction of the bulk concentration allowed to change in one step when
/// computing the time constraint.
const MAX_RELATIVE_CHANGE: f64 = 0.05;

impl Bulk {
    /// Create a bulk. `solutes` is indexed by solute id.
    pub fn new(name: impl Into<String>, dilution: f64, solutes: Vec<BulkSolute>) -> Self {
        Self {
            name: name.into(),
            is_constant: false,
            dilution,
            mode: BulkUpdateMode::Reaction,
            solutes,
        }
    }

    /// A reservoir whose concentrations never change.
    pub fn fixed(name: impl Into<String>, values: &[f64]) -> Self {
        let mut b = Self::new(
            name,
            0.0,
            values.iter().map(|&v| BulkSolute::constant(v)).collect(),
        );
        b.is_constant = true;
        b
    }

    /// Select how the exchange term is measured.
    pub fn with_mode(mut self, mode: BulkUpdateMode) -> Self {
        self.mode = mode;
        self
    }

    /// Reservoir name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the whole reservoir is held fixed.
    pub fn is_constant(&self) -> bool {
        self.is_constant
    }

    /// Dilution rate `D`.
    pub fn dilution(&self) -> f64 {
        self.dilution
    }

    /// Exchange measurement mode.
    pub fn mode(&self) -> BulkUpdateMode {
        self.mode
    }

    /// Number of solutes tracked.
    pub fn solute_count(&self) -> usize {
        self.solutes.len()
    }

    /// Per-solute state.
    pub fn solute(&self, index: usize) -> Option<&BulkSolute> {
        self.solutes.get(index)
    }

    /// Concentration of a solute, zero for untracked solutes.
    pub fn value(&self, index: usize) -> f64 {
        self.solutes.get(index).map_or(0.0, |s| s.value)
    }

    /// Overwrite the concentration of a solute.
    pub fn set_value(&mut self, index: usize, value: f64) {
        if let Some(s) = self.solutes.get_mut(index) {
            s.value = value;
        }
    }

    /// Every concentration, indexed by solute id.
    pub fn values(&self) -> Vec<f64> {
        self.solutes.iter().map(|s| s.value).collect()
    }

    /// Fire any due pulses, then advance every non-constant solute by
    /// `dt` with exchange rates `exchange` (indexed by solute id).
    pub fn update(&mut self, now: f64, dt: f64, exchange: &[f64]) {
        if self.is_constant {
            return;
        }
        for (idx, s) in self.solutes.iter_mut().enumerate() {
            if s.is_constant {
                continue;
            }
            if let Some(pulse) = s.pulse {
                if pulse.rate > 0.0 && now - s.last_pulse >= 1.0 / pulse.rate {
                    s.value = pulse.concentration;
                    s.last_pulse = now;
                }
            }
            let r = exchange.get(idx).copied().unwrap_or(0.0);
            s.rate = self.dilution * (s.inflow - s.value) + r;
            let next = (s.value + dt * (self.dilution * s.inflow + r)) / (1.0 + dt * self.dilution);
            s.value = next.max(0.0);
        }
    }

    /// Largest step keeping every solute's relative change within 5 %.
    ///
    /// Returns `f64::MAX` for a constant bulk or when nothing changes.
    pub fn time_constraint(&self) -> f64 {
        if self.is_constant {
            return f64::MAX;
        }
        let mut out = f64::MAX;
        for s in self.solutes.iter().filter(|s| !s.is_constant) {
            if s.rate == 0.0 {
                continue;
            }
            let t1 = MAX_RELATIVE_CHANGE * s.value / s.rate.abs();
            let t2 = MAX_RELATIVE_CHANGE * (s.value - s.inflow) / s.rate;
            let t = if t2 < 0.0 { t1.min(-t2) } else { t1 };
            if t > 0.0 {
                out = out.min(t);
            }
        }
        out
    }
}

//! The simulation clock.
//!
//! [`SimTimer`] tracks the current time, the step length and the number
//! of completed steps. With adaptive stepping enabled the step follows
//! the tightest time constraint reported after each step: shrinking
//! takes effect at once, growth is smoothed over the last ten proposals.
//! Every step length is a whole multiple of `dt_min / 10`.

use biofilm_core::StepId;

use crate::config::ConfigError;

const HISTORY: usize = 10;

/// Clock parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimerConfig {
    /// Time at which the run ends. Default: 1.
    pub end: f64,
    /// Initial step length. Default: 0.1.
    pub dt: f64,
    /// Smallest step length, also the floor for retries. Default: 1e-4.
    pub dt_min: f64,
    /// Largest step length. Default: 1.
    pub dt_max: f64,
    /// Whether the step follows the reported time constraints.
    /// Default: false.
    pub adaptive: bool,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            end: 1.0,
            dt: 0.1,
            dt_min: 1e-4,
            dt_max: 1.0,
            adaptive: false,
        }
    }
}

impl TimerConfig {
    /// Check the clock parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| Err(ConfigError::InvalidTimer { reason });
        for (name, v) in [("dt", self.dt), ("dt_min", self.dt_min), ("dt_max", self.dt_max)] {
            if !(v > 0.0) || !v.is_finite() {
                return invalid(format!("{name} must be finite and > 0, got {v}"));
            }
        }
        if self.dt_min > self.dt_max {
            return invalid(format!(
                "dt_min ({}) exceeds dt_max ({})",
                self.dt_min, self.dt_max
            ));
        }
        if self.dt < self.dt_min || self.dt > self.dt_max {
            return invalid(format!(
                "dt ({}) outside [{}, {}]",
                self.dt, self.dt_min, self.dt_max
            ));
        }
        if self.end.is_nan() || self.end < 0.0 {
            return invalid(format!("end must be >= 0, got {}", self.end));
        }
        Ok(())
    }
}

/// Simulation clock.
#[derive(Clone, Debug, PartialEq)]
pub struct SimTimer {
    now: f64,
    dt: f64,
    dt_min: f64,
    dt_max: f64,
    end: f64,
    adaptive: bool,
    iteration: StepId,
    history: [f64; HISTORY],
}

impl SimTimer {
    /// A clock at time zero.
    pub fn new(config: &TimerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            now: 0.0,
            dt: config.dt,
            dt_min: config.dt_min,
            dt_max: config.dt_max,
            end: config.end,
            adaptive: config.adaptive,
            iteration: StepId(0),
            history: [config.dt; HISTORY],
        })
    }

    /// Current simulation time.
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Length of the next step.
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Smallest allowed step length.
    pub fn dt_min(&self) -> f64 {
        self.dt_min
    }

    /// Largest allowed step length.
    pub fn dt_max(&self) -> f64 {
        self.dt_max
    }

    /// End of the run.
    pub fn end(&self) -> f64 {
        self.end
    }

    /// Whether adaptive stepping is on.
    pub fn is_adaptive(&self) -> bool {
        self.adaptive
    }

    /// Number of completed steps.
    pub fn iteration(&self) -> StepId {
        self.iteration
    }

    /// Whether the end time has been reached.
    pub fn is_finished(&self) -> bool {
        self.now >= self.end
    }

    /// Whether `t` falls in `[now, now + dt)`.
    pub fn is_during_next_step(&self, t: f64) -> bool {
        t >= self.now && t < self.now + self.dt
    }

    /// Set the step length, clamped to `[dt_min, dt_max]`.
    pub fn set_dt(&mut self, dt: f64) {
        self.dt = dt.clamp(self.dt_min, self.dt_max);
    }

    /// Complete the current step.
    pub fn advance(&mut self) {
        self.now += self.dt;
        self.iteration = self.iteration.next();
    }

    /// Halve the step length for a retry. Returns `false` when the step
    /// is already at `dt_min`.
    pub fn shrink(&mut self) -> bool {
        if self.dt <= self.dt_min {
            return false;
        }
        self.dt = (0.5 * self.dt).max(self.dt_min);
        self.history = [self.dt; HISTORY];
        true
    }

    /// Adopt a new step length from the tightest reported time
    /// constraint. Ignored when adaptive stepping is off or the
    /// constraint is not finite.
    pub fn update(&mut self, constraint: f64) {
        if !self.adaptive || !constraint.is_finite() {
            return;
        }
        let proposal = constraint.clamp(self.dt_min, self.dt_max);
        if proposal <= self.dt {
            self.dt = proposal;
            self.history = [proposal; HISTORY];
        } else {
            self.history.rotate_right(1);
            self.history[0] = proposal;
            let mean = self.history.iter().sum::<f64>() / HISTORY as f64;
            self.dt = mean.clamp(self.dt_min, self.dt_max);
            self.history[0] = self.dt;
        }
        let quantum = self.dt_min / 10.0;
        // The epsilon absorbs rounding in the division.
        let steps = (self.dt / quantum + 1e-9).floor();
        self.dt = (steps * quantum).max(self.dt_min);
    }

    /// Return to time zero, keeping the step length.
    pub fn reset(&mut self) {
        self.now = 0.0;
        self.iteration = StepId(0);
    }
}

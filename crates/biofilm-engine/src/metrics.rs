//! Per-step metrics for the simulation driver.
//!
//! [`StepMetrics`] captures timing and bookkeeping data for a single
//! step, for telemetry and for tuning the retry policy.

/// Timing and counters collected during a single step.
///
/// All durations are in microseconds.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepMetrics {
    /// Wall-clock time for the entire step, retries included.
    pub total_us: u64,
    /// Per-solver execution time of the accepted attempt:
    /// `(name, microseconds)`.
    pub solver_us: Vec<(String, u64)>,
    /// Time spent in the agent update.
    pub agent_us: u64,
    /// Cycles (or integrator steps) summed over the solvers.
    pub cycles: usize,
    /// Largest final residual reported by a solver.
    pub residual: f64,
    /// Live agents after the step.
    pub agent_count: usize,
    /// Agents removed during the step: dead, flushed or pushed out.
    pub removed: usize,
    /// Agents born during the step.
    pub divisions: usize,
    /// Step length actually used.
    pub dt: f64,
    /// Attempts rejected for non-convergence before the accepted one.
    pub retries: u32,
}

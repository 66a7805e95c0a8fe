//! Timing aggregates and the solver info record.
//!
//! A [`Metrics`] aggregate is owned by the solver and reset at the start of
//! every solve. Phases are measured with scoped [`TimerGuard`]s, so a phase
//! that exits early through `?` is still recorded. [`SolverInfo`] is the
//! read-only summary derived from the metrics and the iteration state.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::criteria::{IterationState, SolverStatus};
use crate::error::ErrorCode;
use crate::line_search::LineSearchStats;

/// Timed phases of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Objective evaluation
    ObjectiveEvaluation,
    /// Gradient evaluation
    Gradient,
    /// Curvature assembly
    Assembly,
    /// Linear solve or quasi-Newton update
    Inverting,
    /// Step-size search
    LineSearch,
    /// Problem notifications after a point change
    ConstraintSetUpdate,
}

/// Cumulative timings and counters of a solve.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    /// Wall-clock time of the whole solve
    pub total: Duration,
    /// Time spent evaluating the objective
    pub obj_fun: Duration,
    /// Time spent evaluating the gradient
    pub grad: Duration,
    /// Time spent assembling curvature information
    pub assembly: Duration,
    /// Time spent in linear solves and quasi-Newton updates
    pub inverting: Duration,
    /// Time spent in step-size searches
    pub line_search: Duration,
    /// Time spent in `solution_changed` notifications
    pub constraint_set_update: Duration,
    /// Number of strategy escalations
    pub escalations: usize,
    /// Deepest strategy level reached
    pub max_descent_level: usize,
    /// Statistics accumulated by the step-size search
    pub line_search_stats: LineSearchStats,
}

impl Metrics {
    /// Creates an empty aggregate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears every timing and counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Returns the accumulator of a phase.
    pub fn slot_mut(&mut self, phase: Phase) -> &mut Duration {
        match phase {
            Phase::ObjectiveEvaluation => &mut self.obj_fun,
            Phase::Gradient => &mut self.grad,
            Phase::Assembly => &mut self.assembly,
            Phase::Inverting => &mut self.inverting,
            Phase::LineSearch => &mut self.line_search,
            Phase::ConstraintSetUpdate => &mut self.constraint_set_update,
        }
    }

    /// Starts timing a phase; the time is recorded when the guard drops.
    pub fn timer(&mut self, phase: Phase) -> TimerGuard<'_> {
        TimerGuard::new(self.slot_mut(phase))
    }

    /// Adds a measured duration to a phase.
    pub fn record(&mut self, phase: Phase, duration: Duration) {
        *self.slot_mut(phase) += duration;
    }

    /// Records an escalation to `level`.
    pub fn record_escalation(&mut self, level: usize) {
        self.escalations += 1;
        self.max_descent_level = self.max_descent_level.max(level);
    }
}

/// RAII guard that adds its lifetime to a duration accumulator.
pub struct TimerGuard<'a> {
    slot: &'a mut Duration,
    start: Instant,
}

impl<'a> TimerGuard<'a> {
    /// Starts a timer that accumulates into `slot`.
    pub fn new(slot: &'a mut Duration) -> Self {
        Self {
            slot,
            start: Instant::now(),
        }
    }
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        *self.slot += self.start.elapsed();
    }
}

/// Read-only summary of a solve.
///
/// Times are in seconds. Phase times are averages per iteration, the total
/// time is cumulative. Refreshed after every iteration and at the end of the
/// solve, including the error path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolverInfo {
    /// Solver name
    pub solver: String,
    /// Step-size search name
    pub line_search: String,
    /// Final or current status
    pub status: SolverStatus,
    /// Diagnostic code
    pub error_code: ErrorCode,
    /// Objective value at the current point
    pub energy: f64,
    /// Accepted iterations
    pub iterations: usize,
    /// Last step norm
    #[serde(rename = "xDelta")]
    pub x_delta: f64,
    /// Last value delta
    #[serde(rename = "fDelta")]
    pub f_delta: f64,
    /// Last gradient norm
    #[serde(rename = "gradNorm")]
    pub grad_norm: f64,
    /// Number of strategy escalations
    pub escalations: usize,
    /// Deepest strategy level reached
    pub max_descent_level: usize,
    /// Total wall-clock time
    pub total_time: f64,
    /// Gradient time per iteration
    pub time_grad: f64,
    /// Assembly time per iteration
    pub time_assembly: f64,
    /// Inverting time per iteration
    pub time_inverting: f64,
    /// Step-size search time per iteration
    pub time_line_search: f64,
    /// Constraint-set update time per iteration
    pub time_constraint_set_update: f64,
    /// Objective evaluation time per iteration
    pub time_obj_fun: f64,
    /// Trial steps taken by the step-size search
    pub line_search_iterations: usize,
    /// Validity-check time per iteration
    pub time_checking_for_nan_inf: f64,
    /// Broad-phase time per iteration
    pub time_broad_phase_ccd: f64,
    /// Narrow-phase time per iteration
    pub time_ccd: f64,
    /// Classical search time per iteration, excluding constraint-set updates
    pub time_classical_line_search: f64,
    /// Constraint-set update time spent inside the step-size search, per iteration
    pub time_line_search_constraint_set_update: f64,
}

impl Default for SolverInfo {
    fn default() -> Self {
        Self {
            solver: String::new(),
            line_search: String::new(),
            status: SolverStatus::Continue,
            error_code: ErrorCode::Success,
            energy: f64::NAN,
            iterations: 0,
            x_delta: f64::NAN,
            f_delta: f64::NAN,
            grad_norm: f64::NAN,
            escalations: 0,
            max_descent_level: 0,
            total_time: 0.0,
            time_grad: 0.0,
            time_assembly: 0.0,
            time_inverting: 0.0,
            time_line_search: 0.0,
            time_constraint_set_update: 0.0,
            time_obj_fun: 0.0,
            line_search_iterations: 0,
            time_checking_for_nan_inf: 0.0,
            time_broad_phase_ccd: 0.0,
            time_ccd: 0.0,
            time_classical_line_search: 0.0,
            time_line_search_constraint_set_update: 0.0,
        }
    }
}

impl SolverInfo {
    /// Creates an empty record for the named solver and step-size search.
    pub fn new(solver: impl Into<String>, line_search: impl Into<String>) -> Self {
        Self {
            solver: solver.into(),
            line_search: line_search.into(),
            ..Self::default()
        }
    }

    /// Refreshes the record from the current solve.
    pub fn update(
        &mut self,
        status: SolverStatus,
        error_code: ErrorCode,
        energy: f64,
        state: &IterationState,
        metrics: &Metrics,
    ) {
        let per_iteration = state.iterations.max(1) as f64;
        let avg = |d: Duration| d.as_secs_f64() / per_iteration;
        let ls = &metrics.line_search_stats;

        self.status = status;
        self.error_code = error_code;
        self.energy = energy;
        self.iterations = state.iterations;
        self.x_delta = state.x_delta;
        self.f_delta = state.f_delta;
        self.grad_norm = state.grad_norm;
        self.escalations = metrics.escalations;
        self.max_descent_level = metrics.max_descent_level;

        self.total_time = metrics.total.as_secs_f64();
        self.time_grad = avg(metrics.grad);
        self.time_assembly = avg(metrics.assembly);
        self.time_inverting = avg(metrics.inverting);
        self.time_line_search = avg(metrics.line_search);
        self.time_constraint_set_update = avg(metrics.constraint_set_update);
        self.time_obj_fun = avg(metrics.obj_fun);

        self.line_search_iterations = ls.iterations;
        self.time_checking_for_nan_inf = avg(ls.checking_for_nan_inf);
        self.time_broad_phase_ccd = avg(ls.broad_phase_ccd);
        self.time_ccd = avg(ls.ccd);
        self.time_classical_line_search =
            avg(ls.classical_line_search.saturating_sub(ls.constraint_set_update));
        self.time_line_search_constraint_set_update = avg(ls.constraint_set_update);
    }

    /// Serializes the record as JSON.
    ///
    /// Non-finite quantities serialize as `null`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::ConvergenceReason;
    use approx::assert_relative_eq;

    #[test]
    fn test_timer_guard_records_on_drop() {
        let mut metrics = Metrics::new();
        {
            let _timer = metrics.timer(Phase::LineSearch);
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(metrics.line_search >= Duration::from_millis(1));
        assert_eq!(metrics.grad, Duration::ZERO);
    }

    #[test]
    fn test_escalation_counters() {
        let mut metrics = Metrics::new();
        metrics.record_escalation(1);
        metrics.record_escalation(2);
        metrics.record_escalation(1);
        assert_eq!(metrics.escalations, 3);
        assert_eq!(metrics.max_descent_level, 2);

        metrics.reset();
        assert_eq!(metrics, Metrics::default());
    }

    #[test]
    fn test_info_averages_per_iteration() {
        let mut metrics = Metrics::new();
        metrics.record(Phase::Gradient, Duration::from_millis(40));
        metrics.record(Phase::ObjectiveEvaluation, Duration::from_millis(20));
        metrics.total = Duration::from_millis(100);
        metrics.line_search_stats.iterations = 9;

        let state = IterationState {
            iterations: 4,
            grad_norm: 1e-9,
            f_delta: 1e-3,
            x_delta: 1e-2,
        };

        let mut info = SolverInfo::new("Newton", "Backtracking");
        info.update(
            SolverStatus::Converged(ConvergenceReason::GradNorm),
            ErrorCode::Success,
            0.5,
            &state,
            &metrics,
        );

        assert_eq!(info.iterations, 4);
        assert_relative_eq!(info.total_time, 0.1);
        assert_relative_eq!(info.time_grad, 0.01);
        assert_relative_eq!(info.time_obj_fun, 0.005);
        assert_eq!(info.line_search_iterations, 9);
    }

    #[test]
    fn test_info_zero_iterations_does_not_divide_by_zero() {
        let mut metrics = Metrics::new();
        metrics.record(Phase::Gradient, Duration::from_millis(10));
        let mut info = SolverInfo::default();
        info.update(
            SolverStatus::Continue,
            ErrorCode::Success,
            1.0,
            &IterationState::new(),
            &metrics,
        );
        assert_relative_eq!(info.time_grad, 0.01);
    }

    #[test]
    fn test_info_json_keys() {
        let info = SolverInfo::new("BFGS", "Armijo");
        let json = info.to_json();

        assert_eq!(json["solver"], "BFGS");
        assert_eq!(json["status"], "continue");
        assert_eq!(json["error_code"], "success");
        assert!(json["xDelta"].is_null());
        assert!(json.get("gradNorm").is_some());
        assert!(json.get("time_line_search").is_some());
    }
}

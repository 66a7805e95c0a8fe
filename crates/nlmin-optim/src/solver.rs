//! The solve loop.
//!
//! Each iteration runs the same sequence:
//!
//! 1. Reset the strategy chain to its primary level and notify the problem
//! 2. Evaluate f(x); a non-finite value is fatal
//! 3. Record |Δf| and check the stopping criteria
//! 4. Evaluate ∇f(x); a non-finite gradient is fatal
//! 5. Check the stopping criteria on ‖∇f‖
//! 6. Ask the active strategy for a direction Δx
//! 7. Reject non-descent or non-finite directions by escalating and retrying 6
//! 8. Check the stopping criteria on ‖Δx‖ (not for the terminal strategy)
//! 9. Search a step size; on failure escalate and retry 6, or fail if terminal
//! 10. Apply x ← x + αΔx, then run the `stop`, `post_step` and `save_to_file`
//!     hooks and advance the iteration counter
//! 11. Restore the nominal gradient tolerance and ask `callback` whether to
//!     continue
//!
//! Escalation never advances the iteration counter. Fatal failures leave
//! `x` at the last accepted iterate and surface as [`SolverError::Solve`].
//!
//! # Example
//!
//! ```
//! use nlmin_core::prelude::*;
//! use nlmin_optim::Solver;
//!
//! struct Shifted;
//!
//! impl Problem for Shifted {
//!     fn value(&self, x: &Vector) -> f64 {
//!         (x[0] - 1.0).powi(2) + 10.0 * (x[1] + 2.0).powi(2)
//!     }
//!
//!     fn gradient(&self, x: &Vector, grad: &mut Vector) {
//!         grad[0] = 2.0 * (x[0] - 1.0);
//!         grad[1] = 20.0 * (x[1] + 2.0);
//!     }
//! }
//!
//! let params = SolverParams::new(SolverKind::Lbfgs).with_grad_norm(1e-10);
//! let mut solver = Solver::create(&params, 1.0).unwrap();
//! let mut x = Vector::zeros(2);
//!
//! let status = solver.minimize(&mut Shifted, &mut x).unwrap();
//! assert!(status.is_converged());
//! assert!((x[0] - 1.0).abs() < 1e-8);
//! ```

use std::time::Instant;

use nlmin_core::{
    config::{SolverKind, SolverParams},
    criteria::{IterationState, SolverStatus, StoppingThresholds},
    error::{ErrorCode, Result, SolverError},
    line_search::{LineSearch, StepSizeSearch},
    metrics::{Metrics, Phase, SolverInfo},
    problem::Problem,
    types::Vector,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::descent::{DescentDirection, DescentStrategy, StrategyChain};

/// Iterative minimizer with strategy escalation.
///
/// A solver owns its strategy chain, step-size search and thresholds for its
/// whole lifetime. Iteration state, metrics and the info record are reset at
/// the start of every [`Solver::minimize`] call. Overlapping solves on one
/// instance are not possible since `minimize` takes `&mut self`.
#[derive(Debug, Clone)]
pub struct Solver {
    name: String,
    chain: StrategyChain,
    line_search: LineSearch,
    thresholds: StoppingThresholds,
    allow_out_of_iterations: bool,
    state: IterationState,
    status: SolverStatus,
    error_code: ErrorCode,
    metrics: Metrics,
    info: SolverInfo,
}

impl Solver {
    /// Builds the solver of a strategy family from validated parameters.
    ///
    /// Tolerances are multiplied by `characteristic_length`.
    pub fn create(params: &SolverParams, characteristic_length: f64) -> Result<Self> {
        params.validate()?;
        if !(characteristic_length > 0.0) || !characteristic_length.is_finite() {
            return Err(SolverError::invalid_configuration(
                "must be finite and positive",
                "characteristic_length",
                characteristic_length.to_string(),
            ));
        }

        let chain = StrategyChain::new(DescentStrategy::chain_for(params))?;
        let line_search = LineSearch::new(params.scaled_line_search(characteristic_length));
        let thresholds = params.stopping_thresholds(characteristic_length);

        let mut solver = Self::new(chain, line_search, thresholds).with_name(params.solver.as_str());
        solver.allow_out_of_iterations = params.allow_out_of_iterations;

        debug!(
            solver = %solver.name,
            chain = ?solver.chain.names(),
            line_search = solver.line_search.name(),
            "created solver"
        );
        Ok(solver)
    }

    /// Parses, validates and builds a solver from JSON parameters.
    pub fn from_json(params: &Value, characteristic_length: f64, strict: bool) -> Result<Self> {
        Self::create(&SolverParams::from_json(params, strict)?, characteristic_length)
    }

    /// Builds a solver from an explicit chain.
    ///
    /// The thresholds are used as given, without scaling.
    pub fn new(chain: StrategyChain, line_search: LineSearch, thresholds: StoppingThresholds) -> Self {
        let name = chain.active().name().to_string();
        let info = SolverInfo::new(name.clone(), line_search.name());
        Self {
            name,
            chain,
            line_search,
            thresholds,
            allow_out_of_iterations: false,
            state: IterationState::new(),
            status: SolverStatus::Continue,
            error_code: ErrorCode::Success,
            metrics: Metrics::new(),
            info,
        }
    }

    /// Sets the name used in logs and errors.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self.info.solver = self.name.clone();
        self
    }

    /// Canonical names accepted by the `solver` key.
    pub fn available_solvers() -> Vec<&'static str> {
        SolverKind::CANONICAL_NAMES.to_vec()
    }

    /// Treats an exhausted iteration budget as a normal termination.
    pub fn set_allow_out_of_iterations(&mut self, allow: bool) {
        self.allow_out_of_iterations = allow;
    }

    /// Solver name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the active descent strategy.
    pub fn descent_strategy_name(&self) -> &'static str {
        self.chain.active().name()
    }

    /// Escalation chain.
    pub fn chain(&self) -> &StrategyChain {
        &self.chain
    }

    /// Step-size search.
    pub fn line_search(&self) -> &LineSearch {
        &self.line_search
    }

    /// Nominal stopping thresholds.
    pub fn stopping_thresholds(&self) -> &StoppingThresholds {
        &self.thresholds
    }

    /// Measured quantities of the last or running solve.
    pub fn current(&self) -> &IterationState {
        &self.state
    }

    /// Status of the last solve.
    pub fn status(&self) -> SolverStatus {
        self.status
    }

    /// Error code of the last solve.
    pub fn error_code(&self) -> ErrorCode {
        self.error_code
    }

    /// Timings and counters of the last solve.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Summary record of the last solve.
    pub fn info(&self) -> &SolverInfo {
        &self.info
    }

    /// Minimizes `problem` starting from `x`, updating `x` in place.
    ///
    /// Returns the terminal status on convergence, user stop, or (when
    /// tolerated) an exhausted budget. Every other ending is an error, in
    /// which case `x` holds the last accepted iterate.
    pub fn minimize<P: Problem + ?Sized>(
        &mut self,
        problem: &mut P,
        x: &mut Vector,
    ) -> Result<SolverStatus> {
        self.reset(x.len());

        let start = Instant::now();
        let outcome = self.run(problem, x);
        self.metrics.total = start.elapsed();

        let energy = problem.value(x);
        self.info
            .update(self.status, self.error_code, energy, &self.state, &self.metrics);
        outcome?;

        if self.status == SolverStatus::IterationLimit && !self.allow_out_of_iterations {
            self.error_code = ErrorCode::IterationLimitReached;
            self.info.error_code = self.error_code;
            let message = format!(
                "reached iteration limit (limit={})",
                self.thresholds.max_iterations
            );
            error!(solver = %self.name, "{message}");
            return Err(SolverError::Solve {
                solver: self.name.clone(),
                code: self.error_code,
                state: self.state,
                message,
            });
        }

        info!(
            solver = %self.name,
            status = %self.status,
            elapsed = self.metrics.total.as_secs_f64(),
            iterations = self.state.iterations,
            f = energy,
            f_delta = self.state.f_delta,
            grad_norm = self.state.grad_norm,
            x_delta = self.state.x_delta,
            "finished"
        );
        self.log_times();

        Ok(self.status)
    }

    fn reset(&mut self, ndof: usize) {
        self.state.reset();
        self.chain.reset(ndof);
        self.status = SolverStatus::Continue;
        self.error_code = ErrorCode::Success;
        self.metrics.reset();
        self.info = SolverInfo::new(self.name.clone(), self.line_search.name());
    }

    fn run<P: Problem + ?Sized>(&mut self, problem: &mut P, x: &mut Vector) -> Result<()> {
        let nominal = self.thresholds;
        let mut active = nominal.for_first_iteration();
        let mut grad = Vector::zeros(x.len());
        let mut old_energy = f64::NAN;

        {
            let _timer = self.metrics.timer(Phase::ConstraintSetUpdate);
            problem.solution_changed(x);
        }
        problem.save_to_file(x);

        let initial_energy = problem.value(x);
        debug!(
            solver = %self.name,
            f0 = initial_energy,
            max_iterations = nominal.max_iterations,
            f_delta = nominal.f_delta,
            grad_norm = active.grad_norm,
            x_delta = nominal.x_delta,
            "starting solve"
        );
        self.info
            .update(self.status, self.error_code, initial_energy, &self.state, &self.metrics);

        let mut first = true;
        loop {
            // Escalation is a per-iteration penalty.
            self.chain.reset_level();
            self.state.x_delta = f64::NAN;
            self.state.f_delta = f64::NAN;
            self.state.grad_norm = f64::NAN;

            if !first {
                let _timer = self.metrics.timer(Phase::ConstraintSetUpdate);
                problem.solution_changed(x);
            }
            first = false;

            let energy = {
                let _timer = self.metrics.timer(Phase::ObjectiveEvaluation);
                problem.value(x)
            };
            if !energy.is_finite() {
                return Err(self.fail(ErrorCode::NanEncountered, "f(x) is nan or inf; stopping"));
            }

            self.state.f_delta = (old_energy - energy).abs();
            old_energy = energy;
            self.status = active.check(&self.state);
            if self.status.is_terminal() {
                return Ok(());
            }

            {
                let _timer = self.metrics.timer(Phase::Gradient);
                problem.gradient(x, &mut grad);
            }
            let grad_norm = grad.norm();
            if !grad_norm.is_finite() {
                return Err(self.fail(ErrorCode::NanEncountered, "gradient is nan or inf; stopping"));
            }
            self.state.grad_norm = grad_norm;
            self.status = active.check(&self.state);
            if self.status.is_terminal() {
                return Ok(());
            }

            let Some((direction, rate)) =
                self.find_step(problem, x, &grad, grad_norm, &active)?
            else {
                return Ok(());
            };

            let step = &direction * rate;
            *x += &step;
            self.chain.accept_step(&step, &grad);

            if problem.stop(x) {
                self.status = SolverStatus::UserStopped;
                self.error_code = ErrorCode::Success;
                debug!(solver = %self.name, "objective decided to stop");
            }

            problem.post_step(self.state.iterations, x);

            debug!(
                solver = %self.name,
                iter = self.state.iterations,
                f = energy,
                f_delta = self.state.f_delta,
                grad_norm = self.state.grad_norm,
                x_delta = self.state.x_delta,
                slope = direction.dot(&grad),
                rate,
                step = step.norm(),
                "accepted step"
            );

            self.state.iterations += 1;
            if self.state.iterations >= nominal.max_iterations && !self.status.is_terminal() {
                self.status = SolverStatus::IterationLimit;
            }

            self.info
                .update(self.status, self.error_code, energy, &self.state, &self.metrics);
            problem.save_to_file(x);

            active = nominal;

            let keep_going = problem.callback(&self.state, x);
            if self.status.is_terminal() {
                return Ok(());
            }
            if !keep_going {
                self.status = SolverStatus::UserStopped;
                debug!(solver = %self.name, "callback requested stop");
                return Ok(());
            }
        }
    }

    /// Computes a validated direction and an accepted step size, escalating
    /// on recoverable failures.
    ///
    /// Returns `None` if the step-norm criterion is met before the search.
    fn find_step<P: Problem + ?Sized>(
        &mut self,
        problem: &mut P,
        x: &Vector,
        grad: &Vector,
        grad_norm: f64,
        active: &StoppingThresholds,
    ) -> Result<Option<(Vector, f64)>> {
        loop {
            let strategy = self.chain.active_mut();
            let is_descent_type = strategy.is_descent_type();
            let direction = match strategy.compute_direction(&*problem, x, grad, &mut self.metrics) {
                Ok(direction) => direction,
                Err(err) => {
                    self.escalate_direction(&format!("direction failed ({err})"))?;
                    continue;
                }
            };

            let slope = direction.dot(grad);
            let norm = direction.norm();
            if is_descent_type && grad_norm != 0.0 && slope >= 0.0 {
                self.escalate_direction(&format!(
                    "direction is not a descent direction (‖Δx‖={norm:e}; ‖g‖={grad_norm:e}; Δx⋅g={slope:e}≥0)"
                ))?;
                continue;
            }
            if !norm.is_finite() {
                self.escalate_direction("Δx is nan or inf")?;
                continue;
            }

            self.state.x_delta = if self.chain.is_terminal() { f64::NAN } else { norm };
            self.status = active.check(&self.state);
            if self.status.is_terminal() {
                return Ok(None);
            }

            // The search fills its own statistics, so it is timed by hand.
            let started = Instant::now();
            let searched = self.line_search.search(
                x,
                &direction,
                &mut *problem,
                &mut self.metrics.line_search_stats,
            );
            self.metrics.record(Phase::LineSearch, started.elapsed());

            match searched {
                Ok(rate) => return Ok(Some((direction, rate))),
                Err(err) if !self.chain.is_terminal() => {
                    self.chain.escalate(&mut self.metrics);
                    warn!(
                        solver = %self.name,
                        error = %err,
                        "line search failed; reverting to {}",
                        self.chain.active().name()
                    );
                }
                Err(err) => {
                    let message = format!(
                        "line search failed on {} ({err}); stopping",
                        self.chain.active().name()
                    );
                    return Err(self.fail(ErrorCode::LineSearchFailedAtTerminalStrategy, message));
                }
            }
        }
    }

    fn escalate_direction(&mut self, reason: &str) -> Result<()> {
        if self.chain.escalate(&mut self.metrics) {
            debug!(
                solver = %self.name,
                "{reason}; reverting to {}",
                self.chain.active().name()
            );
            Ok(())
        } else {
            let message = format!("{reason} on {}; stopping", self.chain.active().name());
            Err(self.fail(ErrorCode::DirectionFailedAtTerminalStrategy, message))
        }
    }

    fn fail(&mut self, code: ErrorCode, message: impl Into<String>) -> SolverError {
        let message = message.into();
        self.status = SolverStatus::Failed(code);
        self.error_code = code;
        error!(
            solver = %self.name,
            code = %code,
            iteration = self.state.iterations,
            "{message}"
        );
        SolverError::Solve {
            solver: self.name.clone(),
            code,
            state: self.state,
            message,
        }
    }

    fn log_times(&self) {
        let m = &self.metrics;
        let ls = &m.line_search_stats;
        debug!(
            solver = %self.name,
            grad = m.grad.as_secs_f64(),
            assembly = m.assembly.as_secs_f64(),
            inverting = m.inverting.as_secs_f64(),
            line_search = m.line_search.as_secs_f64(),
            constraint_set_update =
                (m.constraint_set_update + ls.constraint_set_update).as_secs_f64(),
            obj_fun = m.obj_fun.as_secs_f64(),
            checking_for_nan_inf = ls.checking_for_nan_inf.as_secs_f64(),
            broad_phase_ccd = ls.broad_phase_ccd.as_secs_f64(),
            ccd = ls.ccd.as_secs_f64(),
            classical_line_search = ls.classical_line_search.as_secs_f64(),
            "timing"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descent::{Bfgs, GradientDescent};
    use crate::descent::test_problems::spd_2x2;
    use approx::assert_relative_eq;
    use nlmin_core::config::{LineSearchMethod, LineSearchParams};
    use serde_json::json;

    #[test]
    fn test_create_rejects_bad_characteristic_length() {
        let params = SolverParams::default();
        assert!(Solver::create(&params, 0.0).is_err());
        assert!(Solver::create(&params, f64::NAN).is_err());
        assert!(Solver::create(&params, 2.0).is_ok());
    }

    #[test]
    fn test_from_json_names_and_scaling() {
        let solver = Solver::from_json(
            &json!({ "solver": "dense_newton", "grad_norm": 1e-6 }),
            10.0,
            true,
        )
        .unwrap();

        assert_eq!(solver.name(), "DenseNewton");
        assert_eq!(solver.descent_strategy_name(), "dense Newton");
        assert_relative_eq!(solver.stopping_thresholds().grad_norm, 1e-5);
        assert_eq!(solver.line_search().name(), "Backtracking");
        assert_eq!(solver.chain().len(), 3);
    }

    #[test]
    fn test_available_solvers() {
        let names = Solver::available_solvers();
        assert_eq!(names.len(), 5);
        for name in names {
            let solver = Solver::from_json(&json!({ "solver": name }), 1.0, true).unwrap();
            assert_eq!(solver.name(), name);
        }
    }

    #[test]
    fn test_custom_chain() {
        let chain = StrategyChain::new(vec![Bfgs::new().into(), GradientDescent::new().into()])
            .unwrap();
        let thresholds = StoppingThresholds::new()
            .with_grad_norm(1e-10)
            .with_first_grad_norm_tol(1e-10);
        let mut solver = Solver::new(
            chain,
            LineSearch::new(LineSearchParams::new(LineSearchMethod::Armijo)),
            thresholds,
        );

        let mut problem = spd_2x2();
        let mut x = Vector::from_vec(vec![5.0, -5.0]);
        let status = solver.minimize(&mut problem, &mut x).unwrap();

        assert!(status.is_converged());
        let target = problem.minimizer();
        assert_relative_eq!(x[0], target[0], epsilon = 1e-8);
        assert_relative_eq!(x[1], target[1], epsilon = 1e-8);
        assert_eq!(solver.name(), "BFGS");
        assert_eq!(solver.info().status, status);
        assert_eq!(solver.info().line_search, "Armijo");
    }
}

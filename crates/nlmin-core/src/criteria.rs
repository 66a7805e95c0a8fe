//! Stopping criteria for the solve loop.
//!
//! The decision is a pure function of the thresholds and the measured
//! iteration state. Convergence triggers on **any** of the following:
//!
//! - **Step norm**: ‖Δx‖ < ε_x
//! - **Value delta**: |f(xₖ) - f(xₖ₋₁)| < ε_f
//! - **Gradient norm**: ‖∇f(xₖ)‖ < ε_g
//!
//! A threshold of zero disables its test, and a NaN measurement never
//! satisfies one. The iteration budget is enforced by the solver itself
//! after each accepted step.
//!
//! # Example
//!
//! ```
//! use nlmin_core::criteria::{IterationState, SolverStatus, StoppingThresholds};
//!
//! let thresholds = StoppingThresholds::new()
//!     .with_grad_norm(1e-6)
//!     .with_max_iterations(100);
//!
//! let mut state = IterationState::new();
//! state.grad_norm = 1e-8;
//! assert!(thresholds.check(&state).is_converged());
//! ```

use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::ErrorCode;

/// Target tolerances and iteration budget for a solve.
///
/// Tolerances are absolute and are usually built from unit-free values
/// through [`StoppingThresholds::scaled`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StoppingThresholds {
    /// Step-norm tolerance (0 disables)
    pub x_delta: f64,

    /// Value-delta tolerance (0 disables)
    pub f_delta: f64,

    /// Gradient-norm tolerance (0 disables)
    pub grad_norm: f64,

    /// Gradient-norm tolerance used during the first iteration only
    pub first_grad_norm_tol: f64,

    /// Maximum number of accepted iterations
    pub max_iterations: usize,
}

impl Default for StoppingThresholds {
    fn default() -> Self {
        Self {
            x_delta: 0.0,
            f_delta: 0.0,
            grad_norm: 1e-8,
            first_grad_norm_tol: 1e-10,
            max_iterations: 500,
        }
    }
}

impl StoppingThresholds {
    /// Creates thresholds with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the step-norm tolerance.
    pub fn with_x_delta(mut self, tol: f64) -> Self {
        self.x_delta = tol;
        self
    }

    /// Sets the value-delta tolerance.
    pub fn with_f_delta(mut self, tol: f64) -> Self {
        self.f_delta = tol;
        self
    }

    /// Sets the gradient-norm tolerance.
    pub fn with_grad_norm(mut self, tol: f64) -> Self {
        self.grad_norm = tol;
        self
    }

    /// Sets the first-iteration gradient-norm tolerance.
    pub fn with_first_grad_norm_tol(mut self, tol: f64) -> Self {
        self.first_grad_norm_tol = tol;
        self
    }

    /// Sets the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Returns these tolerances multiplied by a characteristic length.
    ///
    /// The iteration budget is unit-free and left unchanged.
    pub fn scaled(&self, characteristic_length: f64) -> Self {
        Self {
            x_delta: self.x_delta * characteristic_length,
            f_delta: self.f_delta * characteristic_length,
            grad_norm: self.grad_norm * characteristic_length,
            first_grad_norm_tol: self.first_grad_norm_tol * characteristic_length,
            max_iterations: self.max_iterations,
        }
    }

    /// Returns the thresholds in force during the first iteration.
    ///
    /// Only the gradient tolerance changes. `first_grad_norm_tol` may be
    /// looser or tighter than `grad_norm`; the defaults make it tighter.
    pub fn for_first_iteration(&self) -> Self {
        Self {
            grad_norm: self.first_grad_norm_tol,
            ..*self
        }
    }

    /// Evaluates the thresholds against the current measurements.
    ///
    /// Returns [`SolverStatus::Converged`] if any enabled tolerance is met,
    /// [`SolverStatus::Continue`] otherwise.
    pub fn check(&self, state: &IterationState) -> SolverStatus {
        if self.x_delta > 0.0 && state.x_delta < self.x_delta {
            return SolverStatus::Converged(ConvergenceReason::StepNorm);
        }
        if self.f_delta > 0.0 && state.f_delta < self.f_delta {
            return SolverStatus::Converged(ConvergenceReason::ValueDelta);
        }
        if self.grad_norm > 0.0 && state.grad_norm < self.grad_norm {
            return SolverStatus::Converged(ConvergenceReason::GradNorm);
        }
        SolverStatus::Continue
    }
}

/// Measured convergence quantities of the running solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IterationState {
    /// Number of accepted iterations
    pub iterations: usize,

    /// Norm of the gradient at the current point
    pub grad_norm: f64,

    /// Absolute change of the objective since the previous iteration
    pub f_delta: f64,

    /// Norm of the last validated direction
    pub x_delta: f64,
}

impl Default for IterationState {
    fn default() -> Self {
        Self {
            iterations: 0,
            grad_norm: f64::NAN,
            f_delta: f64::NAN,
            x_delta: f64::NAN,
        }
    }
}

impl IterationState {
    /// Creates a fresh state with no measurements.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all measurements and the iteration counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Quantity that triggered convergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConvergenceReason {
    /// ‖Δx‖ fell below its tolerance
    StepNorm,
    /// |Δf| fell below its tolerance
    ValueDelta,
    /// ‖∇f‖ fell below its tolerance
    GradNorm,
}

impl fmt::Display for ConvergenceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StepNorm => write!(f, "step norm"),
            Self::ValueDelta => write!(f, "value delta"),
            Self::GradNorm => write!(f, "gradient norm"),
        }
    }
}

/// Status of a solve.
///
/// `Continue` is the only non-terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SolverStatus {
    /// The loop keeps iterating
    #[default]
    Continue,
    /// A tolerance was met
    Converged(ConvergenceReason),
    /// The iteration budget was exhausted
    IterationLimit,
    /// The problem or its callback asked to stop
    UserStopped,
    /// An unrecoverable error ended the solve
    Failed(ErrorCode),
}

impl SolverStatus {
    /// Returns true for every status except `Continue`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Continue)
    }

    /// Returns true if a tolerance was met.
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged(_))
    }

    /// Returns true if the solve ended with an error.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::Converged(reason) => write!(f, "converged ({reason})"),
            Self::IterationLimit => write!(f, "iteration limit"),
            Self::UserStopped => write!(f, "user stopped"),
            Self::Failed(code) => write!(f, "failed ({code})"),
        }
    }
}

impl Serialize for SolverStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn measured(x_delta: f64, f_delta: f64, grad_norm: f64) -> IterationState {
        IterationState {
            iterations: 3,
            grad_norm,
            f_delta,
            x_delta,
        }
    }

    #[test]
    fn test_default_thresholds() {
        let t = StoppingThresholds::default();
        assert_eq!(t.x_delta, 0.0);
        assert_eq!(t.f_delta, 0.0);
        assert_relative_eq!(t.grad_norm, 1e-8);
        assert_relative_eq!(t.first_grad_norm_tol, 1e-10);
        assert_eq!(t.max_iterations, 500);
    }

    #[test]
    fn test_scaling_by_characteristic_length() {
        let t = StoppingThresholds::new()
            .with_x_delta(1e-3)
            .with_f_delta(1e-4)
            .with_grad_norm(1e-5)
            .with_first_grad_norm_tol(1e-2)
            .with_max_iterations(42)
            .scaled(10.0);

        assert_relative_eq!(t.x_delta, 1e-2);
        assert_relative_eq!(t.f_delta, 1e-3);
        assert_relative_eq!(t.grad_norm, 1e-4);
        assert_relative_eq!(t.first_grad_norm_tol, 1e-1);
        assert_eq!(t.max_iterations, 42);
    }

    #[test]
    fn test_first_iteration_swaps_grad_tolerance() {
        let t = StoppingThresholds::new()
            .with_grad_norm(1e-8)
            .with_first_grad_norm_tol(1e-2);
        let first = t.for_first_iteration();

        assert_relative_eq!(first.grad_norm, 1e-2);
        assert_relative_eq!(t.grad_norm, 1e-8);

        let state = measured(f64::NAN, f64::NAN, 1e-4);
        assert!(first.check(&state).is_converged());
        assert_eq!(t.check(&state), SolverStatus::Continue);
    }

    #[test]
    fn test_each_quantity_triggers_alone() {
        let t = StoppingThresholds::new()
            .with_x_delta(1e-6)
            .with_f_delta(1e-6)
            .with_grad_norm(1e-6);

        assert_eq!(
            t.check(&measured(1e-9, 1.0, 1.0)),
            SolverStatus::Converged(ConvergenceReason::StepNorm)
        );
        assert_eq!(
            t.check(&measured(1.0, 1e-9, 1.0)),
            SolverStatus::Converged(ConvergenceReason::ValueDelta)
        );
        assert_eq!(
            t.check(&measured(1.0, 1.0, 1e-9)),
            SolverStatus::Converged(ConvergenceReason::GradNorm)
        );
        assert_eq!(t.check(&measured(1.0, 1.0, 1.0)), SolverStatus::Continue);
    }

    #[test]
    fn test_nan_and_disabled_never_converge() {
        let t = StoppingThresholds::new()
            .with_x_delta(1.0)
            .with_f_delta(1.0)
            .with_grad_norm(1.0);
        assert_eq!(t.check(&IterationState::new()), SolverStatus::Continue);

        let disabled = StoppingThresholds::new().with_grad_norm(0.0);
        assert_eq!(disabled.check(&measured(0.0, 0.0, 0.0)), SolverStatus::Continue);
    }

    #[test]
    fn test_state_reset() {
        let mut state = measured(1.0, 2.0, 3.0);
        state.reset();
        assert_eq!(state.iterations, 0);
        assert!(state.grad_norm.is_nan());
        assert!(state.f_delta.is_nan());
        assert!(state.x_delta.is_nan());
    }

    #[test]
    fn test_status_predicates() {
        assert!(!SolverStatus::Continue.is_terminal());
        assert!(SolverStatus::IterationLimit.is_terminal());
        assert!(SolverStatus::UserStopped.is_terminal());
        assert!(SolverStatus::Failed(ErrorCode::NanEncountered).is_failure());
        assert_eq!(
            SolverStatus::Converged(ConvergenceReason::GradNorm).to_string(),
            "converged (gradient norm)"
        );
    }

    proptest! {
        #[test]
        fn prop_convergence_is_disjunctive(
            x in 0.0f64..2.0,
            f in 0.0f64..2.0,
            g in 0.0f64..2.0,
        ) {
            let t = StoppingThresholds::new()
                .with_x_delta(1.0)
                .with_f_delta(1.0)
                .with_grad_norm(1.0);
            let any_below = x < 1.0 || f < 1.0 || g < 1.0;
            prop_assert_eq!(t.check(&measured(x, f, g)).is_converged(), any_below);
        }

        #[test]
        fn prop_single_threshold_matches_comparison(
            value in 0.0f64..10.0,
            tol in 1e-6f64..10.0,
        ) {
            let t = StoppingThresholds::new().with_grad_norm(tol);
            let state = measured(f64::NAN, f64::NAN, value);
            prop_assert_eq!(t.check(&state).is_converged(), value < tol);
        }
    }
}

//! The objective interface consumed by the solver.
//!
//! A [`Problem`] exposes the objective value and gradient, optional
//! curvature, and a set of lifecycle hooks the solver calls at fixed points
//! of each iteration:
//!
//! 1. `solution_changed(x)` before the value and gradient are evaluated
//! 2. the step-size search hooks (`is_step_valid`, `line_search_begin`,
//!    `max_step_size`, `line_search_end`) while a step is being chosen
//! 3. `stop(x)`, `post_step(iteration, x)` and `save_to_file(x)` after the
//!    step is applied
//! 4. `callback(state, x)` as the continuation veto at the end of the
//!    iteration
//!
//! Only `value` and `gradient` are required.
//!
//! # Example
//!
//! ```
//! use nlmin_core::prelude::*;
//!
//! struct Quadratic;
//!
//! impl Problem for Quadratic {
//!     fn value(&self, x: &Vector) -> f64 {
//!         0.5 * x.norm_squared()
//!     }
//!
//!     fn gradient(&self, x: &Vector, grad: &mut Vector) {
//!         grad.copy_from(x);
//!     }
//! }
//!
//! let x = Vector::from_vec(vec![1.0, 2.0]);
//! assert_eq!(Quadratic.value(&x), 2.5);
//! ```

use crate::{
    criteria::IterationState,
    sparse::CsrMatrix,
    types::{Matrix, Vector},
};

/// Second-order information returned by a problem.
#[derive(Debug, Clone, PartialEq)]
pub enum Hessian {
    /// Dense symmetric matrix
    Dense(Matrix),
    /// Sparse symmetric matrix
    Sparse(CsrMatrix),
}

impl Hessian {
    /// Returns the number of rows.
    pub fn nrows(&self) -> usize {
        match self {
            Self::Dense(m) => m.nrows(),
            Self::Sparse(m) => m.nrows(),
        }
    }

    /// Converts to dense storage.
    pub fn into_dense(self) -> Matrix {
        match self {
            Self::Dense(m) => m,
            Self::Sparse(m) => m.to_dense(),
        }
    }

    /// Converts to sparse storage, dropping entries with `|v| <= tolerance`.
    pub fn into_sparse(self, tolerance: f64) -> CsrMatrix {
        match self {
            Self::Dense(m) => CsrMatrix::from_dense(&m, tolerance),
            Self::Sparse(m) => m,
        }
    }
}

/// Objective function minimized by the solver.
pub trait Problem {
    /// Evaluates the objective at `x`.
    fn value(&self, x: &Vector) -> f64;

    /// Writes the gradient at `x` into `grad`.
    ///
    /// `grad` has the length of `x` on entry.
    fn gradient(&self, x: &Vector, grad: &mut Vector);

    /// Returns the Hessian at `x`, if the problem can provide one.
    ///
    /// Newton strategies escalate when this returns `None`.
    fn hessian(&self, _x: &Vector) -> Option<Hessian> {
        None
    }

    /// Notifies the problem that the current point changed.
    ///
    /// Called before the value and gradient of every iteration, and on
    /// every trial point of the step-size search.
    fn solution_changed(&mut self, _x: &Vector) {}

    /// Returns true to end the solve after the step that produced `x`.
    fn stop(&self, _x: &Vector) -> bool {
        false
    }

    /// Called after every accepted step, with the iteration index before it
    /// is advanced.
    fn post_step(&mut self, _iteration: usize, _x: &Vector) {}

    /// Per-iteration continuation hook. Returning false ends the solve.
    fn callback(&mut self, _state: &IterationState, _x: &Vector) -> bool {
        true
    }

    /// Persists the current point. Called once before the first iteration
    /// and after every accepted step.
    fn save_to_file(&mut self, _x: &Vector) {}

    /// Returns false if the trial point `x1` is not admissible from `x0`.
    fn is_step_valid(&self, _x0: &Vector, _x1: &Vector) -> bool {
        true
    }

    /// Broad-phase notification that a step from `x0` to `x1` is about to be checked.
    fn line_search_begin(&mut self, _x0: &Vector, _x1: &Vector) {}

    /// Largest admissible fraction of the step from `x0` to `x1`, in `[0, 1]`.
    fn max_step_size(&self, _x0: &Vector, _x1: &Vector) -> f64 {
        1.0
    }

    /// Notification that the step-size search finished.
    fn line_search_end(&mut self) {}
}

impl<P: Problem + ?Sized> Problem for &mut P {
    fn value(&self, x: &Vector) -> f64 {
        (**self).value(x)
    }

    fn gradient(&self, x: &Vector, grad: &mut Vector) {
        (**self).gradient(x, grad);
    }

    fn hessian(&self, x: &Vector) -> Option<Hessian> {
        (**self).hessian(x)
    }

    fn solution_changed(&mut self, x: &Vector) {
        (**self).solution_changed(x);
    }

    fn stop(&self, x: &Vector) -> bool {
        (**self).stop(x)
    }

    fn post_step(&mut self, iteration: usize, x: &Vector) {
        (**self).post_step(iteration, x);
    }

    fn callback(&mut self, state: &IterationState, x: &Vector) -> bool {
        (**self).callback(state, x)
    }

    fn save_to_file(&mut self, x: &Vector) {
        (**self).save_to_file(x);
    }

    fn is_step_valid(&self, x0: &Vector, x1: &Vector) -> bool {
        (**self).is_step_valid(x0, x1)
    }

    fn line_search_begin(&mut self, x0: &Vector, x1: &Vector) {
        (**self).line_search_begin(x0, x1);
    }

    fn max_step_size(&self, x0: &Vector, x1: &Vector) -> f64 {
        (**self).max_step_size(x0, x1)
    }

    fn line_search_end(&mut self) {
        (**self).line_search_end();
    }
}

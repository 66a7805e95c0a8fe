//! # nlmin
//!
//! Iterative nonlinear minimization with escalating descent strategies.
//!
//! A [`Solver`] repeatedly asks a descent strategy for a direction, searches
//! a step size along it and moves the point, until a stopping criterion,
//! the iteration budget, or the problem itself ends the solve. When a
//! strategy produces an unusable direction, or the step search along its
//! direction fails, the solver escalates to the next, more robust strategy
//! of its chain for that iteration. Every chain ends in gradient descent.
//!
//! ## Crates
//!
//! - `nlmin-core`: problem interface, stopping criteria, step-size search,
//!   metrics and configuration
//! - `nlmin-optim`: descent strategies, the escalation chain and the solver
//!
//! ## Quick Start
//!
//! ```rust
//! use nlmin::prelude::*;
//!
//! struct Rosenbrock;
//!
//! impl Problem for Rosenbrock {
//!     fn value(&self, x: &Vector) -> f64 {
//!         (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2)
//!     }
//!
//!     fn gradient(&self, x: &Vector, grad: &mut Vector) {
//!         grad[0] = -2.0 * (1.0 - x[0]) - 400.0 * x[0] * (x[1] - x[0] * x[0]);
//!         grad[1] = 200.0 * (x[1] - x[0] * x[0]);
//!     }
//! }
//!
//! let params = SolverParams::new(SolverKind::Bfgs)
//!     .with_grad_norm(1e-8)
//!     .with_max_iterations(1000);
//! let mut solver = Solver::create(&params, 1.0)?;
//! let mut x = Vector::from_vec(vec![-1.2, 1.0]);
//!
//! let status = solver.minimize(&mut Rosenbrock, &mut x)?;
//! assert!(status.is_converged());
//! assert!((x[0] - 1.0).abs() < 1e-4);
//! # Ok::<(), nlmin::SolverError>(())
//! ```

// Re-export the component crates
pub use nlmin_core;
pub use nlmin_optim;

// Re-export the main types
pub use nlmin_core::{
    config::{LineSearchMethod, LineSearchParams, SolverKind, SolverParams},
    criteria::{ConvergenceReason, IterationState, SolverStatus, StoppingThresholds},
    error::{ErrorCode, Result, SolverError},
    metrics::SolverInfo,
    problem::{Hessian, Problem},
    types::{Matrix, Vector},
};
pub use nlmin_optim::Solver;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use nlmin_optim::prelude::*;
}

/// Canonical names accepted by the `solver` configuration key.
pub fn available_solvers() -> Vec<&'static str> {
    Solver::available_solvers()
}

/// Builds a solver from JSON parameters.
///
/// Unknown keys are rejected. Tolerances are scaled by `characteristic_length`.
pub fn solver_from_json(params: &serde_json::Value, characteristic_length: f64) -> Result<Solver> {
    Solver::from_json(params, characteristic_length, true)
}

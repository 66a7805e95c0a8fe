//! Descent strategies and the escalating solve loop.
//!
//! This crate builds on `nlmin-core` and provides the parts of the engine that
//! decide where to move next: the descent-direction family, the ordered chain
//! the solver escalates through when a strategy fails, and the [`Solver`]
//! itself.
//!
//! # Available Solvers
//!
//! - **Newton**: sparse Newton, then regularized sparse Newton, then gradient descent
//! - **DenseNewton**: the same chain with dense curvature
//! - **BFGS**: dense BFGS, then gradient descent
//! - **L-BFGS**: limited-memory BFGS, then gradient descent
//! - **GradientDescent**: gradient descent only
//!
//! # Examples
//!
//! ```rust
//! use nlmin_optim::Solver;
//! use serde_json::json;
//!
//! let solver = Solver::from_json(
//!     &json!({ "solver": "L-BFGS", "line_search": { "method": "Armijo" } }),
//!     1.0,
//!     true,
//! )
//! .unwrap();
//!
//! assert_eq!(solver.descent_strategy_name(), "L-BFGS");
//! assert_eq!(solver.chain().len(), 2);
//! ```

pub mod descent;
pub mod solver;

// Re-export main types for convenience
pub use descent::{
    Bfgs, DescentDirection, DescentStrategy, GradientDescent, HessianStorage, Lbfgs, Newton,
    StrategyChain,
};
pub use solver::Solver;

// Re-export commonly used items from core
pub use nlmin_core::{
    config::SolverParams,
    criteria::{SolverStatus, StoppingThresholds},
    error::{ErrorCode, Result, SolverError},
    problem::Problem,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::descent::{
        Bfgs, DescentDirection, DescentStrategy, GradientDescent, HessianStorage, Lbfgs, Newton,
        StrategyChain,
    };
    pub use crate::solver::Solver;
    pub use nlmin_core::prelude::*;
}

//! Core traits and types for iterative nonlinear minimization.
//!
//! This crate provides the leaves of the minimization engine: the problem
//! interface consumed by the solver, the stopping criteria, the step-size
//! search family, instrumentation records and validated configuration.
//! The descent strategies and the solve loop live in `nlmin-optim`.
//!
//! # Key Concepts
//!
//! - **Problem**: an objective exposing value, gradient and optional curvature
//! - **Stopping criteria**: thresholds scaled by a characteristic length
//! - **Line search**: a step multiplier satisfying decrease and feasibility
//! - **Solver info**: a read-only summary of a solve, refreshed per iteration
//!
//! # Modules
//!
//! - [`config`]: Solver and line-search parameters with validation
//! - [`criteria`]: Stopping thresholds, iteration state and solver status
//! - [`error`]: Error taxonomy and error codes
//! - [`line_search`]: Step-size search algorithms
//! - [`metrics`]: Timing aggregates and the solver info record
//! - [`problem`]: The objective interface consumed by the solver
//! - [`sparse`]: Compressed sparse row storage for curvature information
//! - [`types`]: Vector and matrix aliases

pub mod config;
pub mod criteria;
pub mod error;
pub mod line_search;
pub mod metrics;
pub mod problem;
pub mod sparse;
pub mod types;

// Re-export commonly used items at the crate root
pub use error::{DirectionError, ErrorCode, LineSearchError, Result, SolverError};

/// Prelude module for convenient imports.
///
/// # Example
/// ```
/// use nlmin_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{
        CgParams, LbfgsParams, LineSearchMethod, LineSearchParams, NewtonParams, SolverKind,
        SolverParams,
    };
    pub use crate::criteria::{
        ConvergenceReason, IterationState, SolverStatus, StoppingThresholds,
    };
    pub use crate::error::{DirectionError, ErrorCode, LineSearchError, Result, SolverError};
    pub use crate::line_search::{
        ArmijoLineSearch, BacktrackingLineSearch, LineSearch, LineSearchStats, NoLineSearch,
        StepSizeSearch,
    };
    pub use crate::metrics::{Metrics, SolverInfo, TimerGuard};
    pub use crate::problem::{Hessian, Problem};
    pub use crate::sparse::{CooMatrix, CsrMatrix};
    pub use crate::types::{Matrix, Vector};
}

//! Error types for nonlinear minimization.
//!
//! Errors fall into three groups. Fatal solve failures ([`SolverError::Solve`])
//! abort a `minimize` call and carry an [`ErrorCode`] together with the last
//! known [`IterationState`]. Recoverable failures ([`DirectionError`] and
//! [`LineSearchError`]) are absorbed by the solver through strategy
//! escalation and only surface when no fallback is left. Configuration
//! errors are raised before any solve starts.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::criteria::IterationState;

/// Diagnostic code attached to a solve outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// No error occurred.
    Success,
    /// The objective value or gradient was NaN or infinite.
    NanEncountered,
    /// The step search failed while the most robust strategy was active.
    LineSearchFailedAtTerminalStrategy,
    /// The most robust strategy could not produce a usable direction.
    DirectionFailedAtTerminalStrategy,
    /// The iteration budget was exhausted and the caller did not tolerate it.
    IterationLimitReached,
    /// Any other unrecoverable failure.
    Failed,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::NanEncountered => write!(f, "nan encountered"),
            Self::LineSearchFailedAtTerminalStrategy => {
                write!(f, "line search failed on the terminal strategy")
            }
            Self::DirectionFailedAtTerminalStrategy => {
                write!(f, "direction failed on the terminal strategy")
            }
            Self::IterationLimitReached => write!(f, "iteration limit reached"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Errors surfaced to the caller of the solver.
#[derive(Debug, Clone, Error)]
pub enum SolverError {
    /// A solve aborted with a hard failure.
    ///
    /// The state is the iteration state at the moment of failure; the point
    /// passed to `minimize` holds the last accepted iterate.
    #[error("[{solver}] {message} ({code}, iteration {})", state.iterations)]
    Solve {
        /// Name of the solver that failed
        solver: String,
        /// Diagnostic code
        code: ErrorCode,
        /// Last known iteration state
        state: IterationState,
        /// Human-readable description
        message: String,
    },

    /// Invalid solver or line-search configuration.
    #[error("Invalid solver configuration: {reason} ({parameter} = {value})")]
    InvalidConfiguration {
        /// Description of the configuration error
        reason: String,
        /// Name of the invalid parameter
        parameter: String,
        /// Value that was invalid
        value: String,
    },

    /// The `solver` key names no known strategy family.
    #[error("Unrecognized solver type: {0}")]
    UnknownSolver(String),

    /// The `line_search.method` key names no known step-size search.
    #[error("Unrecognized line search method: {0}")]
    UnknownLineSearch(String),

    /// Strict validation found keys that are not part of the parameter schema.
    #[error("Unknown configuration keys: {}", .0.join(", "))]
    UnknownKeys(Vec<String>),

    /// The descent strategy chain cannot be used for escalation.
    #[error("Invalid descent strategy chain: {0}")]
    InvalidStrategyChain(String),

    /// Dimension mismatch between vectors or matrices.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimensions
        expected: String,
        /// Actual dimensions
        actual: String,
    },

    /// Malformed JSON configuration.
    #[error("Invalid configuration JSON: {0}")]
    Json(String),
}

impl From<serde_json::Error> for SolverError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl SolverError {
    /// Create an InvalidConfiguration error.
    pub fn invalid_configuration<S1, S2, S3>(reason: S1, parameter: S2, value: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::InvalidConfiguration {
            reason: reason.into(),
            parameter: parameter.into(),
            value: value.into(),
        }
    }

    /// Create a DimensionMismatch error.
    pub fn dimension_mismatch<S1, S2>(expected: S1, actual: S2) -> Self
    where
        S1: fmt::Display,
        S2: fmt::Display,
    {
        Self::DimensionMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Returns the diagnostic code of a solve failure, if this is one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Solve { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Returns the iteration state recorded with a solve failure, if this is one.
    pub fn state(&self) -> Option<&IterationState> {
        match self {
            Self::Solve { state, .. } => Some(state),
            _ => None,
        }
    }
}

/// Failure to compute a search direction.
///
/// The solver treats every variant the same way as a non-descent direction:
/// it escalates to the next strategy and retries within the same iteration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DirectionError {
    /// The problem provides no curvature information.
    #[error("the problem does not provide a Hessian")]
    MissingHessian,

    /// The linear system could not be factorized.
    #[error("factorization failed: {reason}")]
    Factorization {
        /// Description of the failure
        reason: String,
    },

    /// The iterative solve met a direction of non-positive curvature.
    #[error("Hessian is not positive definite (pᵀHp = {curvature:e})")]
    IndefiniteHessian {
        /// The offending curvature value
        curvature: f64,
    },

    /// The iterative solve ran out of iterations.
    #[error("linear solve did not converge after {iterations} iterations (residual {residual:e})")]
    LinearSolveDidNotConverge {
        /// Iterations performed
        iterations: usize,
        /// Final residual norm
        residual: f64,
    },

    /// The computed direction contains NaN or infinite entries.
    #[error("direction contains non-finite entries")]
    NonFinite,

    /// The curvature has the wrong shape for the current point.
    #[error("Hessian dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        actual: usize,
    },
}

/// Failure of a step-size search.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LineSearchError {
    /// The objective is not finite at the starting point.
    #[error("objective is not finite at the starting point")]
    NonFiniteStart,

    /// No valid, finite trial point was found.
    #[error("no valid step found after {iterations} trials")]
    NoValidStep {
        /// Trials performed
        iterations: usize,
    },

    /// The feasibility check allows no motion along the direction.
    #[error("collision check allows no step along the direction")]
    CollisionBlocked,

    /// No trial step produced a sufficient decrease.
    #[error("no decrease after {iterations} trials (last step {last_step:e})")]
    NoDecrease {
        /// Trials performed
        iterations: usize,
        /// Last step size tried
        last_step: f64,
    },
}

/// Result type alias for solver operations.
pub type Result<T> = std::result::Result<T, SolverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve_error_context() {
        let state = IterationState {
            iterations: 7,
            ..IterationState::default()
        };
        let err = SolverError::Solve {
            solver: "Newton".to_string(),
            code: ErrorCode::NanEncountered,
            state,
            message: "f(x) is nan or inf; stopping".to_string(),
        };

        assert_eq!(err.code(), Some(ErrorCode::NanEncountered));
        assert_eq!(err.state().map(|s| s.iterations), Some(7));
        let text = err.to_string();
        assert!(text.contains("[Newton]"));
        assert!(text.contains("nan encountered"));
        assert!(text.contains("iteration 7"));
    }

    #[test]
    fn test_configuration_error() {
        let err = SolverError::invalid_configuration("must be in (0, 1)", "step_ratio", "1.5");
        assert!(matches!(err, SolverError::InvalidConfiguration { .. }));
        assert_eq!(err.code(), None);
        assert!(err.to_string().contains("step_ratio = 1.5"));
    }

    #[test]
    fn test_unknown_keys_display() {
        let err = SolverError::UnknownKeys(vec!["foo".into(), "line_search.bar".into()]);
        assert_eq!(
            err.to_string(),
            "Unknown configuration keys: foo, line_search.bar"
        );
    }

    #[test]
    fn test_recoverable_error_display() {
        let errors: Vec<String> = vec![
            DirectionError::MissingHessian.to_string(),
            DirectionError::IndefiniteHessian { curvature: -1.0 }.to_string(),
            LineSearchError::CollisionBlocked.to_string(),
            LineSearchError::NoDecrease {
                iterations: 30,
                last_step: 1e-10,
            }
            .to_string(),
        ];

        for text in errors {
            assert!(!text.is_empty());
        }
    }
}

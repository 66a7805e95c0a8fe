//! Type aliases and numerical constants.
//!
//! The engine works in double precision throughout: tolerances are scaled
//! by physical characteristic lengths and non-finite checks are made on
//! `f64` values directly.

use nalgebra::{DMatrix, DVector};

/// Dense column vector used for points, gradients and directions.
pub type Vector = DVector<f64>;

/// Dense matrix used for curvature information and quasi-Newton state.
pub type Matrix = DMatrix<f64>;

/// Numerical constants shared across the engine.
pub mod constants {
    /// Curvature pairs with `s·y` below this are skipped by quasi-Newton updates.
    pub const CURVATURE_EPSILON: f64 = 1e-12;

    /// Threshold under which a stored value is dropped when densifying or sparsifying.
    pub const SPARSITY_TOLERANCE: f64 = 0.0;
}

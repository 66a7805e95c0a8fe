//! Dense BFGS.
//!
//! Maintains an approximation Hₖ of the inverse Hessian and returns
//! Δx = -Hₖ∇f. After an accepted step s with gradient change y the
//! approximation is updated as
//!
//! Hₖ₊₁ = (I - ρsyᵀ) Hₖ (I - ρysᵀ) + ρssᵀ,  ρ = 1 / yᵀs
//!
//! The first update rescales the identity by sᵀy / yᵀy. Pairs with
//! sᵀy ≤ ε are skipped so that H stays positive definite.

use nlmin_core::{
    error::DirectionError,
    metrics::{Metrics, Phase},
    problem::Problem,
    types::{constants::CURVATURE_EPSILON, Matrix, Vector},
};
use tracing::trace;

use super::{DescentDirection, PendingStep};

/// Dense quasi-Newton strategy.
#[derive(Debug, Clone, Default)]
pub struct Bfgs {
    inverse_hessian: Matrix,
    updates: usize,
    pending: PendingStep,
}

impl Bfgs {
    /// Creates the strategy with an empty approximation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of curvature pairs folded in since the last reset.
    pub fn updates(&self) -> usize {
        self.updates
    }

    /// Current inverse-Hessian approximation.
    pub fn inverse_hessian(&self) -> &Matrix {
        &self.inverse_hessian
    }

    fn update(&mut self, s: &Vector, y: &Vector) {
        let sy = s.dot(y);
        if sy <= CURVATURE_EPSILON {
            trace!(sy, "skipping BFGS update");
            return;
        }

        let n = s.len();
        if self.updates == 0 {
            let yy = y.norm_squared();
            if yy > 0.0 {
                self.inverse_hessian = Matrix::identity(n, n) * (sy / yy);
            }
        }

        let rho = 1.0 / sy;
        let hy = &self.inverse_hessian * y;
        let yhy = y.dot(&hy);

        // Expanded form of (I - ρsyᵀ)H(I - ρysᵀ) + ρssᵀ for symmetric H.
        self.inverse_hessian += (s * s.transpose()) * (rho + rho * rho * yhy)
            - (&hy * s.transpose() + s * hy.transpose()) * rho;
        self.updates += 1;
    }
}

impl DescentDirection for Bfgs {
    fn name(&self) -> &'static str {
        "BFGS"
    }

    fn reset(&mut self, ndof: usize) {
        self.inverse_hessian = Matrix::identity(ndof, ndof);
        self.updates = 0;
        self.pending.clear();
    }

    fn compute_direction<P: Problem + ?Sized>(
        &mut self,
        _problem: &P,
        _x: &Vector,
        grad: &Vector,
        metrics: &mut Metrics,
    ) -> Result<Vector, DirectionError> {
        let n = grad.len();
        if self.inverse_hessian.nrows() != n {
            self.reset(n);
        }

        let _timer = metrics.timer(Phase::Inverting);
        if let Some((s, y)) = self.pending.take_pair(grad) {
            self.update(&s, &y);
        }

        let direction = -(&self.inverse_hessian * grad);
        if direction.iter().any(|v| !v.is_finite()) {
            return Err(DirectionError::NonFinite);
        }
        Ok(direction)
    }

    fn accept_step(&mut self, step: &Vector, grad: &Vector) {
        self.pending.record(step, grad);
    }

    fn escalated_from(&mut self) {
        let n = self.inverse_hessian.nrows();
        self.reset(n);
    }
}

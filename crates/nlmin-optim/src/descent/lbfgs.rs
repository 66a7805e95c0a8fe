//! Limited-memory BFGS.
//!
//! Keeps the last `history_size` curvature pairs (sᵢ, yᵢ) and applies the
//! inverse-Hessian approximation with the two-loop recursion, scaling the
//! initial approximation by γ = sᵀy / yᵀy of the newest pair.

use std::collections::VecDeque;

use nlmin_core::{
    error::DirectionError,
    metrics::{Metrics, Phase},
    problem::Problem,
    types::{constants::CURVATURE_EPSILON, Vector},
};
use tracing::trace;

use super::{DescentDirection, PendingStep};

/// One stored curvature pair.
#[derive(Debug, Clone)]
struct CurvaturePair {
    s: Vector,
    y: Vector,
    rho: f64,
}

/// Limited-memory quasi-Newton strategy.
#[derive(Debug, Clone)]
pub struct Lbfgs {
    history_size: usize,
    history: VecDeque<CurvaturePair>,
    pending: PendingStep,
}

impl Lbfgs {
    /// Creates the strategy with room for `history_size` pairs.
    pub fn new(history_size: usize) -> Self {
        Self {
            history_size,
            history: VecDeque::with_capacity(history_size),
            pending: PendingStep::default(),
        }
    }

    /// Number of stored pairs.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Maximum number of stored pairs.
    pub fn history_size(&self) -> usize {
        self.history_size
    }

    fn push_pair(&mut self, s: Vector, y: Vector) {
        let sy = s.dot(&y);
        if sy <= CURVATURE_EPSILON {
            trace!(sy, "skipping L-BFGS pair");
            return;
        }
        if self.history.len() == self.history_size {
            self.history.pop_front();
        }
        self.history.push_back(CurvaturePair { s, y, rho: 1.0 / sy });
    }

    /// Returns -H∇f using the two-loop recursion.
    fn two_loop_recursion(&self, grad: &Vector) -> Vector {
        let mut q = grad.clone();
        let mut alpha = vec![0.0; self.history.len()];

        for (i, pair) in self.history.iter().enumerate().rev() {
            alpha[i] = pair.rho * pair.s.dot(&q);
            q.axpy(-alpha[i], &pair.y, 1.0);
        }

        if let Some(newest) = self.history.back() {
            let yy = newest.y.norm_squared();
            if yy > 0.0 {
                q *= newest.s.dot(&newest.y) / yy;
            }
        }

        for (i, pair) in self.history.iter().enumerate() {
            let beta = pair.rho * pair.y.dot(&q);
            q.axpy(alpha[i] - beta, &pair.s, 1.0);
        }

        -q
    }
}

impl DescentDirection for Lbfgs {
    fn name(&self) -> &'static str {
        "L-BFGS"
    }

    fn reset(&mut self, _ndof: usize) {
        self.history.clear();
        self.pending.clear();
    }

    fn compute_direction<P: Problem + ?Sized>(
        &mut self,
        _problem: &P,
        _x: &Vector,
        grad: &Vector,
        metrics: &mut Metrics,
    ) -> Result<Vector, DirectionError> {
        if self.history.front().is_some_and(|p| p.s.len() != grad.len()) {
            self.history.clear();
        }

        let _timer = metrics.timer(Phase::Inverting);
        if let Some((s, y)) = self.pending.take_pair(grad) {
            self.push_pair(s, y);
        }

        let direction = self.two_loop_recursion(grad);
        if direction.iter().any(|v| !v.is_finite()) {
            return Err(DirectionError::NonFinite);
        }
        Ok(direction)
    }

    fn accept_step(&mut self, step: &Vector, grad: &Vector) {
        self.pending.record(step, grad);
    }

    fn escalated_from(&mut self) {
        self.reset(0);
    }
}

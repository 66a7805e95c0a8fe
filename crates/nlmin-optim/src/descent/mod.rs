//! Descent-direction strategies.
//!
//! Every strategy turns the gradient at the current point into a candidate
//! update direction Δx. The family is a closed set ordered by robustness:
//!
//! - [`Newton`]: solves (H + wI)Δx = -∇f with dense or sparse curvature
//! - [`Bfgs`]: dense inverse-Hessian approximation
//! - [`Lbfgs`]: bounded history of curvature pairs
//! - [`GradientDescent`]: Δx = -∇f, never fails
//!
//! Quasi-Newton strategies learn from accepted steps only. The solver calls
//! [`DescentDirection::accept_step`] on the strategy whose direction was
//! accepted, and the pending curvature pair is folded in at the next
//! direction computation, once the new gradient is known.

mod bfgs;
mod chain;
mod gradient_descent;
mod lbfgs;
mod newton;

pub use bfgs::Bfgs;
pub use chain::StrategyChain;
pub use gradient_descent::GradientDescent;
pub use lbfgs::Lbfgs;
pub use newton::{HessianStorage, Newton};

use nlmin_core::{
    config::SolverParams, error::DirectionError, metrics::Metrics, problem::Problem,
    types::Vector,
};

/// Common capability of every descent strategy.
pub trait DescentDirection {
    /// Human-readable name used in logs and solver info.
    fn name(&self) -> &'static str;

    /// Whether the solver should reject directions with Δx·∇f ≥ 0.
    fn is_descent_type(&self) -> bool {
        true
    }

    /// Clears internal state for a problem with `ndof` unknowns.
    fn reset(&mut self, ndof: usize);

    /// Computes a candidate direction at `x`.
    ///
    /// Failures are recoverable: the solver escalates to the next strategy.
    fn compute_direction<P: Problem + ?Sized>(
        &mut self,
        problem: &P,
        x: &Vector,
        grad: &Vector,
        metrics: &mut Metrics,
    ) -> Result<Vector, DirectionError>;

    /// Records that the step `step` was accepted from a point with gradient `grad`.
    fn accept_step(&mut self, _step: &Vector, _grad: &Vector) {}

    /// Called when the solver escalates away from this strategy.
    fn escalated_from(&mut self) {}
}

/// Closed set of descent strategies.
#[derive(Debug, Clone)]
pub enum DescentStrategy {
    /// Steepest descent
    GradientDescent(GradientDescent),
    /// Dense quasi-Newton
    Bfgs(Bfgs),
    /// Limited-memory quasi-Newton
    Lbfgs(Lbfgs),
    /// Newton, plain or regularized
    Newton(Newton),
}

impl DescentStrategy {
    /// Returns true for the gradient-descent variant.
    pub fn is_gradient_descent(&self) -> bool {
        matches!(self, Self::GradientDescent(_))
    }

    /// Builds the escalation chain of a solver family.
    pub fn chain_for(params: &SolverParams) -> Vec<Self> {
        use nlmin_core::config::SolverKind;

        let newton = |storage| {
            vec![
                Self::Newton(Newton::new(storage, params.newton, params.linear_solver)),
                Self::Newton(Newton::regularized(storage, params.newton, params.linear_solver)),
                Self::GradientDescent(GradientDescent::new()),
            ]
        };

        match params.solver {
            SolverKind::SparseNewton => newton(HessianStorage::Sparse),
            SolverKind::DenseNewton => newton(HessianStorage::Dense),
            SolverKind::Bfgs => vec![
                Self::Bfgs(Bfgs::new()),
                Self::GradientDescent(GradientDescent::new()),
            ],
            SolverKind::Lbfgs => vec![
                Self::Lbfgs(Lbfgs::new(params.lbfgs.history_size)),
                Self::GradientDescent(GradientDescent::new()),
            ],
            SolverKind::GradientDescent => vec![Self::GradientDescent(GradientDescent::new())],
        }
    }
}

impl From<GradientDescent> for DescentStrategy {
    fn from(s: GradientDescent) -> Self {
        Self::GradientDescent(s)
    }
}

impl From<Bfgs> for DescentStrategy {
    fn from(s: Bfgs) -> Self {
        Self::Bfgs(s)
    }
}

impl From<Lbfgs> for DescentStrategy {
    fn from(s: Lbfgs) -> Self {
        Self::Lbfgs(s)
    }
}

impl From<Newton> for DescentStrategy {
    fn from(s: Newton) -> Self {
        Self::Newton(s)
    }
}

macro_rules! dispatch {
    ($self:ident, $s:ident => $body:expr) => {
        match $self {
            DescentStrategy::GradientDescent($s) => $body,
            DescentStrategy::Bfgs($s) => $body,
            DescentStrategy::Lbfgs($s) => $body,
            DescentStrategy::Newton($s) => $body,
        }
    };
}

impl DescentDirection for DescentStrategy {
    fn name(&self) -> &'static str {
        dispatch!(self, s => s.name())
    }

    fn is_descent_type(&self) -> bool {
        dispatch!(self, s => s.is_descent_type())
    }

    fn reset(&mut self, ndof: usize) {
        dispatch!(self, s => s.reset(ndof));
    }

    fn compute_direction<P: Problem + ?Sized>(
        &mut self,
        problem: &P,
        x: &Vector,
        grad: &Vector,
        metrics: &mut Metrics,
    ) -> Result<Vector, DirectionError> {
        dispatch!(self, s => s.compute_direction(problem, x, grad, metrics))
    }

    fn accept_step(&mut self, step: &Vector, grad: &Vector) {
        dispatch!(self, s => s.accept_step(step, grad));
    }

    fn escalated_from(&mut self) {
        dispatch!(self, s => s.escalated_from());
    }
}

/// Pending curvature pair of a quasi-Newton strategy.
#[derive(Debug, Clone, Default)]
pub(crate) struct PendingStep {
    step: Option<(Vector, Vector)>,
}

impl PendingStep {
    pub(crate) fn record(&mut self, step: &Vector, grad: &Vector) {
        self.step = Some((step.clone(), grad.clone()));
    }

    /// Returns `(s, y)` for the current gradient, consuming the pending step.
    pub(crate) fn take_pair(&mut self, grad: &Vector) -> Option<(Vector, Vector)> {
        self.step
            .take()
            .filter(|(s, _)| s.len() == grad.len())
            .map(|(s, g_prev)| (s, grad - g_prev))
    }

    pub(crate) fn clear(&mut self) {
        self.step = None;
    }
}

use nlmin_core::{error::DirectionError, metrics::Metrics, problem::Problem, types::Vector};

use super::DescentDirection;

/// Steepest descent: Δx = -∇f.
///
/// Stateless and always defined, which makes it the terminal fallback of
/// every escalation chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct GradientDescent;

impl GradientDescent {
    /// Creates the strategy.
    pub fn new() -> Self {
        Self
    }
}

impl DescentDirection for GradientDescent {
    fn name(&self) -> &'static str {
        "gradient descent"
    }

    fn reset(&mut self, _ndof: usize) {}

    fn compute_direction<P: Problem + ?Sized>(
        &mut self,
        _problem: &P,
        _x: &Vector,
        grad: &Vector,
        _metrics: &mut Metrics,
    ) -> Result<Vector, DirectionError> {
        Ok(-grad)
    }
}

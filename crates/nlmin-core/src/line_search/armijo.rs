//! Sufficient-decrease backtracking.

use tracing::trace;

use super::{notify_trial, LineSearchStats, StepSizeSearch};
use crate::{
    config::LineSearchParams, error::LineSearchError, problem::Problem, types::Vector,
};

/// Shrinks the step until the Armijo condition holds:
///
/// f(x + αΔx) ≤ f(x) + c·α·∇f(x)ᵀΔx
///
/// The gradient-norm switch of the backtracking search does not apply;
/// `old_energy` must be the objective at `x`.
#[derive(Debug, Clone)]
pub struct ArmijoLineSearch {
    params: LineSearchParams,
}

impl ArmijoLineSearch {
    /// Creates an Armijo search.
    pub fn new(params: LineSearchParams) -> Self {
        Self { params }
    }
}

impl Default for ArmijoLineSearch {
    fn default() -> Self {
        Self::new(LineSearchParams::new(crate::config::LineSearchMethod::Armijo))
    }
}

impl StepSizeSearch for ArmijoLineSearch {
    fn name(&self) -> &'static str {
        "Armijo"
    }

    fn params(&self) -> &LineSearchParams {
        &self.params
    }

    fn compute_descent_step_size<P: Problem + ?Sized>(
        &self,
        x: &Vector,
        direction: &Vector,
        problem: &mut P,
        use_grad_norm: bool,
        old_energy: f64,
        starting_step: f64,
        stats: &mut LineSearchStats,
    ) -> Result<f64, LineSearchError> {
        let params = &self.params;
        let c = params.armijo.c;

        let energy = if use_grad_norm { problem.value(x) } else { old_energy };
        let mut grad = Vector::zeros(x.len());
        problem.gradient(x, &mut grad);
        let slope = grad.dot(direction);

        let mut step = starting_step;
        let mut trials = 0;

        while trials < params.max_step_size_iter && step >= params.min_step_size {
            trials += 1;
            stats.iterations += 1;

            let trial = x + direction * step;
            notify_trial(problem, &trial, stats);

            if problem.is_step_valid(x, &trial) {
                let new_energy = problem.value(&trial);
                let bound = energy + c * step * slope;
                trace!(step, new_energy, bound, "armijo trial");
                if new_energy <= bound {
                    return Ok(step);
                }
            }

            step *= params.step_ratio;
        }

        Err(LineSearchError::NoDecrease {
            iterations: trials,
            last_step: step,
        })
    }
}

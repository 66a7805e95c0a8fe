//! Strict-decrease backtracking.

use tracing::trace;

use super::{notify_trial, LineSearchStats, StepSizeSearch};
use crate::{
    config::LineSearchParams, error::LineSearchError, problem::Problem, types::Vector,
};

/// Shrinks the step until the objective strictly decreases.
///
/// Close to a minimizer the objective may stagnate at machine precision;
/// when the gradient norm at `x` is below `use_grad_norm_tol` the test
/// compares squared gradient norms instead.
#[derive(Debug, Clone)]
pub struct BacktrackingLineSearch {
    params: LineSearchParams,
}

impl BacktrackingLineSearch {
    /// Creates a backtracking search.
    pub fn new(params: LineSearchParams) -> Self {
        Self { params }
    }
}

impl Default for BacktrackingLineSearch {
    fn default() -> Self {
        Self::new(LineSearchParams::default())
    }
}

impl StepSizeSearch for BacktrackingLineSearch {
    fn name(&self) -> &'static str {
        "Backtracking"
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
        let mut step = starting_step;
        let mut grad = Vector::zeros(x.len());
        let mut trials = 0;

        while trials < params.max_step_size_iter && step >= params.min_step_size {
            trials += 1;
            stats.iterations += 1;

            let trial = x + direction * step;
            notify_trial(problem, &trial, stats);

            if problem.is_step_valid(x, &trial) {
                let new_energy = if use_grad_norm {
                    problem.gradient(&trial, &mut grad);
                    grad.norm_squared()
                } else {
                    problem.value(&trial)
                };

                trace!(step, new_energy, old_energy, "backtracking trial");
                if new_energy < old_energy {
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

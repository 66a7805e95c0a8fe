//! Unchecked full step.

use super::{LineSearchStats, StepSizeSearch};
use crate::{
    config::{LineSearchMethod, LineSearchParams},
    error::LineSearchError,
    problem::Problem,
    types::Vector,
};

/// Returns `default_init_step_size` without evaluating anything.
///
/// None of the validity, collision or decrease phases run. Only use this
/// when the caller has established that the full step is safe; otherwise
/// the solver may accept a step that increases the objective or leaves the
/// admissible set.
#[derive(Debug, Clone)]
pub struct NoLineSearch {
    params: LineSearchParams,
}

impl NoLineSearch {
    /// Creates the unchecked search.
    pub fn new(params: LineSearchParams) -> Self {
        Self { params }
    }
}

impl Default for NoLineSearch {
    fn default() -> Self {
        Self::new(LineSearchParams::new(LineSearchMethod::None))
    }
}

impl StepSizeSearch for NoLineSearch {
    fn name(&self) -> &'static str {
        "None"
    }

    fn params(&self) -> &LineSearchParams {
        &self.params
    }

    fn compute_descent_step_size<P: Problem + ?Sized>(
        &self,
        _x: &Vector,
        _direction: &Vector,
        _problem: &mut P,
        _use_grad_norm: bool,
        _old_energy: f64,
        starting_step: f64,
        _stats: &mut LineSearchStats,
    ) -> Result<f64, LineSearchError> {
        Ok(starting_step)
    }

    fn search<P: Problem + ?Sized>(
        &self,
        _x: &Vector,
        _direction: &Vector,
        _problem: &mut P,
        stats: &mut LineSearchStats,
    ) -> Result<f64, LineSearchError> {
        stats.iterations += 1;
        Ok(self.params.default_init_step_size)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_problems::Bowl;
    use super::*;

    #[test]
    fn test_accepts_ascent_step_unchecked() {
        let ls = NoLineSearch::default();
        let mut problem = Bowl::default();
        let mut stats = LineSearchStats::default();
        let x = Vector::from_vec(vec![1.0]);
        let dir = Vector::from_vec(vec![10.0]);

        assert_eq!(ls.search(&x, &dir, &mut problem, &mut stats), Ok(1.0));
        assert!(problem.changed.is_empty());
        assert_eq!(problem.began, 0);
        assert_eq!(stats.iterations, 1);
    }
}

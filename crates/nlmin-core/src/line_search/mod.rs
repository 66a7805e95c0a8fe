//! Step-size search algorithms.
//!
//! Given a point `x` and a validated descent direction `Δx`, a step-size
//! search returns a multiplier `α > 0` such that `x + αΔx` is admissible and
//! decreases the objective. The search runs in phases:
//!
//! 1. **Validity**: shrink `α` until the trial point is accepted by
//!    [`Problem::is_step_valid`] and has a finite objective
//! 2. **Collision**: [`Problem::line_search_begin`] (broad phase), then scale
//!    `α` by [`Problem::max_step_size`] (narrow phase)
//! 3. **Classical**: the algorithm-specific decrease test, implemented by
//!    [`StepSizeSearch::compute_descent_step_size`]
//! 4. [`Problem::line_search_end`], run whenever phase 2 has begun
//!
//! Every phase shrinks by `step_ratio` and gives up after
//! `max_step_size_iter` trials or once `α` falls below `min_step_size`.
//! Failure is reported as a [`LineSearchError`], never as an accepted step
//! without decrease.
//!
//! # Available Methods
//!
//! - [`BacktrackingLineSearch`]: strict decrease of the objective
//! - [`ArmijoLineSearch`]: sufficient decrease `f(x + αΔx) ≤ f(x) + cα∇f·Δx`
//! - [`NoLineSearch`]: returns the initial step unchecked

mod armijo;
mod backtracking;
mod no_line_search;

pub use armijo::ArmijoLineSearch;
pub use backtracking::BacktrackingLineSearch;
pub use no_line_search::NoLineSearch;

use std::fmt::Debug;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::{
    config::{LineSearchMethod, LineSearchParams},
    error::LineSearchError,
    metrics::TimerGuard,
    problem::Problem,
    types::Vector,
};

/// Counters and phase timings accumulated across searches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineSearchStats {
    /// Trial points evaluated
    pub iterations: usize,
    /// Time spent in the validity phase
    pub checking_for_nan_inf: Duration,
    /// Time spent in the broad phase
    pub broad_phase_ccd: Duration,
    /// Time spent in the narrow phase
    pub ccd: Duration,
    /// Time spent in the classical phase
    pub classical_line_search: Duration,
    /// Time spent in `solution_changed` during the classical phase
    pub constraint_set_update: Duration,
}

impl LineSearchStats {
    /// Clears every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Interface of a step-size search.
pub trait StepSizeSearch: Debug {
    /// Name of the method.
    fn name(&self) -> &'static str;

    /// Parameters of the search.
    fn params(&self) -> &LineSearchParams;

    /// Classical phase: shrinks `starting_step` until the method's decrease
    /// test holds at `x + step·direction`.
    ///
    /// `old_energy` is the objective at `x`, or the squared gradient norm at
    /// `x` when `use_grad_norm` is set.
    #[allow(clippy::too_many_arguments)]
    fn compute_descent_step_size<P: Problem + ?Sized>(
        &self,
        x: &Vector,
        direction: &Vector,
        problem: &mut P,
        use_grad_norm: bool,
        old_energy: f64,
        starting_step: f64,
        stats: &mut LineSearchStats,
    ) -> Result<f64, LineSearchError>;

    /// Runs every phase and returns the accepted step multiplier.
    fn search<P: Problem + ?Sized>(
        &self,
        x: &Vector,
        direction: &Vector,
        problem: &mut P,
        stats: &mut LineSearchStats,
    ) -> Result<f64, LineSearchError> {
        let params = self.params();

        let initial_energy = problem.value(x);
        if !initial_energy.is_finite() {
            return Err(LineSearchError::NonFiniteStart);
        }

        let (use_grad_norm, old_energy) = if params.use_grad_norm_tol > 0.0 {
            let mut grad = Vector::zeros(x.len());
            problem.gradient(x, &mut grad);
            let norm_sq = grad.norm_squared();
            if norm_sq.sqrt() < params.use_grad_norm_tol {
                (true, norm_sq)
            } else {
                (false, initial_energy)
            }
        } else {
            (false, initial_energy)
        };

        let step = {
            let _timer = TimerGuard::new(&mut stats.checking_for_nan_inf);
            valid_step_size(x, direction, problem, params, params.default_init_step_size)
        };
        let step = match step {
            Ok((step, trials)) => {
                stats.iterations += trials;
                step
            }
            Err(err) => {
                problem.solution_changed(x);
                return Err(err);
            }
        };

        let result = collision_free_step_size(x, direction, problem, step, stats).and_then(|step| {
            let start = Instant::now();
            let result = self.compute_descent_step_size(
                x,
                direction,
                problem,
                use_grad_norm,
                old_energy,
                step,
                stats,
            );
            stats.classical_line_search += start.elapsed();
            result
        });

        problem.line_search_end();

        match result {
            Ok(step) => {
                debug!(method = self.name(), step, "line search accepted step");
                Ok(step)
            }
            Err(err) => {
                problem.solution_changed(x);
                debug!(method = self.name(), error = %err, "line search failed");
                Err(err)
            }
        }
    }
}

/// Validity phase: shrinks until the trial point is admissible and finite.
///
/// Returns the step and the number of trials.
fn valid_step_size<P: Problem + ?Sized>(
    x: &Vector,
    direction: &Vector,
    problem: &mut P,
    params: &LineSearchParams,
    starting_step: f64,
) -> Result<(f64, usize), LineSearchError> {
    let mut step = starting_step;
    let mut trials = 0;

    while trials < params.max_step_size_iter && step >= params.min_step_size {
        trials += 1;
        let trial = x + direction * step;
        problem.solution_changed(&trial);
        if problem.is_step_valid(x, &trial) && problem.value(&trial).is_finite() {
            return Ok((step, trials));
        }
        step *= params.step_ratio;
    }

    debug!(trials, step, "no valid trial point");
    Err(LineSearchError::NoValidStep { iterations: trials })
}

/// Collision phase: broad phase, then the narrow-phase step fraction.
fn collision_free_step_size<P: Problem + ?Sized>(
    x: &Vector,
    direction: &Vector,
    problem: &mut P,
    step: f64,
    stats: &mut LineSearchStats,
) -> Result<f64, LineSearchError> {
    let trial = x + direction * step;

    {
        let _timer = TimerGuard::new(&mut stats.broad_phase_ccd);
        problem.line_search_begin(x, &trial);
    }

    let fraction = {
        let _timer = TimerGuard::new(&mut stats.ccd);
        problem.max_step_size(x, &trial)
    };

    if !(fraction > 0.0) {
        return Err(LineSearchError::CollisionBlocked);
    }

    Ok(step * fraction.min(1.0))
}

/// Step-size search selected by configuration.
#[derive(Debug, Clone)]
pub enum LineSearch {
    /// Strict-decrease backtracking
    Backtracking(BacktrackingLineSearch),
    /// Sufficient-decrease backtracking
    Armijo(ArmijoLineSearch),
    /// Unchecked full step
    None(NoLineSearch),
}

impl LineSearch {
    /// Builds the search named by `params.method`.
    pub fn new(params: LineSearchParams) -> Self {
        match params.method {
            LineSearchMethod::Backtracking => Self::Backtracking(BacktrackingLineSearch::new(params)),
            LineSearchMethod::Armijo => Self::Armijo(ArmijoLineSearch::new(params)),
            LineSearchMethod::None => Self::None(NoLineSearch::new(params)),
        }
    }
}

impl Default for LineSearch {
    fn default() -> Self {
        Self::new(LineSearchParams::default())
    }
}

impl StepSizeSearch for LineSearch {
    fn name(&self) -> &'static str {
        match self {
            Self::Backtracking(ls) => ls.name(),
            Self::Armijo(ls) => ls.name(),
            Self::None(ls) => ls.name(),
        }
    }

    fn params(&self) -> &LineSearchParams {
        match self {
            Self::Backtracking(ls) => ls.params(),
            Self::Armijo(ls) => ls.params(),
            Self::None(ls) => ls.params(),
        }
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
        match self {
            Self::Backtracking(ls) => ls.compute_descent_step_size(
                x, direction, problem, use_grad_norm, old_energy, starting_step, stats,
            ),
            Self::Armijo(ls) => ls.compute_descent_step_size(
                x, direction, problem, use_grad_norm, old_energy, starting_step, stats,
            ),
            Self::None(ls) => ls.compute_descent_step_size(
                x, direction, problem, use_grad_norm, old_energy, starting_step, stats,
            ),
        }
    }

    fn search<P: Problem + ?Sized>(
        &self,
        x: &Vector,
        direction: &Vector,
        problem: &mut P,
        stats: &mut LineSearchStats,
    ) -> Result<f64, LineSearchError> {
        match self {
            Self::Backtracking(ls) => ls.search(x, direction, problem, stats),
            Self::Armijo(ls) => ls.search(x, direction, problem, stats),
            Self::None(ls) => ls.search(x, direction, problem, stats),
        }
    }
}

/// Notifies the problem of a trial point and records the time spent.
pub(crate) fn notify_trial<P: Problem + ?Sized>(
    problem: &mut P,
    trial: &Vector,
    stats: &mut LineSearchStats,
) {
    let _timer = TimerGuard::new(&mut stats.constraint_set_update);
    problem.solution_changed(trial);
}

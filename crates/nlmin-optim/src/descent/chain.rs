//! Ordered escalation chain of descent strategies.

use nlmin_core::{
    error::{Result, SolverError},
    metrics::Metrics,
    types::Vector,
};

use super::{DescentDirection, DescentStrategy};

/// Strategies ordered from most aggressive to most robust.
///
/// The active level only moves forward within an iteration and is reset to
/// the primary strategy after every accepted step. The last entry is the
/// terminal level and must be gradient descent.
#[derive(Debug, Clone)]
pub struct StrategyChain {
    strategies: Vec<DescentStrategy>,
    level: usize,
}

impl StrategyChain {
    /// Creates a chain, checking that it ends in gradient descent.
    pub fn new(strategies: Vec<DescentStrategy>) -> Result<Self> {
        match strategies.last() {
            None => Err(SolverError::InvalidStrategyChain(
                "the chain is empty".to_string(),
            )),
            Some(last) if !last.is_gradient_descent() => {
                Err(SolverError::InvalidStrategyChain(format!(
                    "the terminal strategy must be gradient descent, got {}",
                    last.name()
                )))
            }
            Some(_) => Ok(Self {
                strategies,
                level: 0,
            }),
        }
    }

    /// Current level.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Number of levels.
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Always false; a valid chain holds at least the terminal strategy.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Whether the active strategy is the last one.
    pub fn is_terminal(&self) -> bool {
        self.level + 1 >= self.strategies.len()
    }

    /// Active strategy.
    pub fn active(&self) -> &DescentStrategy {
        &self.strategies[self.level]
    }

    /// Active strategy, mutably.
    pub fn active_mut(&mut self) -> &mut DescentStrategy {
        &mut self.strategies[self.level]
    }

    /// Names of every level, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(DescentDirection::name).collect()
    }

    /// Moves to the next level. Returns false if already terminal.
    pub fn escalate(&mut self, metrics: &mut Metrics) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.strategies[self.level].escalated_from();
        self.level += 1;
        metrics.record_escalation(self.level);
        true
    }

    /// Returns to the primary strategy.
    pub fn reset_level(&mut self) {
        self.level = 0;
    }

    /// Resets every strategy for a new solve.
    pub fn reset(&mut self, ndof: usize) {
        self.level = 0;
        for strategy in &mut self.strategies {
            strategy.reset(ndof);
        }
    }

    /// Forwards an accepted step to the active strategy.
    pub fn accept_step(&mut self, step: &Vector, grad: &Vector) {
        self.active_mut().accept_step(step, grad);
    }
}

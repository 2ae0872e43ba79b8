//! # Binary Optimizers
//!
//! $$
//! x^\* = \arg\min_{x\in\{0,1\}^N} E(x)\quad\text{s.t.}\quad a^\top x = b
//! $$
//!
//! One interface, several interchangeable strategies: exact enumeration,
//! simulated annealing, a state-vector QAOA and an adapter for external
//! samplers. Every strategy takes a mandatory evaluation, iteration or time
//! cap and never hands back a partial solution.

pub mod annealing;
pub mod exhaustive;
pub mod qaoa;
pub mod sampler;

pub use annealing::SimulatedAnnealing;
pub use exhaustive::ExhaustiveOptimizer;
pub use qaoa::QaoaOptimizer;
pub use sampler::SampleBackend;
pub use sampler::SampleCount;
pub use sampler::SampleSelection;
pub use sampler::SamplingOptimizer;

use crate::error::OptimizationError;
use crate::qubo::LinearEquality;
use crate::qubo::QuadraticProgram;
use crate::qubo::QuboMatrix;

/// Assignment returned by a [`BinaryOptimizer`].
#[derive(Clone, Debug, PartialEq)]
pub struct BinarySolution {
  /// `x[i] = 1` selects asset `i`, indexed in universe order.
  pub x: Vec<u8>,
  /// [`QuboMatrix::energy`] of `x` as reported by the strategy.
  pub objective_value: f64,
  /// Objective evaluations, iterations or shots spent, depending on the strategy.
  pub evaluations: u64,
}

/// Approximately minimise a QUBO, optionally under a linear equality.
///
/// Implementations only read their inputs, so one problem can be handed to
/// several strategies in parallel.
pub trait BinaryOptimizer: Send + Sync {
  fn name(&self) -> &str;

  fn solve(
    &self,
    qubo: &QuboMatrix,
    constraint: Option<&LinearEquality>,
  ) -> Result<BinarySolution, OptimizationError>;

  fn solve_program(&self, program: &QuadraticProgram) -> Result<BinarySolution, OptimizationError> {
    self.solve(&program.qubo, program.constraint.as_ref())
  }
}

pub(crate) fn check_constraint(
  strategy: &str,
  qubo: &QuboMatrix,
  constraint: Option<&LinearEquality>,
) -> Result<(), OptimizationError> {
  match constraint {
    Some(c) if c.len() != qubo.size() => Err(OptimizationError::InvalidProblem {
      strategy: strategy.to_string(),
      reason: format!(
        "constraint has {} coefficients for {} variables",
        c.len(),
        qubo.size()
      ),
    }),
    _ => Ok(()),
  }
}

pub(crate) fn bits_from_mask(mask: u64, n: usize) -> Vec<u8> {
  (0..n).map(|i| ((mask >> i) & 1) as u8).collect()
}

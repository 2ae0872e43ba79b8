//! # Errors
//!
//! $$
//! \text{input} \to \text{estimate} \to Q \to \text{solve} \to \text{report}
//! $$
//!
//! Estimation and construction failures are fatal for a run. Solver failures
//! are carried as [`OptimizationError`] so a comparison can isolate them per
//! strategy.

use thiserror::Error;

/// Error type for the portfolio pipeline.
#[derive(Debug, Error)]
pub enum PortfolioError {
  /// Malformed universe, budget outside `[1, N]`, mismatched or missing series.
  #[error("invalid input: {0}")]
  InputValidation(String),

  /// Fewer aligned return observations than a covariance estimate needs.
  #[error("insufficient data: {observations} return observations, need at least {required}")]
  InsufficientData { observations: usize, required: usize },

  /// Non-finite values in returns, mean or covariance.
  #[error("numeric error: {0}")]
  Numeric(String),

  /// The binary optimizer failed.
  #[error(transparent)]
  Optimization(#[from] OptimizationError),

  /// Structural mismatch between a solution vector and the asset universe.
  #[error("invalid solution: expected {expected}, got {got}")]
  Validation { expected: String, got: String },
}

/// Failure of a single [`BinaryOptimizer`](crate::optimizer::BinaryOptimizer) invocation.
#[derive(Debug, Error)]
pub enum OptimizationError {
  /// The search space is larger than the caller-supplied evaluation cap.
  #[error("{strategy}: {required} evaluations needed, budget is {budget}")]
  BudgetExceeded {
    strategy: String,
    required: u128,
    budget: u64,
  },

  /// The backend cannot represent a problem of this size.
  #[error("{strategy}: problem has {size} variables, limit is {limit}")]
  ProblemTooLarge {
    strategy: String,
    size: usize,
    limit: usize,
  },

  /// The backend did not answer within the caller-supplied timeout.
  #[error("{strategy}: no result within {timeout_ms} ms")]
  Timeout { strategy: String, timeout_ms: u128 },

  /// The variational parameter search did not produce a usable point.
  #[error("{strategy}: parameter search failed")]
  Convergence {
    strategy: String,
    #[source]
    source: anyhow::Error,
  },

  /// The external backend rejected the problem or returned garbage.
  #[error("{strategy}: backend failure")]
  Backend {
    strategy: String,
    #[source]
    source: anyhow::Error,
  },

  /// The sampler returned no samples.
  #[error("{strategy}: backend returned no samples")]
  NoSamples { strategy: String },

  /// Objective and constraint do not describe a solvable problem.
  #[error("{strategy}: invalid problem: {reason}")]
  InvalidProblem { strategy: String, reason: String },
}

impl OptimizationError {
  /// Name of the strategy that failed.
  pub fn strategy(&self) -> &str {
    match self {
      Self::BudgetExceeded { strategy, .. }
      | Self::ProblemTooLarge { strategy, .. }
      | Self::Timeout { strategy, .. }
      | Self::Convergence { strategy, .. }
      | Self::Backend { strategy, .. }
      | Self::NoSamples { strategy }
      | Self::InvalidProblem { strategy, .. } => strategy,
    }
  }
}

/// Result type for portfolio pipeline operations.
pub type Result<T> = std::result::Result<T, PortfolioError>;

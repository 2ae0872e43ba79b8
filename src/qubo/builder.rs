use impl_new_derive::ImplNew;
use ndarray::Array1;
use ndarray::Array2;
use tracing::debug;

use super::matrix::QuboMatrix;
use crate::error::PortfolioError;
use crate::error::Result;

/// Scalars of the penalised mean-variance objective.
#[derive(ImplNew, Clone, Copy, Debug, PartialEq)]
pub struct QuboParams {
  /// Number of assets to select, `1 <= B <= N`.
  pub budget: usize,
  /// Weight `q` of the covariance term.
  pub risk_aversion: f64,
  /// Weight `lambda` of the cardinality penalty. Too small a value lets the
  /// unconstrained minimum select the wrong number of assets; it is never
  /// tuned automatically.
  pub penalty_strength: f64,
}

impl QuboParams {
  pub fn validate(&self, n: usize) -> Result<()> {
    if self.budget == 0 || self.budget > n {
      return Err(PortfolioError::InputValidation(format!(
        "budget must be between 1 and {n}, got {}",
        self.budget
      )));
    }
    if !(self.risk_aversion.is_finite() && self.risk_aversion > 0.0) {
      return Err(PortfolioError::InputValidation(format!(
        "risk aversion must be a positive number, got {}",
        self.risk_aversion
      )));
    }
    if !(self.penalty_strength.is_finite() && self.penalty_strength > 0.0) {
      return Err(PortfolioError::InputValidation(format!(
        "penalty strength must be a positive number, got {}",
        self.penalty_strength
      )));
    }
    Ok(())
  }
}

/// Build the QUBO matrix of the cardinality-constrained mean-variance problem.
///
/// Only the upper triangle of `sigma` is read and every off-diagonal value is
/// written to both `(i, j)` and `(j, i)`, so the result is exactly symmetric.
/// The penalty `lambda (sum x - B)^2` expands to the diagonal and pair terms
/// plus the constant `lambda B^2`, stored as the matrix offset.
pub fn build_qubo(mu: &Array1<f64>, sigma: &Array2<f64>, params: &QuboParams) -> Result<QuboMatrix> {
  let n = mu.len();
  if n == 0 {
    return Err(PortfolioError::InputValidation(
      "cannot build a QUBO for zero assets".to_string(),
    ));
  }
  if sigma.dim() != (n, n) {
    return Err(PortfolioError::InputValidation(format!(
      "covariance is {:?}, expected ({n}, {n})",
      sigma.dim()
    )));
  }
  params.validate(n)?;
  if mu.iter().chain(sigma.iter()).any(|v| !v.is_finite()) {
    return Err(PortfolioError::Numeric(
      "non-finite value in mean or covariance".to_string(),
    ));
  }

  let q = params.risk_aversion;
  let lambda = params.penalty_strength;
  let b = params.budget as f64;

  let mut coefficients = Array2::<f64>::zeros((n, n));
  for i in 0..n {
    coefficients[[i, i]] = q * sigma[[i, i]] - mu[i] + lambda * (1.0 - 2.0 * b);
    for j in (i + 1)..n {
      let v = q * sigma[[i, j]] + 2.0 * lambda;
      coefficients[[i, j]] = v;
      coefficients[[j, i]] = v;
    }
  }

  debug!(
    assets = n,
    budget = params.budget,
    risk_aversion = q,
    penalty_strength = lambda,
    "built QUBO matrix"
  );

  Ok(QuboMatrix::from_parts(coefficients, lambda * b * b))
}

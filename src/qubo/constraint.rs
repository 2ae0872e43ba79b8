use super::matrix::QuboMatrix;
use crate::error::PortfolioError;
use crate::error::Result;

const FEASIBILITY_TOL: f64 = 1e-9;

/// Linear equality `sum_i a_i x_i = rhs` over the binary variables.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearEquality {
  coefficients: Vec<f64>,
  rhs: f64,
}

impl LinearEquality {
  pub fn new(coefficients: Vec<f64>, rhs: f64) -> Result<Self> {
    if coefficients.is_empty() {
      return Err(PortfolioError::InputValidation(
        "linear equality needs at least one coefficient".to_string(),
      ));
    }
    if !rhs.is_finite() || coefficients.iter().any(|a| !a.is_finite()) {
      return Err(PortfolioError::Numeric(
        "linear equality has non-finite terms".to_string(),
      ));
    }
    Ok(Self { coefficients, rhs })
  }

  /// `sum_i x_i = budget` over `n` variables.
  pub fn cardinality(n: usize, budget: usize) -> Self {
    Self {
      coefficients: vec![1.0; n],
      rhs: budget as f64,
    }
  }

  pub fn coefficients(&self) -> &[f64] {
    &self.coefficients
  }

  pub fn rhs(&self) -> f64 {
    self.rhs
  }

  pub fn len(&self) -> usize {
    self.coefficients.len()
  }

  pub fn is_empty(&self) -> bool {
    self.coefficients.is_empty()
  }

  pub fn lhs(&self, x: &[u8]) -> f64 {
    self
      .coefficients
      .iter()
      .zip(x.iter())
      .filter(|(_, xi)| **xi != 0)
      .map(|(a, _)| a)
      .sum()
  }

  pub fn residual(&self, x: &[u8]) -> f64 {
    self.lhs(x) - self.rhs
  }

  pub fn is_satisfied(&self, x: &[u8]) -> bool {
    x.len() == self.len() && self.residual(x).abs() <= FEASIBILITY_TOL
  }

  /// `Some(B)` when this is a plain cardinality constraint `sum x_i = B`.
  pub fn cardinality_target(&self) -> Option<usize> {
    let unit = self.coefficients.iter().all(|&a| a == 1.0);
    let integral = self.rhs >= 0.0 && self.rhs.fract() == 0.0 && self.rhs <= self.len() as f64;
    (unit && integral).then_some(self.rhs as usize)
  }
}

/// How the budget constraint reaches the solver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConstraintEncoding {
  /// Pass `sum x = B` alongside the objective for solvers that enforce it natively.
  #[default]
  Explicit,
  /// Rely on the penalty already folded into the QUBO. Feasibility of the
  /// minimum then depends on `lambda` being large relative to `sigma` and `mu`.
  PenaltyFolded,
}

/// Objective plus the optional explicit constraint for one solver call.
#[derive(Clone, Debug, PartialEq)]
pub struct QuadraticProgram {
  pub qubo: QuboMatrix,
  pub constraint: Option<LinearEquality>,
}

impl QuadraticProgram {
  pub fn encoding(&self) -> ConstraintEncoding {
    match self.constraint {
      Some(_) => ConstraintEncoding::Explicit,
      None => ConstraintEncoding::PenaltyFolded,
    }
  }
}

/// Pair a penalised QUBO with the budget constraint under `encoding`.
///
/// The penalty stays in the objective either way. On feasible assignments it
/// is the constant `-lambda B^2`, so it does not move the constrained optimum.
pub fn encode(qubo: QuboMatrix, budget: usize, encoding: ConstraintEncoding) -> QuadraticProgram {
  let constraint = match encoding {
    ConstraintEncoding::Explicit => Some(LinearEquality::cardinality(qubo.size(), budget)),
    ConstraintEncoding::PenaltyFolded => None,
  };
  QuadraticProgram { qubo, constraint }
}

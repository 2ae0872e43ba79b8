use ndarray::Array2;

use crate::error::PortfolioError;
use crate::error::Result;

/// Symmetric QUBO coefficient matrix.
///
/// The objective of an assignment `x` counts every unordered pair once:
///
/// $$
/// E(x) = \sum_i Q_{ii} x_i + \sum_{i<j} Q_{ij} x_i x_j
/// $$
///
/// which is the linear + quadratic program form handed to solvers. The
/// constant dropped while expanding the penalty is kept in [`offset`](Self::offset).
#[derive(Clone, Debug, PartialEq)]
pub struct QuboMatrix {
  coefficients: Array2<f64>,
  offset: f64,
}

impl QuboMatrix {
  /// Wrap an externally built matrix. Must be non-empty, square, finite and
  /// exactly symmetric.
  pub fn new(coefficients: Array2<f64>, offset: f64) -> Result<Self> {
    let (rows, cols) = coefficients.dim();
    if rows == 0 || rows != cols {
      return Err(PortfolioError::InputValidation(format!(
        "QUBO matrix must be square and non-empty, got {rows}x{cols}"
      )));
    }
    if !offset.is_finite() || coefficients.iter().any(|v| !v.is_finite()) {
      return Err(PortfolioError::Numeric(
        "QUBO matrix contains non-finite coefficients".to_string(),
      ));
    }

    let qubo = Self {
      coefficients,
      offset,
    };
    if !qubo.is_symmetric() {
      return Err(PortfolioError::InputValidation(
        "QUBO matrix must be symmetric".to_string(),
      ));
    }
    Ok(qubo)
  }

  pub(crate) fn from_parts(coefficients: Array2<f64>, offset: f64) -> Self {
    Self {
      coefficients,
      offset,
    }
  }

  /// Number of binary variables.
  pub fn size(&self) -> usize {
    self.coefficients.nrows()
  }

  pub fn coefficients(&self) -> &Array2<f64> {
    &self.coefficients
  }

  pub fn get(&self, i: usize, j: usize) -> f64 {
    self.coefficients[[i, j]]
  }

  /// Constant term of the expanded objective (not included in [`energy`](Self::energy)).
  pub fn offset(&self) -> f64 {
    self.offset
  }

  pub fn is_symmetric(&self) -> bool {
    let n = self.size();
    (0..n).all(|i| ((i + 1)..n).all(|j| self.coefficients[[i, j]] == self.coefficients[[j, i]]))
  }

  /// Linear coefficients (the diagonal).
  pub fn linear_terms(&self) -> Vec<f64> {
    self.coefficients.diag().to_vec()
  }

  /// Non-zero pair coefficients `(i, j, Q_ij)` with `i < j`.
  pub fn quadratic_terms(&self) -> Vec<(usize, usize, f64)> {
    let n = self.size();
    let mut terms = Vec::new();
    for i in 0..n {
      for j in (i + 1)..n {
        let q = self.coefficients[[i, j]];
        if q != 0.0 {
          terms.push((i, j, q));
        }
      }
    }
    terms
  }

  /// Objective value of a `{0,1}` assignment of length [`size`](Self::size).
  pub fn energy(&self, x: &[u8]) -> Result<f64> {
    if x.len() != self.size() {
      return Err(PortfolioError::Validation {
        expected: format!("{} entries", self.size()),
        got: format!("{} entries", x.len()),
      });
    }
    Ok(self.evaluate(x))
  }

  /// [`energy`](Self::energy) for an `x` already known to have `size` entries.
  pub(crate) fn evaluate(&self, x: &[u8]) -> f64 {
    let n = self.size();
    let mut e = 0.0;
    for i in 0..n {
      if x[i] == 0 {
        continue;
      }
      e += self.coefficients[[i, i]];
      for j in (i + 1)..n {
        if x[j] != 0 {
          e += self.coefficients[[i, j]];
        }
      }
    }
    e
  }

  /// Objective value of the assignment whose bit `i` is `x_i`.
  pub fn energy_of_mask(&self, mask: u64) -> f64 {
    let n = self.size();
    let mut e = 0.0;
    for i in 0..n {
      if (mask >> i) & 1 == 0 {
        continue;
      }
      e += self.coefficients[[i, i]];
      for j in (i + 1)..n {
        if (mask >> j) & 1 == 1 {
          e += self.coefficients[[i, j]];
        }
      }
    }
    e
  }

  /// Change of [`energy`](Self::energy) when bit `k` of `x` is flipped.
  pub fn flip_delta(&self, x: &[u8], k: usize) -> f64 {
    let mut field = self.coefficients[[k, k]];
    for (j, &xj) in x.iter().enumerate() {
      if j != k && xj != 0 {
        field += self.coefficients[[k, j]];
      }
    }
    if x[k] != 0 {
      -field
    } else {
      field
    }
  }
}

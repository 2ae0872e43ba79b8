use ndarray::Array1;
use ndarray::Array2;

use super::matrix::QuboMatrix;
use crate::error::PortfolioError;
use crate::error::Result;

/// Spin form of a QUBO under `x_i = (1 - z_i) / 2`, `z_i in {-1, +1}`:
///
/// $$
/// H(z) = c + \sum_i h_i z_i + \sum_{i<j} J_{ij} z_i z_j
/// $$
///
/// `H(z)` equals [`QuboMatrix::energy`] of the corresponding bit vector.
#[derive(Clone, Debug, PartialEq)]
pub struct IsingModel {
  /// Local fields.
  pub h: Array1<f64>,
  /// Couplings, upper triangle only (`J[i][j]` for `i < j`).
  pub j: Array2<f64>,
  /// Constant term.
  pub offset: f64,
}

impl IsingModel {
  pub fn energy(&self, spins: &[i8]) -> Result<f64> {
    let n = self.h.len();
    if spins.len() != n {
      return Err(PortfolioError::Validation {
        expected: format!("{n} spins"),
        got: format!("{} spins", spins.len()),
      });
    }
    let mut e = self.offset;
    for i in 0..n {
      let zi = f64::from(spins[i]);
      e += self.h[i] * zi;
      for k in (i + 1)..n {
        e += self.j[[i, k]] * zi * f64::from(spins[k]);
      }
    }
    Ok(e)
  }
}

/// Map bits to spins, `0 -> +1`, `1 -> -1`.
pub fn spins_from_bits(x: &[u8]) -> Vec<i8> {
  x.iter().map(|&b| if b == 0 { 1 } else { -1 }).collect()
}

impl QuboMatrix {
  pub fn to_ising(&self) -> IsingModel {
    let n = self.size();
    let mut h = Array1::<f64>::zeros(n);
    let mut j = Array2::<f64>::zeros((n, n));
    let mut offset = 0.0;

    for i in 0..n {
      let qii = self.get(i, i);
      h[i] -= 0.5 * qii;
      offset += 0.5 * qii;
      for k in (i + 1)..n {
        let qik = self.get(i, k);
        j[[i, k]] = 0.25 * qik;
        h[i] -= 0.25 * qik;
        h[k] -= 0.25 * qik;
        offset += 0.25 * qik;
      }
    }

    IsingModel { h, j, offset }
  }
}

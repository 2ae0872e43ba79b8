//! # Returns Estimator
//!
//! $$
//! r_{t,i} = \frac{p_{t+1,i}-p_{t,i}}{p_{t,i}},\qquad
//! \Sigma_{ij} = \frac{1}{T-1}\sum_{t}(r_{t,i}-\mu_i)(r_{t,j}-\mu_j)
//! $$
//!
//! Turns aligned price series into simple returns, the mean vector and the
//! sample covariance matrix (denominator `T - 1`).

use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use statrs::statistics::Statistics;
use tracing::debug;

use crate::data::AssetUniverse;
use crate::data::PriceData;
use crate::error::PortfolioError;
use crate::error::Result;

/// Minimum number of return observations for a non-degenerate covariance.
pub const MIN_OBSERVATIONS: usize = 2;

/// `T x N` matrix of simple returns, one column per asset in universe order.
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnsMatrix {
  values: Array2<f64>,
}

impl ReturnsMatrix {
  /// Wrap a precomputed `T x N` return matrix.
  pub fn new(values: Array2<f64>) -> Self {
    Self { values }
  }

  pub fn observations(&self) -> usize {
    self.values.nrows()
  }

  pub fn assets(&self) -> usize {
    self.values.ncols()
  }

  pub fn values(&self) -> &Array2<f64> {
    &self.values
  }

  fn ensure_finite(&self) -> Result<()> {
    if let Some(((t, i), v)) = self.values.indexed_iter().find(|(_, v)| !v.is_finite()) {
      return Err(PortfolioError::Numeric(format!(
        "non-finite return {v} at observation {t}, asset {i}"
      )));
    }
    Ok(())
  }
}

/// Simple percentage-change returns of every asset in `universe`.
///
/// Every series must cover the same timestamps. `lookback` keeps only the
/// most recent `lookback` prices of each series before differencing.
pub fn compute_returns(
  universe: &AssetUniverse,
  prices: &PriceData,
  lookback: Option<usize>,
) -> Result<ReturnsMatrix> {
  let mut series = Vec::with_capacity(universe.len());
  for id in universe.ids() {
    let s = prices.get(id).ok_or_else(|| {
      PortfolioError::InputValidation(format!("no price series for asset '{id}'"))
    })?;
    series.push(match lookback {
      Some(n) => s.tail(n),
      None => s.clone(),
    });
  }

  let reference = &series[0];
  for (id, s) in universe.ids().iter().zip(series.iter()).skip(1) {
    if s.len() != reference.len() {
      return Err(PortfolioError::InputValidation(format!(
        "mismatched series lengths: '{}' has {} prices, '{}' has {}",
        id,
        s.len(),
        universe.ids()[0],
        reference.len()
      )));
    }
    if !s.timestamps().eq(reference.timestamps()) {
      return Err(PortfolioError::InputValidation(format!(
        "series '{}' is not aligned with '{}'",
        id,
        universe.ids()[0]
      )));
    }
  }

  let observations = reference.len().saturating_sub(1);
  if observations < MIN_OBSERVATIONS {
    return Err(PortfolioError::InsufficientData {
      observations,
      required: MIN_OBSERVATIONS,
    });
  }

  let closes: Vec<Vec<f64>> = series.iter().map(|s| s.closes().collect()).collect();
  let values = Array2::from_shape_fn((observations, universe.len()), |(t, i)| {
    (closes[i][t + 1] - closes[i][t]) / closes[i][t]
  });

  debug!(
    assets = universe.len(),
    observations, "computed simple returns"
  );

  Ok(ReturnsMatrix { values })
}

/// Column-wise arithmetic mean.
pub fn compute_mean(returns: &ReturnsMatrix) -> Result<Array1<f64>> {
  returns.ensure_finite()?;
  returns
    .values
    .mean_axis(Axis(0))
    .ok_or(PortfolioError::InsufficientData {
      observations: 0,
      required: MIN_OBSERVATIONS,
    })
}

/// Unbiased sample covariance of the return columns.
pub fn compute_covariance(returns: &ReturnsMatrix) -> Result<Array2<f64>> {
  returns.ensure_finite()?;
  if returns.observations() < MIN_OBSERVATIONS {
    return Err(PortfolioError::InsufficientData {
      observations: returns.observations(),
      required: MIN_OBSERVATIONS,
    });
  }

  let n = returns.assets();
  let mut cov = Array2::<f64>::zeros((n, n));
  for i in 0..n {
    for j in i..n {
      let col_i = returns.values.column(i);
      let col_j = returns.values.column(j);
      let c = col_i.iter().covariance(col_j.iter());
      if !c.is_finite() {
        return Err(PortfolioError::Numeric(format!(
          "non-finite covariance between assets {i} and {j}"
        )));
      }
      cov[[i, j]] = c;
      cov[[j, i]] = c;
    }
  }

  for i in 0..n {
    // rounding can leave a tiny negative variance for a constant column
    if cov[[i, i]] < 0.0 {
      cov[[i, i]] = 0.0;
    }
  }

  Ok(cov)
}

/// Mean vector and covariance matrix for one problem instance.
#[derive(Clone, Debug, PartialEq)]
pub struct MarketEstimate {
  mu: Array1<f64>,
  sigma: Array2<f64>,
  observations: usize,
}

impl MarketEstimate {
  /// Wrap externally estimated moments, checking shape, finiteness,
  /// symmetry and a non-negative diagonal.
  pub fn new(mu: Array1<f64>, sigma: Array2<f64>) -> Result<Self> {
    let n = mu.len();
    if n == 0 {
      return Err(PortfolioError::InputValidation(
        "mean vector is empty".to_string(),
      ));
    }
    if sigma.dim() != (n, n) {
      return Err(PortfolioError::InputValidation(format!(
        "covariance is {:?}, expected ({n}, {n})",
        sigma.dim()
      )));
    }
    if mu.iter().chain(sigma.iter()).any(|v| !v.is_finite()) {
      return Err(PortfolioError::Numeric(
        "non-finite value in mean or covariance".to_string(),
      ));
    }
    for i in 0..n {
      if sigma[[i, i]] < 0.0 {
        return Err(PortfolioError::InputValidation(format!(
          "negative variance {} for asset {i}",
          sigma[[i, i]]
        )));
      }
      for j in (i + 1)..n {
        if sigma[[i, j]] != sigma[[j, i]] {
          return Err(PortfolioError::InputValidation(format!(
            "covariance is not symmetric at ({i}, {j})"
          )));
        }
      }
    }

    Ok(Self {
      mu,
      sigma,
      observations: 0,
    })
  }

  pub fn mu(&self) -> &Array1<f64> {
    &self.mu
  }

  pub fn sigma(&self) -> &Array2<f64> {
    &self.sigma
  }

  pub fn len(&self) -> usize {
    self.mu.len()
  }

  pub fn is_empty(&self) -> bool {
    self.mu.is_empty()
  }

  /// Number of return observations behind the estimate (0 when supplied externally).
  pub fn observations(&self) -> usize {
    self.observations
  }

  /// Per-asset standard deviation of returns.
  pub fn volatilities(&self) -> Array1<f64> {
    self.sigma.diag().mapv(|v| v.max(0.0).sqrt())
  }

  /// Pearson correlation implied by the covariance matrix.
  pub fn correlation(&self) -> Array2<f64> {
    let vols = self.volatilities();
    let n = self.len();
    Array2::from_shape_fn((n, n), |(i, j)| {
      let denom = vols[i] * vols[j];
      if i == j {
        1.0
      } else if denom > 1e-15 {
        (self.sigma[[i, j]] / denom).clamp(-1.0, 1.0)
      } else {
        0.0
      }
    })
  }
}

/// Full estimation step: returns, mean and covariance.
pub fn estimate(
  universe: &AssetUniverse,
  prices: &PriceData,
  lookback: Option<usize>,
) -> Result<MarketEstimate> {
  let returns = compute_returns(universe, prices, lookback)?;
  let mu = compute_mean(&returns)?;
  let sigma = compute_covariance(&returns)?;

  debug!(
    mu = ?mu.to_vec(),
    volatility = ?sigma.diag().mapv(|v| v.sqrt()).to_vec(),
    "estimated return moments"
  );

  Ok(MarketEstimate {
    mu,
    sigma,
    observations: returns.observations(),
  })
}

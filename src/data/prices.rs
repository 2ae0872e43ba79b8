use std::collections::HashMap;

use chrono::DateTime;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::Utc;

use crate::error::PortfolioError;
use crate::error::Result;

/// Price history keyed by asset identifier.
pub type PriceData = HashMap<String, PriceSeries>;

/// A single closing price observation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PricePoint {
  pub timestamp: DateTime<Utc>,
  pub close: f64,
}

/// Time-ordered closing prices of one asset.
///
/// Timestamps are strictly increasing. Gaps must already be forward-filled
/// or dropped by whoever produced the series.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceSeries {
  points: Vec<PricePoint>,
}

impl PriceSeries {
  pub fn new(points: Vec<PricePoint>) -> Result<Self> {
    if points.is_empty() {
      return Err(PortfolioError::InputValidation(
        "price series has no observations".to_string(),
      ));
    }

    for pair in points.windows(2) {
      if pair[1].timestamp <= pair[0].timestamp {
        return Err(PortfolioError::InputValidation(format!(
          "price timestamps must be strictly increasing ({} follows {})",
          pair[1].timestamp, pair[0].timestamp
        )));
      }
    }

    Ok(Self { points })
  }

  /// Daily closes starting at `start` (midnight UTC), one calendar day apart.
  pub fn daily(start: NaiveDate, closes: &[f64]) -> Result<Self> {
    let origin = start.and_hms_opt(0, 0, 0).map(|t| t.and_utc()).ok_or_else(|| {
      PortfolioError::InputValidation(format!("invalid start date {start}"))
    })?;

    let points = closes
      .iter()
      .enumerate()
      .map(|(k, &close)| PricePoint {
        timestamp: origin + Duration::days(k as i64),
        close,
      })
      .collect();

    Self::new(points)
  }

  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  pub fn points(&self) -> &[PricePoint] {
    &self.points
  }

  pub fn closes(&self) -> impl Iterator<Item = f64> + '_ {
    self.points.iter().map(|p| p.close)
  }

  pub fn timestamps(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
    self.points.iter().map(|p| p.timestamp)
  }

  /// The most recent `n` observations (the whole series if shorter).
  pub fn tail(&self, n: usize) -> PriceSeries {
    let start = self.points.len().saturating_sub(n);
    PriceSeries {
      points: self.points[start..].to_vec(),
    }
  }
}

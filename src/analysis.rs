//! # Solution Analysis
//!
//! $$
//! R_S=\sum_{i\in S}\mu_i,\qquad
//! \sigma_S=\sqrt{\max\Big(0,\sum_{i\in S}\sum_{j\in S}\Sigma_{ij}\Big)}
//! $$
//!
//! Decodes a bit vector back into a portfolio over the same estimates the
//! QUBO was built from. Constraint violations are reported, never raised.

use tracing::warn;

use crate::data::AssetUniverse;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::estimator::MarketEstimate;
use crate::optimizer::BinarySolution;

/// Irregularities found while decoding a solution.
#[derive(Clone, Debug, PartialEq)]
pub enum Anomaly {
  /// The number of selected assets differs from the budget.
  CardinalityViolation { selected: usize, budget: usize },
  /// No asset is selected.
  EmptySelection,
  /// Rounding made the selected variance negative; it was clamped to zero.
  VarianceClamped { raw: f64 },
  /// The solver reported a NaN or infinite objective.
  NonFiniteObjective,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolutionStatus {
  Solved,
  /// The solver produced no assignment; every metric is zero.
  NoSolution,
}

/// Portfolio decoded from one solver result.
#[derive(Clone, Debug, PartialEq)]
pub struct PortfolioReport {
  pub status: SolutionStatus,
  /// Selected asset indices, ascending.
  pub selected: Vec<usize>,
  /// Identifiers of the selected assets, in the same order as `selected`.
  pub assets: Vec<String>,
  /// Sum of the selected expected returns.
  pub realized_return: f64,
  /// Full double sum of the selected covariance block, clamped at zero.
  pub variance: f64,
  /// Square root of `variance`.
  pub realized_risk: f64,
  /// Objective as reported by the solver.
  pub objective_value: Option<f64>,
  pub budget: usize,
  /// `selected.len() == budget`. Always false without a solution.
  pub constraint_satisfied: bool,
  pub anomalies: Vec<Anomaly>,
}

impl PortfolioReport {
  pub fn no_solution(budget: usize) -> Self {
    Self {
      status: SolutionStatus::NoSolution,
      selected: Vec::new(),
      assets: Vec::new(),
      realized_return: 0.0,
      variance: 0.0,
      realized_risk: 0.0,
      objective_value: None,
      budget,
      constraint_satisfied: false,
      anomalies: Vec::new(),
    }
  }

  pub fn is_solved(&self) -> bool {
    self.status == SolutionStatus::Solved
  }

  /// Return per unit of risk, `None` for a riskless or empty selection.
  pub fn risk_return_ratio(&self) -> Option<f64> {
    (self.realized_risk > 0.0).then(|| self.realized_return / self.realized_risk)
  }

  pub fn has_anomaly(&self, f: impl Fn(&Anomaly) -> bool) -> bool {
    self.anomalies.iter().any(f)
  }
}

/// Decodes solutions for one universe, estimate and budget.
#[derive(Clone, Copy, Debug)]
pub struct SolutionAnalyzer<'a> {
  universe: &'a AssetUniverse,
  estimate: &'a MarketEstimate,
  budget: usize,
}

impl<'a> SolutionAnalyzer<'a> {
  pub fn new(universe: &'a AssetUniverse, estimate: &'a MarketEstimate, budget: usize) -> Result<Self> {
    if universe.len() != estimate.len() {
      return Err(PortfolioError::InputValidation(format!(
        "universe has {} assets, estimate has {}",
        universe.len(),
        estimate.len()
      )));
    }
    universe.validate_budget(budget)?;
    Ok(Self {
      universe,
      estimate,
      budget,
    })
  }

  /// Decode `x` into a [`PortfolioReport`].
  ///
  /// A missing or empty `x` yields a [`SolutionStatus::NoSolution`] report.
  /// Only a length other than `N` or a value other than 0/1 is an error.
  pub fn analyze(&self, x: Option<&[u8]>, objective_value: Option<f64>) -> Result<PortfolioReport> {
    let x = match x {
      Some(x) if !x.is_empty() => x,
      _ => return Ok(PortfolioReport::no_solution(self.budget)),
    };

    let n = self.universe.len();
    if x.len() != n {
      return Err(PortfolioError::Validation {
        expected: format!("{n} entries"),
        got: format!("{} entries", x.len()),
      });
    }
    if let Some(bad) = x.iter().find(|&&b| b > 1) {
      return Err(PortfolioError::Validation {
        expected: "binary entries".to_string(),
        got: format!("value {bad}"),
      });
    }

    let selected: Vec<usize> = (0..n).filter(|&i| x[i] == 1).collect();
    let assets = selected
      .iter()
      .filter_map(|&i| self.universe.get(i))
      .map(str::to_string)
      .collect();

    let mu = self.estimate.mu();
    let sigma = self.estimate.sigma();
    let realized_return = selected.iter().map(|&i| mu[i]).sum();
    let raw_variance: f64 = selected
      .iter()
      .flat_map(|&i| selected.iter().map(move |&j| (i, j)))
      .map(|(i, j)| sigma[[i, j]])
      .sum();

    let mut anomalies = Vec::new();
    if selected.is_empty() {
      anomalies.push(Anomaly::EmptySelection);
    }
    let constraint_satisfied = selected.len() == self.budget;
    if !constraint_satisfied {
      warn!(
        selected = selected.len(),
        budget = self.budget,
        "solution violates the cardinality constraint"
      );
      anomalies.push(Anomaly::CardinalityViolation {
        selected: selected.len(),
        budget: self.budget,
      });
    }
    let variance = if raw_variance < 0.0 {
      anomalies.push(Anomaly::VarianceClamped { raw: raw_variance });
      0.0
    } else {
      raw_variance
    };
    if objective_value.is_some_and(|v| !v.is_finite()) {
      anomalies.push(Anomaly::NonFiniteObjective);
    }

    Ok(PortfolioReport {
      status: SolutionStatus::Solved,
      selected,
      assets,
      realized_return,
      variance,
      realized_risk: variance.sqrt(),
      objective_value,
      budget: self.budget,
      constraint_satisfied,
      anomalies,
    })
  }

  pub fn analyze_solution(&self, solution: &BinarySolution) -> Result<PortfolioReport> {
    self.analyze(Some(&solution.x), Some(solution.objective_value))
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;
  use tracing_test::traced_test;

  use super::*;

  fn setup() -> (AssetUniverse, MarketEstimate) {
    let universe = AssetUniverse::new(["AAPL", "MSFT", "NVDA"]).unwrap();
    let estimate = MarketEstimate::new(
      array![0.01, 0.02, 0.03],
      array![[0.04, 0.01, 0.0], [0.01, 0.09, 0.02], [0.0, 0.02, 0.16]],
    )
    .unwrap();
    (universe, estimate)
  }

  #[test]
  fn decodes_selected_set_round_trip() {
    let (universe, estimate) = setup();
    let analyzer = SolutionAnalyzer::new(&universe, &estimate, 2).unwrap();
    let selected = [0usize, 2];
    let x: Vec<u8> = (0..3).map(|i| u8::from(selected.contains(&i))).collect();

    let report = analyzer.analyze(Some(&x), Some(-1.5)).unwrap();

    assert_eq!(report.selected, selected);
    assert_eq!(report.assets, vec!["AAPL", "NVDA"]);
    assert!(report.constraint_satisfied);
    assert!(report.anomalies.is_empty());
    assert_abs_diff_eq!(report.realized_return, 0.04, epsilon = 1e-15);
    // 0.04 + 0.16 + 2 * 0.0
    assert_abs_diff_eq!(report.variance, 0.20, epsilon = 1e-15);
    assert_abs_diff_eq!(report.realized_risk, 0.20_f64.sqrt(), epsilon = 1e-15);
    assert_eq!(report.objective_value, Some(-1.5));
  }

  #[test]
  fn cross_terms_count_in_both_directions() {
    let (universe, estimate) = setup();
    let analyzer = SolutionAnalyzer::new(&universe, &estimate, 2).unwrap();

    let report = analyzer.analyze(Some(&[0, 1, 1]), None).unwrap();

    assert_abs_diff_eq!(report.variance, 0.09 + 0.16 + 2.0 * 0.02, epsilon = 1e-15);
    assert_abs_diff_eq!(
      report.risk_return_ratio().unwrap(),
      0.05 / 0.29_f64.sqrt(),
      epsilon = 1e-12
    );
  }

  #[test]
  fn full_budget_with_all_ones() {
    let (universe, estimate) = setup();
    let analyzer = SolutionAnalyzer::new(&universe, &estimate, 3).unwrap();

    let report = analyzer.analyze(Some(&[1, 1, 1]), Some(0.0)).unwrap();

    assert!(report.constraint_satisfied);
    assert_eq!(report.selected, vec![0, 1, 2]);
    assert_abs_diff_eq!(report.variance, 0.29 + 2.0 * (0.01 + 0.0 + 0.02), epsilon = 1e-15);
  }

  #[test]
  fn single_asset_budget() {
    let (universe, estimate) = setup();
    let analyzer = SolutionAnalyzer::new(&universe, &estimate, 1).unwrap();

    let report = analyzer.analyze(Some(&[0, 1, 0]), None).unwrap();

    assert!(report.constraint_satisfied);
    assert_eq!(report.assets, vec!["MSFT"]);
    assert_abs_diff_eq!(report.realized_risk, 0.3, epsilon = 1e-15);
    assert!(SolutionAnalyzer::new(&universe, &estimate, 0).is_err());
    assert!(SolutionAnalyzer::new(&universe, &estimate, 4).is_err());
  }

  #[test]
  #[traced_test]
  fn cardinality_violation_is_reported_not_raised() {
    let (universe, estimate) = setup();
    let analyzer = SolutionAnalyzer::new(&universe, &estimate, 2).unwrap();

    let report = analyzer.analyze(Some(&[1, 1, 1]), Some(f64::NAN)).unwrap();

    assert!(report.is_solved());
    assert!(!report.constraint_satisfied);
    assert!(report.has_anomaly(|a| matches!(
      a,
      Anomaly::CardinalityViolation { selected: 3, budget: 2 }
    )));
    assert!(report.has_anomaly(|a| *a == Anomaly::NonFiniteObjective));
    assert!(logs_contain("cardinality constraint"));

    let empty = analyzer.analyze(Some(&[0, 0, 0]), None).unwrap();
    assert!(empty.has_anomaly(|a| *a == Anomaly::EmptySelection));
    assert_eq!(empty.risk_return_ratio(), None);
  }

  #[test]
  fn missing_solution_gives_empty_report() {
    let (universe, estimate) = setup();
    let analyzer = SolutionAnalyzer::new(&universe, &estimate, 2).unwrap();

    let none = analyzer.analyze(None, None).unwrap();
    let empty = analyzer.analyze(Some(&[]), Some(1.0)).unwrap();

    for report in [none, empty] {
      assert_eq!(report, PortfolioReport::no_solution(2));
      assert_eq!(report.status, SolutionStatus::NoSolution);
      assert_eq!(report.realized_return, 0.0);
      assert!(!report.constraint_satisfied);
    }
  }

  #[test]
  fn structural_mismatch_is_a_validation_error() {
    let (universe, estimate) = setup();
    let analyzer = SolutionAnalyzer::new(&universe, &estimate, 2).unwrap();

    assert!(matches!(
      analyzer.analyze(Some(&[1, 0]), None),
      Err(PortfolioError::Validation { .. })
    ));
    assert!(matches!(
      analyzer.analyze(Some(&[1, 0, 2]), None),
      Err(PortfolioError::Validation { .. })
    ));
  }

  #[test]
  fn negative_variance_is_clamped() {
    let universe = AssetUniverse::new(["A", "B"]).unwrap();
    let estimate = MarketEstimate::new(
      array![0.01, 0.01],
      array![[0.01, -0.02], [-0.02, 0.01]],
    )
    .unwrap();
    let analyzer = SolutionAnalyzer::new(&universe, &estimate, 2).unwrap();

    let report = analyzer.analyze(Some(&[1, 1]), None).unwrap();

    assert_eq!(report.variance, 0.0);
    assert_eq!(report.realized_risk, 0.0);
    assert!(report.has_anomaly(|a| matches!(a, Anomaly::VarianceClamped { raw } if *raw < 0.0)));
  }
}

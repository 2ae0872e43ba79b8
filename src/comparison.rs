//! # Strategy Comparison
//!
//! $$
//! \Delta_R=|R_a-R_b|,\quad \Delta_\sigma=|\sigma_a-\sigma_b|,\quad
//! \Delta_E=|E_a-E_b|,\quad s_{b/a}=t_b/t_a
//! $$
//!
//! Read-only aggregation of per-strategy reports for one problem instance.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use prettytable::Table;
use prettytable::format;
use prettytable::row;

use crate::analysis::PortfolioReport;
use crate::error::PortfolioError;

/// Result of one strategy on the shared problem.
#[derive(Debug)]
pub enum StrategyOutcome {
  Succeeded(PortfolioReport),
  Failed(PortfolioError),
}

#[derive(Debug)]
pub struct StrategyRun {
  pub name: String,
  pub outcome: StrategyOutcome,
  /// Wall-clock solve time, when measured.
  pub elapsed: Option<Duration>,
}

impl StrategyRun {
  pub fn succeeded(name: impl Into<String>, report: PortfolioReport, elapsed: Option<Duration>) -> Self {
    Self {
      name: name.into(),
      outcome: StrategyOutcome::Succeeded(report),
      elapsed,
    }
  }

  pub fn failed(name: impl Into<String>, error: PortfolioError, elapsed: Option<Duration>) -> Self {
    Self {
      name: name.into(),
      outcome: StrategyOutcome::Failed(error),
      elapsed,
    }
  }

  pub fn report(&self) -> Option<&PortfolioReport> {
    match &self.outcome {
      StrategyOutcome::Succeeded(report) => Some(report),
      StrategyOutcome::Failed(_) => None,
    }
  }

  pub fn error(&self) -> Option<&PortfolioError> {
    match &self.outcome {
      StrategyOutcome::Succeeded(_) => None,
      StrategyOutcome::Failed(error) => Some(error),
    }
  }
}

/// Differences between two successful strategies.
#[derive(Clone, Debug, PartialEq)]
pub struct PairwiseComparison {
  pub left: String,
  pub right: String,
  /// Both strategies reached the same status with the same asset set.
  pub selection_match: bool,
  pub return_delta: f64,
  pub risk_delta: f64,
  /// `None` unless both strategies reported an objective.
  pub objective_delta: Option<f64>,
  /// `right` time over `left` time, when both were measured and `left` is non-zero.
  pub slowdown: Option<f64>,
}

impl PairwiseComparison {
  fn between(left: &StrategyRun, l: &PortfolioReport, right: &StrategyRun, r: &PortfolioReport) -> Self {
    let objective_delta = match (l.objective_value, r.objective_value) {
      (Some(a), Some(b)) => Some((a - b).abs()),
      _ => None,
    };
    let slowdown = match (left.elapsed, right.elapsed) {
      (Some(a), Some(b)) if !a.is_zero() => Some(b.as_secs_f64() / a.as_secs_f64()),
      _ => None,
    };

    Self {
      left: left.name.clone(),
      right: right.name.clone(),
      selection_match: l.status == r.status && l.selected == r.selected,
      return_delta: (l.realized_return - r.realized_return).abs(),
      risk_delta: (l.realized_risk - r.realized_risk).abs(),
      objective_delta,
      slowdown,
    }
  }
}

/// Every strategy's outcome plus the pairwise diffs of the successful ones.
#[derive(Debug)]
pub struct ComparisonSummary {
  pub runs: Vec<StrategyRun>,
  pub pairs: Vec<PairwiseComparison>,
}

impl ComparisonSummary {
  pub fn run(&self, name: &str) -> Option<&StrategyRun> {
    self.runs.iter().find(|r| r.name == name)
  }

  /// Comparison of `a` and `b` in either order.
  pub fn pair(&self, a: &str, b: &str) -> Option<&PairwiseComparison> {
    self
      .pairs
      .iter()
      .find(|p| (p.left == a && p.right == b) || (p.left == b && p.right == a))
  }

  pub fn succeeded(&self) -> impl Iterator<Item = (&str, &PortfolioReport)> {
    self
      .runs
      .iter()
      .filter_map(|r| r.report().map(|report| (r.name.as_str(), report)))
  }

  pub fn failed(&self) -> impl Iterator<Item = (&str, &PortfolioError)> {
    self
      .runs
      .iter()
      .filter_map(|r| r.error().map(|error| (r.name.as_str(), error)))
  }

  /// True when every successful strategy picked the same assets.
  pub fn all_agree(&self) -> bool {
    self.pairs.iter().all(|p| p.selection_match)
  }

  pub fn to_table(&self) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_NO_LINESEP_WITH_TITLE);
    table.set_titles(row![
      "strategy", "status", "assets", "return", "risk", "ratio", "objective", "feasible", "time (ms)"
    ]);

    for run in &self.runs {
      let time = run
        .elapsed
        .map_or_else(|| "-".to_string(), |d| format!("{:.3}", d.as_secs_f64() * 1e3));
      match &run.outcome {
        StrategyOutcome::Succeeded(report) => {
          table.add_row(row![
            run.name,
            if report.is_solved() { "ok" } else { "no solution" },
            report.assets.join(","),
            format!("{:.6}", report.realized_return),
            format!("{:.6}", report.realized_risk),
            report
              .risk_return_ratio()
              .map_or_else(|| "-".to_string(), |v| format!("{v:.4}")),
            report
              .objective_value
              .map_or_else(|| "-".to_string(), |v| format!("{v:.6}")),
            report.constraint_satisfied,
            time
          ]);
        }
        StrategyOutcome::Failed(error) => {
          table.add_row(row![run.name, "failed", error, "-", "-", "-", "-", "-", time]);
        }
      }
    }
    table
  }
}

impl fmt::Display for ComparisonSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.to_table())?;
    for p in &self.pairs {
      writeln!(
        f,
        "{} vs {}: same selection {}, |dR| {:.6}, |dRisk| {:.6}{}{}",
        p.left,
        p.right,
        p.selection_match,
        p.return_delta,
        p.risk_delta,
        p.objective_delta
          .map_or_else(String::new, |d| format!(", |dE| {d:.6}")),
        p.slowdown
          .map_or_else(String::new, |s| format!(", slowdown {s:.2}x")),
      )?;
    }
    Ok(())
  }
}

/// Aggregate runs into a summary, comparing every pair of successful strategies
/// in run order.
pub fn compare(runs: Vec<StrategyRun>) -> ComparisonSummary {
  let mut pairs = Vec::new();
  for (i, left) in runs.iter().enumerate() {
    let Some(l) = left.report() else { continue };
    for right in &runs[i + 1..] {
      if let Some(r) = right.report() {
        pairs.push(PairwiseComparison::between(left, l, right, r));
      }
    }
  }
  ComparisonSummary { runs, pairs }
}

/// [`compare`] over already finished, untimed reports keyed by strategy name.
pub fn compare_reports(reports: &BTreeMap<String, PortfolioReport>) -> ComparisonSummary {
  compare(
    reports
      .iter()
      .map(|(name, report)| StrategyRun::succeeded(name.clone(), report.clone(), None))
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;
  use crate::analysis::SolutionStatus;
  use crate::error::OptimizationError;

  fn report(selected: Vec<usize>, ret: f64, risk: f64, objective: f64) -> PortfolioReport {
    PortfolioReport {
      status: SolutionStatus::Solved,
      assets: selected.iter().map(|i| format!("A{i}")).collect(),
      selected,
      realized_return: ret,
      variance: risk * risk,
      realized_risk: risk,
      objective_value: Some(objective),
      budget: 2,
      constraint_satisfied: true,
      anomalies: Vec::new(),
    }
  }

  #[test]
  fn identical_reports_have_zero_deltas() {
    let r = report(vec![0, 2], 0.015, 0.2, -1.945);
    let reports = BTreeMap::from([("exact".to_string(), r.clone()), ("qaoa".to_string(), r.clone())]);

    let summary = compare_reports(&reports);

    let pair = summary.pair("qaoa", "exact").unwrap();
    assert!(pair.selection_match);
    assert_eq!(pair.return_delta, 0.0);
    assert_eq!(pair.risk_delta, 0.0);
    assert_eq!(pair.objective_delta, Some(0.0));
    assert_eq!(pair.slowdown, None);
    assert!(summary.all_agree());
    // inputs are left untouched
    assert_eq!(reports["exact"], r);
  }

  #[test]
  fn deltas_and_slowdown() {
    let runs = vec![
      StrategyRun::succeeded(
        "exact",
        report(vec![0, 2], 0.015, 0.20, -1.945),
        Some(Duration::from_millis(10)),
      ),
      StrategyRun::succeeded(
        "annealing",
        report(vec![0, 1], 0.010, 0.25, -1.940),
        Some(Duration::from_millis(25)),
      ),
    ];

    let summary = compare(runs);
    let pair = summary.pair("exact", "annealing").unwrap();

    assert!(!pair.selection_match);
    assert_abs_diff_eq!(pair.return_delta, 0.005, epsilon = 1e-15);
    assert_abs_diff_eq!(pair.risk_delta, 0.05, epsilon = 1e-15);
    assert_abs_diff_eq!(pair.objective_delta.unwrap(), 0.005, epsilon = 1e-12);
    assert_abs_diff_eq!(pair.slowdown.unwrap(), 2.5, epsilon = 1e-12);
    assert!(!summary.all_agree());
  }

  #[test]
  fn no_solution_never_matches_a_solved_report() {
    let mut empty = report(Vec::new(), 0.0, 0.0, 0.0);
    empty.budget = 0;
    let reports = BTreeMap::from([
      ("exact".to_string(), empty),
      ("sampler".to_string(), PortfolioReport::no_solution(0)),
    ]);

    let summary = compare_reports(&reports);

    let pair = summary.pair("exact", "sampler").unwrap();
    assert!(!pair.selection_match);
    assert!(!summary.all_agree());
  }

  #[test]
  fn failures_are_isolated() {
    let runs = vec![
      StrategyRun::succeeded("exact", report(vec![0, 2], 0.015, 0.2, -1.9), None),
      StrategyRun::failed(
        "hardware",
        OptimizationError::Timeout {
          strategy: "hardware".to_string(),
          timeout_ms: 100,
        }
        .into(),
        Some(Duration::from_millis(100)),
      ),
      StrategyRun::succeeded("annealing", report(vec![0, 2], 0.015, 0.2, -1.9), None),
    ];

    let summary = compare(runs);

    assert_eq!(summary.pairs.len(), 1);
    assert_eq!(summary.succeeded().count(), 2);
    let failed: Vec<&str> = summary.failed().map(|(name, _)| name).collect();
    assert_eq!(failed, vec!["hardware"]);
    assert!(summary.pair("exact", "hardware").is_none());

    let rendered = summary.to_string();
    assert!(rendered.contains("hardware"));
    assert!(rendered.contains("failed"));
    assert!(rendered.contains("exact vs annealing"));
  }
}

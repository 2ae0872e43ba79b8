//! # Portfolio Pipeline
//!
//! $$
//! p \xrightarrow{\text{estimate}} (\mu,\Sigma) \xrightarrow{\text{build}} Q
//! \xrightarrow{\text{solve}} x \xrightarrow{\text{analyze}} \text{report}
//! $$
//!
//! High-level entry points: one strategy ([`run_pipeline`]) or several
//! strategies on the same problem ([`run_comparison`]).

use std::collections::HashSet;
use std::time::Instant;

use rayon::prelude::*;
use tracing::info;
use tracing::warn;

use crate::analysis::PortfolioReport;
use crate::analysis::SolutionAnalyzer;
use crate::comparison::ComparisonSummary;
use crate::comparison::StrategyRun;
use crate::comparison::compare;
use crate::data::AssetUniverse;
use crate::data::PriceData;
use crate::error::PortfolioError;
use crate::error::Result;
use crate::estimator::MarketEstimate;
use crate::estimator::estimate;
use crate::optimizer::BinaryOptimizer;
use crate::qubo::ConstraintEncoding;
use crate::qubo::QuadraticProgram;
use crate::qubo::QuboParams;
use crate::qubo::build_qubo;
use crate::qubo::encode;

/// Runtime configuration for [`PortfolioPipeline`].
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
  /// Number of assets to select.
  pub budget: usize,
  /// Weight `q` of the covariance term.
  pub risk_aversion: f64,
  /// Weight `lambda` of the cardinality penalty. With
  /// [`ConstraintEncoding::PenaltyFolded`] a value that is small next to the
  /// market terms lets the optimum break the budget; the report then carries
  /// a cardinality violation.
  pub penalty_strength: f64,
  /// How the budget constraint reaches the optimizer.
  pub encoding: ConstraintEncoding,
  /// Keep only the last `k` prices of every series.
  pub lookback: Option<usize>,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      budget: 1,
      risk_aversion: 1.0,
      penalty_strength: 10.0,
      encoding: ConstraintEncoding::Explicit,
      lookback: None,
    }
  }
}

impl PipelineConfig {
  pub fn new(budget: usize) -> Self {
    Self {
      budget,
      ..Self::default()
    }
  }

  pub fn with_risk_aversion(mut self, risk_aversion: f64) -> Self {
    self.risk_aversion = risk_aversion;
    self
  }

  pub fn with_penalty_strength(mut self, penalty_strength: f64) -> Self {
    self.penalty_strength = penalty_strength;
    self
  }

  pub fn with_encoding(mut self, encoding: ConstraintEncoding) -> Self {
    self.encoding = encoding;
    self
  }

  pub fn with_lookback(mut self, lookback: usize) -> Self {
    self.lookback = Some(lookback);
    self
  }

  pub fn qubo_params(&self) -> QuboParams {
    QuboParams::new(self.budget, self.risk_aversion, self.penalty_strength)
  }
}

/// Estimated and encoded problem, shared read-only by every strategy.
#[derive(Clone, Debug)]
pub struct PreparedProblem<'a> {
  pub universe: &'a AssetUniverse,
  pub estimate: MarketEstimate,
  pub program: QuadraticProgram,
  pub budget: usize,
}

impl PreparedProblem<'_> {
  pub fn analyzer(&self) -> Result<SolutionAnalyzer<'_>> {
    SolutionAnalyzer::new(self.universe, &self.estimate, self.budget)
  }

  /// Solve with one strategy and decode the result.
  pub fn solve(&self, optimizer: &dyn BinaryOptimizer) -> Result<PortfolioReport> {
    let solution = optimizer.solve_program(&self.program)?;
    self.analyzer()?.analyze_solution(&solution)
  }

  /// Timed [`solve`](Self::solve) with the failure kept in the run.
  pub fn run_strategy(&self, name: &str, optimizer: &dyn BinaryOptimizer) -> StrategyRun {
    let start = Instant::now();
    let outcome = self.solve(optimizer);
    let elapsed = start.elapsed();

    match outcome {
      Ok(report) => {
        info!(
          strategy = name,
          elapsed_ms = elapsed.as_secs_f64() * 1e3,
          selected = ?report.assets,
          feasible = report.constraint_satisfied,
          "strategy finished"
        );
        StrategyRun::succeeded(name, report, Some(elapsed))
      }
      Err(error) => {
        warn!(strategy = name, %error, "strategy failed");
        StrategyRun::failed(name, error, Some(elapsed))
      }
    }
  }
}

/// Single entry-point engine for estimation, encoding and solving.
#[derive(Clone, Debug)]
pub struct PortfolioPipeline {
  config: PipelineConfig,
}

impl PortfolioPipeline {
  pub fn new(config: PipelineConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  /// Validate inputs, estimate moments and build the encoded program.
  pub fn prepare<'a>(&self, universe: &'a AssetUniverse, prices: &PriceData) -> Result<PreparedProblem<'a>> {
    universe.validate_budget(self.config.budget)?;
    let estimate = estimate(universe, prices, self.config.lookback)?;
    let qubo = build_qubo(estimate.mu(), estimate.sigma(), &self.config.qubo_params())?;
    let program = encode(qubo, self.config.budget, self.config.encoding);

    info!(
      assets = universe.len(),
      observations = estimate.observations(),
      budget = self.config.budget,
      encoding = ?self.config.encoding,
      "prepared portfolio problem"
    );

    Ok(PreparedProblem {
      universe,
      estimate,
      program,
      budget: self.config.budget,
    })
  }

  pub fn run(
    &self,
    universe: &AssetUniverse,
    prices: &PriceData,
    optimizer: &dyn BinaryOptimizer,
  ) -> Result<PortfolioReport> {
    let problem = self.prepare(universe, prices)?;
    let start = Instant::now();
    let report = problem.solve(optimizer)?;
    info!(
      strategy = optimizer.name(),
      elapsed_ms = start.elapsed().as_secs_f64() * 1e3,
      "pipeline finished"
    );
    Ok(report)
  }

  /// Run every named strategy on the same prepared problem in parallel.
  ///
  /// Estimation and encoding failures abort the call. Strategy failures are
  /// recorded in the summary next to the successful runs.
  pub fn compare(
    &self,
    universe: &AssetUniverse,
    prices: &PriceData,
    strategies: &[(&str, &dyn BinaryOptimizer)],
  ) -> Result<ComparisonSummary> {
    let mut seen = HashSet::with_capacity(strategies.len());
    if let Some((name, _)) = strategies.iter().find(|(name, _)| !seen.insert(*name)) {
      return Err(PortfolioError::InputValidation(format!(
        "duplicate strategy name '{name}'"
      )));
    }

    let problem = self.prepare(universe, prices)?;
    let runs: Vec<StrategyRun> = strategies
      .par_iter()
      .map(|(name, optimizer)| problem.run_strategy(name, *optimizer))
      .collect();

    Ok(compare(runs))
  }
}

/// Estimate, build, solve with `optimizer` and decode.
pub fn run_pipeline(
  universe: &AssetUniverse,
  prices: &PriceData,
  config: &PipelineConfig,
  optimizer: &dyn BinaryOptimizer,
) -> Result<PortfolioReport> {
  PortfolioPipeline::new(config.clone()).run(universe, prices, optimizer)
}

/// Solve the same problem with every strategy and compare the reports.
pub fn run_comparison(
  universe: &AssetUniverse,
  prices: &PriceData,
  config: &PipelineConfig,
  strategies: &[(&str, &dyn BinaryOptimizer)],
) -> Result<ComparisonSummary> {
  PortfolioPipeline::new(config.clone()).compare(universe, prices, strategies)
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;
  use crate::data::PriceSeries;
  use crate::optimizer::ExhaustiveOptimizer;

  fn market() -> (AssetUniverse, PriceData) {
    let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let series = [
      ("AAA", vec![100.0, 101.0, 103.0, 102.0, 104.0, 106.0]),
      ("BBB", vec![50.0, 50.5, 50.2, 50.8, 51.0, 51.1]),
      ("CCC", vec![20.0, 19.5, 20.5, 21.0, 20.8, 21.5]),
    ];
    let universe = AssetUniverse::new(series.iter().map(|(id, _)| *id)).unwrap();
    let prices = series
      .iter()
      .map(|(id, closes)| (id.to_string(), PriceSeries::daily(start, closes).unwrap()))
      .collect();
    (universe, prices)
  }

  #[test]
  fn config_defaults_and_builders() {
    let config = PipelineConfig::new(2)
      .with_risk_aversion(0.5)
      .with_encoding(ConstraintEncoding::PenaltyFolded)
      .with_lookback(4);

    assert_eq!(config.budget, 2);
    assert_eq!(config.penalty_strength, 10.0);
    assert_eq!(config.qubo_params(), QuboParams::new(2, 0.5, 10.0));
    assert_eq!(config.lookback, Some(4));
  }

  #[test]
  fn prepare_encodes_requested_constraint() {
    let (universe, prices) = market();

    let explicit = PortfolioPipeline::new(PipelineConfig::new(2))
      .prepare(&universe, &prices)
      .unwrap();
    let folded = PortfolioPipeline::new(PipelineConfig::new(2).with_encoding(ConstraintEncoding::PenaltyFolded))
      .prepare(&universe, &prices)
      .unwrap();

    assert_eq!(explicit.estimate.observations(), 5);
    assert_eq!(explicit.program.encoding(), ConstraintEncoding::Explicit);
    assert!(folded.program.constraint.is_none());
    assert_eq!(explicit.program.qubo, folded.program.qubo);
  }

  #[test]
  fn budget_is_validated_before_estimation() {
    let (universe, prices) = market();

    let err = run_pipeline(
      &universe,
      &prices,
      &PipelineConfig::new(4),
      &ExhaustiveOptimizer::new(100),
    )
    .unwrap_err();

    assert!(matches!(err, PortfolioError::InputValidation(_)));
  }

  #[test]
  fn duplicate_strategy_names_are_rejected() {
    let (universe, prices) = market();
    let exact = ExhaustiveOptimizer::new(100);

    let err = run_comparison(
      &universe,
      &prices,
      &PipelineConfig::new(1),
      &[("exact", &exact), ("exact", &exact)],
    )
    .unwrap_err();

    assert!(matches!(err, PortfolioError::InputValidation(_)));
  }
}

use std::sync::Arc;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use tracing::debug;
use tracing::warn;

use super::BinaryOptimizer;
use super::BinarySolution;
use super::check_constraint;
use crate::error::OptimizationError;
use crate::qubo::LinearEquality;
use crate::qubo::QuboMatrix;

/// One distinct measured bitstring and how often it was observed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SampleCount {
  pub bits: Vec<u8>,
  pub count: u64,
}

/// External sampler: hardware, a cloud service or another simulator.
///
/// Implementations receive the full objective and constraint and return
/// measured assignments in universe order. [`sample`](Self::sample) should
/// return within a bounded time, see [`SamplingOptimizer`].
pub trait SampleBackend: Send + Sync {
  fn name(&self) -> &str;

  /// Largest problem the backend accepts, if bounded.
  fn max_variables(&self) -> Option<usize> {
    None
  }

  fn sample(
    &self,
    qubo: &QuboMatrix,
    constraint: Option<&LinearEquality>,
    shots: usize,
  ) -> anyhow::Result<Vec<SampleCount>>;
}

/// Which measured assignment becomes the solution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SampleSelection {
  /// Highest count, ties to the lower objective.
  #[default]
  MostFrequent,
  /// Lowest objective among feasible samples, falling back to all samples.
  LowestEnergy,
}

/// [`BinaryOptimizer`] over a [`SampleBackend`] with a wall-clock limit.
///
/// The backend runs on its own thread. When the timeout elapses the call
/// returns [`OptimizationError::Timeout`] and the late result is discarded.
/// The thread itself is not cancelled: a backend that can hang must bound its
/// own work (job deadline, request timeout), otherwise every timed-out call
/// leaves one detached thread running.
pub struct SamplingOptimizer {
  name: String,
  backend: Arc<dyn SampleBackend>,
  shots: usize,
  timeout: Duration,
  selection: SampleSelection,
}

impl SamplingOptimizer {
  pub fn new(backend: Arc<dyn SampleBackend>, shots: usize, timeout: Duration) -> Self {
    Self {
      name: format!("sampler:{}", backend.name()),
      backend,
      shots,
      timeout,
      selection: SampleSelection::default(),
    }
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  pub fn with_selection(mut self, selection: SampleSelection) -> Self {
    self.selection = selection;
    self
  }

  fn backend_error(&self, source: anyhow::Error) -> OptimizationError {
    OptimizationError::Backend {
      strategy: self.name.clone(),
      source,
    }
  }

  fn run_backend(
    &self,
    qubo: &QuboMatrix,
    constraint: Option<&LinearEquality>,
  ) -> Result<Vec<SampleCount>, OptimizationError> {
    let backend = Arc::clone(&self.backend);
    let qubo = qubo.clone();
    let constraint = constraint.cloned();
    let shots = self.shots;
    let (tx, rx) = mpsc::channel();

    thread::Builder::new()
      .name(format!("{}-backend", self.name))
      .spawn(move || {
        // the receiver is gone once the caller timed out
        let _ = tx.send(backend.sample(&qubo, constraint.as_ref(), shots));
      })
      .map_err(|e| self.backend_error(e.into()))?;

    match rx.recv_timeout(self.timeout) {
      Ok(Ok(samples)) => Ok(samples),
      Ok(Err(e)) => Err(self.backend_error(e)),
      Err(RecvTimeoutError::Timeout) => {
        warn!(strategy = %self.name, timeout_ms = self.timeout.as_millis() as u64, "backend timed out");
        Err(OptimizationError::Timeout {
          strategy: self.name.clone(),
          timeout_ms: self.timeout.as_millis(),
        })
      }
      Err(RecvTimeoutError::Disconnected) => {
        Err(self.backend_error(anyhow!("backend thread exited without a result")))
      }
    }
  }

  fn check_samples(&self, samples: &[SampleCount], n: usize) -> Result<(), OptimizationError> {
    for s in samples {
      if s.bits.len() != n {
        return Err(self.backend_error(anyhow!(
          "sample has {} bits for {n} variables",
          s.bits.len()
        )));
      }
      if s.bits.iter().any(|&b| b > 1) {
        return Err(self.backend_error(anyhow!("sample {:?} is not binary", s.bits)));
      }
    }
    Ok(())
  }
}

impl BinaryOptimizer for SamplingOptimizer {
  fn name(&self) -> &str {
    &self.name
  }

  fn solve(
    &self,
    qubo: &QuboMatrix,
    constraint: Option<&LinearEquality>,
  ) -> Result<BinarySolution, OptimizationError> {
    check_constraint(&self.name, qubo, constraint)?;
    let n = qubo.size();
    if let Some(limit) = self.backend.max_variables() {
      if n > limit {
        return Err(OptimizationError::ProblemTooLarge {
          strategy: self.name.clone(),
          size: n,
          limit,
        });
      }
    }

    let samples = self.run_backend(qubo, constraint)?;
    self.check_samples(&samples, n)?;

    let observed: Vec<(&SampleCount, f64)> = samples
      .iter()
      .filter(|s| s.count > 0)
      .map(|s| (s, qubo.evaluate(&s.bits)))
      .collect();
    let shots: u64 = observed.iter().map(|(s, _)| s.count).sum();

    let best = match self.selection {
      SampleSelection::MostFrequent => observed.iter().min_by(|a, b| {
        b.0
          .count
          .cmp(&a.0.count)
          .then_with(|| a.1.total_cmp(&b.1))
      }),
      SampleSelection::LowestEnergy => {
        let feasible = |s: &SampleCount| constraint.map_or(true, |c| c.is_satisfied(&s.bits));
        let order = |a: &&(&SampleCount, f64), b: &&(&SampleCount, f64)| a.1.total_cmp(&b.1);
        observed
          .iter()
          .filter(|(s, _)| feasible(s))
          .min_by(order)
          .or_else(|| observed.iter().min_by(order))
      }
    };
    let (sample, objective_value) = best.ok_or_else(|| OptimizationError::NoSamples {
      strategy: self.name.clone(),
    })?;

    debug!(strategy = %self.name, shots, distinct = observed.len(), "sampling finished");

    Ok(BinarySolution {
      x: sample.bits.clone(),
      objective_value: *objective_value,
      evaluations: shots,
    })
  }
}

#[cfg(test)]
mod tests {
  use ndarray::array;

  use super::*;

  struct Fixed(Vec<SampleCount>);

  impl SampleBackend for Fixed {
    fn name(&self) -> &str {
      "fixed"
    }

    fn sample(
      &self,
      _qubo: &QuboMatrix,
      _constraint: Option<&LinearEquality>,
      _shots: usize,
    ) -> anyhow::Result<Vec<SampleCount>> {
      Ok(self.0.clone())
    }
  }

  struct Slow;

  impl SampleBackend for Slow {
    fn name(&self) -> &str {
      "slow"
    }

    fn sample(
      &self,
      _qubo: &QuboMatrix,
      _constraint: Option<&LinearEquality>,
      _shots: usize,
    ) -> anyhow::Result<Vec<SampleCount>> {
      thread::sleep(Duration::from_millis(500));
      Ok(vec![])
    }
  }

  struct Broken;

  impl SampleBackend for Broken {
    fn name(&self) -> &str {
      "broken"
    }

    fn max_variables(&self) -> Option<usize> {
      Some(2)
    }

    fn sample(
      &self,
      _qubo: &QuboMatrix,
      _constraint: Option<&LinearEquality>,
      _shots: usize,
    ) -> anyhow::Result<Vec<SampleCount>> {
      Err(anyhow!("device offline"))
    }
  }

  fn sample(bits: &[u8], count: u64) -> SampleCount {
    SampleCount {
      bits: bits.to_vec(),
      count,
    }
  }

  fn qubo() -> QuboMatrix {
    QuboMatrix::new(array![[-1.0, 0.5], [0.5, -2.0]], 0.0).unwrap()
  }

  fn optimizer(backend: impl SampleBackend + 'static) -> SamplingOptimizer {
    SamplingOptimizer::new(Arc::new(backend), 100, Duration::from_secs(5))
  }

  #[test]
  fn most_frequent_sample_wins() {
    let backend = Fixed(vec![sample(&[0, 1], 10), sample(&[1, 0], 60), sample(&[1, 1], 30)]);

    let solution = optimizer(backend).solve(&qubo(), None).unwrap();

    assert_eq!(solution.x, vec![1, 0]);
    assert_eq!(solution.objective_value, -1.0);
    assert_eq!(solution.evaluations, 100);
  }

  #[test]
  fn lowest_energy_prefers_feasible_samples() {
    let backend = Fixed(vec![sample(&[1, 1], 50), sample(&[1, 0], 30), sample(&[0, 0], 20)]);
    let budget = LinearEquality::cardinality(2, 1);

    let solution = optimizer(backend)
      .with_selection(SampleSelection::LowestEnergy)
      .solve(&qubo(), Some(&budget))
      .unwrap();

    // [1, 1] has energy -2.5 but violates the budget
    assert_eq!(solution.x, vec![1, 0]);
  }

  #[test]
  fn empty_result_is_no_samples() {
    let err = optimizer(Fixed(vec![sample(&[0, 1], 0)]))
      .solve(&qubo(), None)
      .unwrap_err();

    assert!(matches!(err, OptimizationError::NoSamples { .. }));
    assert_eq!(err.strategy(), "sampler:fixed");
  }

  #[test]
  fn non_canonical_samples_are_rejected() {
    let short = optimizer(Fixed(vec![sample(&[1], 5)])).solve(&qubo(), None);
    let non_binary = optimizer(Fixed(vec![sample(&[2, 0], 5)])).solve(&qubo(), None);

    assert!(matches!(short, Err(OptimizationError::Backend { .. })));
    assert!(matches!(non_binary, Err(OptimizationError::Backend { .. })));
  }

  #[test]
  fn slow_backend_times_out() {
    let optimizer = SamplingOptimizer::new(Arc::new(Slow), 10, Duration::from_millis(20));

    let err = optimizer.solve(&qubo(), None).unwrap_err();

    assert!(matches!(err, OptimizationError::Timeout { timeout_ms: 20, .. }));
  }

  #[test]
  fn backend_failure_keeps_its_cause() {
    let err = optimizer(Broken).solve(&qubo(), None).unwrap_err();
    let cause = std::error::Error::source(&err).map(|e| e.to_string());
    assert_eq!(cause.as_deref(), Some("device offline"));

    let large = QuboMatrix::new(ndarray::Array2::zeros((3, 3)), 0.0).unwrap();
    assert!(matches!(
      optimizer(Broken).solve(&large, None),
      Err(OptimizationError::ProblemTooLarge { limit: 2, .. })
    ));
  }
}

use tracing::debug;

use super::BinaryOptimizer;
use super::BinarySolution;
use super::bits_from_mask;
use super::check_constraint;
use crate::error::OptimizationError;
use crate::qubo::LinearEquality;
use crate::qubo::QuboMatrix;

/// Largest problem the bit-mask enumeration can address.
pub const MAX_VARIABLES: usize = 63;

/// Exact minimisation by enumeration.
///
/// With a cardinality constraint only the `C(N, B)` feasible assignments are
/// visited, otherwise all `2^N`. Ties keep the first assignment in increasing
/// bit-mask order, so the result is deterministic.
#[derive(Clone, Debug)]
pub struct ExhaustiveOptimizer {
  name: String,
  max_evaluations: u64,
}

impl ExhaustiveOptimizer {
  /// `max_evaluations` caps the number of assignments the search may visit.
  pub fn new(max_evaluations: u64) -> Self {
    Self {
      name: "exhaustive".to_string(),
      max_evaluations,
    }
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  fn check_budget(&self, required: u128) -> Result<(), OptimizationError> {
    if required > u128::from(self.max_evaluations) {
      return Err(OptimizationError::BudgetExceeded {
        strategy: self.name.clone(),
        required,
        budget: self.max_evaluations,
      });
    }
    Ok(())
  }
}

/// `C(n, k)` without overflow for `n <= 63`.
pub fn binomial(n: usize, k: usize) -> u128 {
  if k > n {
    return 0;
  }
  let k = k.min(n - k);
  let mut c: u128 = 1;
  for i in 1..=k {
    c = c * (n - k + i) as u128 / i as u128;
  }
  c
}

/// Masks with exactly `k` of the low `n` bits set, in increasing order.
fn combinations(n: usize, k: usize) -> impl Iterator<Item = u64> {
  let limit = 1u64 << n;
  let first = if k == 0 { 0 } else { (1u64 << k) - 1 };
  let mut next = Some(first);
  std::iter::from_fn(move || {
    let mask = next?;
    next = if mask == 0 {
      None
    } else {
      // Gosper's hack
      let c = mask & mask.wrapping_neg();
      let r = mask + c;
      let m = (((r ^ mask) >> 2) / c) | r;
      (m < limit).then_some(m)
    };
    Some(mask)
  })
}

impl BinaryOptimizer for ExhaustiveOptimizer {
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
    if n > MAX_VARIABLES {
      return Err(OptimizationError::ProblemTooLarge {
        strategy: self.name.clone(),
        size: n,
        limit: MAX_VARIABLES,
      });
    }

    let mut best: Option<(u64, f64)> = None;
    let mut evaluations = 0u64;
    let mut visit = |mask: u64| {
      evaluations += 1;
      let e = qubo.energy_of_mask(mask);
      if best.map_or(true, |(_, b)| e < b) {
        best = Some((mask, e));
      }
    };

    match constraint {
      Some(c) => match c.cardinality_target() {
        Some(k) => {
          self.check_budget(binomial(n, k))?;
          combinations(n, k).for_each(&mut visit);
        }
        None => {
          self.check_budget(1u128 << n)?;
          (0..(1u64 << n))
            .filter(|&mask| c.is_satisfied(&bits_from_mask(mask, n)))
            .for_each(&mut visit);
        }
      },
      None => {
        self.check_budget(1u128 << n)?;
        (0..(1u64 << n)).for_each(&mut visit);
      }
    }

    let (mask, objective_value) = best.ok_or_else(|| OptimizationError::InvalidProblem {
      strategy: self.name.clone(),
      reason: "no assignment satisfies the constraint".to_string(),
    })?;

    debug!(strategy = %self.name, evaluations, objective_value, "exhaustive search finished");

    Ok(BinarySolution {
      x: bits_from_mask(mask, n),
      objective_value,
      evaluations,
    })
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::Array2;
  use ndarray::array;

  use super::*;
  use crate::qubo::QuboParams;
  use crate::qubo::build_qubo;

  #[test]
  fn combinations_enumerates_all_subsets_of_size_k() {
    let all: Vec<u64> = combinations(4, 2).collect();
    assert_eq!(all, vec![0b0011, 0b0101, 0b0110, 0b1001, 0b1010, 0b1100]);
    assert_eq!(combinations(3, 0).collect::<Vec<_>>(), vec![0]);
    assert_eq!(combinations(3, 3).collect::<Vec<_>>(), vec![0b111]);
    assert_eq!(binomial(7, 3), 35);
    assert_eq!(binomial(63, 31), 916_312_070_471_295_267);
  }

  #[test]
  fn three_assets_identity_covariance() {
    let mu = array![0.01, 0.0, 0.005];
    let sigma = Array2::eye(3);
    let qubo = build_qubo(&mu, &sigma, &QuboParams::new(2, 1.0, 0.01)).unwrap();
    let budget = LinearEquality::cardinality(3, 2);

    let solution = ExhaustiveOptimizer::new(1_000).solve(&qubo, Some(&budget)).unwrap();

    // E({i, j}) = 2 - 0.06 + 0.02 - (mu_i + mu_j)
    let candidates = [
      (vec![1, 1, 0], 1.96_f64 - 0.010),
      (vec![1, 0, 1], 1.96 - 0.015),
      (vec![0, 1, 1], 1.96 - 0.005),
    ];
    let (best_x, best_e) = candidates
      .iter()
      .min_by(|a, b| a.1.total_cmp(&b.1))
      .unwrap();

    assert_eq!(&solution.x, best_x);
    assert_eq!(solution.x, vec![1, 0, 1]);
    assert_abs_diff_eq!(solution.objective_value, *best_e, epsilon = 1e-12);
    assert_eq!(solution.evaluations, 3);
  }

  #[test]
  fn budget_one_prefers_better_return_for_risk() {
    let mu = array![0.02, 0.01];
    let sigma = array![[0.04, 0.0], [0.0, 0.01]];
    let qubo = build_qubo(&mu, &sigma, &QuboParams::new(1, 1.0, 1.0)).unwrap();

    let solution = ExhaustiveOptimizer::new(10)
      .solve(&qubo, Some(&LinearEquality::cardinality(2, 1)))
      .unwrap();

    // q sigma_ii - mu_i: 0.02 for asset 0, 0.0 for asset 1
    assert_eq!(solution.x, vec![0, 1]);
  }

  #[test]
  fn unconstrained_search_visits_every_assignment() {
    let qubo = QuboMatrix::new(array![[-1.0, 2.0], [2.0, -1.5]], 0.0).unwrap();

    let solution = ExhaustiveOptimizer::new(4).solve(&qubo, None).unwrap();

    assert_eq!(solution.x, vec![0, 1]);
    assert_eq!(solution.evaluations, 4);
    assert_abs_diff_eq!(solution.objective_value, -1.5);
  }

  #[test]
  fn general_equality_filters_assignments() {
    let qubo = QuboMatrix::new(Array2::from_diag(&array![-1.0, -1.0, -3.0]), 0.0).unwrap();
    let c = LinearEquality::new(vec![1.0, 1.0, 2.0], 2.0).unwrap();

    let solution = ExhaustiveOptimizer::new(8).solve(&qubo, Some(&c)).unwrap();
    assert_eq!(solution.x, vec![0, 0, 1]);

    let impossible = LinearEquality::new(vec![1.0, 1.0, 1.0], 0.5).unwrap();
    assert!(matches!(
      ExhaustiveOptimizer::new(8).solve(&qubo, Some(&impossible)),
      Err(OptimizationError::InvalidProblem { .. })
    ));
  }

  #[test]
  fn refuses_search_beyond_budget() {
    let qubo = QuboMatrix::new(Array2::zeros((10, 10)), 0.0).unwrap();

    let err = ExhaustiveOptimizer::new(100)
      .with_name("ground-truth")
      .solve(&qubo, Some(&LinearEquality::cardinality(10, 5)))
      .unwrap_err();

    match err {
      OptimizationError::BudgetExceeded {
        strategy,
        required,
        budget,
      } => {
        assert_eq!(strategy, "ground-truth");
        assert_eq!(required, 252);
        assert_eq!(budget, 100);
      }
      other => panic!("unexpected error {other:?}"),
    }
  }

  #[test]
  fn constraint_length_must_match() {
    let qubo = QuboMatrix::new(Array2::zeros((3, 3)), 0.0).unwrap();
    assert!(matches!(
      ExhaustiveOptimizer::new(100).solve(&qubo, Some(&LinearEquality::cardinality(2, 1))),
      Err(OptimizationError::InvalidProblem { .. })
    ));
  }
}

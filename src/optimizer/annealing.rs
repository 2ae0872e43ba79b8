use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use rayon::prelude::*;
use tracing::debug;

use super::BinaryOptimizer;
use super::BinarySolution;
use super::check_constraint;
use crate::error::OptimizationError;
use crate::qubo::LinearEquality;
use crate::qubo::QuboMatrix;

/// Simulated annealing over binary assignments with geometric cooling.
///
/// Under a cardinality constraint the walk starts from a random feasible
/// subset and only swaps a selected asset for an unselected one, so every
/// visited state is feasible. Otherwise single bits are flipped and, for a
/// general equality, the best feasible state visited is kept.
///
/// Independent restarts run in parallel; with a seed, restart `r` uses
/// `seed + r` and the result is reproducible.
#[derive(Clone, Debug)]
pub struct SimulatedAnnealing {
  name: String,
  max_iterations: u64,
  restarts: usize,
  initial_temperature: Option<f64>,
  final_temperature: Option<f64>,
  seed: Option<u64>,
}

impl SimulatedAnnealing {
  /// `max_iterations` is the move budget of each restart.
  pub fn new(max_iterations: u64) -> Self {
    Self {
      name: "simulated-annealing".to_string(),
      max_iterations,
      restarts: 4,
      initial_temperature: None,
      final_temperature: None,
      seed: None,
    }
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  pub fn with_restarts(mut self, restarts: usize) -> Self {
    self.restarts = restarts;
    self
  }

  /// Fix the cooling schedule. By default it starts at a bound on the energy
  /// change of one move and ends four orders of magnitude lower.
  pub fn with_temperatures(mut self, initial: f64, final_temperature: f64) -> Self {
    self.initial_temperature = Some(initial);
    self.final_temperature = Some(final_temperature);
    self
  }

  pub fn with_seed(mut self, seed: u64) -> Self {
    self.seed = Some(seed);
    self
  }

  fn schedule(&self, qubo: &QuboMatrix, cardinality: Option<usize>) -> Result<(f64, f64), OptimizationError> {
    let scale = match cardinality {
      Some(k) => swap_scale(qubo, k),
      None => qubo
        .coefficients()
        .iter()
        .fold(0.0_f64, |m, v| m.max(v.abs())),
    }
    .max(f64::EPSILON);
    let t0 = self.initial_temperature.unwrap_or(scale);
    let t1 = self.final_temperature.unwrap_or(t0 * 1e-4);
    if !(t0.is_finite() && t1.is_finite() && t0 > 0.0 && t1 > 0.0 && t1 <= t0) {
      return Err(self.invalid(format!("invalid temperature schedule {t0} -> {t1}")));
    }
    Ok((t0, t1))
  }

  fn invalid(&self, reason: String) -> OptimizationError {
    OptimizationError::InvalidProblem {
      strategy: self.name.clone(),
      reason,
    }
  }

  fn rng(&self, restart: usize) -> StdRng {
    match self.seed {
      Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(restart as u64)),
      None => StdRng::from_entropy(),
    }
  }
}

struct Walk<'a> {
  qubo: &'a QuboMatrix,
  constraint: Option<&'a LinearEquality>,
  t0: f64,
  cooling: f64,
  steps: u64,
}

impl Walk<'_> {
  fn accept(rng: &mut StdRng, delta: f64, temperature: f64) -> bool {
    delta <= 0.0 || rng.gen::<f64>() < (-delta / temperature).exp()
  }

  /// Swap moves inside the `sum x = k` slice.
  fn swaps(&self, rng: &mut StdRng, k: usize) -> Option<(Vec<u8>, f64)> {
    let n = self.qubo.size();
    let mut x = vec![0u8; n];
    for i in index::sample(rng, n, k) {
      x[i] = 1;
    }
    let mut energy = self.qubo.evaluate(&x);
    let mut best = (x.clone(), energy);
    if k == 0 || k == n {
      return Some(best);
    }

    let mut temperature = self.t0;
    for _ in 0..self.steps {
      let out = pick(rng, &x, 1);
      let inn = pick(rng, &x, 0);
      let mut delta = self.qubo.flip_delta(&x, out);
      x[out] = 0;
      delta += self.qubo.flip_delta(&x, inn);
      x[inn] = 1;

      if Self::accept(rng, delta, temperature) {
        energy += delta;
        if energy < best.1 {
          best = (x.clone(), energy);
        }
      } else {
        x[inn] = 0;
        x[out] = 1;
      }
      temperature *= self.cooling;
    }
    Some(best)
  }

  /// Single-bit flips, tracking the best state that satisfies the constraint.
  fn flips(&self, rng: &mut StdRng) -> Option<(Vec<u8>, f64)> {
    let n = self.qubo.size();
    let feasible = |x: &[u8]| self.constraint.map_or(true, |c| c.is_satisfied(x));

    let mut x: Vec<u8> = (0..n).map(|_| u8::from(rng.gen::<bool>())).collect();
    let mut energy = self.qubo.evaluate(&x);
    let mut best = feasible(&x).then(|| (x.clone(), energy));

    let mut temperature = self.t0;
    for _ in 0..self.steps {
      let k = rng.gen_range(0..n);
      let delta = self.qubo.flip_delta(&x, k);
      if Self::accept(rng, delta, temperature) {
        x[k] ^= 1;
        energy += delta;
        if best.as_ref().map_or(true, |(_, b)| energy < *b) && feasible(&x) {
          best = Some((x.clone(), energy));
        }
      }
      temperature *= self.cooling;
    }
    best
  }
}

/// Upper bound of `|delta|` for a swap inside the `sum x = k` slice.
///
/// Swapping `i` out and `j` in changes the energy by
/// `Q_jj - Q_ii + sum_{l in S \ i} (Q_jl - Q_il)`, so only the spreads of the
/// diagonal and of the off-diagonal entries matter. A cardinality penalty adds
/// the same amount to every diagonal and every off-diagonal entry and drops out.
fn swap_scale(qubo: &QuboMatrix, k: usize) -> f64 {
  let n = qubo.size();
  let mut diagonal = (f64::INFINITY, f64::NEG_INFINITY);
  let mut coupling = (f64::INFINITY, f64::NEG_INFINITY);
  for i in 0..n {
    let d = qubo.get(i, i);
    diagonal = (diagonal.0.min(d), diagonal.1.max(d));
    for j in (i + 1)..n {
      let c = qubo.get(i, j);
      coupling = (coupling.0.min(c), coupling.1.max(c));
    }
  }
  let coupling_spread = if n > 1 { coupling.1 - coupling.0 } else { 0.0 };
  (diagonal.1 - diagonal.0) + k.saturating_sub(1) as f64 * coupling_spread
}

/// Uniformly pick an index whose bit equals `value`.
fn pick(rng: &mut StdRng, x: &[u8], value: u8) -> usize {
  let count = x.iter().filter(|&&b| b == value).count();
  let target = rng.gen_range(0..count);
  x.iter()
    .enumerate()
    .filter(|(_, b)| **b == value)
    .nth(target)
    .map_or(0, |(i, _)| i)
}

impl BinaryOptimizer for SimulatedAnnealing {
  fn name(&self) -> &str {
    &self.name
  }

  fn solve(
    &self,
    qubo: &QuboMatrix,
    constraint: Option<&LinearEquality>,
  ) -> Result<BinarySolution, OptimizationError> {
    check_constraint(&self.name, qubo, constraint)?;
    if self.max_iterations == 0 || self.restarts == 0 {
      return Err(self.invalid("iteration budget and restarts must be positive".to_string()));
    }
    let cardinality = constraint.and_then(LinearEquality::cardinality_target);
    let (t0, t1) = self.schedule(qubo, cardinality)?;
    let walk = Walk {
      qubo,
      constraint,
      t0,
      cooling: (t1 / t0).powf(1.0 / self.max_iterations as f64),
      steps: self.max_iterations,
    };

    let best = (0..self.restarts)
      .into_par_iter()
      .filter_map(|r| {
        let mut rng = self.rng(r);
        match cardinality {
          Some(k) => walk.swaps(&mut rng, k),
          None => walk.flips(&mut rng),
        }
      })
      .map(|(x, _)| {
        let e = qubo.evaluate(&x);
        (x, e)
      })
      .min_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
      .ok_or_else(|| self.invalid("no feasible assignment visited".to_string()))?;

    let evaluations = self.max_iterations * self.restarts as u64;
    debug!(strategy = %self.name, evaluations, objective_value = best.1, "annealing finished");

    Ok(BinarySolution {
      x: best.0,
      objective_value: best.1,
      evaluations,
    })
  }
}

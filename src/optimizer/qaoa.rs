//! # QAOA
//!
//! $$
//! |\gamma,\beta\rangle = \prod_{l=1}^{p} e^{-i\beta_l \sum_k X_k}\, e^{-i\gamma_l \hat E}\, |+\rangle^{\otimes N}
//! $$
//!
//! Exact state-vector simulation of the alternating operator ansatz. The
//! `2p` angles minimise `<E>` with Nelder-Mead, then the optimised state is
//! sampled and the best sampled assignment is returned.

use std::f64::consts::FRAC_PI_2;
use std::f64::consts::PI;

use anyhow::anyhow;
use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::State;
use argmin::solver::neldermead::NelderMead;
use num_complex::Complex64;
use rand::SeedableRng;
use rand::distributions::WeightedIndex;
use rand::rngs::StdRng;
use rand_distr::Distribution;
use rand_distr::Uniform;
use tracing::debug;

use super::BinaryOptimizer;
use super::BinarySolution;
use super::bits_from_mask;
use super::check_constraint;
use crate::error::OptimizationError;
use crate::qubo::LinearEquality;
use crate::qubo::QuboMatrix;

/// Default qubit limit of the simulator (a `2^16` amplitude state vector).
pub const DEFAULT_MAX_QUBITS: usize = 16;

/// Variational QAOA on a simulated state vector.
#[derive(Clone, Debug)]
pub struct QaoaOptimizer {
  name: String,
  layers: usize,
  max_iterations: u64,
  shots: usize,
  max_qubits: usize,
  seed: Option<u64>,
}

impl QaoaOptimizer {
  /// `layers` is the ansatz depth `p`, `max_iterations` caps the classical
  /// parameter search.
  pub fn new(layers: usize, max_iterations: u64) -> Self {
    Self {
      name: "qaoa".to_string(),
      layers,
      max_iterations,
      shots: 1024,
      max_qubits: DEFAULT_MAX_QUBITS,
      seed: None,
    }
  }

  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  pub fn with_shots(mut self, shots: usize) -> Self {
    self.shots = shots;
    self
  }

  pub fn with_max_qubits(mut self, max_qubits: usize) -> Self {
    self.max_qubits = max_qubits;
    self
  }

  pub fn with_seed(mut self, seed: u64) -> Self {
    self.seed = Some(seed);
    self
  }

  fn convergence(&self, source: anyhow::Error) -> OptimizationError {
    OptimizationError::Convergence {
      strategy: self.name.clone(),
      source,
    }
  }

  fn rng(&self) -> StdRng {
    match self.seed {
      Some(seed) => StdRng::seed_from_u64(seed),
      None => StdRng::from_entropy(),
    }
  }
}

/// Apply the ansatz with `params = [gamma_1..gamma_p, beta_1..beta_p]` to `|+>^n`.
fn evolve(phases: &[f64], n: usize, params: &[f64]) -> Vec<Complex64> {
  let dim = phases.len();
  let layers = params.len() / 2;
  let mut psi = vec![Complex64::new(1.0 / (dim as f64).sqrt(), 0.0); dim];

  for l in 0..layers {
    let (gamma, beta) = (params[l], params[layers + l]);
    for (a, &e) in psi.iter_mut().zip(phases) {
      *a *= Complex64::from_polar(1.0, -gamma * e);
    }

    // exp(-i beta X) = cos(beta) I - i sin(beta) X on every qubit
    let c = Complex64::new(beta.cos(), 0.0);
    let s = Complex64::new(0.0, -beta.sin());
    for q in 0..n {
      let bit = 1usize << q;
      for k in (0..dim).filter(|k| k & bit == 0) {
        let (a, b) = (psi[k], psi[k | bit]);
        psi[k] = c * a + s * b;
        psi[k | bit] = s * a + c * b;
      }
    }
  }
  psi
}

/// Shift and width mapping the feasible energies onto `[0, 1]`.
///
/// A uniform shift is a global phase. Scaling by the feasible spread keeps the
/// angle ranges independent of the penalty, which is constant on feasible
/// states and only moves infeasible ones.
fn phase_scale(energies: &[f64], feasible: impl Fn(usize) -> bool) -> (f64, f64) {
  let bounds = |keep: &dyn Fn(usize) -> bool| {
    energies
      .iter()
      .enumerate()
      .filter(|(m, _)| keep(*m))
      .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, &e)| (lo.min(e), hi.max(e)))
  };
  let (mut lo, mut hi) = bounds(&feasible);
  if !lo.is_finite() {
    (lo, hi) = bounds(&|_| true);
  }
  (lo, (hi - lo).max(f64::EPSILON))
}

struct ExpectationCost {
  phases: Vec<f64>,
  qubits: usize,
}

impl CostFunction for ExpectationCost {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    let psi = evolve(&self.phases, self.qubits, x);
    Ok(psi.iter().zip(&self.phases).map(|(a, e)| a.norm_sqr() * e).sum())
  }
}

impl BinaryOptimizer for QaoaOptimizer {
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
    if n > self.max_qubits {
      return Err(OptimizationError::ProblemTooLarge {
        strategy: self.name.clone(),
        size: n,
        limit: self.max_qubits,
      });
    }
    if self.layers == 0 || self.shots == 0 {
      return Err(OptimizationError::InvalidProblem {
        strategy: self.name.clone(),
        reason: "layers and shots must be positive".to_string(),
      });
    }

    let energies: Vec<f64> = (0..(1u64 << n)).map(|m| qubo.energy_of_mask(m)).collect();
    let feasible = |m: usize| constraint.map_or(true, |c| c.is_satisfied(&bits_from_mask(m as u64, n)));
    let (low, scale) = phase_scale(&energies, &feasible);
    let phases: Vec<f64> = energies.iter().map(|e| (e - low) / scale).collect();
    let cost = ExpectationCost {
      phases: phases.clone(),
      qubits: n,
    };

    let mut rng = self.rng();
    let p = self.layers;
    let mut x0 = Vec::with_capacity(2 * p);
    x0.extend(Uniform::new(0.0, PI).sample_iter(&mut rng).take(p));
    x0.extend(Uniform::new(0.0, FRAC_PI_2).sample_iter(&mut rng).take(p));

    let mut simplex = Vec::with_capacity(2 * p + 1);
    simplex.push(x0.clone());
    for i in 0..2 * p {
      let mut point = x0.clone();
      point[i] += 0.25;
      simplex.push(point);
    }

    let solver = NelderMead::new(simplex)
      .with_sd_tolerance(1e-8)
      .map_err(|e| self.convergence(e))?;
    let res = Executor::new(cost, solver)
      .configure(|state| state.max_iters(self.max_iterations))
      .run()
      .map_err(|e| self.convergence(e))?;

    let iterations = res.state.get_iter();
    let expectation = res.state.get_best_cost();
    let params = res
      .state
      .best_param
      .ok_or_else(|| self.convergence(anyhow!("no parameters evaluated")))?;
    if !expectation.is_finite() || params.iter().any(|v| !v.is_finite()) {
      return Err(self.convergence(anyhow!("non-finite expectation {expectation}")));
    }

    let probabilities: Vec<f64> = evolve(&phases, n, &params)
      .iter()
      .map(|a| a.norm_sqr())
      .collect();
    let dist = WeightedIndex::new(&probabilities).map_err(|e| self.convergence(e.into()))?;

    let mut counts = vec![0u64; energies.len()];
    for _ in 0..self.shots {
      counts[dist.sample(&mut rng)] += 1;
    }

    let sampled: Vec<usize> = (0..counts.len()).filter(|&m| counts[m] > 0).collect();
    // lowest energy first, then the most frequent
    let order = |a: &&usize, b: &&usize| {
      energies[**a]
        .total_cmp(&energies[**b])
        .then_with(|| counts[**b].cmp(&counts[**a]))
    };
    let best = sampled
      .iter()
      .filter(|&&m| feasible(m))
      .min_by(order)
      .or_else(|| sampled.iter().min_by(order))
      .copied()
      .ok_or_else(|| OptimizationError::NoSamples {
        strategy: self.name.clone(),
      })?;

    debug!(
      strategy = %self.name,
      iterations,
      expectation = expectation * scale + low,
      feasible = feasible(best),
      "qaoa finished"
    );

    Ok(BinarySolution {
      x: bits_from_mask(best as u64, n),
      objective_value: energies[best],
      evaluations: iterations,
    })
  }
}

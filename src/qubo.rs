//! # QUBO
//!
//! $$
//! Q_{ii} = q\,\Sigma_{ii} - \mu_i + \lambda(1-2B),\qquad
//! Q_{ij} = q\,\Sigma_{ij} + 2\lambda\quad(i\neq j)
//! $$
//!
//! Cardinality-constrained mean-variance selection as a quadratic binary
//! objective, the explicit budget constraint, and the equivalent Ising form.

pub mod builder;
pub mod constraint;
pub mod ising;
pub mod matrix;

pub use builder::build_qubo;
pub use builder::QuboParams;
pub use constraint::encode;
pub use constraint::ConstraintEncoding;
pub use constraint::LinearEquality;
pub use constraint::QuadraticProgram;
pub use ising::IsingModel;
pub use matrix::QuboMatrix;

//! # qubo-portfolio
//!
//! $$
//! \min_{x\in\{0,1\}^N}\; q\,x^\top\Sigma x-\mu^\top x+\lambda\Big(\sum_i x_i-B\Big)^2
//! $$
//!
//! Cardinality-constrained mean-variance asset selection as a QUBO: price
//! series in, return moments, the penalised QUBO and its constraint, a set of
//! interchangeable binary optimizers, and a decoded portfolio report out.

pub mod analysis;
pub mod comparison;
pub mod data;
pub mod error;
pub mod estimator;
pub mod optimizer;
pub mod pipeline;
pub mod qubo;

pub use analysis::PortfolioReport;
pub use analysis::SolutionAnalyzer;
pub use comparison::ComparisonSummary;
pub use data::AssetUniverse;
pub use data::PriceData;
pub use data::PriceSeries;
pub use error::OptimizationError;
pub use error::PortfolioError;
pub use error::Result;
pub use optimizer::BinaryOptimizer;
pub use optimizer::BinarySolution;
pub use pipeline::run_comparison;
pub use pipeline::run_pipeline;
pub use pipeline::PipelineConfig;
pub use pipeline::PortfolioPipeline;

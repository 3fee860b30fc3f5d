//! lagwatch engine - Freshness evaluation over an asset graph
//!
//! This crate ties policies to the graph they live in:
//! - Data-time propagation from root ancestors
//! - Per-asset freshness evaluation and diagnostics
//! - Partition coverage checks

pub mod data_time;
pub mod freshness_evaluator;
pub mod partition_check;

pub use data_time::DataTimeResolver;
pub use freshness_evaluator::{AssetFreshness, EvaluationError, FreshnessEvaluation, FreshnessEvaluator};
pub use partition_check::PartitionCoverage;

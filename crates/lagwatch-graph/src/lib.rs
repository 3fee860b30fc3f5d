//! lagwatch graph - Asset snapshots and the asset dependency graph
//!
//! This crate loads an asset snapshot and builds the graph the freshness
//! engine walks:
//! - Snapshot parsing
//! - Dependency graph construction and traversal
//! - Near-miss suggestions for unresolved dependencies

pub mod graph;
pub mod similar;
pub mod snapshot;

pub use graph::{unresolved_dependencies, AssetGraph, GraphError};
pub use similar::{
    format_suggestions, resolve_similar_asset_keys, similarity_ratio, SimilarAssetIndex,
    DEFAULT_SIMILARITY_CUTOFF,
};
pub use snapshot::{AssetRecord, AssetSnapshot, SnapshotError};

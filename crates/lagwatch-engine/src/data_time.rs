//! Data-time propagation over the asset graph
//!
//! The data time of an asset with respect to a root ancestor is the
//! timestamp of the root's data that the asset's latest materialization
//! incorporates. It flows down the graph: each materialization inherits the
//! oldest root data among its parents as they stood when it ran.

use chrono::{DateTime, Utc};
use lagwatch_core::AssetKey;
use lagwatch_freshness::DataTimes;
use lagwatch_graph::AssetGraph;
use std::collections::{BTreeSet, HashMap};

type CacheKey = (AssetKey, AssetKey, DateTime<Utc>);

/// Resolves used and available data times as of one evaluation time
pub struct DataTimeResolver<'a> {
    graph: &'a AssetGraph,
    evaluation_time: DateTime<Utc>,
    used_cache: HashMap<CacheKey, Option<DateTime<Utc>>>,
    roots_cache: HashMap<AssetKey, BTreeSet<AssetKey>>,
}

impl<'a> DataTimeResolver<'a> {
    pub fn new(graph: &'a AssetGraph, evaluation_time: DateTime<Utc>) -> Self {
        Self {
            graph,
            evaluation_time,
            used_cache: HashMap::new(),
            roots_cache: HashMap::new(),
        }
    }

    pub fn evaluation_time(&self) -> DateTime<Utc> {
        self.evaluation_time
    }

    /// Root ancestors of `key`, memoized
    pub fn root_ancestors(&mut self, key: &AssetKey) -> BTreeSet<AssetKey> {
        if let Some(roots) = self.roots_cache.get(key) {
            return roots.clone();
        }
        let roots = self.graph.root_ancestors(key);
        self.roots_cache.insert(key.clone(), roots.clone());
        roots
    }

    /// Newest data that exists for `root`
    ///
    /// A source only has what has been observed; a materializable root can
    /// produce data for the evaluation time at any moment.
    pub fn available_data_time(&self, root: &AssetKey) -> Option<DateTime<Utc>> {
        let record = self.graph.node(root)?;
        if record.is_source {
            record.materialization_at_or_before(self.evaluation_time)
        } else {
            Some(self.evaluation_time)
        }
    }

    /// Available data time of every root ancestor of `key`
    pub fn available_data_times(&mut self, key: &AssetKey) -> DataTimes {
        self.root_ancestors(key)
            .into_iter()
            .map(|root| {
                let available = self.available_data_time(&root);
                (root, available)
            })
            .collect()
    }

    /// Data time of every root ancestor incorporated by `key` as of the
    /// evaluation time
    pub fn used_data_times(&mut self, key: &AssetKey) -> DataTimes {
        let evaluation_time = self.evaluation_time;
        self.root_ancestors(key)
            .into_iter()
            .map(|root| {
                let used = self.used_data_time(key, &root, evaluation_time);
                (root, used)
            })
            .collect()
    }

    /// Data time of `root` incorporated by the latest materialization of
    /// `asset` at or before `as_of`
    pub fn used_data_time(
        &mut self,
        asset: &AssetKey,
        root: &AssetKey,
        as_of: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let cache_key = (asset.clone(), root.clone(), as_of);
        if let Some(cached) = self.used_cache.get(&cache_key) {
            return *cached;
        }

        let resolved = self.resolve_used_data_time(asset, root, as_of);
        self.used_cache.insert(cache_key, resolved);
        resolved
    }

    fn resolve_used_data_time(
        &mut self,
        asset: &AssetKey,
        root: &AssetKey,
        as_of: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let graph = self.graph;
        let record = graph.node(asset)?;
        let materialization = record.materialization_at_or_before(as_of)?;

        if asset == root {
            return Some(materialization);
        }

        if record.latest_materialization() == Some(materialization) {
            if let Some(recorded) = record.recorded_data_time(root) {
                return recorded;
            }
        }

        let mut oldest: Option<DateTime<Utc>> = None;
        for parent in graph.parents(asset) {
            if parent != root && !self.root_ancestors(parent).contains(root) {
                continue;
            }

            let parent_time = self.used_data_time(parent, root, materialization);
            match parent_time {
                None => {
                    tracing::trace!(%asset, %parent, %root, "Parent has no data time for root");
                    return None;
                }
                Some(t) => oldest = Some(oldest.map_or(t, |current| current.min(t))),
            }
        }

        oldest
    }
}

//! Asset dependency graph (DAG) construction and traversal
//!
//! Builds forward and reverse dependency edges from a snapshot, resolving
//! every declared dependency against the assets the snapshot defines.

use lagwatch_core::AssetKey;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::similar::{format_suggestions, SimilarAssetIndex};
use crate::snapshot::{AssetRecord, AssetSnapshot};

/// Dependency graph with forward and reverse edges
#[derive(Debug, Clone)]
pub struct AssetGraph {
    /// Asset records by key
    nodes: HashMap<AssetKey, AssetRecord>,

    /// Forward edges: asset -> assets it depends on (parents)
    parents: HashMap<AssetKey, Vec<AssetKey>>,

    /// Reverse edges: asset -> assets that depend on it (children)
    children: HashMap<AssetKey, Vec<AssetKey>>,
}

impl AssetGraph {
    /// Build a graph from a snapshot
    ///
    /// Fails on duplicate keys, on dependencies that name no asset in the
    /// snapshot, and on cycles.
    pub fn from_snapshot(snapshot: &AssetSnapshot, similarity_cutoff: f64) -> Result<Self, GraphError> {
        if let Some(err) = unresolved_dependencies(snapshot, similarity_cutoff).into_iter().next() {
            return Err(err);
        }

        let mut nodes: HashMap<AssetKey, AssetRecord> = HashMap::new();
        let mut parents: HashMap<AssetKey, Vec<AssetKey>> = HashMap::new();
        let mut children: HashMap<AssetKey, Vec<AssetKey>> = HashMap::new();

        for record in &snapshot.assets {
            if nodes.insert(record.key.clone(), record.clone()).is_some() {
                return Err(GraphError::DuplicateAsset(record.key.clone()));
            }

            let mut deps: Vec<AssetKey> = Vec::new();
            for dep in &record.deps {
                if !deps.contains(dep) {
                    deps.push(dep.clone());
                }
            }

            for dep in &deps {
                children
                    .entry(dep.clone())
                    .or_default()
                    .push(record.key.clone());
            }
            parents.insert(record.key.clone(), deps);
        }

        let graph = Self {
            nodes,
            parents,
            children,
        };

        if graph.topological_sort().is_none() {
            return Err(GraphError::Cycle(graph.keys_on_cycles()));
        }

        tracing::debug!(assets = graph.nodes.len(), "Built asset graph");
        Ok(graph)
    }

    /// Get the record of an asset
    pub fn node(&self, key: &AssetKey) -> Option<&AssetRecord> {
        self.nodes.get(key)
    }

    /// Get all asset keys in ascending order
    pub fn all_keys(&self) -> Vec<&AssetKey> {
        let mut keys: Vec<&AssetKey> = self.nodes.keys().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get immediate parents (dependencies) of an asset
    pub fn parents(&self, key: &AssetKey) -> &[AssetKey] {
        self.parents.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Get immediate children (dependents) of an asset
    pub fn children(&self, key: &AssetKey) -> &[AssetKey] {
        self.children.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Get all downstream assets (transitive closure of children)
    pub fn downstream(&self, key: &AssetKey) -> Vec<AssetKey> {
        self.traverse(key, &self.children)
    }

    /// Get all upstream assets (transitive closure of parents)
    pub fn upstream(&self, key: &AssetKey) -> Vec<AssetKey> {
        self.traverse(key, &self.parents)
    }

    fn traverse(&self, key: &AssetKey, edges: &HashMap<AssetKey, Vec<AssetKey>>) -> Vec<AssetKey> {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<&AssetKey> = edges.get(key).into_iter().flatten().collect();
        let mut result = Vec::new();

        // BFS
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            result.push(current.clone());

            for next in edges.get(current).into_iter().flatten() {
                if !visited.contains(next) {
                    queue.push_back(next);
                }
            }
        }

        result
    }

    /// Ancestors with no parents of their own; a root is its own only root
    pub fn root_ancestors(&self, key: &AssetKey) -> BTreeSet<AssetKey> {
        if self.parents(key).is_empty() {
            return BTreeSet::from([key.clone()]);
        }

        self.upstream(key)
            .into_iter()
            .filter(|ancestor| self.parents(ancestor).is_empty())
            .collect()
    }

    /// Check if there's a path from `source` down to `target`
    pub fn has_path(&self, source: &AssetKey, target: &AssetKey) -> bool {
        source == target || self.downstream(source).contains(target)
    }

    /// Get topological sort of all assets, parents first
    ///
    /// Returns `None` when the graph has a cycle.
    pub fn topological_sort(&self) -> Option<Vec<AssetKey>> {
        let order = self.kahn_order();
        (order.len() == self.nodes.len()).then_some(order)
    }

    /// Kahn's algorithm; assets on or behind a cycle are left out
    fn kahn_order(&self) -> Vec<AssetKey> {
        let mut in_degree: HashMap<&AssetKey, usize> = self
            .nodes
            .keys()
            .map(|key| (key, self.parents(key).len()))
            .collect();

        // Seed in key order so the result is deterministic
        let mut ready: Vec<&AssetKey> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(key, _)| *key)
            .collect();
        ready.sort();
        let mut queue: VecDeque<&AssetKey> = ready.into();
        let mut result = Vec::with_capacity(self.nodes.len());

        while let Some(key) = queue.pop_front() {
            result.push(key.clone());

            for child in self.children(key) {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }

        result
    }

    fn keys_on_cycles(&self) -> Vec<AssetKey> {
        let ordered: HashSet<AssetKey> = self.kahn_order().into_iter().collect();
        let mut remaining: Vec<AssetKey> = self
            .nodes
            .keys()
            .filter(|key| !ordered.contains(*key))
            .cloned()
            .collect();
        remaining.sort();
        remaining
    }
}

/// Every dependency in the snapshot that names no asset, with suggestions
///
/// Candidates are indexed once, so this stays cheap for large snapshots.
pub fn unresolved_dependencies(snapshot: &AssetSnapshot, similarity_cutoff: f64) -> Vec<GraphError> {
    let known: HashSet<&AssetKey> = snapshot.assets.iter().map(|asset| &asset.key).collect();
    let mut index: Option<SimilarAssetIndex> = None;
    let mut errors = Vec::new();

    for record in &snapshot.assets {
        for dep in &record.deps {
            if known.contains(dep) {
                continue;
            }

            let index = index.get_or_insert_with(|| {
                SimilarAssetIndex::new(snapshot.assets.iter().map(|a| &a.key), similarity_cutoff)
            });
            let suggestions = index.similar_to(dep);
            tracing::warn!(asset = %record.key, dependency = %dep, "Unresolved asset dependency");

            errors.push(GraphError::UnresolvedDependency {
                asset: record.key.clone(),
                dependency: dep.clone(),
                suggestions,
            });
        }
    }

    errors
}

fn unresolved_message(dependency: &AssetKey, suggestions: &[AssetKey]) -> String {
    let mut message = format!(
        "Input asset \"{}\" is not produced by any of the provided assets and is not one of the provided sources.",
        dependency
    );
    if !suggestions.is_empty() {
        message.push_str(" Did you mean one of the following?\n\t");
        message.push_str(&format_suggestions(suggestions));
    }
    message
}

/// Asset graph errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("Asset \"{0}\" is defined more than once")]
    DuplicateAsset(AssetKey),

    #[error("{}", unresolved_message(.dependency, .suggestions))]
    UnresolvedDependency {
        asset: AssetKey,
        dependency: AssetKey,
        suggestions: Vec<AssetKey>,
    },

    #[error("Asset dependencies form a cycle through: {}", format_suggestions(.0))]
    Cycle(Vec<AssetKey>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(key: &str, deps: &[&str]) -> AssetRecord {
        let mut record = AssetRecord::new(AssetKey::from(key));
        record.deps = deps.iter().map(|d| AssetKey::from(*d)).collect();
        record
    }

    fn snapshot(records: Vec<AssetRecord>) -> AssetSnapshot {
        AssetSnapshot {
            evaluated_at: None,
            assets: records,
        }
    }

    fn diamond() -> AssetGraph {
        let snap = snapshot(vec![
            record("root", &[]),
            record("left", &["root"]),
            record("right", &["root"]),
            record("sink", &["left", "right"]),
        ]);
        AssetGraph::from_snapshot(&snap, 0.8).unwrap()
    }

    #[test]
    fn edges_in_both_directions() {
        let graph = diamond();
        assert_eq!(graph.parents(&AssetKey::from("sink")), &keys(&["left", "right"])[..]);
        assert_eq!(graph.children(&AssetKey::from("root")), &keys(&["left", "right"])[..]);
        assert!(graph.parents(&AssetKey::from("root")).is_empty());
    }

    fn keys(raw: &[&str]) -> Vec<AssetKey> {
        raw.iter().map(|k| AssetKey::from(*k)).collect()
    }

    #[test]
    fn transitive_closures() {
        let graph = diamond();
        let mut upstream = graph.upstream(&AssetKey::from("sink"));
        upstream.sort();
        assert_eq!(upstream, keys(&["left", "right", "root"]));

        let mut downstream = graph.downstream(&AssetKey::from("root"));
        downstream.sort();
        assert_eq!(downstream, keys(&["left", "right", "sink"]));

        assert!(graph.has_path(&AssetKey::from("root"), &AssetKey::from("sink")));
        assert!(!graph.has_path(&AssetKey::from("sink"), &AssetKey::from("root")));
    }

    #[test]
    fn root_ancestors_of_root_is_itself() {
        let graph = diamond();
        let roots: Vec<_> = graph.root_ancestors(&AssetKey::from("root")).into_iter().collect();
        assert_eq!(roots, keys(&["root"]));

        let roots: Vec<_> = graph.root_ancestors(&AssetKey::from("sink")).into_iter().collect();
        assert_eq!(roots, keys(&["root"]));
    }

    #[test]
    fn topological_order_puts_parents_first() {
        let order = diamond().topological_sort().unwrap();
        assert_eq!(order.first(), Some(&AssetKey::from("root")));
        assert_eq!(order.last(), Some(&AssetKey::from("sink")));
    }

    #[test]
    fn cycle_is_rejected() {
        let snap = snapshot(vec![record("a", &["b"]), record("b", &["a"]), record("c", &[])]);
        let err = AssetGraph::from_snapshot(&snap, 0.8).unwrap_err();
        assert_eq!(err, GraphError::Cycle(keys(&["a", "b"])));
    }

    #[test]
    fn duplicate_is_rejected() {
        let snap = snapshot(vec![record("a", &[]), record("a", &[])]);
        let err = AssetGraph::from_snapshot(&snap, 0.8).unwrap_err();
        assert_eq!(err, GraphError::DuplicateAsset(AssetKey::from("a")));
    }

    #[test]
    fn unresolved_dependency_message() {
        let snap = snapshot(vec![
            record("asset1", &[]),
            record("assets1", &[]),
            record("asst", &[]),
            record("downstream", &["asst1"]),
        ]);
        let err = AssetGraph::from_snapshot(&snap, 0.8).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Input asset \"asst1\" is not produced by any of the provided assets and is not one \
             of the provided sources. Did you mean one of the following?\n\tasset1, assets1, asst"
        );
    }

    #[test]
    fn unresolved_dependency_without_suggestions() {
        let snap = snapshot(vec![record("a", &[]), record("downstream", &["zzz"])]);
        let err = AssetGraph::from_snapshot(&snap, 0.8).unwrap_err();
        assert!(!err.to_string().contains("Did you mean"));
    }
}

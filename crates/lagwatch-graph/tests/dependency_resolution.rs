//! Integration tests for snapshot loading and dependency resolution

use lagwatch_core::AssetKey;
use lagwatch_graph::{
    unresolved_dependencies, AssetGraph, AssetRecord, AssetSnapshot, GraphError,
    DEFAULT_SIMILARITY_CUTOFF,
};
use std::io::Write;
use std::time::{Duration, Instant};

fn record(key: AssetKey, deps: Vec<AssetKey>) -> AssetRecord {
    let mut record = AssetRecord::new(key);
    record.deps = deps;
    record
}

fn snapshot(assets: Vec<AssetRecord>) -> AssetSnapshot {
    AssetSnapshot {
        evaluated_at: None,
        assets,
    }
}

fn suggestions_for(assets: Vec<AssetRecord>, missing: &str) -> Vec<String> {
    let mut assets = assets;
    assets.push(record(AssetKey::from("consumer"), vec![AssetKey::from(missing)]));

    match AssetGraph::from_snapshot(&snapshot(assets), DEFAULT_SIMILARITY_CUTOFF) {
        Err(GraphError::UnresolvedDependency { suggestions, .. }) => {
            suggestions.iter().map(AssetKey::to_user_string).collect()
        }
        other => panic!("expected unresolved dependency, got {:?}", other.map(|g| g.len())),
    }
}

fn roots(keys: &[&str]) -> Vec<AssetRecord> {
    keys.iter().map(|k| record(AssetKey::from(*k), vec![])).collect()
}

#[test]
fn typo_in_name_suggests_siblings_in_ascending_order() {
    let found = suggestions_for(roots(&["a", "b", "c", "asst", "assets1", "asset1"]), "asst1");
    assert_eq!(found, vec!["asset1", "assets1", "asst"]);
}

#[test]
fn typo_in_prefix_suggests_namesake() {
    let found = suggestions_for(roots(&["my/prefix/asset1"]), "my/prfix/asset1");
    assert_eq!(found, vec!["my/prefix/asset1"]);
}

#[test]
fn dropped_prefix_segment_suggests_namesake() {
    let found = suggestions_for(roots(&["my/prefix/asset1"]), "my/asset1");
    assert_eq!(found, vec!["my/prefix/asset1"]);
}

#[test]
fn extra_prefix_segment_suggests_namesake() {
    let found = suggestions_for(roots(&["my/prefix/asset1"]), "my/prefix/nested/asset1");
    assert_eq!(found, vec!["my/prefix/asset1"]);
}

#[test]
fn wrong_prefix_and_name_suggests_nothing() {
    let found = suggestions_for(roots(&["my/prefix/asset1"]), "my/prfix/asset4");
    assert!(found.is_empty());

    let err = AssetGraph::from_snapshot(
        &snapshot(vec![
            record(AssetKey::from("my/prefix/asset1"), vec![]),
            record(AssetKey::from("consumer"), vec![AssetKey::from("my/prfix/asset4")]),
        ]),
        DEFAULT_SIMILARITY_CUTOFF,
    )
    .unwrap_err();
    assert!(!err.to_string().contains("Did you mean"));
}

#[test]
fn every_unresolved_dependency_is_reported() {
    let snap = snapshot(vec![
        record(AssetKey::from("orders"), vec![]),
        record(AssetKey::from("report"), vec![AssetKey::from("ordrs"), AssetKey::from("custmers")]),
    ]);
    let errors = unresolved_dependencies(&snap, DEFAULT_SIMILARITY_CUTOFF);
    assert_eq!(errors.len(), 2);
    assert!(errors[0].to_string().contains("Did you mean one of the following?\n\torders"));
}

#[test]
fn suggestions_over_5000_assets_are_fast() {
    let prefix = ["warehouse", "staging"];
    let mut assets: Vec<AssetRecord> = (0..5000)
        .map(|i| {
            let name = format!("asset_{}", i);
            record(AssetKey::new([prefix[0], prefix[1], name.as_str()]), vec![])
        })
        .collect();
    assets.push(record(
        AssetKey::from("consumer"),
        vec![AssetKey::from("warehouse/staging/aset_4999")],
    ));
    let snap = snapshot(assets);

    let started = Instant::now();
    let err = AssetGraph::from_snapshot(&snap, DEFAULT_SIMILARITY_CUTOFF).unwrap_err();
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_millis(300), "took {:?}", elapsed);
    match err {
        GraphError::UnresolvedDependency { suggestions, .. } => {
            assert!(suggestions.contains(&AssetKey::from("warehouse/staging/asset_4999")));
        }
        other => panic!("unexpected error {}", other),
    }
}

#[test]
fn snapshot_file_round_trip() {
    let json = r#"{
        "assets": [
            {"key": ["raw", "events"], "is_source": true, "materializations": ["2023-03-01T00:00:00Z"]},
            {"key": ["daily"], "deps": [["raw", "events"]],
             "freshness_policy": {"maximum_lag_minutes": 30, "cron_schedule": "0 * * * *"}}
        ]
    }"#;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();

    let snap = AssetSnapshot::from_file(file.path()).unwrap();
    let graph = AssetGraph::from_snapshot(&snap, DEFAULT_SIMILARITY_CUTOFF).unwrap();

    assert_eq!(graph.len(), 2);
    assert_eq!(graph.parents(&AssetKey::from("daily")), &[AssetKey::new(["raw", "events"])]);
    let daily = graph.node(&AssetKey::from("daily")).unwrap();
    assert_eq!(
        daily.freshness_policy.as_ref().and_then(|p| p.cron_schedule()).map(|s| s.expression()),
        Some("0 * * * *")
    );
}

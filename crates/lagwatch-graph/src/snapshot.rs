//! Asset snapshot parsing
//!
//! A snapshot is a JSON document describing every asset in a deployment:
//! its dependencies, its freshness policy, the times it was materialized (or,
//! for sources, observed) and its partition state.

use chrono::{DateTime, Utc};
use lagwatch_core::AssetKey;
use lagwatch_freshness::FreshnessPolicy;
use lagwatch_partitions::PartitionsDefinition;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Snapshot of an asset deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSnapshot {
    /// Evaluation time to use when none is given on the command line
    #[serde(default)]
    pub evaluated_at: Option<DateTime<Utc>>,

    /// All known assets, sources included
    pub assets: Vec<AssetRecord>,
}

impl AssetSnapshot {
    /// Load snapshot from file
    pub fn from_file(path: &Path) -> Result<Self, SnapshotError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SnapshotError::IoError(path.display().to_string(), e.to_string()))?;

        Self::from_str(&contents)
    }

    /// Parse snapshot from JSON string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(json: &str) -> Result<Self, SnapshotError> {
        let mut snapshot: Self =
            serde_json::from_str(json).map_err(|e| SnapshotError::ParseError(e.to_string()))?;

        for asset in &mut snapshot.assets {
            if asset.key.is_empty() {
                return Err(SnapshotError::EmptyKey);
            }
            asset.materializations.sort();
        }

        Ok(snapshot)
    }

    /// Get a specific asset record
    pub fn get_asset(&self, key: &AssetKey) -> Option<&AssetRecord> {
        self.assets.iter().find(|asset| &asset.key == key)
    }

    /// Keys of every asset in the snapshot
    pub fn keys(&self) -> Vec<&AssetKey> {
        self.assets.iter().map(|asset| &asset.key).collect()
    }
}

/// One asset in the snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub key: AssetKey,

    /// Assets this asset reads from
    #[serde(default)]
    pub deps: Vec<AssetKey>,

    /// Externally produced; `materializations` are observation times
    #[serde(default)]
    pub is_source: bool,

    /// Materialization (or observation) timestamps, kept sorted ascending
    #[serde(default)]
    pub materializations: Vec<DateTime<Utc>>,

    #[serde(default)]
    pub freshness_policy: Option<FreshnessPolicy>,

    /// Data times recorded with the latest materialization, keyed by the
    /// user-facing form of the root asset key
    #[serde(default)]
    pub used_data_times: HashMap<String, Option<DateTime<Utc>>>,

    #[serde(default)]
    pub partitions: Option<PartitionsDefinition>,

    /// Serialized subset of materialized partitions
    #[serde(default)]
    pub materialized_partitions: Option<String>,
}

impl AssetRecord {
    /// A record with no dependencies or history
    pub fn new(key: AssetKey) -> Self {
        Self {
            key,
            deps: Vec::new(),
            is_source: false,
            materializations: Vec::new(),
            freshness_policy: None,
            used_data_times: HashMap::new(),
            partitions: None,
            materialized_partitions: None,
        }
    }

    pub fn latest_materialization(&self) -> Option<DateTime<Utc>> {
        self.materializations.last().copied()
    }

    /// Latest materialization at or before `as_of`
    pub fn materialization_at_or_before(&self, as_of: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let count = self.materializations.partition_point(|t| *t <= as_of);
        count.checked_sub(1).map(|index| self.materializations[index])
    }

    /// Explicitly recorded data time for `root`, if any
    ///
    /// The outer `Option` tells whether a value was recorded at all; the
    /// inner one is the recorded value, which may itself be unknown.
    pub fn recorded_data_time(&self, root: &AssetKey) -> Option<Option<DateTime<Utc>>> {
        self.used_data_times.get(&root.to_user_string()).copied()
    }
}

/// Snapshot loading errors
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Failed to read snapshot file {0}: {1}")]
    IoError(String, String),

    #[error("Failed to parse snapshot JSON: {0}")]
    ParseError(String),

    #[error("Snapshot contains an asset with an empty key")]
    EmptyKey,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    const SNAPSHOT: &str = r#"{
        "evaluated_at": "2023-03-01T12:00:00Z",
        "assets": [
            {"key": ["raw", "events"], "is_source": true,
             "materializations": ["2023-03-01T11:00:00Z", "2023-03-01T09:00:00Z"]},
            {"key": ["daily"], "deps": [["raw", "events"]],
             "materializations": ["2023-03-01T10:00:00Z"],
             "freshness_policy": {"maximum_lag_minutes": 60},
             "used_data_times": {"raw/events": "2023-03-01T09:00:00Z"},
             "partitions": {"type": "static", "keys": ["us", "eu"]},
             "materialized_partitions": "{\"version\":1,\"subset\":[\"us\"]}"}
        ]
    }"#;

    #[test]
    fn parse_snapshot() {
        let snapshot = AssetSnapshot::from_str(SNAPSHOT).unwrap();
        assert_eq!(snapshot.assets.len(), 2);
        assert_eq!(
            snapshot.evaluated_at,
            Some(Utc.with_ymd_and_hms(2023, 3, 1, 12, 0, 0).unwrap())
        );

        let daily = snapshot.get_asset(&AssetKey::from("daily")).unwrap();
        assert_eq!(daily.deps, vec![AssetKey::new(["raw", "events"])]);
        assert_eq!(daily.freshness_policy.as_ref().map(|p| p.maximum_lag_minutes()), Some(60.0));
        assert!(daily.partitions.is_some());
        assert_eq!(
            daily.recorded_data_time(&AssetKey::new(["raw", "events"])),
            Some(Some(Utc.with_ymd_and_hms(2023, 3, 1, 9, 0, 0).unwrap()))
        );
    }

    #[test]
    fn materializations_are_sorted() {
        let snapshot = AssetSnapshot::from_str(SNAPSHOT).unwrap();
        let events = snapshot.get_asset(&AssetKey::new(["raw", "events"])).unwrap();

        assert_eq!(
            events.latest_materialization(),
            Some(Utc.with_ymd_and_hms(2023, 3, 1, 11, 0, 0).unwrap())
        );
        assert_eq!(
            events.materialization_at_or_before(Utc.with_ymd_and_hms(2023, 3, 1, 10, 0, 0).unwrap()),
            Some(Utc.with_ymd_and_hms(2023, 3, 1, 9, 0, 0).unwrap())
        );
        assert_eq!(
            events.materialization_at_or_before(Utc.with_ymd_and_hms(2023, 3, 1, 8, 0, 0).unwrap()),
            None
        );
    }

    #[test]
    fn invalid_policy_is_a_parse_error() {
        let json = r#"{"assets": [{"key": ["a"], "freshness_policy": {"maximum_lag_minutes": 0}}]}"#;
        assert!(matches!(AssetSnapshot::from_str(json), Err(SnapshotError::ParseError(_))));
    }

    #[test]
    fn empty_key_is_rejected() {
        let json = r#"{"assets": [{"key": []}]}"#;
        assert!(matches!(AssetSnapshot::from_str(json), Err(SnapshotError::EmptyKey)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = AssetSnapshot::from_file(Path::new("/nonexistent/snapshot.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/snapshot.json"));
    }
}

//! Partition coverage checks
//!
//! Compares the partitions an asset defines with the persisted subset of
//! partitions it has materialized.

use chrono::{DateTime, Utc};
use lagwatch_core::{Diagnostic, DiagnosticCode, SeverityThreshold, Severity};
use lagwatch_graph::AssetRecord;

/// How many missing keys to spell out in a diagnostic message
const MAX_LISTED_KEYS: usize = 5;

/// Result of checking one asset's partitions
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionCoverage {
    /// Asset is not partitioned or has no persisted subset
    NotTracked,

    /// Every existing partition is materialized
    Complete { total: usize },

    /// Some existing partitions are not materialized
    Missing { total: usize, missing: Vec<String> },

    /// The persisted subset could not be read
    Undecodable(String),
}

impl PartitionCoverage {
    pub fn check(record: &AssetRecord, evaluation_time: DateTime<Utc>) -> Self {
        let (Some(definition), Some(serialized)) =
            (&record.partitions, &record.materialized_partitions)
        else {
            return Self::NotTracked;
        };

        let subset = match definition.deserialize_subset(serialized) {
            Ok(subset) => subset,
            Err(err) => {
                tracing::warn!(asset = %record.key, error = %err, "Cannot decode materialized partitions");
                return Self::Undecodable(err.to_string());
            }
        };

        let total = definition.get_partition_keys(evaluation_time).len();
        let missing = subset.get_partition_keys_not_in_subset(definition, evaluation_time);
        if missing.is_empty() {
            Self::Complete { total }
        } else {
            Self::Missing { total, missing }
        }
    }

    /// Diagnostic describing this coverage, if it is worth reporting
    pub fn to_diagnostic(&self, record: &AssetRecord, severity: &SeverityThreshold) -> Option<Diagnostic> {
        let asset = record.key.to_user_string();
        match self {
            Self::NotTracked | Self::Complete { .. } => None,
            Self::Missing { total, missing } => {
                let mut listed = missing
                    .iter()
                    .take(MAX_LISTED_KEYS)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ");
                if missing.len() > MAX_LISTED_KEYS {
                    listed.push_str(&format!(" and {} more", missing.len() - MAX_LISTED_KEYS));
                }

                let code = DiagnosticCode::PartitionsMissing;
                Some(
                    Diagnostic::new(
                        code,
                        severity.get_severity(code, Severity::Warn),
                        format!(
                            "Asset '{}' is missing {} of {} partitions: {}",
                            asset,
                            missing.len(),
                            total,
                            listed
                        ),
                    )
                    .with_asset(asset)
                    .with_comparison(format!("{} partitions", total), format!("{} partitions", total - missing.len())),
                )
            }
            Self::Undecodable(reason) => {
                let code = DiagnosticCode::PartitionsUndecodable;
                Some(
                    Diagnostic::new(
                        code,
                        severity.get_severity(code, Severity::Error),
                        format!("Materialized partitions of asset '{}' cannot be read: {}", asset, reason),
                    )
                    .with_asset(asset),
                )
            }
        }
    }
}

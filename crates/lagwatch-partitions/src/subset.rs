//! Partition subsets
//!
//! Subsets are persistent values: every "add keys" operation returns a new
//! subset. The persisted form carries a version tag so readers can refuse
//! layouts they do not understand instead of misreading keys.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::definition::PartitionsDefinition;
use crate::time_window::TimeWindowPartitionsSubset;

/// Fail unless an encoded version is the one this reader supports
pub(crate) fn check_serialization_version(version: i64, supported: i64) -> Result<(), SubsetError> {
    if version == supported {
        Ok(())
    } else {
        Err(SubsetError::InvalidDeserializationVersion { version, supported })
    }
}

/// Subset of any partitions definition, stored as an explicit key set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultPartitionsSubset {
    subset: BTreeSet<String>,
}

impl DefaultPartitionsSubset {
    /// Version written by [`Self::serialize`]
    pub const SERIALIZATION_VERSION: i64 = 1;

    pub fn empty() -> Self {
        Self::default()
    }

    /// A new subset with `keys` added; `self` is left untouched
    pub fn with_partition_keys<I, S>(&self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut subset = self.subset.clone();
        subset.extend(keys.into_iter().map(Into::into));
        Self { subset }
    }

    /// Keys in ascending order
    pub fn get_partition_keys(&self) -> Vec<String> {
        self.subset.iter().cloned().collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.subset.contains(key)
    }

    pub fn len(&self) -> usize {
        self.subset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subset.is_empty()
    }

    /// Encode as `{"version": 1, "subset": [keys...]}`
    pub fn serialize(&self) -> String {
        serde_json::json!({
            "version": Self::SERIALIZATION_VERSION,
            "subset": self.subset,
        })
        .to_string()
    }

    pub fn from_serialized(serialized: &str) -> Result<Self, SubsetError> {
        Self::from_serialized_with_version(serialized, Self::SERIALIZATION_VERSION)
    }

    /// Decode, accepting only `supported_version` for versioned payloads
    ///
    /// A bare JSON array of keys predates versioning and is always accepted.
    pub fn from_serialized_with_version(
        serialized: &str,
        supported_version: i64,
    ) -> Result<Self, SubsetError> {
        let value: serde_json::Value = serde_json::from_str(serialized)
            .map_err(|e| SubsetError::Malformed(e.to_string()))?;

        let body = match value {
            serde_json::Value::Array(_) => {
                tracing::debug!("Decoding legacy partitions subset");
                value
            }
            serde_json::Value::Object(mut fields) => {
                let version = fields
                    .get("version")
                    .and_then(serde_json::Value::as_i64)
                    .ok_or_else(|| {
                        SubsetError::Malformed("missing integer 'version' field".to_string())
                    })?;
                check_serialization_version(version, supported_version)?;

                fields.remove("subset").ok_or_else(|| {
                    SubsetError::Malformed("missing 'subset' field".to_string())
                })?
            }
            other => {
                return Err(SubsetError::Malformed(format!(
                    "expected an array or object, got {}",
                    other
                )))
            }
        };

        let subset: BTreeSet<String> = serde_json::from_value(body)
            .map_err(|e| SubsetError::Malformed(e.to_string()))?;
        Ok(Self { subset })
    }
}

/// A subset of the partitions of one definition
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionsSubset {
    Default(DefaultPartitionsSubset),
    TimeWindow(TimeWindowPartitionsSubset),
}

impl PartitionsSubset {
    /// A new subset with `keys` added
    ///
    /// Fails for time-window subsets when a key does not name a partition.
    pub fn with_partition_keys<I, S>(&self, keys: I) -> Result<Self, SubsetError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match self {
            Self::Default(subset) => Ok(Self::Default(
                subset.with_partition_keys(keys.into_iter().map(|k| k.as_ref().to_string())),
            )),
            Self::TimeWindow(subset) => subset.with_partition_keys(keys).map(Self::TimeWindow),
        }
    }

    pub fn get_partition_keys(&self) -> Vec<String> {
        match self {
            Self::Default(subset) => subset.get_partition_keys(),
            Self::TimeWindow(subset) => subset.get_partition_keys(),
        }
    }

    /// Keys of `partitions_def` existing at `current_time` that are not in this subset
    pub fn get_partition_keys_not_in_subset(
        &self,
        partitions_def: &PartitionsDefinition,
        current_time: DateTime<Utc>,
    ) -> Vec<String> {
        partitions_def
            .get_partition_keys(current_time)
            .into_iter()
            .filter(|key| !self.contains(key))
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        match self {
            Self::Default(subset) => subset.contains(key),
            Self::TimeWindow(subset) => subset.contains(key),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Default(subset) => subset.len(),
            Self::TimeWindow(subset) => subset.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn serialize(&self) -> String {
        match self {
            Self::Default(subset) => subset.serialize(),
            Self::TimeWindow(subset) => subset.serialize(),
        }
    }
}

/// Partition subset errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubsetError {
    #[error("Attempted to deserialize partitions subset with version {version}, but only version {supported} is supported")]
    InvalidDeserializationVersion { version: i64, supported: i64 },

    #[error("Malformed partitions subset: {0}")]
    Malformed(String),

    #[error("Invalid partition key '{key}': {reason}")]
    InvalidPartitionKey { key: String, reason: String },
}

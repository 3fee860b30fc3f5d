//! Partitions definitions
//!
//! A definition enumerates the partition keys an asset can be materialized for.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::subset::{DefaultPartitionsSubset, PartitionsSubset, SubsetError};
use crate::time_window::{TimeWindowPartitionsDefinition, TimeWindowPartitionsSubset};

/// Definition of the partitions of an asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartitionsDefinition {
    /// A fixed list of keys
    Static(StaticPartitionsDefinition),

    /// One partition per hour/day/week/month since a start instant
    TimeWindow(TimeWindowPartitionsDefinition),
}

impl PartitionsDefinition {
    /// All partition keys that exist as of `current_time`
    ///
    /// Static keys exist regardless of time; time-window partitions exist once
    /// their window has closed.
    pub fn get_partition_keys(&self, current_time: DateTime<Utc>) -> Vec<String> {
        match self {
            Self::Static(def) => def.keys().to_vec(),
            Self::TimeWindow(def) => def.get_partition_keys(current_time),
        }
    }

    /// Whether `key` names a partition of this definition
    pub fn has_partition_key(&self, key: &str, current_time: DateTime<Utc>) -> bool {
        match self {
            Self::Static(def) => def.has_key(key),
            Self::TimeWindow(def) => def.has_partition_key(key, current_time),
        }
    }

    /// A subset containing no partitions
    pub fn empty_subset(&self) -> PartitionsSubset {
        match self {
            Self::Static(_) => PartitionsSubset::Default(DefaultPartitionsSubset::empty()),
            Self::TimeWindow(def) => {
                PartitionsSubset::TimeWindow(TimeWindowPartitionsSubset::empty(def.clone()))
            }
        }
    }

    /// Decode a persisted subset for this definition
    pub fn deserialize_subset(&self, serialized: &str) -> Result<PartitionsSubset, SubsetError> {
        match self {
            Self::Static(_) => {
                DefaultPartitionsSubset::from_serialized(serialized).map(PartitionsSubset::Default)
            }
            Self::TimeWindow(def) => TimeWindowPartitionsSubset::from_serialized(def, serialized)
                .map(PartitionsSubset::TimeWindow),
        }
    }
}

/// Partitions with a fixed, ordered list of keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawStaticPartitions")]
pub struct StaticPartitionsDefinition {
    keys: Vec<String>,
}

#[derive(Deserialize)]
struct RawStaticPartitions {
    keys: Vec<String>,
}

impl TryFrom<RawStaticPartitions> for StaticPartitionsDefinition {
    type Error = DefinitionError;

    fn try_from(raw: RawStaticPartitions) -> Result<Self, Self::Error> {
        Self::new(raw.keys)
    }
}

impl StaticPartitionsDefinition {
    /// Create a definition; keys must be unique
    pub fn new<I, S>(keys: I) -> Result<Self, DefinitionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();

        let mut seen = HashSet::new();
        for key in &keys {
            if !seen.insert(key.as_str()) {
                return Err(DefinitionError::DuplicateKey(key.clone()));
            }
        }

        Ok(Self { keys })
    }

    /// Keys in declaration order
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }
}

/// Errors raised while building a partitions definition
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DefinitionError {
    #[error("Duplicate partition key '{0}'")]
    DuplicateKey(String),

    #[error("Invalid partition key format '{0}'")]
    InvalidFormat(String),
}

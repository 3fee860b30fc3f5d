//! Time-window partitions
//!
//! Partition `i` covers `[start + i * cadence, start + (i + 1) * cadence)`.
//! Subsets are stored as merged runs of consecutive windows so that a year of
//! daily partitions persists as a handful of intervals instead of 365 keys.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Range;

use crate::definition::DefinitionError;
use crate::subset::{check_serialization_version, SubsetError};

/// Spacing between consecutive partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Cadence {
    /// Key format used when none is configured
    pub fn default_fmt(self) -> &'static str {
        match self {
            Self::Hourly => "%Y-%m-%d-%H:%M",
            Self::Daily | Self::Weekly | Self::Monthly => "%Y-%m-%d",
        }
    }

    /// Window length for cadences that are a fixed number of seconds
    fn fixed_seconds(self) -> Option<i64> {
        match self {
            Self::Hourly => Some(3_600),
            Self::Daily => Some(86_400),
            Self::Weekly => Some(604_800),
            Self::Monthly => None,
        }
    }
}

impl std::fmt::Display for Cadence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hourly => write!(f, "hourly"),
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
            Self::Monthly => write!(f, "monthly"),
        }
    }
}

/// Half-open interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Partitions laid out on a regular calendar cadence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTimeWindowPartitions")]
pub struct TimeWindowPartitionsDefinition {
    start: DateTime<Utc>,
    cadence: Cadence,
    fmt: String,
}

#[derive(Deserialize)]
struct RawTimeWindowPartitions {
    start: DateTime<Utc>,
    cadence: Cadence,
    #[serde(default)]
    fmt: Option<String>,
}

impl TryFrom<RawTimeWindowPartitions> for TimeWindowPartitionsDefinition {
    type Error = DefinitionError;

    fn try_from(raw: RawTimeWindowPartitions) -> Result<Self, Self::Error> {
        Self::new(raw.start, raw.cadence, raw.fmt)
    }
}

impl TimeWindowPartitionsDefinition {
    /// Create a definition
    ///
    /// The key format must round-trip the start instant, and monthly
    /// partitions must start on day 1-28 so every month has a boundary.
    pub fn new(
        start: DateTime<Utc>,
        cadence: Cadence,
        fmt: Option<String>,
    ) -> Result<Self, DefinitionError> {
        let fmt = fmt.unwrap_or_else(|| cadence.default_fmt().to_string());

        if cadence == Cadence::Monthly && start.day() > 28 {
            return Err(DefinitionError::InvalidFormat(format!(
                "monthly partitions must start on day 1-28, got {}",
                start.day()
            )));
        }

        let def = Self { start, cadence, fmt };
        let rendered = start.format(&def.fmt).to_string();
        if def.parse_key(&rendered) != Some(start) {
            return Err(DefinitionError::InvalidFormat(def.fmt));
        }

        Ok(def)
    }

    /// Daily partitions starting at midnight UTC of `start_date`
    pub fn daily(start_date: NaiveDate) -> Self {
        Self {
            start: Utc.from_utc_datetime(&start_date.and_time(NaiveTime::default())),
            cadence: Cadence::Daily,
            fmt: Cadence::Daily.default_fmt().to_string(),
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    pub fn fmt(&self) -> &str {
        &self.fmt
    }

    /// Start of partition `index`
    pub fn window_start(&self, index: i64) -> Option<DateTime<Utc>> {
        match self.cadence.fixed_seconds() {
            Some(seconds) => {
                let offset = Duration::try_seconds(index.checked_mul(seconds)?)?;
                self.start.checked_add_signed(offset)
            }
            None => {
                let months = Months::new(u32::try_from(index.unsigned_abs()).ok()?);
                if index >= 0 {
                    self.start.checked_add_months(months)
                } else {
                    self.start.checked_sub_months(months)
                }
            }
        }
    }

    /// Window covered by partition `index`
    pub fn window_for_index(&self, index: i64) -> Option<TimeWindow> {
        Some(TimeWindow {
            start: self.window_start(index)?,
            end: self.window_start(index + 1)?,
        })
    }

    /// Key of partition `index`
    pub fn partition_key_for_index(&self, index: i64) -> Option<String> {
        self.window_start(index)
            .map(|start| start.format(&self.fmt).to_string())
    }

    /// Index of the partition containing `t`
    fn floor_index(&self, t: DateTime<Utc>) -> i64 {
        match self.cadence.fixed_seconds() {
            Some(seconds) => (t - self.start).num_seconds().div_euclid(seconds),
            None => {
                let mut months = (i64::from(t.year()) - i64::from(self.start.year())) * 12
                    + i64::from(t.month())
                    - i64::from(self.start.month());
                if self.window_start(months).map_or(false, |ws| ws > t) {
                    months -= 1;
                }
                months
            }
        }
    }

    /// Index of the first partition starting at or after `t`
    fn ceil_index(&self, t: DateTime<Utc>) -> i64 {
        let floor = self.floor_index(t);
        if self.window_start(floor) == Some(t) {
            floor
        } else {
            floor + 1
        }
    }

    /// Indices of the partitions lying entirely inside `window`
    pub fn indices_in_window(&self, window: &TimeWindow) -> Range<i64> {
        let first = self.ceil_index(window.start).max(0);
        let last = self.floor_index(window.end);
        first..last.max(first)
    }

    fn parse_key(&self, key: &str) -> Option<DateTime<Utc>> {
        let naive = NaiveDateTime::parse_from_str(key, &self.fmt)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(key, &self.fmt)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })?;
        Some(Utc.from_utc_datetime(&naive))
    }

    /// Index of the partition named by `key`
    pub fn index_of_key(&self, key: &str) -> Result<i64, SubsetError> {
        let invalid = |reason: String| SubsetError::InvalidPartitionKey {
            key: key.to_string(),
            reason,
        };

        let instant = self
            .parse_key(key)
            .ok_or_else(|| invalid(format!("does not match format '{}'", self.fmt)))?;

        if instant < self.start {
            return Err(invalid(format!("is before partitions start {}", self.start)));
        }

        let index = self.floor_index(instant);
        if self.window_start(index) != Some(instant) {
            return Err(invalid(format!("is not aligned to a {} boundary", self.cadence)));
        }

        Ok(index)
    }

    /// Keys of all partitions whose window has closed by `current_time`
    pub fn get_partition_keys(&self, current_time: DateTime<Utc>) -> Vec<String> {
        (0..self.floor_index(current_time).max(0))
            .filter_map(|index| self.partition_key_for_index(index))
            .collect()
    }

    pub fn has_partition_key(&self, key: &str, current_time: DateTime<Utc>) -> bool {
        match self.index_of_key(key) {
            Ok(index) => index < self.floor_index(current_time),
            Err(_) => false,
        }
    }
}

/// Subset of a time-window partitions definition
#[derive(Debug, Clone, PartialEq)]
pub struct TimeWindowPartitionsSubset {
    partitions_def: TimeWindowPartitionsDefinition,
    included_time_windows: Vec<TimeWindow>,
    num_partitions: usize,
}

#[derive(Deserialize)]
struct SerializedTimeWindows {
    time_windows: Vec<(f64, f64)>,
    num_partitions: usize,
}

impl TimeWindowPartitionsSubset {
    /// Version written by [`Self::serialize`]
    pub const SERIALIZATION_VERSION: i64 = 1;

    pub fn empty(partitions_def: TimeWindowPartitionsDefinition) -> Self {
        Self {
            partitions_def,
            included_time_windows: Vec::new(),
            num_partitions: 0,
        }
    }

    pub fn partitions_def(&self) -> &TimeWindowPartitionsDefinition {
        &self.partitions_def
    }

    /// Merged, sorted windows covered by this subset
    pub fn included_time_windows(&self) -> &[TimeWindow] {
        &self.included_time_windows
    }

    fn included_indices(&self) -> BTreeSet<i64> {
        self.included_time_windows
            .iter()
            .flat_map(|window| self.partitions_def.indices_in_window(window))
            .collect()
    }

    fn from_indices(
        partitions_def: TimeWindowPartitionsDefinition,
        indices: &BTreeSet<i64>,
    ) -> Result<Self, SubsetError> {
        let mut runs: Vec<(i64, i64)> = Vec::new();
        for &index in indices {
            match runs.last_mut() {
                Some((_, end)) if *end == index => *end = index + 1,
                _ => runs.push((index, index + 1)),
            }
        }

        let out_of_range = || SubsetError::Malformed("partition index out of range".to_string());
        let included_time_windows = runs
            .into_iter()
            .map(|(first, end)| {
                Ok(TimeWindow {
                    start: partitions_def.window_start(first).ok_or_else(out_of_range)?,
                    end: partitions_def.window_start(end).ok_or_else(out_of_range)?,
                })
            })
            .collect::<Result<Vec<_>, SubsetError>>()?;

        Ok(Self {
            partitions_def,
            included_time_windows,
            num_partitions: indices.len(),
        })
    }

    /// A new subset with `keys` added; `self` is left untouched
    pub fn with_partition_keys<I, S>(&self, keys: I) -> Result<Self, SubsetError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut indices = self.included_indices();
        for key in keys {
            indices.insert(self.partitions_def.index_of_key(key.as_ref())?);
        }
        Self::from_indices(self.partitions_def.clone(), &indices)
    }

    /// Keys in chronological order
    pub fn get_partition_keys(&self) -> Vec<String> {
        self.included_indices()
            .into_iter()
            .filter_map(|index| self.partitions_def.partition_key_for_index(index))
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        match self.partitions_def.index_of_key(key) {
            Ok(index) => self
                .included_time_windows
                .iter()
                .any(|window| self.partitions_def.indices_in_window(window).contains(&index)),
            Err(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.num_partitions
    }

    pub fn is_empty(&self) -> bool {
        self.num_partitions == 0
    }

    /// Encode as `{"version": 1, "time_windows": [[start, end], ...], "num_partitions": n}`
    pub fn serialize(&self) -> String {
        let windows: Vec<[f64; 2]> = self
            .included_time_windows
            .iter()
            .map(|window| [to_timestamp(window.start), to_timestamp(window.end)])
            .collect();

        serde_json::json!({
            "version": Self::SERIALIZATION_VERSION,
            "time_windows": windows,
            "num_partitions": self.num_partitions,
        })
        .to_string()
    }

    pub fn from_serialized(
        partitions_def: &TimeWindowPartitionsDefinition,
        serialized: &str,
    ) -> Result<Self, SubsetError> {
        Self::from_serialized_with_version(partitions_def, serialized, Self::SERIALIZATION_VERSION)
    }

    /// Decode, accepting only `supported_version` for versioned payloads
    ///
    /// Legacy bare arrays of `[start, end]` pairs and objects without a
    /// `version` field predate versioning and are always accepted.
    pub fn from_serialized_with_version(
        partitions_def: &TimeWindowPartitionsDefinition,
        serialized: &str,
        supported_version: i64,
    ) -> Result<Self, SubsetError> {
        let value: serde_json::Value = serde_json::from_str(serialized)
            .map_err(|e| SubsetError::Malformed(e.to_string()))?;

        let (pairs, num_partitions) = match value {
            serde_json::Value::Array(_) => {
                tracing::debug!("Decoding legacy time-window subset");
                let pairs: Vec<(f64, f64)> = serde_json::from_value(value)
                    .map_err(|e| SubsetError::Malformed(e.to_string()))?;
                (pairs, None)
            }
            serde_json::Value::Object(ref fields) => {
                if let Some(version) = fields.get("version") {
                    let version = version.as_i64().ok_or_else(|| {
                        SubsetError::Malformed(format!("version must be an integer, got {}", version))
                    })?;
                    check_serialization_version(version, supported_version)?;
                }
                let body: SerializedTimeWindows = serde_json::from_value(value)
                    .map_err(|e| SubsetError::Malformed(e.to_string()))?;
                (body.time_windows, Some(body.num_partitions))
            }
            other => {
                return Err(SubsetError::Malformed(format!(
                    "expected an array or object, got {}",
                    other
                )))
            }
        };

        let mut included_time_windows = pairs
            .into_iter()
            .map(|(start, end)| {
                Ok(TimeWindow {
                    start: from_timestamp(start)?,
                    end: from_timestamp(end)?,
                })
            })
            .collect::<Result<Vec<_>, SubsetError>>()?;
        included_time_windows.sort();

        let counted: usize = included_time_windows
            .iter()
            .map(|window| partitions_def.indices_in_window(window).count())
            .sum();
        if let Some(declared) = num_partitions {
            if declared != counted {
                return Err(SubsetError::Malformed(format!(
                    "num_partitions is {} but the time windows cover {} partitions",
                    declared, counted
                )));
            }
        }

        Ok(Self {
            partitions_def: partitions_def.clone(),
            included_time_windows,
            num_partitions: counted,
        })
    }
}

fn to_timestamp(instant: DateTime<Utc>) -> f64 {
    instant.timestamp_millis() as f64 / 1000.0
}

fn from_timestamp(seconds: f64) -> Result<DateTime<Utc>, SubsetError> {
    if !seconds.is_finite() {
        return Err(SubsetError::Malformed(format!("invalid timestamp {}", seconds)));
    }
    Utc.timestamp_millis_opt((seconds * 1000.0).round() as i64)
        .single()
        .ok_or_else(|| SubsetError::Malformed(format!("timestamp {} out of range", seconds)))
}

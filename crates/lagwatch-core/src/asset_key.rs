//! Asset keys
//!
//! An asset is addressed by an ordered path of string components, e.g.
//! `["warehouse", "daily_orders"]`. The user-facing form joins components with `/`.

use serde::{Deserialize, Serialize};

/// Separator used in the user-facing string form of an asset key
pub const ASSET_KEY_SEPARATOR: char = '/';

/// Identifier of an asset: a non-empty sequence of path components
///
/// Ordering is lexicographic over components, which is the order used whenever
/// keys are listed to a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetKey(Vec<String>);

impl AssetKey {
    /// Create a key from path components
    pub fn new<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(path.into_iter().map(Into::into).collect())
    }

    /// Parse the user-facing form (`a/b/c`)
    pub fn from_user_string(value: &str) -> Self {
        Self(
            value
                .split(ASSET_KEY_SEPARATOR)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// All path components
    pub fn path(&self) -> &[String] {
        &self.0
    }

    /// Last path component (the asset name)
    pub fn name(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or("")
    }

    /// Every component except the last
    pub fn prefix(&self) -> &[String] {
        match self.0.split_last() {
            Some((_, prefix)) => prefix,
            None => &[],
        }
    }

    /// Render as `a/b/c`
    pub fn to_user_string(&self) -> String {
        self.0.join("/")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for AssetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_user_string())
    }
}

impl From<&str> for AssetKey {
    fn from(value: &str) -> Self {
        Self::from_user_string(value)
    }
}

impl From<Vec<String>> for AssetKey {
    fn from(path: Vec<String>) -> Self {
        Self(path)
    }
}

//! Diagnostic codes and error reporting
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // Freshness (1xxx)
    /// Asset has not incorporated upstream data within its maximum lag
    FreshnessOverdue,

    /// Lateness cannot be determined (upstream data unavailable or never used)
    FreshnessUnknown,

    /// Asset satisfies its freshness policy
    FreshnessOnTime,

    // Partitions (2xxx)
    /// Some partitions of the asset have never been materialized
    PartitionsMissing,

    /// The persisted partitions subset could not be decoded
    PartitionsUndecodable,

    // Graph (3xxx)
    /// An asset depends on a key no asset or source provides
    AssetUnresolvedDependency,

    // General warnings (9xxx)
    /// General informational message
    Info,

    /// General warning message
    Warning,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FreshnessOverdue => "FRESHNESS_OVERDUE",
            Self::FreshnessUnknown => "FRESHNESS_UNKNOWN",
            Self::FreshnessOnTime => "FRESHNESS_ON_TIME",
            Self::PartitionsMissing => "PARTITIONS_MISSING",
            Self::PartitionsUndecodable => "PARTITIONS_UNDECODABLE",
            Self::AssetUnresolvedDependency => "ASSET_UNRESOLVED_DEPENDENCY",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - should be reviewed but not blocking
    Warn,

    /// Error - blocking issue that should fail CI
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Asset the diagnostic is about (user-facing key form)
    pub asset: Option<String>,

    /// Expected value (for comparison diagnostics)
    pub expected: Option<String>,

    /// Actual value (for comparison diagnostics)
    pub actual: Option<String>,

    /// Downstream assets affected by this issue
    pub impact: Vec<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            asset: None,
            expected: None,
            actual: None,
            impact: Vec::new(),
        }
    }

    /// Set the asset
    pub fn with_asset(mut self, asset: impl Into<String>) -> Self {
        self.asset = Some(asset.into());
        self
    }

    /// Set expected/actual values
    pub fn with_comparison(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }

    /// Set downstream impact
    pub fn with_impact(mut self, impact: Vec<String>) -> Self {
        self.impact = impact;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_code_stability() {
        assert_eq!(DiagnosticCode::FreshnessOverdue.as_str(), "FRESHNESS_OVERDUE");
        assert_eq!(DiagnosticCode::PartitionsMissing.as_str(), "PARTITIONS_MISSING");
    }

    #[test]
    fn serde_name_matches_stable_string() {
        let json = serde_json::to_string(&DiagnosticCode::AssetUnresolvedDependency).unwrap();
        assert_eq!(json, format!("\"{}\"", DiagnosticCode::AssetUnresolvedDependency.as_str()));
    }

    #[test]
    fn diagnostic_serialization() {
        let diag = Diagnostic::new(
            DiagnosticCode::FreshnessOverdue,
            Severity::Error,
            "Asset 'orders' is 42.0 minutes late",
        )
        .with_asset("warehouse/orders");

        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("FRESHNESS_OVERDUE"));
        assert!(json.contains("error"));
        assert!(json.contains("warehouse/orders"));
    }
}

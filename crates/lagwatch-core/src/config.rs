//! Configuration schema (lagwatch.toml)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use crate::diagnostic::{DiagnosticCode, Severity};

/// Freshness evaluation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Width of the constraint window computed ahead of the evaluation time
    #[serde(default = "default_lookahead_minutes")]
    pub lookahead_minutes: f64,

    /// Lateness above which an overdue asset is reported as a warning
    #[serde(default)]
    pub warn_after_minutes: f64,

    /// Lateness above which an overdue asset is reported as an error
    #[serde(default = "default_error_after_minutes")]
    pub error_after_minutes: f64,
}

fn default_lookahead_minutes() -> f64 {
    60.0
}

fn default_error_after_minutes() -> f64 {
    60.0
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            lookahead_minutes: default_lookahead_minutes(),
            warn_after_minutes: 0.0,
            error_after_minutes: default_error_after_minutes(),
        }
    }
}

impl EvaluationConfig {
    /// Severity for an asset that is `minutes_late` behind its policy,
    /// `None` when it is within tolerance
    pub fn severity_for_lateness(&self, minutes_late: f64) -> Option<Severity> {
        if minutes_late > self.error_after_minutes {
            Some(Severity::Error)
        } else if minutes_late > self.warn_after_minutes {
            Some(Severity::Warn)
        } else {
            None
        }
    }
}

/// Typo-suggestion settings for unresolved asset dependencies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionConfig {
    /// Minimum similarity ratio (0.0 - 1.0) for a key to be suggested
    #[serde(default = "default_similarity_cutoff")]
    pub similarity_cutoff: f64,
}

fn default_similarity_cutoff() -> f64 {
    0.8
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            similarity_cutoff: default_similarity_cutoff(),
        }
    }
}

/// Severity threshold overrides for specific diagnostic codes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeverityThreshold {
    /// Map of diagnostic code to severity override
    #[serde(default)]
    pub overrides: HashMap<String, Severity>,
}

impl SeverityThreshold {
    /// Get severity for a diagnostic code, or default
    pub fn get_severity(&self, code: DiagnosticCode, default: Severity) -> Severity {
        self.overrides
            .get(code.as_str())
            .copied()
            .unwrap_or(default)
    }

    /// Set severity override for a code
    pub fn set_override(&mut self, code: DiagnosticCode, severity: Severity) {
        self.overrides.insert(code.as_str().to_string(), severity);
    }
}

/// Allowlist rules for assets that should not be evaluated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllowlistRules {
    /// Skip evaluation for these assets (glob patterns over `a/b/c` keys)
    #[serde(default)]
    pub skip_assets: Vec<String>,
}

impl AllowlistRules {
    /// Check if an asset should be skipped
    pub fn is_asset_skipped(&self, asset: &str) -> bool {
        self.skip_assets.iter().any(|pattern| {
            if pattern.contains('*') {
                glob_match(pattern, asset)
            } else {
                pattern == asset
            }
        })
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Freshness evaluation settings
    #[serde(default)]
    pub evaluation: EvaluationConfig,

    /// Typo-suggestion settings
    #[serde(default)]
    pub suggestions: SuggestionConfig,

    /// Severity thresholds
    #[serde(default)]
    pub severity: SeverityThreshold,

    /// Allowlist rules
    #[serde(default)]
    pub allowlist: AllowlistRules,
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the evaluator cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let eval = &self.evaluation;
        if !eval.lookahead_minutes.is_finite() || eval.lookahead_minutes < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "evaluation.lookahead_minutes must be a non-negative number, got {}",
                eval.lookahead_minutes
            )));
        }
        if eval.warn_after_minutes < 0.0 || eval.error_after_minutes < eval.warn_after_minutes {
            return Err(ConfigError::Invalid(format!(
                "expected 0 <= evaluation.warn_after_minutes ({}) <= evaluation.error_after_minutes ({})",
                eval.warn_after_minutes, eval.error_after_minutes
            )));
        }

        let cutoff = self.suggestions.similarity_cutoff;
        if !(cutoff > 0.0 && cutoff <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "suggestions.similarity_cutoff must be in (0, 1], got {}",
                cutoff
            )));
        }

        Ok(())
    }
}

/// Simple glob matching (supports a single * wildcard)
fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" || pattern == "**" {
        return true;
    }

    if let Some(star_pos) = pattern.find('*') {
        let prefix = &pattern[..star_pos];
        let suffix = &pattern[star_pos + 1..];

        text.len() >= prefix.len() + suffix.len()
            && text.starts_with(prefix)
            && text.ends_with(suffix)
    } else {
        pattern == text
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.evaluation.lookahead_minutes, 60.0);
        assert_eq!(config.suggestions.similarity_cutoff, 0.8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn severity_override() {
        let mut threshold = SeverityThreshold::default();
        threshold.set_override(DiagnosticCode::FreshnessUnknown, Severity::Info);

        assert_eq!(
            threshold.get_severity(DiagnosticCode::FreshnessUnknown, Severity::Warn),
            Severity::Info
        );
        assert_eq!(
            threshold.get_severity(DiagnosticCode::FreshnessOverdue, Severity::Error),
            Severity::Error
        );
    }

    #[test]
    fn lateness_severity_bands() {
        let eval = EvaluationConfig {
            lookahead_minutes: 60.0,
            warn_after_minutes: 5.0,
            error_after_minutes: 30.0,
        };
        assert_eq!(eval.severity_for_lateness(0.0), None);
        assert_eq!(eval.severity_for_lateness(10.0), Some(Severity::Warn));
        assert_eq!(eval.severity_for_lateness(45.0), Some(Severity::Error));
    }

    #[test]
    fn parses_full_toml() {
        let config = Config::from_toml(
            r#"
            [evaluation]
            lookahead_minutes = 120
            error_after_minutes = 90.0

            [suggestions]
            similarity_cutoff = 0.75

            [severity.overrides]
            FRESHNESS_UNKNOWN = "info"

            [allowlist]
            skip_assets = ["scratch/*"]
            "#,
        )
        .unwrap();

        assert_eq!(config.evaluation.lookahead_minutes, 120.0);
        assert_eq!(config.evaluation.warn_after_minutes, 0.0);
        assert_eq!(config.suggestions.similarity_cutoff, 0.75);
        assert_eq!(
            config.severity.get_severity(DiagnosticCode::FreshnessUnknown, Severity::Warn),
            Severity::Info
        );
        assert!(config.allowlist.is_asset_skipped("scratch/tmp_table"));
        assert!(!config.allowlist.is_asset_skipped("warehouse/orders"));
    }

    #[test]
    fn rejects_out_of_range_cutoff() {
        let err = Config::from_toml("[suggestions]\nsimilarity_cutoff = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let err = Config::from_toml(
            "[evaluation]\nwarn_after_minutes = 30.0\nerror_after_minutes = 10.0\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("warn_after_minutes"));
    }

    #[test]
    fn config_file_loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lagwatch.toml");

        std::fs::write(&path, "[allowlist]\nskip_assets = [\"scratch/*\"]\n").unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert!(loaded.allowlist.is_asset_skipped("scratch/tmp"));
        assert_eq!(loaded.evaluation, EvaluationConfig::default());
    }

    #[test]
    fn glob_matching() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("staging/*", "staging/users"));
        assert!(glob_match("*_tmp", "orders_tmp"));
        assert!(!glob_match("staging/*", "prod/users"));
        assert!(!glob_match("ab*ba", "aba"));
    }
}

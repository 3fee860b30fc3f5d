//! lagwatch core
//!
//! Core domain model with stable, versioned types.
//! Never rename diagnostic codes - they are part of the public API.

pub mod asset_key;
pub mod diagnostic;
pub mod report;
pub mod config;

pub use asset_key::AssetKey;
pub use diagnostic::{Diagnostic, DiagnosticCode, Severity};
pub use report::{Report, ReportSummary, ReportVersion};
pub use config::{Config, ConfigError, EvaluationConfig, SuggestionConfig, SeverityThreshold, AllowlistRules};

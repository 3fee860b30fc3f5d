//! Freshness evaluation over a whole asset graph
//!
//! For every asset with a freshness policy this resolves used and available
//! data times for its root ancestors, asks the policy how late the asset is
//! and which constraints it must meet over the lookahead window, and turns
//! the outcome into diagnostics.

use chrono::{DateTime, Duration, Utc};
use lagwatch_core::{AssetKey, Config, Diagnostic, DiagnosticCode, Severity};
use lagwatch_freshness::{DataTimes, FreshnessConstraint};
use lagwatch_graph::AssetGraph;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::data_time::DataTimeResolver;
use crate::partition_check::PartitionCoverage;

/// Freshness state of one asset at one evaluation time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetFreshness {
    pub asset_key: AssetKey,

    /// Human-readable policy, e.g. "at most 60 minutes behind"
    pub policy: String,

    /// `None` when lateness cannot be determined
    pub minutes_late: Option<f64>,

    /// Root data incorporated by the latest materialization, keyed by `a/b/c`
    pub used_data_times: BTreeMap<String, Option<DateTime<Utc>>>,

    /// Newest root data that exists, keyed by `a/b/c`
    pub available_data_times: BTreeMap<String, Option<DateTime<Utc>>>,

    /// Constraints over the lookahead window, ordered by asset then time
    pub constraints: Vec<FreshnessConstraint>,
}

impl AssetFreshness {
    pub fn is_late(&self) -> bool {
        self.minutes_late.is_some_and(|late| late > 0.0)
    }
}

/// Output of evaluating every policy in a graph
#[derive(Debug, Clone, Default)]
pub struct FreshnessEvaluation {
    pub assets: Vec<AssetFreshness>,
    pub diagnostics: Vec<Diagnostic>,

    /// Assets looked at, policies or not
    pub assets_checked: usize,
}

impl FreshnessEvaluation {
    pub fn policies_evaluated(&self) -> usize {
        self.assets.len()
    }

    /// Check if there are any errors
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }
}

/// Evaluates freshness policies attached to the assets of a graph
pub struct FreshnessEvaluator<'a> {
    graph: &'a AssetGraph,
    config: &'a Config,
}

impl<'a> FreshnessEvaluator<'a> {
    pub fn new(graph: &'a AssetGraph, config: &'a Config) -> Self {
        Self { graph, config }
    }

    fn lookahead(&self) -> Duration {
        Duration::milliseconds((self.config.evaluation.lookahead_minutes * 60_000.0).round() as i64)
    }

    /// Evaluate one asset; `None` if it has no freshness policy
    pub fn evaluate_asset(
        &self,
        resolver: &mut DataTimeResolver<'_>,
        key: &AssetKey,
    ) -> Option<AssetFreshness> {
        let policy = self.graph.node(key)?.freshness_policy.as_ref()?;
        let evaluation_time = resolver.evaluation_time();

        let used = resolver.used_data_times(key);
        let available = resolver.available_data_times(key);
        let minutes_late = policy.minutes_late(evaluation_time, &used, &available);

        let window_end = evaluation_time
            .checked_add_signed(self.lookahead())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut constraints: Vec<FreshnessConstraint> = policy
            .constraints_for_time_window(evaluation_time, window_end, &used, &available)
            .into_iter()
            .collect();
        constraints.sort();

        tracing::debug!(asset = %key, ?minutes_late, constraints = constraints.len(), "Evaluated freshness policy");

        Some(AssetFreshness {
            asset_key: key.clone(),
            policy: policy.to_string(),
            minutes_late,
            used_data_times: sorted(used),
            available_data_times: sorted(available),
            constraints,
        })
    }

    /// Constraints `key` must satisfy in `[window_start, window_end)`
    ///
    /// Data times are resolved as of `window_start`.
    pub fn constraints_for(
        &self,
        key: &AssetKey,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<FreshnessConstraint>, EvaluationError> {
        let record = self
            .graph
            .node(key)
            .ok_or_else(|| EvaluationError::UnknownAsset(key.clone()))?;
        let policy = record
            .freshness_policy
            .as_ref()
            .ok_or_else(|| EvaluationError::NoPolicy(key.clone()))?;

        let mut resolver = DataTimeResolver::new(self.graph, window_start);
        let used = resolver.used_data_times(key);
        let available = resolver.available_data_times(key);

        let mut constraints: Vec<_> = policy
            .constraints_for_time_window(window_start, window_end, &used, &available)
            .into_iter()
            .collect();
        constraints.sort();
        Ok(constraints)
    }

    /// Evaluate every asset in the graph
    pub fn evaluate(&self, evaluation_time: DateTime<Utc>) -> FreshnessEvaluation {
        let mut resolver = DataTimeResolver::new(self.graph, evaluation_time);
        let mut evaluation = FreshnessEvaluation::default();

        for key in self.graph.all_keys() {
            let asset = key.to_user_string();
            if self.config.allowlist.is_asset_skipped(&asset) {
                tracing::debug!(%asset, "Skipping allowlisted asset");
                continue;
            }
            evaluation.assets_checked += 1;

            if let Some(record) = self.graph.node(key) {
                let coverage = PartitionCoverage::check(record, evaluation_time);
                if let Some(diagnostic) = coverage.to_diagnostic(record, &self.config.severity) {
                    evaluation.diagnostics.push(diagnostic);
                }
            }

            if let Some(freshness) = self.evaluate_asset(&mut resolver, key) {
                evaluation.diagnostics.push(self.freshness_diagnostic(&freshness));
                evaluation.assets.push(freshness);
            }
        }

        evaluation
    }

    fn freshness_diagnostic(&self, freshness: &AssetFreshness) -> Diagnostic {
        let asset = freshness.asset_key.to_user_string();
        let impact: Vec<String> = self
            .graph
            .downstream(&freshness.asset_key)
            .iter()
            .map(AssetKey::to_user_string)
            .collect();
        let overrides = &self.config.severity;

        match freshness.minutes_late {
            None => {
                let unknown: Vec<String> = freshness
                    .available_data_times
                    .iter()
                    .filter(|(root, available)| {
                        available.is_none()
                            || freshness.used_data_times.get(*root).copied().flatten().is_none()
                    })
                    .map(|(root, _)| root.clone())
                    .collect();
                let code = DiagnosticCode::FreshnessUnknown;
                let mut message = format!("Freshness of asset '{}' cannot be determined", asset);
                if !unknown.is_empty() {
                    message.push_str(&format!(": no data time known for {}", unknown.join(", ")));
                }
                Diagnostic::new(code, overrides.get_severity(code, Severity::Warn), message)
                    .with_asset(asset)
                    .with_impact(impact)
            }
            Some(minutes_late) => match self.config.evaluation.severity_for_lateness(minutes_late) {
                Some(default_severity) => {
                    let code = DiagnosticCode::FreshnessOverdue;
                    Diagnostic::new(
                        code,
                        overrides.get_severity(code, default_severity),
                        format!(
                            "Asset '{}' is {:.1} minutes late ({})",
                            asset, minutes_late, freshness.policy
                        ),
                    )
                    .with_asset(asset)
                    .with_comparison("0.0 minutes late", format!("{:.1} minutes late", minutes_late))
                    .with_impact(impact)
                }
                None => {
                    let code = DiagnosticCode::FreshnessOnTime;
                    Diagnostic::new(
                        code,
                        overrides.get_severity(code, Severity::Info),
                        format!("Asset '{}' is on time ({})", asset, freshness.policy),
                    )
                    .with_asset(asset)
                }
            },
        }
    }
}

fn sorted(times: DataTimes) -> BTreeMap<String, Option<DateTime<Utc>>> {
    times
        .into_iter()
        .map(|(key, time)| (key.to_user_string(), time))
        .collect()
}

/// Errors from targeted evaluation requests
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error("Unknown asset \"{0}\"")]
    UnknownAsset(AssetKey),

    #[error("Asset \"{0}\" has no freshness policy")]
    NoPolicy(AssetKey),
}

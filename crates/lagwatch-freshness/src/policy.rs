//! Freshness policies
//!
//! A policy bounds how far behind its root data an asset may fall. Given the
//! data times an asset has incorporated ("used") and the newest data times
//! that exist upstream ("available"), a policy can:
//! - list the constraints the asset must satisfy during a future window
//! - report how many minutes late the asset currently is

use chrono::{DateTime, Duration, Utc};
use lagwatch_core::AssetKey;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::cron::{CronError, CronSchedule};

/// Continuous policies are checked this many times per lag window
pub const TICKS_PER_LAG_WINDOW: f64 = 10.0;

/// Constraint generation stops once this many constraints have accumulated
pub const MAX_CONSTRAINTS: usize = 100;

/// Data time per upstream asset; `None` means no data is known
pub type DataTimes = HashMap<AssetKey, Option<DateTime<Utc>>>;

/// Requirement that `asset_key` incorporates data from at least
/// `required_data_time` by `required_by_time`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FreshnessConstraint {
    pub asset_key: AssetKey,
    pub required_data_time: DateTime<Utc>,
    pub required_by_time: DateTime<Utc>,
}

/// Maximum tolerated lag, optionally only enforced at cron ticks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFreshnessPolicy", into = "RawFreshnessPolicy")]
pub struct FreshnessPolicy {
    maximum_lag_minutes: f64,
    cron_schedule: Option<CronSchedule>,
}

#[derive(Serialize, Deserialize)]
struct RawFreshnessPolicy {
    maximum_lag_minutes: f64,
    #[serde(default)]
    cron_schedule: Option<String>,
}

impl TryFrom<RawFreshnessPolicy> for FreshnessPolicy {
    type Error = FreshnessError;

    fn try_from(raw: RawFreshnessPolicy) -> Result<Self, Self::Error> {
        Self::new(raw.maximum_lag_minutes, raw.cron_schedule.as_deref())
    }
}

impl From<FreshnessPolicy> for RawFreshnessPolicy {
    fn from(policy: FreshnessPolicy) -> Self {
        Self {
            maximum_lag_minutes: policy.maximum_lag_minutes,
            cron_schedule: policy.cron_schedule.map(|s| s.expression().to_string()),
        }
    }
}

impl FreshnessPolicy {
    /// Create a policy; lag must be a positive number of minutes that fits
    /// in a duration, and the schedule must parse
    pub fn new(maximum_lag_minutes: f64, cron_schedule: Option<&str>) -> Result<Self, FreshnessError> {
        if !maximum_lag_minutes.is_finite()
            || maximum_lag_minutes <= 0.0
            || maximum_lag_minutes * 60_000.0 >= i64::MAX as f64
        {
            return Err(FreshnessError::InvalidMaximumLag(maximum_lag_minutes));
        }

        let cron_schedule = cron_schedule.map(CronSchedule::parse).transpose()?;

        Ok(Self {
            maximum_lag_minutes,
            cron_schedule,
        })
    }

    pub fn maximum_lag_minutes(&self) -> f64 {
        self.maximum_lag_minutes
    }

    pub fn cron_schedule(&self) -> Option<&CronSchedule> {
        self.cron_schedule.as_ref()
    }

    pub fn maximum_lag(&self) -> Duration {
        Duration::milliseconds((self.maximum_lag_minutes * 60_000.0).round() as i64)
    }

    /// Spacing of constraint ticks when no cron schedule is set
    pub fn tick_interval(&self) -> Duration {
        let millis = (self.maximum_lag_minutes * 60_000.0 / TICKS_PER_LAG_WINDOW).round() as i64;
        Duration::milliseconds(millis.max(1))
    }

    /// Constraints the asset must satisfy for ticks in `[window_start, window_end)`
    ///
    /// An upstream whose available time equals `window_start` is treated as
    /// producing data continuously, so each tick requires data no older than
    /// the lag. Any other upstream only requires its available data to land
    /// within the lag. Upstreams already satisfied by `used_data_times` yield
    /// no constraint.
    pub fn constraints_for_time_window(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        used_data_times: &DataTimes,
        available_data_times: &DataTimes,
    ) -> HashSet<FreshnessConstraint> {
        let mut constraints = HashSet::new();

        if window_start >= window_end || available_data_times.values().all(Option::is_none) {
            return constraints;
        }

        let lag = self.maximum_lag();
        // Without a continuously available upstream every tick yields the
        // same constraints, so one tick is enough
        let tick_dependent = available_data_times
            .values()
            .any(|available| *available == Some(window_start));

        let ticks: Box<dyn Iterator<Item = DateTime<Utc>> + '_> = match &self.cron_schedule {
            Some(schedule) => Box::new(schedule.occurrences(window_start)),
            None => {
                let step = self.tick_interval();
                Box::new(std::iter::successors(Some(window_start), move |tick| {
                    tick.checked_add_signed(step)
                }))
            }
        };

        for tick in ticks.take_while(|tick| *tick < window_end) {
            for (asset_key, available) in available_data_times {
                let Some(available) = *available else {
                    continue;
                };

                let (required_data_time, required_by_time) = if available == window_start {
                    (saturating_sub(tick, lag), tick)
                } else {
                    (available, saturating_add(available, lag))
                };

                let satisfied = matches!(
                    used_data_times.get(asset_key),
                    Some(Some(used)) if *used >= required_data_time
                );
                if !satisfied {
                    constraints.insert(FreshnessConstraint {
                        asset_key: asset_key.clone(),
                        required_data_time,
                        required_by_time,
                    });
                }
            }

            if constraints.len() >= MAX_CONSTRAINTS || !tick_dependent {
                break;
            }
        }

        tracing::trace!(
            count = constraints.len(),
            %window_start,
            %window_end,
            "Generated freshness constraints"
        );
        constraints
    }

    /// Minutes by which the asset currently misses this policy
    ///
    /// `None` when any upstream's available or used data time is unknown, or
    /// when a cron schedule has no tick at or before `evaluation_time`.
    pub fn minutes_late(
        &self,
        evaluation_time: DateTime<Utc>,
        used_data_times: &DataTimes,
        available_data_times: &DataTimes,
    ) -> Option<f64> {
        let evaluation_tick = match &self.cron_schedule {
            Some(schedule) => schedule.prev_at_or_before(evaluation_time)?,
            None => evaluation_time,
        };
        let lag = self.maximum_lag();

        let mut minutes_late = 0.0_f64;
        for (asset_key, available) in available_data_times {
            let available = (*available)?;
            let used = used_data_times.get(asset_key).copied().flatten()?;

            // Data that arrived less than one lag before the tick is not due yet
            if evaluation_time != available && evaluation_tick < saturating_add(available, lag) {
                continue;
            }

            let required = available.min(saturating_sub(evaluation_tick, lag));
            if used < required {
                let late = (required - used).num_milliseconds() as f64 / 60_000.0;
                minutes_late = minutes_late.max(late);
            }
        }

        Some(minutes_late)
    }
}

impl std::fmt::Display for FreshnessPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "at most {} minutes behind", self.maximum_lag_minutes)?;
        if let Some(schedule) = &self.cron_schedule {
            write!(f, " at every tick of '{}'", schedule)?;
        }
        Ok(())
    }
}

fn saturating_add(t: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    t.checked_add_signed(d).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn saturating_sub(t: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    t.checked_sub_signed(d).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Freshness policy errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FreshnessError {
    #[error("maximum_lag_minutes must be a positive number of minutes, got {0}")]
    InvalidMaximumLag(f64),

    #[error("Invalid cron schedule: {0}")]
    Cron(#[from] CronError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 3, 1, h, m, 0).unwrap()
    }

    fn times(entries: &[(&str, Option<DateTime<Utc>>)]) -> DataTimes {
        entries
            .iter()
            .map(|(key, t)| (AssetKey::from_user_string(key), *t))
            .collect()
    }

    #[test]
    fn rejects_non_positive_lag() {
        assert_eq!(
            FreshnessPolicy::new(0.0, None).unwrap_err(),
            FreshnessError::InvalidMaximumLag(0.0)
        );
        assert!(FreshnessPolicy::new(-5.0, None).is_err());
        assert!(FreshnessPolicy::new(f64::NAN, None).is_err());
        assert!(FreshnessPolicy::new(f64::INFINITY, None).is_err());
    }

    #[test]
    fn rejects_bad_cron() {
        let err = FreshnessPolicy::new(30.0, Some("not a cron")).unwrap_err();
        assert!(matches!(err, FreshnessError::Cron(_)));
    }

    #[test]
    fn deserialization_validates() {
        let policy: FreshnessPolicy =
            serde_json::from_str(r#"{"maximum_lag_minutes": 60, "cron_schedule": "0 1 * * *"}"#)
                .unwrap();
        assert_eq!(policy.cron_schedule().map(|s| s.expression()), Some("0 1 * * *"));

        let continuous: FreshnessPolicy =
            serde_json::from_str(r#"{"maximum_lag_minutes": 15}"#).unwrap();
        assert!(continuous.cron_schedule().is_none());

        assert!(serde_json::from_str::<FreshnessPolicy>(r#"{"maximum_lag_minutes": -1}"#).is_err());
        assert!(serde_json::from_str::<FreshnessPolicy>(
            r#"{"maximum_lag_minutes": 60, "cron_schedule": "1/4294967295 * * * *"}"#
        )
        .is_err());
    }

    #[test]
    fn tick_interval_is_a_tenth_of_the_lag() {
        let policy = FreshnessPolicy::new(60.0, None).unwrap();
        assert_eq!(policy.tick_interval(), Duration::minutes(6));

        let tiny = FreshnessPolicy::new(0.000_001, None).unwrap();
        assert_eq!(tiny.tick_interval(), Duration::milliseconds(1));
    }

    #[test]
    fn zero_width_window_is_empty() {
        let policy = FreshnessPolicy::new(60.0, None).unwrap();
        let available = times(&[("a", Some(at(0, 0)))]);
        assert!(policy
            .constraints_for_time_window(at(1, 0), at(1, 0), &DataTimes::new(), &available)
            .is_empty());
    }

    #[test]
    fn stale_available_data_yields_single_constraint() {
        let policy = FreshnessPolicy::new(60.0, None).unwrap();
        let available = times(&[("a", Some(at(0, 0)))]);
        let used = times(&[("a", Some(at(0, 0) - Duration::hours(2)))]);

        let constraints = policy.constraints_for_time_window(at(1, 0), at(3, 0), &used, &available);
        let expected: HashSet<_> = [FreshnessConstraint {
            asset_key: AssetKey::from("a"),
            required_data_time: at(0, 0),
            required_by_time: at(1, 0),
        }]
        .into_iter()
        .collect();
        assert_eq!(constraints, expected);
    }

    #[test]
    fn satisfied_upstreams_produce_nothing() {
        let policy = FreshnessPolicy::new(60.0, None).unwrap();
        let available = times(&[("a", Some(at(0, 0)))]);
        let used = times(&[("a", Some(at(0, 0)))]);
        assert!(policy
            .constraints_for_time_window(at(1, 0), at(3, 0), &used, &available)
            .is_empty());
    }

    #[test]
    fn cron_ticks_drive_constraints() {
        let policy = FreshnessPolicy::new(30.0, Some("0 * * * *")).unwrap();
        let start = at(0, 10);
        let available = times(&[("a", Some(start))]);

        let mut constraints: Vec<_> = policy
            .constraints_for_time_window(start, at(3, 0), &DataTimes::new(), &available)
            .into_iter()
            .collect();
        constraints.sort();

        let ticks: Vec<_> = constraints.iter().map(|c| c.required_by_time).collect();
        assert_eq!(ticks, vec![at(1, 0), at(2, 0)]);
        assert_eq!(constraints[0].required_data_time, at(0, 30));
    }

    #[test]
    fn minutes_late_continuous() {
        let policy = FreshnessPolicy::new(30.0, None).unwrap();
        let now = at(2, 0);
        let available = times(&[("a", Some(now))]);

        let used = times(&[("a", Some(at(1, 0)))]);
        assert_eq!(policy.minutes_late(now, &used, &available), Some(30.0));

        let fresh = times(&[("a", Some(at(1, 45)))]);
        assert_eq!(policy.minutes_late(now, &fresh, &available), Some(0.0));
    }

    #[test]
    fn minutes_late_skips_data_that_is_not_due() {
        let policy = FreshnessPolicy::new(60.0, None).unwrap();
        let now = at(2, 0);
        // New data landed 10 minutes ago; the asset has an hour to pick it up
        let available = times(&[("a", Some(at(1, 50)))]);
        let used = times(&[("a", Some(at(0, 0)))]);
        assert_eq!(policy.minutes_late(now, &used, &available), Some(0.0));
    }

    #[test]
    fn minutes_late_with_cron_uses_previous_tick() {
        let policy = FreshnessPolicy::new(60.0, Some("0 1 * * *")).unwrap();
        let now = at(12, 0);
        let available = times(&[("a", Some(now))]);
        // At the 01:00 tick data from 00:00 was required
        let used = times(&[("a", Some(at(0, 0) - Duration::minutes(90)))]);
        assert_eq!(policy.minutes_late(now, &used, &available), Some(90.0));
    }

    #[test]
    fn minutes_late_unknown_data() {
        let policy = FreshnessPolicy::new(60.0, None).unwrap();
        let now = at(2, 0);
        let available = times(&[("a", Some(now)), ("b", None)]);
        let used = times(&[("a", Some(now)), ("b", Some(now))]);
        assert_eq!(policy.minutes_late(now, &used, &available), None);

        let available = times(&[("a", Some(now))]);
        assert_eq!(policy.minutes_late(now, &DataTimes::new(), &available), None);
    }

    #[test]
    fn display_mentions_schedule() {
        let policy = FreshnessPolicy::new(60.0, Some("@daily")).unwrap();
        assert_eq!(policy.to_string(), "at most 60 minutes behind at every tick of '@daily'");
    }
}

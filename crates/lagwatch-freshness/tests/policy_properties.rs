//! Integration tests for freshness policies and cron schedules

use chrono::{DateTime, Duration, TimeZone, Utc};
use lagwatch_core::AssetKey;
use lagwatch_freshness::{CronSchedule, DataTimes, FreshnessConstraint, FreshnessError, FreshnessPolicy};

fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 3, d, h, m, 0).unwrap()
}

fn data_times(entries: &[(&str, Option<DateTime<Utc>>)]) -> DataTimes {
    entries
        .iter()
        .map(|(key, time)| (AssetKey::from(*key), *time))
        .collect()
}

#[test]
fn cron_next_and_previous_around_half_past_midnight() {
    let schedule = CronSchedule::parse("0 1 * * *").unwrap();
    let t = at(2, 0, 30);

    assert_eq!(schedule.next_at_or_after(t), Some(at(2, 1, 0)));
    assert_eq!(schedule.prev_at_or_before(t), Some(at(1, 1, 0)));

    let exact = at(2, 1, 0);
    assert_eq!(schedule.next_at_or_after(exact), Some(exact));
    assert_eq!(schedule.prev_at_or_before(exact), Some(exact));
}

#[test]
fn zero_width_window_has_no_constraints() {
    let policy = FreshnessPolicy::new(30.0, Some("*/5 * * * *")).unwrap();
    let available = data_times(&[("up", Some(at(1, 0, 0)))]);
    let t = at(1, 0, 0);
    assert!(policy
        .constraints_for_time_window(t, t, &DataTimes::new(), &available)
        .is_empty());
}

#[test]
fn unknown_availability_has_no_constraints() {
    let policy = FreshnessPolicy::new(30.0, None).unwrap();
    let available = data_times(&[("up", None)]);
    assert!(policy
        .constraints_for_time_window(at(1, 0, 0), at(1, 3, 0), &DataTimes::new(), &available)
        .is_empty());
}

#[test]
fn minutes_late_is_unknown_without_used_data() {
    let policy = FreshnessPolicy::new(30.0, None).unwrap();
    let now = at(1, 12, 0);
    let available = data_times(&[("up", Some(now))]);
    let used = data_times(&[("up", None)]);
    assert_eq!(policy.minutes_late(now, &used, &available), None);
}

#[test]
fn minutes_late_takes_worst_upstream() {
    let policy = FreshnessPolicy::new(30.0, None).unwrap();
    let now = at(1, 12, 0);
    let available = data_times(&[("a", Some(now)), ("b", Some(now))]);
    let used = data_times(&[
        ("a", Some(now - Duration::minutes(45))),
        ("b", Some(now - Duration::minutes(90))),
    ]);
    assert_eq!(policy.minutes_late(now, &used, &available), Some(60.0));
}

#[test]
fn cron_policy_without_past_tick_is_unknown() {
    let policy = FreshnessPolicy::new(30.0, Some("0 0 30 2 *")).unwrap();
    let now = at(1, 12, 0);
    let available = data_times(&[("a", Some(now))]);
    let used = data_times(&[("a", Some(now))]);
    assert_eq!(policy.minutes_late(now, &used, &available), None);
}

#[test]
fn construction_errors() {
    assert!(matches!(
        FreshnessPolicy::new(-1.0, None),
        Err(FreshnessError::InvalidMaximumLag(_))
    ));
    let err = FreshnessPolicy::new(10.0, Some("61 * * * *")).unwrap_err();
    assert!(err.to_string().contains("minute"));
}

#[test]
fn policy_types_are_thread_safe() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<FreshnessPolicy>();
    assert_send_sync::<FreshnessConstraint>();
    assert_send_sync::<CronSchedule>();
}

//! Five-field cron schedules
//!
//! Schedules are immutable values; iteration is expressed as pure
//! "occurrence at or after / at or before t" lookups so callers never hold
//! hidden iterator state. All times are evaluated in UTC.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use std::str::FromStr;

/// Searches give up after this many years without an occurrence
/// (e.g. `0 0 30 2 *` never fires)
const SEARCH_HORIZON_YEARS: i32 = 30;

const MONTH_NAMES: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const DAY_NAMES: &[&str] = &["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    /// Names accepted for `min`, `min + 1`, ...
    names: &'static [&'static str],
}

const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59, names: &[] };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23, names: &[] };
const DAY_OF_MONTH: FieldSpec = FieldSpec { name: "day-of-month", min: 1, max: 31, names: &[] };
const MONTH: FieldSpec = FieldSpec { name: "month", min: 1, max: 12, names: MONTH_NAMES };
// 7 is accepted as an alias for Sunday and folded onto 0 after parsing
const DAY_OF_WEEK: FieldSpec = FieldSpec { name: "day-of-week", min: 0, max: 7, names: DAY_NAMES };

/// A parsed cron expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    /// Day fields not starting with `*`; when both are restricted a day
    /// matches if either field matches
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    /// Parse a 5-field expression or one of the `@daily`-style macros
    pub fn parse(expression: &str) -> Result<Self, CronError> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(CronError::Empty);
        }

        let expanded = match trimmed.to_ascii_lowercase().as_str() {
            "@hourly" => "0 * * * *",
            "@daily" | "@midnight" => "0 0 * * *",
            "@weekly" => "0 0 * * 0",
            "@monthly" => "0 0 1 * *",
            "@yearly" | "@annually" => "0 0 1 1 *",
            other if other.starts_with('@') => {
                return Err(CronError::UnknownMacro(trimmed.to_string()));
            }
            _ => trimmed,
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronError::FieldCount {
                expression: trimmed.to_string(),
                found: fields.len(),
            });
        }

        let minutes = parse_field(fields[0], &MINUTE)?;
        let hours = parse_field(fields[1], &HOUR)?;
        let days_of_month = parse_field(fields[2], &DAY_OF_MONTH)?;
        let months = parse_field(fields[3], &MONTH)?;
        let mut days_of_week = parse_field(fields[4], &DAY_OF_WEEK)?;
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            expression: trimmed.to_string(),
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            dom_restricted: !fields[2].starts_with('*'),
            dow_restricted: !fields[4].starts_with('*'),
        })
    }

    /// The expression as written
    pub fn expression(&self) -> &str {
        &self.expression
    }

    fn month_matches(&self, month: u32) -> bool {
        bit(self.months, month)
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = bit(self.days_of_month, date.day());
        let dow = bit(self.days_of_week, date.weekday().num_days_from_sunday());
        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        }
    }

    /// Whether the schedule fires at `t` (seconds are ignored)
    pub fn matches(&self, t: DateTime<Utc>) -> bool {
        self.month_matches(t.month())
            && self.day_matches(t.date_naive())
            && bit(self.hours, t.hour())
            && bit(self.minutes, t.minute())
    }

    /// First occurrence at or after `t`
    pub fn next_at_or_after(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let floor = truncate_to_minute(t.naive_utc())?;
        let mut current = if floor < t.naive_utc() {
            floor.checked_add_signed(Duration::minutes(1))?
        } else {
            floor
        };
        let horizon = t.year().checked_add(SEARCH_HORIZON_YEARS)?;

        loop {
            if current.year() > horizon {
                return None;
            }

            let date = current.date();
            if !self.month_matches(date.month()) {
                current = first_of_next_month(date)?.and_time(NaiveTime::default());
            } else if !self.day_matches(date) {
                current = date.succ_opt()?.and_time(NaiveTime::default());
            } else if !bit(self.hours, current.hour()) {
                current = truncate_to_hour(current)?.checked_add_signed(Duration::hours(1))?;
            } else if !bit(self.minutes, current.minute()) {
                current = current.checked_add_signed(Duration::minutes(1))?;
            } else {
                return Some(Utc.from_utc_datetime(&current));
            }
        }
    }

    /// Most recent occurrence at or before `t`
    pub fn prev_at_or_before(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut current = truncate_to_minute(t.naive_utc())?;
        let horizon = t.year().checked_sub(SEARCH_HORIZON_YEARS)?;
        let one_minute = Duration::minutes(1);

        loop {
            if current.year() < horizon {
                return None;
            }

            let date = current.date();
            if !self.month_matches(date.month()) {
                current = date
                    .with_day(1)?
                    .and_time(NaiveTime::default())
                    .checked_sub_signed(one_minute)?;
            } else if !self.day_matches(date) {
                current = date
                    .and_time(NaiveTime::default())
                    .checked_sub_signed(one_minute)?;
            } else if !bit(self.hours, current.hour()) {
                current = truncate_to_hour(current)?.checked_sub_signed(one_minute)?;
            } else if !bit(self.minutes, current.minute()) {
                current = current.checked_sub_signed(one_minute)?;
            } else {
                return Some(Utc.from_utc_datetime(&current));
            }
        }
    }

    /// Occurrences at or after `from`, in increasing order
    pub fn occurrences(&self, from: DateTime<Utc>) -> CronOccurrences<'_> {
        CronOccurrences {
            schedule: self,
            cursor: Some(from),
        }
    }
}

impl FromStr for CronSchedule {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.expression)
    }
}

/// Iterator over successive occurrences of a schedule
pub struct CronOccurrences<'a> {
    schedule: &'a CronSchedule,
    cursor: Option<DateTime<Utc>>,
}

impl Iterator for CronOccurrences<'_> {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.schedule.next_at_or_after(self.cursor?);
        self.cursor = next.and_then(|t| t.checked_add_signed(Duration::minutes(1)));
        next
    }
}

fn bit(set: u64, value: u32) -> bool {
    value < 64 && set & (1 << value) != 0
}

fn truncate_to_minute(t: NaiveDateTime) -> Option<NaiveDateTime> {
    t.date().and_hms_opt(t.hour(), t.minute(), 0)
}

fn truncate_to_hour(t: NaiveDateTime) -> Option<NaiveDateTime> {
    t.date().and_hms_opt(t.hour(), 0, 0)
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDate> {
    if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year().checked_add(1)?, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    }
}

/// Parse one field into a bitset of allowed values
fn parse_field(token: &str, spec: &FieldSpec) -> Result<u64, CronError> {
    let invalid = |reason: String| CronError::InvalidField {
        field: spec.name,
        token: token.to_string(),
        reason,
    };

    let mut set = 0u64;
    for item in token.split(',') {
        if item.is_empty() {
            return Err(invalid("empty list item".to_string()));
        }

        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| invalid(format!("step '{}' is not a number", step)))?;
                if step == 0 {
                    return Err(invalid("step must be positive".to_string()));
                }
                if step > spec.max {
                    return Err(invalid(format!("step {} exceeds maximum {}", step, spec.max)));
                }
                (range, Some(step))
            }
            None => (item, None),
        };

        let (low, high) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((low, high)) = range.split_once('-') {
            (parse_value(low, spec).map_err(&invalid)?, parse_value(high, spec).map_err(&invalid)?)
        } else {
            let value = parse_value(range, spec).map_err(&invalid)?;
            // `5/15` means "from 5 to the end, every 15"
            (value, if step.is_some() { spec.max } else { value })
        };

        if low > high {
            return Err(invalid(format!("range {}-{} is reversed", low, high)));
        }

        let step = step.unwrap_or(1);
        let mut value = Some(low);
        while let Some(current) = value.filter(|v| *v <= high) {
            set |= 1 << current;
            value = current.checked_add(step);
        }
    }

    Ok(set)
}

fn parse_value(raw: &str, spec: &FieldSpec) -> Result<u32, String> {
    let lowered = raw.to_ascii_lowercase();
    let value = match spec.names.iter().position(|name| *name == lowered) {
        Some(index) => spec.min + index as u32,
        None => raw
            .parse::<u32>()
            .map_err(|_| format!("'{}' is not a number", raw))?,
    };

    if value < spec.min || value > spec.max {
        return Err(format!(
            "{} is outside {}-{}",
            value, spec.min, spec.max
        ));
    }
    Ok(value)
}

/// Cron parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CronError {
    #[error("Empty cron expression")]
    Empty,

    #[error("Unknown cron macro '{0}'")]
    UnknownMacro(String),

    #[error("Cron expression '{expression}' has {found} fields, expected 5")]
    FieldCount { expression: String, found: usize },

    #[error("Invalid cron {field} field '{token}': {reason}")]
    InvalidField {
        field: &'static str,
        token: String,
        reason: String,
    },
}

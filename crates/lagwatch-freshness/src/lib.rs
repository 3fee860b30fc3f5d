//! lagwatch freshness - Freshness policies and cron schedules
//!
//! This crate evaluates a single asset's freshness policy against maps of
//! upstream data times:
//! - Cron schedule parsing and tick iteration
//! - Constraint generation over a future time window
//! - Current lateness in minutes

pub mod cron;
pub mod policy;

pub use cron::{CronError, CronOccurrences, CronSchedule};
pub use policy::{
    DataTimes, FreshnessConstraint, FreshnessError, FreshnessPolicy, MAX_CONSTRAINTS,
    TICKS_PER_LAG_WINDOW,
};

//! Period arithmetic anchored at a goal's start-tracking instant.
//!
//! Periods are fixed-length buckets: 1 day, 7 days, or 31 days for monthly
//! goals. Monthly is deliberately not calendar-aware.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{FrequencyType, Goal};

/// Half-open `[start, end)` time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PeriodRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// Length of one period. `Undefined` has zero length.
pub fn period_length(frequency: FrequencyType) -> Duration {
    match frequency {
        FrequencyType::Daily => Duration::days(1),
        FrequencyType::Weekly => Duration::days(7),
        FrequencyType::Monthly => Duration::days(31),
        FrequencyType::Undefined => Duration::zero(),
    }
}

/// Whole periods elapsed between the goal's start and `at`.
///
/// Instants before the start land in negative periods.
pub fn current_period(goal: &Goal, at: DateTime<Utc>) -> i64 {
    period_index(goal.start_tracking_at, goal.frequency, at)
}

pub fn period_index(start: DateTime<Utc>, frequency: FrequencyType, at: DateTime<Utc>) -> i64 {
    let length_ms = period_length(frequency).num_milliseconds();
    if length_ms == 0 {
        return 0;
    }
    (at - start).num_milliseconds().div_euclid(length_ms)
}

/// Range of period number `offset` counted from `start`.
pub fn period_range(start: DateTime<Utc>, frequency: FrequencyType, offset: i64) -> PeriodRange {
    let length_ms = period_length(frequency).num_milliseconds();
    PeriodRange {
        start: start + Duration::milliseconds(length_ms * offset),
        end: start + Duration::milliseconds(length_ms * (offset + 1)),
    }
}

/// Full range of the period containing `at`.
pub fn current_period_range(goal: &Goal, at: DateTime<Utc>) -> PeriodRange {
    period_range(goal.start_tracking_at, goal.frequency, current_period(goal, at))
}

/// Full range of the period before the one containing `at`.
pub fn previous_period_range(goal: &Goal, at: DateTime<Utc>) -> PeriodRange {
    period_range(
        goal.start_tracking_at,
        goal.frequency,
        current_period(goal, at) - 1,
    )
}

/// Part of the current period up to the end of `at`'s calendar day.
///
/// Executions logged on later virtual days never count towards `at`.
pub fn period_progress_range(goal: &Goal, at: DateTime<Utc>) -> PeriodRange {
    let period = current_period_range(goal, at);
    let day_end = day_range(at.date_naive()).end;
    PeriodRange {
        start: period.start,
        end: period.end.min(day_end).max(period.start),
    }
}

/// `[day 00:00Z, next day 00:00Z)`.
pub fn day_range(day: NaiveDate) -> PeriodRange {
    let start = day.and_time(NaiveTime::MIN).and_utc();
    PeriodRange {
        start,
        end: start + Duration::days(1),
    }
}

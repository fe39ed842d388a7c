//! Progress statistics and the per-day snapshots that bind them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::habit::{Goal, Habit};

/// Cumulative statistics for one goal as of one day.
///
/// Several rows exist per goal (one per observed day); each is owned by
/// exactly one [`ProgressSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub id: i64,
    pub goal_id: i64,
    pub username: String,
    pub total_completed_periods: u32,
    pub total_skipped_periods: u32,
    /// Raw count of logged completions.
    pub total_completed_times: u32,
    pub most_longest_streak: u32,
    pub current_streak: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Progress {
    /// Zero-valued statistics stamped with `at`, not yet persisted.
    pub fn empty(goal_id: i64, username: &str, at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            goal_id,
            username: username.to_string(),
            total_completed_periods: 0,
            total_skipped_periods: 0,
            total_completed_times: 0,
            most_longest_streak: 0,
            current_streak: 0,
            created_at: at,
            updated_at: at,
        }
    }

    /// Copy of these statistics for a new day, without an id.
    pub fn carried_to(&self, at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            created_at: at,
            updated_at: at,
            ..self.clone()
        }
    }

    /// Records one more completed period and extends the streak.
    pub fn complete_period(&mut self) {
        self.total_completed_periods += 1;
        self.current_streak += 1;
        self.most_longest_streak = self.most_longest_streak.max(self.current_streak);
    }
}

/// Binding of `(username, goal, day)` to a progress row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub username: String,
    pub goal_id: i64,
    pub progress_id: i64,
    pub day: NaiveDate,
}

/// Habit, its active goal and the progress in effect today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressWithGoal {
    pub habit: Habit,
    pub goal: Goal,
    pub progress: Progress,
}

/// A habit whose current-period target is not met yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentPeriodProgress {
    pub habit: Habit,
    pub current_period_completed_times: u32,
    pub need_to_complete_times: u32,
    /// 1-based index of the period containing "now".
    pub current_period: i64,
}

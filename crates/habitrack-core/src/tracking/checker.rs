//! Periodic reconciliation of missed periods.
//!
//! A goal whose check deadline has passed is inspected once: if the period
//! before "now" fell short of the target, the streak is broken and a skipped
//! period is recorded. The deadline then moves forward one period either way.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::period::{period_length, previous_period_range};
use super::recalculator::recalculate_future_progresses_by_goal_update;
use super::snapshot;
use crate::clock::{SystemTimeSource, TimeSource, VirtualClock};
use crate::error::Result;
use crate::model::Goal;
use crate::storage::{Storage, Transactor};

/// Outcome of one checker pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    /// Goals whose deadline was processed.
    pub checked: usize,
    /// Goals that got a skipped period recorded.
    pub skipped_marked: usize,
    /// Goals whose transaction failed; they are retried on the next pass.
    pub failed: usize,
}

/// Applies the skip rule to one due goal. Returns whether a skip was recorded.
pub fn check_goal(storage: &dyn Storage, goal: &Goal, now: DateTime<Utc>) -> Result<bool> {
    let mut progress = snapshot::get_progress(storage, goal.id, &goal.username, now)?;
    let previous_count = storage.count_executions(goal.id, previous_period_range(goal, now))?;

    let skipped = previous_count < goal.times_per_frequency;
    if skipped {
        progress.current_streak = 0;
        progress.total_skipped_periods += 1;
        progress.updated_at = now;
        storage.update_progress_by_id(&progress)?;
        recalculate_future_progresses_by_goal_update(storage, &goal.username, goal, goal, now)?;
    }

    storage.set_goal_next_check(goal.id, goal.next_check_at + period_length(goal.frequency))?;
    Ok(skipped)
}

pub struct GoalsChecker<'a, D, T: TimeSource = SystemTimeSource> {
    db: &'a D,
    clock: VirtualClock<T>,
    system_username: String,
}

impl<'a, D: Transactor, T: TimeSource> GoalsChecker<'a, D, T> {
    pub fn new(db: &'a D, clock: VirtualClock<T>, system_username: impl Into<String>) -> Self {
        Self {
            db,
            clock,
            system_username: system_username.into(),
        }
    }

    /// Processes every due goal, each in its own transaction.
    ///
    /// A failing goal is logged and counted; the rest of the batch still runs.
    ///
    /// # Errors
    /// Only when the due goals cannot be listed at all.
    #[instrument(skip(self), fields(system_username = %self.system_username))]
    pub fn check_goals(&self) -> Result<CheckReport> {
        let due = self.db.run_repeatable_read(|storage| {
            let now = self.clock.current_time(storage, &self.system_username)?;
            storage.list_goals_needing_check(now)
        })?;

        let mut report = CheckReport::default();
        for goal in due {
            match self.check_one(&goal) {
                Ok(Some(skipped)) => {
                    report.checked += 1;
                    if skipped {
                        report.skipped_marked += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        goal_id = goal.id,
                        habit_id = goal.habit_id,
                        error = %e,
                        "goal check failed"
                    );
                }
            }
        }

        info!(
            checked = report.checked,
            skipped_marked = report.skipped_marked,
            failed = report.failed,
            "goals check finished"
        );
        Ok(report)
    }

    /// `None` when the goal changed since it was listed.
    fn check_one(&self, listed: &Goal) -> Result<Option<bool>> {
        self.db.run_repeatable_read(|storage| {
            let now = self.clock.current_time(storage, &self.system_username)?;
            let goal = match storage.get_goal(listed.habit_id)? {
                Some(goal)
                    if goal.id == listed.id && !goal.is_completed && goal.next_check_at <= now =>
                {
                    goal
                }
                _ => return Ok(None),
            };
            check_goal(storage, &goal, now).map(Some)
        })
    }
}

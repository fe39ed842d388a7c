//! Progress logging and the read side of progress.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use super::period::{current_period, period_progress_range, previous_period_range};
use super::recalculator::recalculate_future_progresses_by_goal_update;
use super::snapshot;
use crate::clock::{SystemTimeSource, TimeSource, VirtualClock};
use crate::error::{CoreError, Result};
use crate::model::{CurrentPeriodProgress, Goal, Habit, Progress, ProgressWithGoal};
use crate::storage::{Storage, Transactor};

/// Logs one execution of `goal` at `now` and updates today's progress.
///
/// Returns the updated progress for today. Snapshots of later days that
/// already exist are re-derived, and the goal is marked completed once the
/// last tracking period is done.
pub fn add_progress_for_goal(
    storage: &dyn Storage,
    goal: &Goal,
    username: &str,
    now: DateTime<Utc>,
) -> Result<Progress> {
    if goal.is_completed {
        return Err(CoreError::GoalAlreadyCompleted { goal_id: goal.id });
    }

    let mut progress = snapshot::get_progress(storage, goal.id, username, now)?;
    let previous_count = storage.count_executions(goal.id, previous_period_range(goal, now))?;
    let current_count = storage.count_executions(goal.id, period_progress_range(goal, now))?;

    storage.add_execution_log(goal.id, now)?;
    let current_count = current_count + 1;
    progress.total_completed_times += 1;

    let mut completes_goal = false;
    if current_count == goal.times_per_frequency {
        progress.total_completed_periods += 1;
        if previous_count >= goal.times_per_frequency {
            progress.current_streak += 1;
        } else {
            progress.current_streak = 1;
        }
        progress.most_longest_streak = progress.most_longest_streak.max(progress.current_streak);
        completes_goal = progress.total_completed_periods >= goal.total_tracking_periods;
    }

    progress.updated_at = now;
    storage.update_progress_by_id(&progress)?;

    recalculate_future_progresses_by_goal_update(storage, username, goal, goal, now)?;

    if completes_goal {
        storage.set_goal_completed(goal.id)?;
        info!(username, goal_id = goal.id, "goal completed");
    }

    Ok(progress)
}

pub(crate) fn ensure_user(storage: &dyn Storage, username: &str) -> Result<()> {
    match storage.get_user(username)? {
        Some(_) => Ok(()),
        None => Err(CoreError::UserNotFound {
            username: username.to_string(),
        }),
    }
}

pub(crate) fn find_habit(storage: &dyn Storage, username: &str, habit_id: i64) -> Result<Habit> {
    storage
        .get_habit(username, habit_id)?
        .ok_or(CoreError::HabitNotFound { habit_id })
}

/// Progress operations exposed to the presentation layer.
pub struct ProgressService<'a, D, T: TimeSource = SystemTimeSource> {
    db: &'a D,
    clock: VirtualClock<T>,
}

impl<'a, D: Transactor, T: TimeSource> ProgressService<'a, D, T> {
    pub fn new(db: &'a D, clock: VirtualClock<T>) -> Self {
        Self { db, clock }
    }

    /// Records one completion of the habit's active goal for the user's
    /// current virtual day.
    ///
    /// # Errors
    /// `HabitNotFound`, `GoalNotFound`, or `GoalAlreadyCompleted` for the
    /// domain cases; store failures otherwise.
    #[instrument(skip(self))]
    pub fn add_progress(&self, username: &str, habit_id: i64) -> Result<Progress> {
        self.db.run_repeatable_read(|storage| {
            ensure_user(storage, username)?;
            let now = self.clock.current_time(storage, username)?;
            let habit = find_habit(storage, username, habit_id)?;
            let goal = habit.goal.ok_or(CoreError::GoalNotFound { habit_id })?;
            let progress = add_progress_for_goal(storage, &goal, username, now)?;
            info!(
                username,
                habit_id,
                goal_id = goal.id,
                total_completed_times = progress.total_completed_times,
                "progress added"
            );
            Ok(progress)
        })
    }

    /// Habit, active goal and today's progress.
    #[instrument(skip(self))]
    pub fn get_progress(&self, username: &str, habit_id: i64) -> Result<ProgressWithGoal> {
        self.db.run_repeatable_read(|storage| {
            ensure_user(storage, username)?;
            let now = self.clock.current_time(storage, username)?;
            let habit = find_habit(storage, username, habit_id)?;
            let goal = habit
                .goal
                .clone()
                .ok_or(CoreError::GoalNotFound { habit_id })?;
            let progress = snapshot::get_progress(storage, goal.id, username, now)?;
            Ok(ProgressWithGoal {
                habit,
                goal,
                progress,
            })
        })
    }

    /// Habits whose current-period target is still open, sorted by habit id.
    ///
    /// Habits without an active goal, or whose goal is already completed,
    /// are left out.
    #[instrument(skip(self))]
    pub fn current_progress_for_all_habits(
        &self,
        username: &str,
    ) -> Result<Vec<CurrentPeriodProgress>> {
        self.db.run_repeatable_read(|storage| {
            ensure_user(storage, username)?;
            let now = self.clock.current_time(storage, username)?;

            let mut result = Vec::new();
            for habit in storage.list_habits(username)? {
                let Some(goal) = habit.goal.clone() else {
                    continue;
                };
                if goal.is_completed {
                    continue;
                }
                let done = storage.count_executions(goal.id, period_progress_range(&goal, now))?;
                if done >= goal.times_per_frequency {
                    continue;
                }
                result.push(CurrentPeriodProgress {
                    current_period_completed_times: done,
                    need_to_complete_times: goal.times_per_frequency,
                    current_period: current_period(&goal, now) + 1,
                    habit,
                });
            }
            result.sort_by_key(|entry| entry.habit.id);
            Ok(result)
        })
    }
}

//! Re-derivation of already materialised future days.
//!
//! Completed-period and streak counters depend on the per-period target, so
//! whenever the target changes (or today's counts change under a clock that
//! already visited later days) every later snapshot is rebuilt from today's
//! progress plus that day's own executions.

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use super::period::{day_range, period_progress_range};
use super::snapshot;
use crate::error::Result;
use crate::model::{Goal, Progress};
use crate::storage::Storage;

/// Rebuilds the progress of `prev_goal` for today and every later day that
/// already has a snapshot, applying `new_goal`'s per-period target.
///
/// Period boundaries stay anchored at `prev_goal`. Each day is derived from
/// the previous day's freshly computed value, and written back under its
/// existing progress id.
#[instrument(skip(storage, prev_goal, new_goal), fields(goal_id = prev_goal.id))]
pub fn recalculate_future_progresses_by_goal_update(
    storage: &dyn Storage,
    username: &str,
    prev_goal: &Goal,
    new_goal: &Goal,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut base = snapshot::get_progress(storage, prev_goal.id, username, now)?;

    let period_count =
        storage.count_executions(prev_goal.id, period_progress_range(prev_goal, now))?;
    if period_count < new_goal.times_per_frequency
        && period_count >= prev_goal.times_per_frequency
        && base.total_completed_periods > 0
    {
        retract_period(&mut base);
        base.updated_at = now;
        storage.update_progress_by_id(&base)?;
        debug!(username, period_count, "retracted completed period");
    }

    let target = new_goal.times_per_frequency;
    let mut previous = base;
    for future in storage.get_future_snapshots(username, prev_goal.id, now.date_naive())? {
        let stored = snapshot::load(storage, future.progress_id)?;
        let at = stored.created_at;

        let day_count = storage.count_executions(prev_goal.id, day_range(future.day))?;
        let period_count =
            storage.count_executions(prev_goal.id, period_progress_range(prev_goal, at))?;

        if period_count > target {
            // Period already counted on an earlier day.
            continue;
        }

        let mut next = Progress {
            id: stored.id,
            created_at: stored.created_at,
            updated_at: now,
            ..previous.clone()
        };
        next.total_completed_times += day_count;
        if period_count == target {
            next.complete_period();
        }

        storage.update_progress_by_id(&next)?;
        debug!(username, day = %future.day, progress_id = next.id, "recalculated day");
        previous = next;
    }

    Ok(())
}

/// Undoes one completed period. The longest streak only shrinks when the
/// retracted period was the one that set it.
fn retract_period(progress: &mut Progress) {
    progress.total_completed_periods = progress.total_completed_periods.saturating_sub(1);
    if progress.current_streak == progress.most_longest_streak {
        progress.most_longest_streak = progress.most_longest_streak.saturating_sub(1);
    }
    progress.current_streak = progress.current_streak.saturating_sub(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use crate::testing::{instant, seed_daily_goal};
    use chrono::Duration;

    #[test]
    fn retraction_keeps_longest_when_set_earlier() {
        let mut progress = Progress::empty(1, "ann", instant(1, 0));
        progress.total_completed_periods = 4;
        progress.current_streak = 1;
        progress.most_longest_streak = 3;
        retract_period(&mut progress);
        assert_eq!(progress.total_completed_periods, 3);
        assert_eq!(progress.current_streak, 0);
        assert_eq!(progress.most_longest_streak, 3);
    }

    #[test]
    fn retraction_shrinks_longest_it_set() {
        let mut progress = Progress::empty(1, "ann", instant(1, 0));
        progress.total_completed_periods = 2;
        progress.current_streak = 2;
        progress.most_longest_streak = 2;
        retract_period(&mut progress);
        assert_eq!(progress.current_streak, 1);
        assert_eq!(progress.most_longest_streak, 1);
    }

    #[test]
    fn no_future_snapshots_only_touches_today() {
        let db = Database::open_memory().unwrap();
        let store = db.storage();
        let goal = seed_daily_goal(&store, "ann", 2, 10);
        let now = instant(1, 12);

        recalculate_future_progresses_by_goal_update(&store, "ann", &goal, &goal, now).unwrap();
        let today = snapshot::get_progress(&store, goal.id, "ann", now).unwrap();
        assert_eq!(today.total_completed_times, 0);
        assert!(store
            .get_future_snapshots("ann", goal.id, now.date_naive())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn skipped_day_does_not_break_the_chain() {
        let db = Database::open_memory().unwrap();
        let store = db.storage();
        let goal = seed_daily_goal(&store, "ann", 1, 10);
        let now = instant(1, 12);

        // Today and three visited days; day+2 over-delivers.
        snapshot::get_progress(&store, goal.id, "ann", now).unwrap();
        let mut ids = Vec::new();
        for (offset, executions) in [(1, 1), (2, 3), (3, 1)] {
            let at = now + Duration::days(offset);
            ids.push(snapshot::get_progress(&store, goal.id, "ann", at).unwrap().id);
            for _ in 0..executions {
                store.add_execution_log(goal.id, at).unwrap();
            }
        }

        recalculate_future_progresses_by_goal_update(&store, "ann", &goal, &goal, now).unwrap();

        let day = |i: usize| snapshot::load(&store, ids[i]).unwrap();
        assert_eq!((day(0).total_completed_times, day(0).total_completed_periods), (1, 1));
        // Untouched: count 3 exceeds the target of 1.
        assert_eq!(day(1).total_completed_times, 0);
        // Chained from day+1, not from the skipped day.
        assert_eq!((day(2).total_completed_times, day(2).total_completed_periods), (2, 2));
        assert_eq!(day(2).current_streak, 2);
    }
}

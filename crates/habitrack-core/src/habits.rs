//! Habit lifecycle: create, list, edit and archive.
//!
//! Habit mutations are only accepted while the user's virtual clock sits on
//! the real current day. Editing a goal's target or length keeps the goal and
//! re-derives visited days; changing its frequency starts a new goal
//! generation that inherits the old one's executions and statistics.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument};

use crate::clock::{SystemTimeSource, TimeSource, VirtualClock};
use crate::error::{CoreError, Result, ValidationError};
use crate::model::{FrequencyType, Goal, GoalRules, Habit, HabitUpdate, NewHabit, ProgressSnapshot};
use crate::storage::{Storage, Transactor};
use crate::tracking::engine::{ensure_user, find_habit};
use crate::tracking::period::period_length;
use crate::tracking::recalculate_future_progresses_by_goal_update;
use crate::tracking::snapshot;

/// Slack added to the first check deadline so the checker never races the
/// end of the first period.
const CHECK_GRACE_MINUTES: i64 = 5;

/// First check deadline of a goal tracking from `start`.
pub fn first_check_at(start: DateTime<Utc>, frequency: FrequencyType) -> DateTime<Utc> {
    start + period_length(frequency) + Duration::minutes(CHECK_GRACE_MINUTES)
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "name".into(),
            message: "must not be empty".into(),
        });
    }
    Ok(())
}

fn new_goal(
    habit_id: i64,
    username: &str,
    rules: GoalRules,
    now: DateTime<Utc>,
    predecessor_ids: Vec<i64>,
) -> Goal {
    Goal {
        id: 0,
        habit_id,
        username: username.to_string(),
        frequency: rules.frequency,
        times_per_frequency: rules.times_per_frequency,
        total_tracking_periods: rules.total_tracking_periods,
        is_active: true,
        is_completed: false,
        created_at: now,
        start_tracking_at: now,
        next_check_at: first_check_at(now, rules.frequency),
        predecessor_ids,
    }
}

pub struct HabitService<'a, D, T: TimeSource = SystemTimeSource> {
    db: &'a D,
    clock: VirtualClock<T>,
}

impl<'a, D: Transactor, T: TimeSource> HabitService<'a, D, T> {
    pub fn new(db: &'a D, clock: VirtualClock<T>) -> Self {
        Self { db, clock }
    }

    fn ensure_present(
        &self,
        storage: &dyn Storage,
        username: &str,
        action: &'static str,
    ) -> Result<()> {
        if self.clock.current_offset(storage, username)? != 0 {
            return Err(CoreError::ChangeFromFuture { action });
        }
        Ok(())
    }

    /// Creates a habit, and its goal when rules are given. Returns the habit id.
    #[instrument(skip(self, habit), fields(name = %habit.name))]
    pub fn create_habit(&self, username: &str, habit: NewHabit) -> Result<i64> {
        validate_name(&habit.name)?;
        if let Some(rules) = &habit.goal {
            rules.validate()?;
        }

        self.db.run_repeatable_read(|storage| {
            self.ensure_present(storage, username, "create")?;
            ensure_user(storage, username)?;
            let now = self.clock.current_time(storage, username)?;

            let habit_id = storage.create_habit(username, &habit, now)?;
            if let Some(rules) = habit.goal {
                let goal = new_goal(habit_id, username, rules, now, Vec::new());
                let goal_id = storage.create_goal(&goal)?;
                info!(
                    username,
                    habit_id,
                    goal_id,
                    frequency = %rules.frequency,
                    "habit created with goal"
                );
            } else {
                info!(username, habit_id, "habit created");
            }
            Ok(habit_id)
        })
    }

    /// Non-archived habits sorted by id.
    pub fn list_habits(&self, username: &str) -> Result<Vec<Habit>> {
        self.db.run_repeatable_read(|storage| {
            ensure_user(storage, username)?;
            storage.list_habits(username)
        })
    }

    /// Habits whose active goal is completed, sorted by id.
    pub fn list_completed_habits(&self, username: &str) -> Result<Vec<Habit>> {
        self.db.run_repeatable_read(|storage| {
            ensure_user(storage, username)?;
            storage.list_completed_habits(username)
        })
    }

    /// Replaces the habit's name, description and goal rules.
    ///
    /// # Errors
    /// `ChangeFromFuture` while the clock is offset, `HabitNotFound`, and
    /// `UpdateCompletedGoal` when the active goal is already completed.
    #[instrument(skip(self, update), fields(habit_id = update.habit_id))]
    pub fn update_habit(&self, username: &str, update: HabitUpdate) -> Result<()> {
        validate_name(&update.name)?;
        if let Some(rules) = &update.goal {
            rules.validate()?;
        }

        self.db.run_repeatable_read(|storage| {
            self.ensure_present(storage, username, "update")?;
            ensure_user(storage, username)?;
            let now = self.clock.current_time(storage, username)?;
            let current = find_habit(storage, username, update.habit_id)?;

            if let Some(goal) = &current.goal {
                if goal.is_completed {
                    return Err(CoreError::UpdateCompletedGoal { goal_id: goal.id });
                }
            }

            if current.name != update.name || current.description != update.description {
                storage.update_habit(current.id, &update.name, &update.description)?;
            }

            match (current.goal, update.goal) {
                (None, None) => {}
                (None, Some(rules)) => {
                    let goal = new_goal(current.id, username, rules, now, Vec::new());
                    let goal_id = storage.create_goal(&goal)?;
                    info!(username, habit_id = current.id, goal_id, "goal added");
                }
                (Some(goal), None) => {
                    storage.deactivate_goal(goal.id)?;
                    info!(username, habit_id = current.id, goal_id = goal.id, "goal removed");
                }
                (Some(goal), Some(rules)) if goal.rules() == rules => {}
                (Some(goal), Some(rules)) if goal.frequency == rules.frequency => {
                    self.retarget_goal(storage, username, &goal, rules, now)?;
                }
                (Some(goal), Some(rules)) => {
                    self.replace_goal(storage, username, &goal, rules, now)?;
                }
            }
            Ok(())
        })
    }

    /// Same frequency: the goal keeps its id and anchoring.
    fn retarget_goal(
        &self,
        storage: &dyn Storage,
        username: &str,
        goal: &Goal,
        rules: GoalRules,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let updated = goal.with_rules(rules);
        storage.update_goal(&updated)?;
        recalculate_future_progresses_by_goal_update(storage, username, goal, &updated, now)?;

        let today = snapshot::get_progress(storage, goal.id, username, now)?;
        if today.total_completed_periods >= updated.total_tracking_periods {
            storage.set_goal_completed(goal.id)?;
        }
        info!(
            username,
            goal_id = goal.id,
            times_per_frequency = rules.times_per_frequency,
            total_tracking_periods = rules.total_tracking_periods,
            "goal retargeted"
        );
        Ok(())
    }

    /// New frequency: retire the goal and start a new generation that counts
    /// the old generations' executions and starts from today's statistics.
    fn replace_goal(
        &self,
        storage: &dyn Storage,
        username: &str,
        goal: &Goal,
        rules: GoalRules,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let carried = snapshot::get_progress(storage, goal.id, username, now)?;
        storage.deactivate_goal(goal.id)?;

        let mut predecessors = goal.predecessor_ids.clone();
        predecessors.push(goal.id);
        let successor = new_goal(goal.habit_id, username, rules, now, predecessors);
        let goal_id = storage.create_goal(&successor)?;

        let mut progress = carried.carried_to(now);
        progress.goal_id = goal_id;
        progress.id = storage.create_progress(&progress)?;
        storage.create_snapshot(&ProgressSnapshot {
            username: username.to_string(),
            goal_id,
            progress_id: progress.id,
            day: now.date_naive(),
        })?;

        info!(
            username,
            habit_id = goal.habit_id,
            old_goal_id = goal.id,
            goal_id,
            frequency = %rules.frequency,
            "goal replaced"
        );
        Ok(())
    }

    /// Archives the habit and deactivates its goal.
    #[instrument(skip(self))]
    pub fn archive_habit(&self, username: &str, habit_id: i64) -> Result<()> {
        self.db.run_repeatable_read(|storage| {
            self.ensure_present(storage, username, "archive")?;
            ensure_user(storage, username)?;
            let habit = find_habit(storage, username, habit_id)?;

            storage.archive_habit(habit.id)?;
            if let Some(goal) = &habit.goal {
                storage.deactivate_goal(goal.id)?;
            }
            info!(username, habit_id, "habit archived");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTimeSource;
    use crate::storage::Database;
    use crate::testing::instant;

    fn setup() -> (Database, ManualTimeSource) {
        let db = Database::open_memory().unwrap();
        db.storage().create_user("ann", instant(1, 0)).unwrap();
        (db, ManualTimeSource::new(instant(1, 12)))
    }

    fn daily(times: u32, periods: u32) -> GoalRules {
        GoalRules {
            frequency: FrequencyType::Daily,
            times_per_frequency: times,
            total_tracking_periods: periods,
        }
    }

    fn new_habit(name: &str, goal: Option<GoalRules>) -> NewHabit {
        NewHabit {
            name: name.into(),
            description: String::new(),
            goal,
        }
    }

    #[test]
    fn create_anchors_goal_at_current_time() {
        let (db, source) = setup();
        let svc = HabitService::new(&db, VirtualClock::new(source));

        let habit_id = svc.create_habit("ann", new_habit("Read", Some(daily(2, 10)))).unwrap();
        let goal = db.storage().get_goal(habit_id).unwrap().unwrap();
        assert_eq!(goal.start_tracking_at, instant(1, 12));
        assert_eq!(goal.next_check_at, instant(2, 12) + Duration::minutes(5));
    }

    #[test]
    fn create_rejects_empty_name_and_bad_rules() {
        let (db, source) = setup();
        let svc = HabitService::new(&db, VirtualClock::new(source));

        assert!(matches!(
            svc.create_habit("ann", new_habit("  ", None)),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            svc.create_habit("ann", new_habit("Read", Some(daily(0, 10)))),
            Err(CoreError::Validation(_))
        ));
        assert!(svc.list_habits("ann").unwrap().is_empty());
    }

    #[test]
    fn mutations_from_the_future_are_rejected() {
        let (db, source) = setup();
        let clock = VirtualClock::new(source);
        let svc = HabitService::new(&db, clock.clone());
        let habit_id = svc.create_habit("ann", new_habit("Read", None)).unwrap();

        clock.advance_days(&db.storage(), "ann", 1).unwrap();
        assert!(matches!(
            svc.create_habit("ann", new_habit("Run", None)),
            Err(CoreError::ChangeFromFuture { action: "create" })
        ));
        assert!(matches!(
            svc.archive_habit("ann", habit_id),
            Err(CoreError::ChangeFromFuture { action: "archive" })
        ));
        let update = HabitUpdate {
            habit_id,
            name: "Read more".into(),
            description: String::new(),
            goal: None,
        };
        assert!(matches!(
            svc.update_habit("ann", update),
            Err(CoreError::ChangeFromFuture { action: "update" })
        ));
    }

    #[test]
    fn archive_hides_habit_and_deactivates_goal() {
        let (db, source) = setup();
        let svc = HabitService::new(&db, VirtualClock::new(source));
        let habit_id = svc.create_habit("ann", new_habit("Read", Some(daily(1, 3)))).unwrap();

        svc.archive_habit("ann", habit_id).unwrap();
        assert!(svc.list_habits("ann").unwrap().is_empty());
        assert!(db.storage().get_goal(habit_id).unwrap().is_none());
        assert!(matches!(
            svc.archive_habit("ann", 404),
            Err(CoreError::HabitNotFound { habit_id: 404 })
        ));
    }

    #[test]
    fn same_frequency_edit_keeps_goal_id() {
        let (db, source) = setup();
        let svc = HabitService::new(&db, VirtualClock::new(source));
        let habit_id = svc.create_habit("ann", new_habit("Read", Some(daily(2, 10)))).unwrap();
        let before = db.storage().get_goal(habit_id).unwrap().unwrap();

        svc.update_habit(
            "ann",
            HabitUpdate {
                habit_id,
                name: "Read".into(),
                description: "before bed".into(),
                goal: Some(daily(3, 12)),
            },
        )
        .unwrap();

        let after = db.storage().get_goal(habit_id).unwrap().unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(after.times_per_frequency, 3);
        assert_eq!(after.total_tracking_periods, 12);
        assert_eq!(after.start_tracking_at, before.start_tracking_at);
        let habit = db.storage().get_habit("ann", habit_id).unwrap().unwrap();
        assert_eq!(habit.description, "before bed");
    }

    #[test]
    fn frequency_change_starts_new_generation() {
        let (db, source) = setup();
        let svc = HabitService::new(&db, VirtualClock::new(source));
        let habit_id = svc.create_habit("ann", new_habit("Read", Some(daily(2, 10)))).unwrap();
        let old = db.storage().get_goal(habit_id).unwrap().unwrap();
        db.storage().add_execution_log(old.id, instant(1, 13)).unwrap();

        let weekly = GoalRules {
            frequency: FrequencyType::Weekly,
            times_per_frequency: 3,
            total_tracking_periods: 4,
        };
        svc.update_habit(
            "ann",
            HabitUpdate {
                habit_id,
                name: "Read".into(),
                description: String::new(),
                goal: Some(weekly),
            },
        )
        .unwrap();

        let new = db.storage().get_goal(habit_id).unwrap().unwrap();
        assert_ne!(new.id, old.id);
        assert_eq!(new.predecessor_ids, vec![old.id]);
        assert_eq!(new.frequency, FrequencyType::Weekly);

        let all_day = crate::tracking::period::day_range(instant(1, 0).date_naive());
        assert_eq!(db.storage().count_executions(new.id, all_day).unwrap(), 1);
    }

    #[test]
    fn completed_goal_cannot_be_edited() {
        let (db, source) = setup();
        let svc = HabitService::new(&db, VirtualClock::new(source));
        let habit_id = svc.create_habit("ann", new_habit("Read", Some(daily(1, 1)))).unwrap();
        let goal = db.storage().get_goal(habit_id).unwrap().unwrap();
        db.storage().set_goal_completed(goal.id).unwrap();

        let result = svc.update_habit(
            "ann",
            HabitUpdate {
                habit_id,
                name: "Renamed".into(),
                description: String::new(),
                goal: Some(daily(2, 5)),
            },
        );
        assert!(matches!(result, Err(CoreError::UpdateCompletedGoal { .. })));
        assert_eq!(svc.list_completed_habits("ann").unwrap().len(), 1);
        let habit = db.storage().get_habit("ann", habit_id).unwrap().unwrap();
        assert_eq!(habit.name, "Read");
    }
}

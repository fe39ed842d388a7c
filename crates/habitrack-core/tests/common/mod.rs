//! Shared harness for habitrack-core integration tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use habitrack_core::users::create_user;
use habitrack_core::{
    Database, FrequencyType, Goal, GoalRules, GoalsChecker, HabitService, ManualTimeSource,
    NewHabit, Progress, ProgressService, Storage, VirtualClock,
};

pub const CHECKER: &str = "goals_checker";

/// 2024-03-`day` at `hour`:00 UTC.
pub fn instant(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

pub fn rules(frequency: FrequencyType, times: u32, periods: u32) -> GoalRules {
    GoalRules {
        frequency,
        times_per_frequency: times,
        total_tracking_periods: periods,
    }
}

/// In-memory database plus a wall clock frozen at 2024-03-01 12:00 UTC.
pub struct Harness {
    pub db: Database,
    pub source: ManualTimeSource,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            db: Database::open_memory().unwrap(),
            source: ManualTimeSource::new(instant(1, 12)),
        }
    }

    pub fn clock(&self) -> VirtualClock<ManualTimeSource> {
        VirtualClock::new(self.source.clone())
    }

    pub fn progress(&self) -> ProgressService<'_, Database, ManualTimeSource> {
        ProgressService::new(&self.db, self.clock())
    }

    pub fn habits(&self) -> HabitService<'_, Database, ManualTimeSource> {
        HabitService::new(&self.db, self.clock())
    }

    pub fn checker(&self) -> GoalsChecker<'_, Database, ManualTimeSource> {
        GoalsChecker::new(&self.db, self.clock(), CHECKER)
    }

    pub fn user(&self, username: &str) {
        create_user(&self.db, username, self.source_now()).unwrap();
    }

    pub fn source_now(&self) -> DateTime<Utc> {
        use habitrack_core::TimeSource;
        self.source.now()
    }

    /// Creates a habit with a goal and returns its active goal.
    pub fn habit(&self, username: &str, rules: GoalRules) -> Goal {
        let habit_id = self
            .habits()
            .create_habit(
                username,
                NewHabit {
                    name: format!("{} x{}", rules.frequency, rules.times_per_frequency),
                    description: String::new(),
                    goal: Some(rules),
                },
            )
            .unwrap();
        self.goal(habit_id)
    }

    pub fn goal(&self, habit_id: i64) -> Goal {
        self.db.storage().get_goal(habit_id).unwrap().unwrap()
    }

    pub fn advance(&self, username: &str, days: i64) {
        self.clock().advance_days(&self.db.storage(), username, days).unwrap();
    }

    pub fn reset(&self, username: &str) {
        self.clock().reset_time(&self.db.storage(), username).unwrap();
    }

    pub fn add(&self, username: &str, habit_id: i64) -> Progress {
        self.progress().add_progress(username, habit_id).unwrap()
    }

    pub fn today(&self, username: &str, habit_id: i64) -> Progress {
        self.progress().get_progress(username, habit_id).unwrap().progress
    }
}

/// `(completed_times, completed_periods, skipped, current_streak, longest_streak)`
pub fn stats(p: &Progress) -> (u32, u32, u32, u32, u32) {
    (
        p.total_completed_times,
        p.total_completed_periods,
        p.total_skipped_periods,
        p.current_streak,
        p.most_longest_streak,
    )
}

//! Fixtures shared by unit tests.

use chrono::{DateTime, TimeZone, Utc};

use crate::model::{FrequencyType, Goal, NewHabit};
use crate::storage::Storage;
use crate::habits::first_check_at;

/// 2024-03-`day` at `hour`:00 UTC.
pub fn instant(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

/// Creates the user when missing, a habit, and an active goal tracking from
/// 2024-03-01 00:00 UTC.
pub fn seed_goal(
    storage: &dyn Storage,
    username: &str,
    frequency: FrequencyType,
    times_per_frequency: u32,
    total_tracking_periods: u32,
) -> Goal {
    let start = instant(1, 0);
    if storage.get_user(username).unwrap().is_none() {
        storage.create_user(username, start).unwrap();
    }
    let habit_id = storage
        .create_habit(
            username,
            &NewHabit {
                name: format!("{frequency} habit"),
                description: String::new(),
                goal: None,
            },
            start,
        )
        .unwrap();

    let mut goal = Goal {
        id: 0,
        habit_id,
        username: username.to_string(),
        frequency,
        times_per_frequency,
        total_tracking_periods,
        is_active: true,
        is_completed: false,
        created_at: start,
        start_tracking_at: start,
        next_check_at: first_check_at(start, frequency),
        predecessor_ids: Vec::new(),
    };
    goal.id = storage.create_goal(&goal).unwrap();
    goal
}

pub fn seed_daily_goal(storage: &dyn Storage, username: &str, target: u32, periods: u32) -> Goal {
    seed_goal(storage, username, FrequencyType::Daily, target, periods)
}

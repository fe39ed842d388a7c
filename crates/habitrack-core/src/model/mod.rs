//! Domain records shared by the engine, storage and CLI.

pub mod habit;
pub mod progress;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use habit::{FrequencyType, Goal, GoalRules, Habit, HabitUpdate, NewHabit};
pub use progress::{CurrentPeriodProgress, Progress, ProgressSnapshot, ProgressWithGoal};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub created_at: DateTime<Utc>,
}

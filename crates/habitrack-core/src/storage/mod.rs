mod config;
pub mod database;
pub mod migrations;
pub mod sqlite;

pub use config::{CheckerConfig, Config, LoggingConfig, StorageConfig, TransactionConfig};
pub use database::Database;
pub use sqlite::SqliteStorage;

use chrono::{DateTime, NaiveDate, Utc};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};
use crate::model::{Goal, Habit, NewHabit, Progress, ProgressSnapshot, User};
use crate::tracking::period::PeriodRange;

/// Returns the data directory.
///
/// `HABITRACK_HOME` wins when set; otherwise `~/.config/habitrack[-dev]/`
/// based on `HABITRACK_ENV`.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("HABITRACK_HOME") {
        Some(home) => PathBuf::from(home),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("HABITRACK_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("habitrack-dev")
            } else {
                base_dir.join("habitrack")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}

/// Store operations the engine depends on.
///
/// Absence is reported as `Ok(None)`; errors are reserved for store failures.
pub trait Storage {
    fn create_user(&self, username: &str, at: DateTime<Utc>) -> Result<()>;
    fn get_user(&self, username: &str) -> Result<Option<User>>;

    /// Per-user virtual clock offset in days.
    fn get_time_offset(&self, username: &str) -> Result<Option<i64>>;
    fn set_time_offset(&self, username: &str, offset_days: i64) -> Result<()>;

    /// Inserts the habit row only; goals are created separately.
    fn create_habit(&self, username: &str, habit: &NewHabit, at: DateTime<Utc>) -> Result<i64>;
    /// Habit owned by `username`, with its active goal attached.
    fn get_habit(&self, username: &str, habit_id: i64) -> Result<Option<Habit>>;
    fn list_habits(&self, username: &str) -> Result<Vec<Habit>>;
    fn list_completed_habits(&self, username: &str) -> Result<Vec<Habit>>;
    fn update_habit(&self, habit_id: i64, name: &str, description: &str) -> Result<()>;
    fn archive_habit(&self, habit_id: i64) -> Result<()>;

    /// Inserts a goal together with its predecessor list.
    fn create_goal(&self, goal: &Goal) -> Result<i64>;
    /// Active goal of a habit.
    fn get_goal(&self, habit_id: i64) -> Result<Option<Goal>>;
    fn update_goal(&self, goal: &Goal) -> Result<()>;
    fn set_goal_completed(&self, goal_id: i64) -> Result<()>;
    fn deactivate_goal(&self, goal_id: i64) -> Result<()>;
    fn set_goal_next_check(&self, goal_id: i64, next_check_at: DateTime<Utc>) -> Result<()>;
    /// Active, incomplete goals whose next check is at or before `now`.
    fn list_goals_needing_check(&self, now: DateTime<Utc>) -> Result<Vec<Goal>>;

    fn add_execution_log(&self, goal_id: i64, at: DateTime<Utc>) -> Result<()>;
    /// Executions of the goal or any of its predecessors inside `range`.
    fn count_executions(&self, goal_id: i64, range: PeriodRange) -> Result<u32>;

    fn create_progress(&self, progress: &Progress) -> Result<i64>;
    fn update_progress_by_id(&self, progress: &Progress) -> Result<()>;
    fn get_progress_by_id(&self, progress_id: i64) -> Result<Option<Progress>>;

    fn get_current_snapshot(
        &self,
        username: &str,
        goal_id: i64,
        day: NaiveDate,
    ) -> Result<Option<ProgressSnapshot>>;
    /// Latest snapshot strictly before `before`.
    fn get_most_recent_snapshot(
        &self,
        username: &str,
        goal_id: i64,
        before: NaiveDate,
    ) -> Result<Option<ProgressSnapshot>>;
    /// Snapshots strictly after `after`, oldest first.
    fn get_future_snapshots(
        &self,
        username: &str,
        goal_id: i64,
        after: NaiveDate,
    ) -> Result<Vec<ProgressSnapshot>>;
    fn create_snapshot(&self, snapshot: &ProgressSnapshot) -> Result<()>;
}

/// Runs a unit of work atomically.
pub trait Transactor {
    /// Runs `f` inside a transaction at repeatable-read isolation or
    /// stronger. Commits on `Ok`, rolls back on `Err`. `f` may be re-run
    /// when the store reports a transient conflict.
    fn run_repeatable_read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnMut(&dyn Storage) -> Result<T>;
}

//! SQLite implementation of [`Storage`].
//!
//! `SqliteStorage` borrows a connection, so the same code runs both on a
//! plain connection and inside a transaction opened by
//! [`Database`](super::Database).

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::Storage;
use crate::error::{DatabaseError, Result};
use crate::model::{FrequencyType, Goal, Habit, NewHabit, Progress, ProgressSnapshot, User};
use crate::tracking::period::PeriodRange;

// === Helper Functions ===

/// Fixed-width RFC 3339 so lexical order equals chronological order.
pub(crate) fn format_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn format_day(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn ts_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn day_column(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| conversion_error(idx, e))
}

fn count_column(row: &Row, idx: usize) -> rusqlite::Result<u32> {
    let raw: i64 = row.get(idx)?;
    u32::try_from(raw).map_err(|e| conversion_error(idx, e))
}

const HABIT_COLUMNS: &str = "id, username, name, description, is_archived, created_at";

/// Build a Habit (without its goal) from a database row
fn row_to_habit(row: &Row) -> rusqlite::Result<Habit> {
    Ok(Habit {
        id: row.get(0)?,
        username: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        goal: None,
        is_archived: row.get(4)?,
        created_at: ts_column(row, 5)?,
    })
}

const GOAL_COLUMNS: &str = "g.id, g.habit_id, h.username, g.frequency, g.times_per_frequency, \
     g.total_tracking_periods, g.is_active, g.is_completed, g.created_at, \
     g.start_tracking_at, g.next_check_at";

/// Build a Goal (without predecessors) from a database row
fn row_to_goal(row: &Row) -> rusqlite::Result<Goal> {
    let frequency: String = row.get(3)?;
    Ok(Goal {
        id: row.get(0)?,
        habit_id: row.get(1)?,
        username: row.get(2)?,
        frequency: FrequencyType::from_db(&frequency),
        times_per_frequency: count_column(row, 4)?,
        total_tracking_periods: count_column(row, 5)?,
        is_active: row.get(6)?,
        is_completed: row.get(7)?,
        created_at: ts_column(row, 8)?,
        start_tracking_at: ts_column(row, 9)?,
        next_check_at: ts_column(row, 10)?,
        predecessor_ids: Vec::new(),
    })
}

const PROGRESS_COLUMNS: &str = "id, goal_id, username, total_completed_periods, \
     total_skipped_periods, total_completed_times, most_longest_streak, current_streak, \
     created_at, updated_at";

fn row_to_progress(row: &Row) -> rusqlite::Result<Progress> {
    Ok(Progress {
        id: row.get(0)?,
        goal_id: row.get(1)?,
        username: row.get(2)?,
        total_completed_periods: count_column(row, 3)?,
        total_skipped_periods: count_column(row, 4)?,
        total_completed_times: count_column(row, 5)?,
        most_longest_streak: count_column(row, 6)?,
        current_streak: count_column(row, 7)?,
        created_at: ts_column(row, 8)?,
        updated_at: ts_column(row, 9)?,
    })
}

fn row_to_snapshot(row: &Row) -> rusqlite::Result<ProgressSnapshot> {
    Ok(ProgressSnapshot {
        username: row.get(0)?,
        goal_id: row.get(1)?,
        progress_id: row.get(2)?,
        day: day_column(row, 3)?,
    })
}

/// Storage operations over a borrowed SQLite connection.
pub struct SqliteStorage<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStorage<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn load_predecessors(&self, goal: &mut Goal) -> Result<()> {
        let op = "load_predecessors";
        let mut stmt = self
            .conn
            .prepare(
                "SELECT predecessor_id FROM goal_predecessors
                 WHERE goal_id = ?1 ORDER BY position",
            )
            .map_err(|e| DatabaseError::query(op, e))?;
        goal.predecessor_ids = stmt
            .query_map([goal.id], |row| row.get(0))
            .map_err(|e| DatabaseError::query(op, e))?
            .collect::<rusqlite::Result<Vec<i64>>>()
            .map_err(|e| DatabaseError::query(op, e))?;
        Ok(())
    }

    fn query_goals(
        &self,
        op: &'static str,
        sql: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<Goal>> {
        let mut stmt = self.conn.prepare(sql).map_err(|e| DatabaseError::query(op, e))?;
        let mut goals = stmt
            .query_map(args, row_to_goal)
            .map_err(|e| DatabaseError::query(op, e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| DatabaseError::query(op, e))?;
        for goal in &mut goals {
            self.load_predecessors(goal)?;
        }
        Ok(goals)
    }

    fn query_habits(&self, op: &'static str, sql: &str, username: &str) -> Result<Vec<Habit>> {
        let mut stmt = self.conn.prepare(sql).map_err(|e| DatabaseError::query(op, e))?;
        let mut habits = stmt
            .query_map([username], row_to_habit)
            .map_err(|e| DatabaseError::query(op, e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| DatabaseError::query(op, e))?;
        for habit in &mut habits {
            habit.goal = self.get_goal(habit.id)?;
        }
        Ok(habits)
    }

    fn expect_one_row(op: &'static str, changed: usize, what: &str, id: i64) -> Result<()> {
        if changed == 0 {
            return Err(DatabaseError::InvalidData {
                op,
                message: format!("{what} {id} does not exist"),
            }
            .into());
        }
        Ok(())
    }
}

impl Storage for SqliteStorage<'_> {
    // === Users ===

    fn create_user(&self, username: &str, at: DateTime<Utc>) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO users (username, created_at) VALUES (?1, ?2)",
                params![username, format_ts(at)],
            )
            .map_err(|e| DatabaseError::query("create_user", e))?;
        Ok(())
    }

    fn get_user(&self, username: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT username, created_at FROM users WHERE username = ?1",
                [username],
                |row| {
                    Ok(User {
                        username: row.get(0)?,
                        created_at: ts_column(row, 1)?,
                    })
                },
            )
            .optional()
            .map_err(|e| DatabaseError::query("get_user", e))?;
        Ok(user)
    }

    fn get_time_offset(&self, username: &str) -> Result<Option<i64>> {
        let offset = self
            .conn
            .query_row(
                "SELECT offset_days FROM user_time_offsets WHERE username = ?1",
                [username],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| DatabaseError::query("get_time_offset", e))?;
        Ok(offset)
    }

    fn set_time_offset(&self, username: &str, offset_days: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO user_time_offsets (username, offset_days) VALUES (?1, ?2)
                 ON CONFLICT(username) DO UPDATE SET offset_days = excluded.offset_days",
                params![username, offset_days],
            )
            .map_err(|e| DatabaseError::query("set_time_offset", e))?;
        Ok(())
    }

    // === Habits ===

    fn create_habit(&self, username: &str, habit: &NewHabit, at: DateTime<Utc>) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO habits (username, name, description, is_archived, created_at)
                 VALUES (?1, ?2, ?3, 0, ?4)",
                params![username, habit.name, habit.description, format_ts(at)],
            )
            .map_err(|e| DatabaseError::query("create_habit", e))?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_habit(&self, username: &str, habit_id: i64) -> Result<Option<Habit>> {
        let habit = self
            .conn
            .query_row(
                &format!("SELECT {HABIT_COLUMNS} FROM habits WHERE id = ?1 AND username = ?2"),
                params![habit_id, username],
                row_to_habit,
            )
            .optional()
            .map_err(|e| DatabaseError::query("get_habit", e))?;

        match habit {
            Some(mut habit) => {
                habit.goal = self.get_goal(habit.id)?;
                Ok(Some(habit))
            }
            None => Ok(None),
        }
    }

    fn list_habits(&self, username: &str) -> Result<Vec<Habit>> {
        self.query_habits(
            "list_habits",
            &format!(
                "SELECT {HABIT_COLUMNS} FROM habits
                 WHERE username = ?1 AND is_archived = 0 ORDER BY id"
            ),
            username,
        )
    }

    fn list_completed_habits(&self, username: &str) -> Result<Vec<Habit>> {
        self.query_habits(
            "list_completed_habits",
            &format!(
                "SELECT {HABIT_COLUMNS} FROM habits h
                 WHERE h.username = ?1 AND EXISTS (
                     SELECT 1 FROM goals g
                     WHERE g.habit_id = h.id AND g.is_active = 1 AND g.is_completed = 1
                 )
                 ORDER BY h.id"
            ),
            username,
        )
    }

    fn update_habit(&self, habit_id: i64, name: &str, description: &str) -> Result<()> {
        let op = "update_habit";
        let changed = self
            .conn
            .execute(
                "UPDATE habits SET name = ?1, description = ?2 WHERE id = ?3",
                params![name, description, habit_id],
            )
            .map_err(|e| DatabaseError::query(op, e))?;
        Self::expect_one_row(op, changed, "habit", habit_id)
    }

    fn archive_habit(&self, habit_id: i64) -> Result<()> {
        let op = "archive_habit";
        let changed = self
            .conn
            .execute("UPDATE habits SET is_archived = 1 WHERE id = ?1", [habit_id])
            .map_err(|e| DatabaseError::query(op, e))?;
        Self::expect_one_row(op, changed, "habit", habit_id)
    }

    // === Goals ===

    fn create_goal(&self, goal: &Goal) -> Result<i64> {
        let op = "create_goal";
        self.conn
            .execute(
                "INSERT INTO goals (
                    habit_id, frequency, times_per_frequency, total_tracking_periods,
                    is_active, is_completed, created_at, start_tracking_at, next_check_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    goal.habit_id,
                    goal.frequency.as_str(),
                    goal.times_per_frequency,
                    goal.total_tracking_periods,
                    goal.is_active,
                    goal.is_completed,
                    format_ts(goal.created_at),
                    format_ts(goal.start_tracking_at),
                    format_ts(goal.next_check_at),
                ],
            )
            .map_err(|e| DatabaseError::query(op, e))?;
        let goal_id = self.conn.last_insert_rowid();

        for (position, predecessor_id) in goal.predecessor_ids.iter().enumerate() {
            self.conn
                .execute(
                    "INSERT INTO goal_predecessors (goal_id, predecessor_id, position)
                     VALUES (?1, ?2, ?3)",
                    params![goal_id, predecessor_id, position as i64],
                )
                .map_err(|e| DatabaseError::query(op, e))?;
        }
        Ok(goal_id)
    }

    fn get_goal(&self, habit_id: i64) -> Result<Option<Goal>> {
        let mut goals = self.query_goals(
            "get_goal",
            &format!(
                "SELECT {GOAL_COLUMNS} FROM goals g JOIN habits h ON h.id = g.habit_id
                 WHERE g.habit_id = ?1 AND g.is_active = 1
                 ORDER BY g.id DESC LIMIT 1"
            ),
            [habit_id],
        )?;
        Ok(goals.pop())
    }

    fn update_goal(&self, goal: &Goal) -> Result<()> {
        let op = "update_goal";
        let changed = self
            .conn
            .execute(
                "UPDATE goals SET
                    frequency = ?1, times_per_frequency = ?2, total_tracking_periods = ?3,
                    is_active = ?4, is_completed = ?5, start_tracking_at = ?6, next_check_at = ?7
                 WHERE id = ?8",
                params![
                    goal.frequency.as_str(),
                    goal.times_per_frequency,
                    goal.total_tracking_periods,
                    goal.is_active,
                    goal.is_completed,
                    format_ts(goal.start_tracking_at),
                    format_ts(goal.next_check_at),
                    goal.id,
                ],
            )
            .map_err(|e| DatabaseError::query(op, e))?;
        Self::expect_one_row(op, changed, "goal", goal.id)
    }

    fn set_goal_completed(&self, goal_id: i64) -> Result<()> {
        let op = "set_goal_completed";
        let changed = self
            .conn
            .execute("UPDATE goals SET is_completed = 1 WHERE id = ?1", [goal_id])
            .map_err(|e| DatabaseError::query(op, e))?;
        Self::expect_one_row(op, changed, "goal", goal_id)
    }

    fn deactivate_goal(&self, goal_id: i64) -> Result<()> {
        let op = "deactivate_goal";
        let changed = self
            .conn
            .execute("UPDATE goals SET is_active = 0 WHERE id = ?1", [goal_id])
            .map_err(|e| DatabaseError::query(op, e))?;
        Self::expect_one_row(op, changed, "goal", goal_id)
    }

    fn set_goal_next_check(&self, goal_id: i64, next_check_at: DateTime<Utc>) -> Result<()> {
        let op = "set_goal_next_check";
        let changed = self
            .conn
            .execute(
                "UPDATE goals SET next_check_at = ?1 WHERE id = ?2",
                params![format_ts(next_check_at), goal_id],
            )
            .map_err(|e| DatabaseError::query(op, e))?;
        Self::expect_one_row(op, changed, "goal", goal_id)
    }

    fn list_goals_needing_check(&self, now: DateTime<Utc>) -> Result<Vec<Goal>> {
        self.query_goals(
            "list_goals_needing_check",
            &format!(
                "SELECT {GOAL_COLUMNS} FROM goals g JOIN habits h ON h.id = g.habit_id
                 WHERE g.is_active = 1 AND g.is_completed = 0 AND g.next_check_at <= ?1
                 ORDER BY g.id"
            ),
            [format_ts(now)],
        )
    }

    // === Execution log ===

    fn add_execution_log(&self, goal_id: i64, at: DateTime<Utc>) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO execution_logs (goal_id, created_at) VALUES (?1, ?2)",
                params![goal_id, format_ts(at)],
            )
            .map_err(|e| DatabaseError::query("add_execution_log", e))?;
        Ok(())
    }

    fn count_executions(&self, goal_id: i64, range: PeriodRange) -> Result<u32> {
        let op = "count_executions";
        if range.end <= range.start {
            return Ok(0);
        }
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM execution_logs
                 WHERE (goal_id = ?1 OR goal_id IN (
                        SELECT predecessor_id FROM goal_predecessors WHERE goal_id = ?1))
                   AND created_at >= ?2 AND created_at < ?3",
                params![goal_id, format_ts(range.start), format_ts(range.end)],
                |row| row.get(0),
            )
            .map_err(|e| DatabaseError::query(op, e))?;
        u32::try_from(count).map_err(|e| {
            DatabaseError::InvalidData {
                op,
                message: e.to_string(),
            }
            .into()
        })
    }

    // === Progress ===

    fn create_progress(&self, progress: &Progress) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO progresses (
                    goal_id, username, total_completed_periods, total_skipped_periods,
                    total_completed_times, most_longest_streak, current_streak,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    progress.goal_id,
                    progress.username,
                    progress.total_completed_periods,
                    progress.total_skipped_periods,
                    progress.total_completed_times,
                    progress.most_longest_streak,
                    progress.current_streak,
                    format_ts(progress.created_at),
                    format_ts(progress.updated_at),
                ],
            )
            .map_err(|e| DatabaseError::query("create_progress", e))?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_progress_by_id(&self, progress: &Progress) -> Result<()> {
        let op = "update_progress_by_id";
        let changed = self
            .conn
            .execute(
                "UPDATE progresses SET
                    total_completed_periods = ?1, total_skipped_periods = ?2,
                    total_completed_times = ?3, most_longest_streak = ?4,
                    current_streak = ?5, updated_at = ?6
                 WHERE id = ?7",
                params![
                    progress.total_completed_periods,
                    progress.total_skipped_periods,
                    progress.total_completed_times,
                    progress.most_longest_streak,
                    progress.current_streak,
                    format_ts(progress.updated_at),
                    progress.id,
                ],
            )
            .map_err(|e| DatabaseError::query(op, e))?;
        Self::expect_one_row(op, changed, "progress", progress.id)
    }

    fn get_progress_by_id(&self, progress_id: i64) -> Result<Option<Progress>> {
        let progress = self
            .conn
            .query_row(
                &format!("SELECT {PROGRESS_COLUMNS} FROM progresses WHERE id = ?1"),
                [progress_id],
                row_to_progress,
            )
            .optional()
            .map_err(|e| DatabaseError::query("get_progress_by_id", e))?;
        Ok(progress)
    }

    // === Snapshots ===

    fn get_current_snapshot(
        &self,
        username: &str,
        goal_id: i64,
        day: NaiveDate,
    ) -> Result<Option<ProgressSnapshot>> {
        let snapshot = self
            .conn
            .query_row(
                "SELECT username, goal_id, progress_id, day FROM progress_snapshots
                 WHERE username = ?1 AND goal_id = ?2 AND day = ?3",
                params![username, goal_id, format_day(day)],
                row_to_snapshot,
            )
            .optional()
            .map_err(|e| DatabaseError::query("get_current_snapshot", e))?;
        Ok(snapshot)
    }

    fn get_most_recent_snapshot(
        &self,
        username: &str,
        goal_id: i64,
        before: NaiveDate,
    ) -> Result<Option<ProgressSnapshot>> {
        let snapshot = self
            .conn
            .query_row(
                "SELECT username, goal_id, progress_id, day FROM progress_snapshots
                 WHERE username = ?1 AND goal_id = ?2 AND day < ?3
                 ORDER BY day DESC LIMIT 1",
                params![username, goal_id, format_day(before)],
                row_to_snapshot,
            )
            .optional()
            .map_err(|e| DatabaseError::query("get_most_recent_snapshot", e))?;
        Ok(snapshot)
    }

    fn get_future_snapshots(
        &self,
        username: &str,
        goal_id: i64,
        after: NaiveDate,
    ) -> Result<Vec<ProgressSnapshot>> {
        let op = "get_future_snapshots";
        let mut stmt = self
            .conn
            .prepare(
                "SELECT username, goal_id, progress_id, day FROM progress_snapshots
                 WHERE username = ?1 AND goal_id = ?2 AND day > ?3
                 ORDER BY day",
            )
            .map_err(|e| DatabaseError::query(op, e))?;
        let snapshots = stmt
            .query_map(params![username, goal_id, format_day(after)], row_to_snapshot)
            .map_err(|e| DatabaseError::query(op, e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| DatabaseError::query(op, e))?;
        Ok(snapshots)
    }

    fn create_snapshot(&self, snapshot: &ProgressSnapshot) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO progress_snapshots (username, goal_id, progress_id, day)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    snapshot.username,
                    snapshot.goal_id,
                    snapshot.progress_id,
                    format_day(snapshot.day)
                ],
            )
            .map_err(|e| DatabaseError::query("create_snapshot", e))?;
        Ok(())
    }
}

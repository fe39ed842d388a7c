//! Database schema migrations for habitrack.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};
use tracing::{info, warn};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const CURRENT_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }
    if current_version < CURRENT_VERSION {
        info!(from = current_version, to = CURRENT_VERSION, "schema migrated");
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: users, habits, goals, execution log, progress rows and the
/// per-user virtual clock offsets.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            username   TEXT PRIMARY KEY,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS habits (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            username    TEXT NOT NULL REFERENCES users(username),
            name        TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            is_archived INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS goals (
            id                     INTEGER PRIMARY KEY AUTOINCREMENT,
            habit_id               INTEGER NOT NULL REFERENCES habits(id),
            frequency              TEXT NOT NULL,
            times_per_frequency    INTEGER NOT NULL,
            total_tracking_periods INTEGER NOT NULL,
            is_active              INTEGER NOT NULL DEFAULT 1,
            is_completed           INTEGER NOT NULL DEFAULT 0,
            created_at             TEXT NOT NULL,
            start_tracking_at      TEXT NOT NULL,
            next_check_at          TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS execution_logs (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            goal_id    INTEGER NOT NULL REFERENCES goals(id),
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS progresses (
            id                      INTEGER PRIMARY KEY AUTOINCREMENT,
            goal_id                 INTEGER NOT NULL REFERENCES goals(id),
            username                TEXT NOT NULL,
            total_completed_periods INTEGER NOT NULL DEFAULT 0,
            total_skipped_periods   INTEGER NOT NULL DEFAULT 0,
            total_completed_times   INTEGER NOT NULL DEFAULT 0,
            most_longest_streak     INTEGER NOT NULL DEFAULT 0,
            current_streak          INTEGER NOT NULL DEFAULT 0,
            created_at              TEXT NOT NULL,
            updated_at              TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS user_time_offsets (
            username    TEXT PRIMARY KEY,
            offset_days INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_habits_username ON habits(username);
        CREATE INDEX IF NOT EXISTS idx_goals_habit_active ON goals(habit_id, is_active);
        CREATE INDEX IF NOT EXISTS idx_goals_next_check ON goals(is_active, is_completed, next_check_at);
        CREATE INDEX IF NOT EXISTS idx_execution_logs_goal_time ON execution_logs(goal_id, created_at);",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: day snapshots and goal generations.
///
/// - `progress_snapshots` binds one progress row to each (user, goal, day).
/// - `goal_predecessors` keeps superseded goal ids so their execution logs
///   still count for the goal that replaced them.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS progress_snapshots (
            username    TEXT NOT NULL,
            goal_id     INTEGER NOT NULL REFERENCES goals(id),
            progress_id INTEGER NOT NULL UNIQUE REFERENCES progresses(id),
            day         TEXT NOT NULL,
            PRIMARY KEY (username, goal_id, day)
        );

        CREATE TABLE IF NOT EXISTS goal_predecessors (
            goal_id        INTEGER NOT NULL REFERENCES goals(id),
            predecessor_id INTEGER NOT NULL REFERENCES goals(id),
            position       INTEGER NOT NULL,
            PRIMARY KEY (goal_id, predecessor_id)
        );",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn fresh_database_reaches_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), CURRENT_VERSION);
        for table in [
            "users",
            "habits",
            "goals",
            "execution_logs",
            "progresses",
            "user_time_offsets",
            "progress_snapshots",
            "goal_predecessors",
        ] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
    }

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), CURRENT_VERSION);
    }

    #[test]
    fn v1_database_is_upgraded() {
        let conn = Connection::open_in_memory().unwrap();
        create_schema_version_table(&conn).unwrap();
        migrate_v1(&conn).unwrap();
        assert!(!table_exists(&conn, "progress_snapshots"));

        migrate(&conn).unwrap();
        assert!(table_exists(&conn, "progress_snapshots"));
        assert_eq!(get_schema_version(&conn), 2);
    }
}

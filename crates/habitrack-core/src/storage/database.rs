//! SQLite database handle and transaction runner.
//!
//! `Database` owns the connection, applies migrations on open and runs
//! units of work through [`Transactor`]. Writers take SQLite's reserved lock
//! up front (`BEGIN IMMEDIATE`), so read-modify-write sequences on progress
//! counters never interleave with another writer.

use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use super::config::{Config, TransactionConfig};
use super::migrations;
use super::sqlite::SqliteStorage;
use super::{Storage, Transactor};
use crate::error::{DatabaseError, Result};

/// SQLite database for habits, goals and progress.
pub struct Database {
    conn: Connection,
    retry: TransactionConfig,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database configured for `data_dir`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(config: &Config, data_dir: &Path) -> Result<Self> {
        let path = config.database_path(data_dir);
        let conn = Connection::open(&path).map_err(|source| DatabaseError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "opened database");
        Self::init(conn, config.busy_timeout(), config.transactions.clone())
    }

    /// Open an in-memory database with default settings.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| DatabaseError::OpenFailed {
            path: ":memory:".into(),
            source,
        })?;
        let config = Config::default();
        Self::init(conn, config.busy_timeout(), config.transactions)
    }

    fn init(conn: Connection, busy_timeout: Duration, retry: TransactionConfig) -> Result<Self> {
        conn.busy_timeout(busy_timeout)
            .map_err(|e| DatabaseError::query("busy_timeout", e))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| DatabaseError::query("foreign_keys", e))?;
        migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn, retry })
    }

    /// Store view over the connection without an enclosing transaction.
    pub fn storage(&self) -> SqliteStorage<'_> {
        SqliteStorage::new(&self.conn)
    }

    fn run_once<T, F>(&self, f: &mut F) -> Result<T>
    where
        F: FnMut(&dyn Storage) -> Result<T>,
    {
        self.conn
            .execute_batch("BEGIN IMMEDIATE TRANSACTION;")
            .map_err(|e| DatabaseError::query("begin", e))?;
        let storage = SqliteStorage::new(&self.conn);
        match f(&storage) {
            Ok(value) => {
                if let Err(e) = self.conn.execute_batch("COMMIT;") {
                    let _ = self.conn.execute_batch("ROLLBACK;");
                    return Err(DatabaseError::query("commit", e).into());
                }
                Ok(value)
            }
            Err(err) => {
                let _ = self.conn.execute_batch("ROLLBACK;");
                Err(err)
            }
        }
    }
}

impl Transactor for Database {
    fn run_repeatable_read<T, F>(&self, mut f: F) -> Result<T>
    where
        F: FnMut(&dyn Storage) -> Result<T>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.run_once(&mut f) {
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let backoff = self.retry.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        ?backoff,
                        error = %err,
                        "transaction conflict, retrying"
                    );
                    std::thread::sleep(backoff);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use chrono::Utc;

    fn fast_retry(db: &mut Database, max_attempts: u32) {
        db.retry = TransactionConfig {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
        };
    }

    #[test]
    fn commit_persists_writes() {
        let db = Database::open_memory().unwrap();
        db.run_repeatable_read(|store| store.create_user("ann", Utc::now()))
            .unwrap();
        assert!(db.storage().get_user("ann").unwrap().is_some());
    }

    #[test]
    fn error_rolls_back_every_write() {
        let db = Database::open_memory().unwrap();
        let result: Result<()> = db.run_repeatable_read(|store| {
            store.create_user("ann", Utc::now())?;
            store.set_time_offset("ann", 3)?;
            Err(CoreError::UserNotFound {
                username: "bob".into(),
            })
        });
        assert!(matches!(result, Err(CoreError::UserNotFound { .. })));
        assert!(db.storage().get_user("ann").unwrap().is_none());
        assert_eq!(db.storage().get_time_offset("ann").unwrap(), None);
    }

    #[test]
    fn locked_conflicts_are_retried_until_success() {
        let mut db = Database::open_memory().unwrap();
        fast_retry(&mut db, 5);
        let mut calls = 0;
        let value = db
            .run_repeatable_read(|store| {
                calls += 1;
                store.set_time_offset("ann", calls)?;
                if calls < 3 {
                    return Err(DatabaseError::Locked { op: "test" }.into());
                }
                Ok(calls)
            })
            .unwrap();
        assert_eq!(value, 3);
        assert_eq!(db.storage().get_time_offset("ann").unwrap(), Some(3));
    }

    #[test]
    fn retries_are_bounded() {
        let mut db = Database::open_memory().unwrap();
        fast_retry(&mut db, 2);
        let mut calls = 0;
        let result: Result<()> = db.run_repeatable_read(|_| {
            calls += 1;
            Err(DatabaseError::Locked { op: "test" }.into())
        });
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls, 2);
    }

    #[test]
    fn non_retryable_errors_fail_fast() {
        let db = Database::open_memory().unwrap();
        let mut calls = 0;
        let result: Result<()> = db.run_repeatable_read(|_| {
            calls += 1;
            Err(CoreError::HabitNotFound { habit_id: 1 })
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        {
            let db = Database::open(&config, dir.path()).unwrap();
            db.storage().create_user("ann", Utc::now()).unwrap();
        }
        let db = Database::open(&config, dir.path()).unwrap();
        assert!(db.storage().get_user("ann").unwrap().is_some());
        assert_eq!(
            migrations::get_schema_version(db.conn()),
            migrations::CURRENT_VERSION
        );
    }
}

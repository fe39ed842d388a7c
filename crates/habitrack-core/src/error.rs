//! Core error types for habitrack-core.
//!
//! This module defines the error hierarchy using thiserror. Storage failures
//! carry the name of the store operation that produced them; domain errors
//! (missing habit, completed goal, ...) are surfaced as distinct variants so
//! callers can present them without string matching.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for habitrack-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("user not found: {username}")]
    UserNotFound { username: String },

    #[error("habit not found: {habit_id}")]
    HabitNotFound { habit_id: i64 },

    /// The habit exists but has no active goal.
    #[error("goal not found for habit {habit_id}")]
    GoalNotFound { habit_id: i64 },

    #[error("goal {goal_id} is already completed")]
    GoalAlreadyCompleted { goal_id: i64 },

    #[error("can't update completed goal {goal_id}")]
    UpdateCompletedGoal { goal_id: i64 },

    #[error("progress not found: {progress_id}")]
    ProgressNotFound { progress_id: i64 },

    /// Habit mutations are only allowed on the real current day.
    #[error("can't {action} habit from future")]
    ChangeFromFuture { action: &'static str },
}

impl CoreError {
    /// Whether the failure is a transient lock conflict worth re-running the
    /// whole transaction for.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Database(DatabaseError::Locked { .. }))
    }
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("{op}: query failed: {source}")]
    QueryFailed {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked by a concurrent writer
    #[error("{op}: database is locked")]
    Locked { op: &'static str },

    /// A stored row could not be mapped back to a domain value
    #[error("{op}: invalid persisted data: {message}")]
    InvalidData { op: &'static str, message: String },
}

impl DatabaseError {
    /// Wraps a rusqlite error with the name of the failing store operation.
    pub fn query(op: &'static str, err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                DatabaseError::Locked { op }
            }
            _ => DatabaseError::QueryFailed { op, source: err },
        }
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Unknown frequency name
    #[error("Unknown frequency type '{0}' (expected daily, weekly or monthly)")]
    UnknownFrequency(String),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

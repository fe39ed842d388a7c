//! # Habitrack Core Library
//!
//! This library provides the core logic for tracking recurring habits against
//! daily, weekly or monthly goals. The `habitrack` CLI is a thin layer over
//! the same library.
//!
//! ## Architecture
//!
//! - **Tracking engine**: period arithmetic, per-day progress snapshots,
//!   progress logging, recalculation of visited days after a goal edit, and
//!   the skipped-period checker
//! - **Virtual clock**: per-user day offset layered on wall-clock time
//! - **Storage**: SQLite persistence behind the [`Storage`] trait and
//!   TOML-based configuration
//!
//! ## Key Components
//!
//! - [`ProgressService`]: log progress and read current statistics
//! - [`HabitService`]: habit and goal lifecycle
//! - [`GoalsChecker`]: periodic skip detection
//! - [`VirtualClock`]: per-user "now"
//! - [`Database`]: SQLite handle and transaction runner
//! - [`Config`]: Application configuration management

pub mod clock;
pub mod error;
pub mod habits;
pub mod model;
pub mod storage;
pub mod tracking;
pub mod users;

#[cfg(test)]
pub(crate) mod testing;

pub use clock::{ManualTimeSource, SystemTimeSource, TimeSource, VirtualClock};
pub use error::{ConfigError, CoreError, DatabaseError, Result, ValidationError};
pub use habits::HabitService;
pub use model::{
    CurrentPeriodProgress, FrequencyType, Goal, GoalRules, Habit, HabitUpdate, NewHabit, Progress,
    ProgressSnapshot, ProgressWithGoal, User,
};
pub use storage::{Config, Database, SqliteStorage, Storage, Transactor};
pub use tracking::{CheckReport, GoalsChecker, PeriodRange, ProgressService};

//! Per-user virtual clock.
//!
//! "Now" for a user is the wall clock shifted by a persisted number of days.
//! Every time-dependent engine operation resolves its instant here first, so
//! advancing or resetting a user's day changes nothing but that offset.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::error::{Result, ValidationError};
use crate::storage::Storage;

/// Largest offset, in either direction, a user's clock may be moved.
pub const MAX_OFFSET_DAYS: i64 = 100 * 366;

/// Source of wall-clock time.
pub trait TimeSource {
    fn now(&self) -> DateTime<Utc>;
}

/// Real system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable time source; clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualTimeSource {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualTimeSource {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        match self.now.lock() {
            Ok(mut guard) => *guard = now,
            Err(poisoned) => *poisoned.into_inner() = now,
        }
    }

    pub fn advance(&self, by: Duration) {
        let next = self.now() + by;
        self.set(next);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Wall clock plus a persisted per-user day offset.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock<T: TimeSource = SystemTimeSource> {
    source: T,
}

impl<T: TimeSource> VirtualClock<T> {
    pub fn new(source: T) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &T {
        &self.source
    }

    /// Offset in days; users without a row are at offset 0.
    pub fn current_offset(&self, storage: &dyn Storage, username: &str) -> Result<i64> {
        Ok(storage.get_time_offset(username)?.unwrap_or(0))
    }

    pub fn current_time(&self, storage: &dyn Storage, username: &str) -> Result<DateTime<Utc>> {
        let offset = self.current_offset(storage, username)?;
        self.shifted(offset)
    }

    /// Persists `offset_days` after checking it stays within
    /// [`MAX_OFFSET_DAYS`] of the wall clock.
    pub fn set_time_offset(
        &self,
        storage: &dyn Storage,
        username: &str,
        offset_days: i64,
    ) -> Result<()> {
        if offset_days.unsigned_abs() > MAX_OFFSET_DAYS.unsigned_abs() {
            return Err(invalid_offset(
                offset_days,
                format!("must be within {MAX_OFFSET_DAYS} days of today"),
            ));
        }
        self.shifted(offset_days)?;
        storage.set_time_offset(username, offset_days)?;
        info!(username, offset_days, "virtual clock offset set");
        Ok(())
    }

    pub fn reset_time(&self, storage: &dyn Storage, username: &str) -> Result<()> {
        self.set_time_offset(storage, username, 0)
    }

    /// Moves the user's day forward by `days` and returns the new offset.
    pub fn advance_days(&self, storage: &dyn Storage, username: &str, days: i64) -> Result<i64> {
        let offset = self
            .current_offset(storage, username)?
            .checked_add(days)
            .ok_or_else(|| invalid_offset(days, "offset overflows".into()))?;
        self.set_time_offset(storage, username, offset)?;
        Ok(offset)
    }

    fn shifted(&self, offset_days: i64) -> Result<DateTime<Utc>> {
        Duration::try_days(offset_days)
            .and_then(|delta| self.source.now().checked_add_signed(delta))
            .ok_or_else(|| invalid_offset(offset_days, "date out of range".into()))
    }
}

fn invalid_offset(offset_days: i64, reason: String) -> crate::error::CoreError {
    ValidationError::InvalidValue {
        field: "offset_days".into(),
        message: format!("{offset_days}: {reason}"),
    }
    .into()
}

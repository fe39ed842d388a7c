//! Day snapshot resolution.
//!
//! Each `(username, goal, day)` owns its own progress row. The first time a
//! day is observed its row is derived from the latest earlier day (or from
//! zero), then bound to the day so later reads return the same row.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::model::{Progress, ProgressSnapshot};
use crate::storage::Storage;

/// Progress in effect for `goal_id` on `at`'s calendar day, materialising
/// the day's snapshot when it does not exist yet.
///
/// Does not check that the goal exists.
pub fn get_progress(
    storage: &dyn Storage,
    goal_id: i64,
    username: &str,
    at: DateTime<Utc>,
) -> Result<Progress> {
    let day = at.date_naive();

    if let Some(snapshot) = storage.get_current_snapshot(username, goal_id, day)? {
        return load(storage, snapshot.progress_id);
    }

    let mut progress = match storage.get_most_recent_snapshot(username, goal_id, day)? {
        Some(previous) => load(storage, previous.progress_id)?.carried_to(at),
        None => Progress::empty(goal_id, username, at),
    };
    progress.id = storage.create_progress(&progress)?;
    storage.create_snapshot(&ProgressSnapshot {
        username: username.to_string(),
        goal_id,
        progress_id: progress.id,
        day,
    })?;
    debug!(username, goal_id, %day, progress_id = progress.id, "materialised day snapshot");

    Ok(progress)
}

pub(crate) fn load(storage: &dyn Storage, progress_id: i64) -> Result<Progress> {
    storage
        .get_progress_by_id(progress_id)?
        .ok_or(CoreError::ProgressNotFound { progress_id })
}

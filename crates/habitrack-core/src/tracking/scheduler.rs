//! Fixed-interval runner for background jobs such as the goals checker.

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Runs `job` immediately and then every `interval` until `shutdown`
/// resolves. Job failures are logged and do not stop the loop.
///
/// Returns the number of completed runs.
pub async fn run_every<T, F, S>(interval: Duration, shutdown: S, mut job: F) -> usize
where
    T: Debug,
    F: FnMut() -> Result<T>,
    S: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    let mut runs = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(runs, "scheduler stopped");
                break;
            }
            _ = ticker.tick() => {
                match job() {
                    Ok(outcome) => debug!(?outcome, "scheduled job finished"),
                    Err(e) => warn!(error = %e, "scheduled job failed"),
                }
                runs += 1;
            }
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    #[tokio::test]
    async fn runs_until_shutdown_and_survives_failures() {
        let mut calls = 0;
        let runs = run_every(
            Duration::from_millis(10),
            tokio::time::sleep(Duration::from_millis(65)),
            || {
                calls += 1;
                if calls % 2 == 0 {
                    Err(CoreError::HabitNotFound { habit_id: calls })
                } else {
                    Ok(calls)
                }
            },
        )
        .await;
        assert!(runs >= 2, "expected several runs, got {runs}");
        assert_eq!(runs as i64, calls);
    }

    #[tokio::test]
    async fn immediate_shutdown_may_skip_all_runs() {
        let runs = run_every(Duration::from_secs(3600), async {}, || Ok(())).await;
        assert!(runs <= 1);
    }
}

use clap::Subcommand;
use habitrack_core::tracking::run_every;
use habitrack_core::GoalsChecker;
use std::time::Duration;
use tracing::info;

use super::{print_json, CmdResult, Context};

#[derive(Subcommand)]
pub enum GoalsAction {
    /// Run one checker pass over due goals
    Check,
    /// Run the checker on an interval until interrupted
    Watch {
        /// Seconds between passes (defaults to checker.interval_secs)
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

pub fn run(action: GoalsAction) -> CmdResult {
    let ctx = Context::open()?;
    let checker = GoalsChecker::new(
        &ctx.db,
        ctx.clock(),
        ctx.config.checker.system_username.clone(),
    );

    match action {
        GoalsAction::Check => {
            print_json(&checker.check_goals()?)?;
        }
        GoalsAction::Watch { interval_secs } => {
            let interval = interval_secs
                .map(|secs| Duration::from_secs(secs.max(1)))
                .unwrap_or_else(|| ctx.config.checker_interval());
            let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
            let runs =
                runtime.block_on(run_every(interval, shutdown_signal(), || checker.check_goals()));
            info!(runs, "goals watch stopped");
        }
    }
    Ok(())
}

use clap::Subcommand;
use habitrack_core::ProgressService;

use super::{print_json, CmdResult, Context};

#[derive(Subcommand)]
pub enum ProgressAction {
    /// Log one completion for today
    Add {
        /// Username
        user: String,
        /// Habit ID
        habit: i64,
    },
    /// Show today's statistics for a habit
    Show {
        /// Username
        user: String,
        /// Habit ID
        habit: i64,
    },
    /// Habits whose current-period target is still open
    Today {
        /// Username
        user: String,
    },
}

pub fn run(action: ProgressAction) -> CmdResult {
    let ctx = Context::open()?;
    let service = ProgressService::new(&ctx.db, ctx.clock());

    match action {
        ProgressAction::Add { user, habit } => {
            print_json(&service.add_progress(&user, habit)?)?;
        }
        ProgressAction::Show { user, habit } => {
            print_json(&service.get_progress(&user, habit)?)?;
        }
        ProgressAction::Today { user } => {
            print_json(&service.current_progress_for_all_habits(&user)?)?;
        }
    }
    Ok(())
}

use clap::Subcommand;
use serde_json::json;

use super::{print_json, CmdResult, Context};

#[derive(Subcommand)]
pub enum ClockAction {
    /// Show the user's current virtual time
    Now {
        /// Username
        user: String,
    },
    /// Move the user's day forward
    NextDay {
        /// Username
        user: String,
        /// Number of days to advance
        #[arg(long, default_value_t = 1)]
        days: i64,
    },
    /// Return the user to the real current day
    Reset {
        /// Username
        user: String,
    },
}

pub fn run(action: ClockAction) -> CmdResult {
    let ctx = Context::open()?;
    let clock = ctx.clock();
    let storage = ctx.db.storage();

    let user = match action {
        ClockAction::Now { user } => user,
        ClockAction::NextDay { user, days } => {
            clock.advance_days(&storage, &user, days)?;
            user
        }
        ClockAction::Reset { user } => {
            clock.reset_time(&storage, &user)?;
            user
        }
    };

    print_json(&json!({
        "username": user,
        "offset_days": clock.current_offset(&storage, &user)?,
        "now": clock.current_time(&storage, &user)?,
    }))
}

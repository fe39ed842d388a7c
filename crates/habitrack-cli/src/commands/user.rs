use clap::Subcommand;
use habitrack_core::users::create_user;
use habitrack_core::TimeSource;

use super::{print_json, CmdResult, Context};

#[derive(Subcommand)]
pub enum UserAction {
    /// Register a user
    Add {
        /// Username
        name: String,
    },
}

pub fn run(action: UserAction) -> CmdResult {
    let ctx = Context::open()?;
    match action {
        UserAction::Add { name } => {
            let user = create_user(&ctx.db, &name, ctx.clock().source().now())?;
            print_json(&user)?;
        }
    }
    Ok(())
}

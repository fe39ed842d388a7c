use clap::{Args, Subcommand};
use habitrack_core::{
    FrequencyType, GoalRules, Habit, HabitService, HabitUpdate, NewHabit, Storage,
};

use super::{print_json, CmdResult, Context};

#[derive(Args)]
pub struct GoalArgs {
    /// Goal cadence: daily, weekly or monthly
    #[arg(long)]
    frequency: Option<FrequencyType>,
    /// Completions required per period
    #[arg(long)]
    times: Option<u32>,
    /// Completed periods after which the goal is done
    #[arg(long)]
    periods: Option<u32>,
}

impl GoalArgs {
    fn is_empty(&self) -> bool {
        self.frequency.is_none() && self.times.is_none() && self.periods.is_none()
    }

    /// Rules with every given flag applied on top of `base`.
    fn apply(&self, base: Option<GoalRules>) -> Result<GoalRules, Box<dyn std::error::Error>> {
        let frequency = self
            .frequency
            .or(base.map(|rules| rules.frequency))
            .ok_or("--frequency is required when adding a goal")?;
        Ok(GoalRules {
            frequency,
            times_per_frequency: self.times.or(base.map(|r| r.times_per_frequency)).unwrap_or(1),
            total_tracking_periods: self
                .periods
                .or(base.map(|r| r.total_tracking_periods))
                .unwrap_or(1),
        })
    }
}

#[derive(Subcommand)]
pub enum HabitAction {
    /// Create a habit, optionally with a goal
    Create {
        /// Owner username
        user: String,
        /// Habit name
        name: String,
        /// Free-form description
        #[arg(long, default_value = "")]
        description: String,
        #[command(flatten)]
        goal: GoalArgs,
    },
    /// List habits
    List {
        /// Owner username
        user: String,
        /// Only habits whose goal is completed
        #[arg(long)]
        completed: bool,
    },
    /// Edit a habit; omitted fields keep their current value
    Update {
        /// Owner username
        user: String,
        /// Habit ID
        id: i64,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New description
        #[arg(long)]
        description: Option<String>,
        #[command(flatten)]
        goal: GoalArgs,
        /// Stop tracking the habit against a goal
        #[arg(long, conflicts_with_all = ["frequency", "times", "periods"])]
        no_goal: bool,
    },
    /// Archive a habit
    Archive {
        /// Owner username
        user: String,
        /// Habit ID
        id: i64,
    },
}

pub fn run(action: HabitAction) -> CmdResult {
    let ctx = Context::open()?;
    let service = HabitService::new(&ctx.db, ctx.clock());

    match action {
        HabitAction::Create {
            user,
            name,
            description,
            goal,
        } => {
            let rules = if goal.is_empty() {
                None
            } else {
                Some(goal.apply(None)?)
            };
            let habit_id = service.create_habit(
                &user,
                NewHabit {
                    name,
                    description,
                    goal: rules,
                },
            )?;
            print_json(&find(&ctx, &user, habit_id)?)?;
        }
        HabitAction::List { user, completed } => {
            let habits = if completed {
                service.list_completed_habits(&user)?
            } else {
                service.list_habits(&user)?
            };
            print_json(&habits)?;
        }
        HabitAction::Update {
            user,
            id,
            name,
            description,
            goal,
            no_goal,
        } => {
            let current = find(&ctx, &user, id)?;
            let current_rules = current.goal.as_ref().map(|g| g.rules());
            let rules = if no_goal {
                None
            } else if goal.is_empty() {
                current_rules
            } else {
                Some(goal.apply(current_rules)?)
            };
            service.update_habit(
                &user,
                HabitUpdate {
                    habit_id: id,
                    name: name.unwrap_or(current.name),
                    description: description.unwrap_or(current.description),
                    goal: rules,
                },
            )?;
            print_json(&find(&ctx, &user, id)?)?;
        }
        HabitAction::Archive { user, id } => {
            service.archive_habit(&user, id)?;
            println!("habit {id} archived");
        }
    }
    Ok(())
}

fn find(ctx: &Context, user: &str, habit_id: i64) -> habitrack_core::Result<Habit> {
    ctx.db
        .storage()
        .get_habit(user, habit_id)?
        .ok_or(habitrack_core::CoreError::HabitNotFound { habit_id })
}

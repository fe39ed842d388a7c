//! Progress tracking engine.
//!
//! - [`period`]: period index and range arithmetic
//! - [`snapshot`]: per-day progress materialisation
//! - [`engine`]: execution logging and progress reads
//! - [`recalculator`]: re-derivation of visited future days
//! - [`checker`]: skipped-period reconciliation
//! - [`scheduler`]: interval runner for the checker
//!
//! Everything that writes takes `&dyn Storage`, so a caller's transaction
//! spans every nested step.

pub mod checker;
pub mod engine;
pub mod period;
pub mod recalculator;
pub mod scheduler;
pub mod snapshot;

pub use checker::{CheckReport, GoalsChecker};
pub use engine::{add_progress_for_goal, ProgressService};
pub use period::PeriodRange;
pub use recalculator::recalculate_future_progresses_by_goal_update;
pub use scheduler::run_every;

pub mod clock;
pub mod config;
pub mod goals;
pub mod habit;
pub mod progress;
pub mod user;

use habitrack_core::storage::{data_dir, Config, Database};
use habitrack_core::VirtualClock;
use serde::Serialize;

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Configuration and database shared by the tracking commands.
pub struct Context {
    pub config: Config,
    pub db: Database,
}

impl Context {
    pub fn open() -> habitrack_core::Result<Self> {
        let data_dir = data_dir()?;
        let config = Config::load_from(&data_dir)?;
        let db = Database::open(&config, &data_dir)?;
        Ok(Self { config, db })
    }

    pub fn clock(&self) -> VirtualClock {
        VirtualClock::default()
    }
}

pub fn print_json<T: Serialize>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

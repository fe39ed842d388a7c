use clap::{Parser, Subcommand};
use habitrack_core::storage::{data_dir, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "habitrack", version, about = "Habit and goal progress tracker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// User management
    User {
        #[command(subcommand)]
        action: commands::user::UserAction,
    },
    /// Habit and goal management
    Habit {
        #[command(subcommand)]
        action: commands::habit::HabitAction,
    },
    /// Progress logging and reporting
    Progress {
        #[command(subcommand)]
        action: commands::progress::ProgressAction,
    },
    /// Per-user virtual clock
    Clock {
        #[command(subcommand)]
        action: commands::clock::ClockAction,
    },
    /// Skipped-period checks
    Goals {
        #[command(subcommand)]
        action: commands::goals::GoalsAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

/// Logs go to stderr so stdout stays machine-readable. `HABITRACK_LOG`
/// overrides the configured level.
fn init_tracing() {
    let level = data_dir()
        .ok()
        .and_then(|dir| Config::load_from(&dir).ok())
        .map(|config| config.logging.level)
        .unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_from_env("HABITRACK_LOG").unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::User { action } => commands::user::run(action),
        Commands::Habit { action } => commands::habit::run(action),
        Commands::Progress { action } => commands::progress::run(action),
        Commands::Clock { action } => commands::clock::run(action),
        Commands::Goals { action } => commands::goals::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

mod commands;
mod logging;
mod world;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(version, about = "Scene log watcher and effect orchestrator")]
struct Cli {
    /// Config file (default: platform config dir, then ./ember.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Tail the scene log against a dry-run world until interrupted
    Watch {
        /// TOML description of the actors and plugins in the dry-run world
        #[arg(short, long)]
        world: Option<PathBuf>,
    },
    /// Classify log lines given as arguments, or every line of a file
    Classify {
        #[arg(short, long)]
        file: Option<PathBuf>,
        lines: Vec<String>,
    },
    /// Lift every effect the action log still records as active
    Replay {
        #[arg(short, long)]
        world: Option<PathBuf>,
    },
    /// Load and validate the configuration, optionally printing it
    CheckConfig {
        #[arg(long)]
        print: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let cli = Cli::parse();
    let _guard = logging::init_logging(cli.log_dir.as_deref());

    match &cli.command {
        Commands::Watch { world } => commands::watch(cli.config.as_deref(), world.as_deref()).await,
        Commands::Classify { file, lines } => commands::classify(file.as_deref(), lines),
        Commands::Replay { world } => commands::replay(cli.config.as_deref(), world.as_deref()),
        Commands::CheckConfig { print } => commands::check_config(cli.config.as_deref(), *print),
    }
}

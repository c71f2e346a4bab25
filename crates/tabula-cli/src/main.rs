use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use config::{FileConfig, Overrides, Settings};

/// tabula: Run-once data migrations for partitioned table stores.
///
/// Applies `.mig` files from a directory to a SQLite-backed table store,
/// recording each one so it never runs twice.
#[derive(Parser)]
#[command(name = "tabula", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply every pending migration, in file name order.
    Up {
        #[command(flatten)]
        target: Target,
    },

    /// List migrations and whether each has been applied.
    Status {
        #[command(flatten)]
        target: Target,
    },

    /// Parse a migration file and print its operations without running it.
    Plan {
        /// Path to the migration file.
        file: PathBuf,

        /// Print the parsed operations as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct Target {
    /// Config file. Defaults to ./tabula.toml when present.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the SQLite database file.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Directory containing migration files.
    #[arg(short, long)]
    dir: Option<PathBuf>,
}

impl Target {
    fn settings(self) -> Result<Settings, config::ConfigError> {
        let file = FileConfig::load(self.config.as_deref())?;
        Ok(file.resolve(Overrides {
            db: self.db,
            dir: self.dir,
        }))
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = match cli.command {
        Commands::Up { target } => match target.settings() {
            Ok(settings) => commands::up(settings).await,
            Err(e) => Err(e.into()),
        },
        Commands::Status { target } => match target.settings() {
            Ok(settings) => commands::status(settings).await,
            Err(e) => Err(e.into()),
        },
        Commands::Plan { file, json } => commands::plan(&file, json),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

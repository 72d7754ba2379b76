mod commands;
mod error;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use commands::migrate;
use error::CliError;
use showroom_core::{AppConfigTrait, EnvSnapshot, LoggingConfig};

#[derive(Parser)]
#[command(name = "showroom")]
#[command(about = "Database tooling for the showroom dealership site")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database migration management
    Migrate {
        #[command(subcommand)]
        migrate_command: MigrateCommands,
    },
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Run pending migrations
    Run {
        /// Migrations directory (defaults to MIGRATIONS_DIR or db/migrations)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Warn instead of failing when an applied migration was edited
        #[arg(long)]
        allow_modified: bool,
    },

    /// Show migration status
    Status {
        /// Migrations directory (defaults to MIGRATIONS_DIR or db/migrations)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a new migration
    Create {
        /// Migration name
        name: String,

        /// Migrations directory (defaults to MIGRATIONS_DIR or db/migrations)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let env = EnvSnapshot::load(&std::env::current_dir()?)?;
    logging::init_logging(&LoggingConfig::from_snapshot(&env)?)?;

    match cli.command {
        Commands::Migrate { migrate_command } => match migrate_command {
            MigrateCommands::Run {
                dir,
                allow_modified,
            } => migrate::run(&env, dir, allow_modified).await,
            MigrateCommands::Status { dir, json } => migrate::status(&env, dir, json).await,
            MigrateCommands::Create { name, dir } => migrate::create(&env, &name, dir),
        },
    }
}

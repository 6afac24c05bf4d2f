//! chain-mirror: applies chain notification streams to a SQLite mirror.

mod app;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mirror_config_and_utils::{init_logging, parse_level, Config, Paths};

/// chain-mirror command-line interface.
#[derive(Parser)]
#[command(name = "chain-mirror")]
#[command(about = "Mirror chain state notifications into SQLite")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, logs, and the default database. Defaults to ~/.chain-mirror
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// SQLite database file. Overrides the config file.
    #[arg(long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a JSONL notification stream
    Flush {
        /// Read from this file instead of stdin
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Create or upgrade the schema and exit
    Migrate,
    /// Print the last committed block height
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;

    let mut config = Config::load(&paths)?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Some(database) = cli.database {
        config.database_path = Some(database);
    }

    let level = parse_level(&config.log_level).to_string().to_lowercase();
    init_logging(&paths, &level);

    let db_path = config.database_file(&paths);

    match cli.command {
        Commands::Flush { input } => {
            app::run_flush(&config, &db_path, input.as_deref()).await?;
        }
        Commands::Migrate => {
            app::run_migrate(&db_path).await?;
        }
        Commands::Status => {
            app::check_status(&db_path).await?;
        }
    }

    Ok(())
}

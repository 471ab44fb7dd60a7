//! `moodwave`: inspect and maintain the local store, and push pending changes.

use anyhow::Result;
use clap::{Parser, Subcommand};
use moodwave_cli::{describe_outcome, describe_repair, App, AppConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "moodwave", about = "Moodwave local store and sync tool")]
struct Args {
    /// Config file (defaults to the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Treat the device as offline
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show store mode, sync state and queue depth
    Status,
    /// Run one sync cycle now
    Sync,
    /// Print the value stored under a key
    Get {
        key: String,
        /// Read as a protected value; a plain entry is re-encrypted in place
        /// when a data key is available
        #[arg(long)]
        protected: bool,
    },
    /// Verify one entry, removing it if corrupt
    Repair { key: String },
    /// Rewrite every legacy-format entry
    Migrate,
    /// Remove all local data owned by a user
    PurgeUser { user_id: String },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config_path = args.config.unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load(&config_path)?;
    let app = App::open(&config)?;
    if args.offline {
        app.engine().set_connectivity(false);
    }

    match args.command {
        Command::Status => println!("{}", app.status()),
        Command::Sync => {
            let outcome = app.sync().await;
            println!("{}", describe_outcome(&outcome));
            if !outcome.is_success() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Get { key, protected } => match app.get(&key, protected)? {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => {
                println!("{key}: not found");
                return Ok(ExitCode::FAILURE);
            }
        },
        Command::Repair { key } => {
            let outcome = app.repair(&key)?;
            println!("{}", describe_repair(&key, outcome));
        }
        Command::Migrate => {
            let report = app.migrate()?;
            println!(
                "recovered {}, purged {}, left sealed {}",
                report.recovered, report.purged, report.unreadable
            );
        }
        Command::PurgeUser { user_id } => {
            let removed = app.purge_user(&user_id)?;
            println!("removed {removed} entries");
        }
    }

    Ok(ExitCode::SUCCESS)
}

//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `larder_core` linkage and schema version.
//! - Open a household database and print record counts.

use clap::{Parser, Subcommand};
use larder_core::{open_db, EngineConfig, TripService};
use std::path::PathBuf;
use std::process::ExitCode;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "larder", about = "Purchase reconciliation engine smoke tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print core and schema versions
    Version,
    /// Print household record counts
    Overview {
        /// SQLite database file; created and migrated when missing
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        household: Uuid,
        /// Absolute directory for rolling log files
        #[arg(long)]
        log_dir: Option<PathBuf>,
        /// JSON engine config
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Version => {
            println!("larder_core version={}", larder_core::core_version());
            println!("larder_core schema_version={}", larder_core::schema_version());
            Ok(())
        }
        Commands::Overview {
            db,
            household,
            log_dir,
            config,
        } => overview(db, household, log_dir, config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn overview(
    db: PathBuf,
    household: Uuid,
    log_dir: Option<PathBuf>,
    config: Option<PathBuf>,
) -> Result<(), String> {
    let mut config = match config {
        Some(path) => EngineConfig::load(path).map_err(|err| err.to_string())?,
        None => EngineConfig::default(),
    };
    if log_dir.is_some() {
        config.log_dir = log_dir;
        config.validate().map_err(|err| err.to_string())?;
    }
    config.init_logging().map_err(|err| err.to_string())?;

    let conn = open_db(&db).map_err(|err| err.to_string())?;
    let counts = TripService::new(&conn)
        .household_overview(household)
        .map_err(|err| err.to_string())?;
    log::info!(
        "event=cli_overview module=cli status=ok household_id={}",
        household
    );

    println!("household={household}");
    println!("trips={}", counts.trips);
    println!("stops={}", counts.stops);
    println!("line_items={}", counts.line_items);
    println!("ledger_entries={}", counts.ledger_entries);
    println!("stock_items={}", counts.stock_items);
    Ok(())
}

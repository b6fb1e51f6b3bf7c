//! Bulk-load observation exports into PostgreSQL.
//!
//! Reads one or more `collection_time,gauge,sensor,value` CSV exports and
//! inserts them into the observation table named in storms.toml. Rows
//! already present (same time, gauge and sensor) are skipped, so an export
//! can be reloaded safely.
//!
//! Usage:
//!   load_observations export.csv [more.csv ...]
//!   load_observations --create-table export.csv
//!
//! Environment:
//!   DATABASE_URL - PostgreSQL connection string

use clap::Parser;
use std::error::Error;
use std::path::PathBuf;

use storm_events::config::{load_config_or_default, DEFAULT_CONFIG_PATH};
use storm_events::db;
use storm_events::ingest::load_observations;
use storm_events::store::PgObservationStore;

/// Rows per insert transaction.
const BATCH_SIZE: usize = 5_000;

#[derive(Parser)]
#[command(name = "load_observations", version, about = "Load observation CSV exports into PostgreSQL", long_about = None)]
struct Cli {
    /// Observation export files
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Pipeline configuration file (for the table and sensor labels)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Create the observation table if it does not exist
    #[arg(long)]
    create_table: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    println!("📥 Observation Loader");
    println!("=====================\n");

    if let Err(e) = run(&cli) {
        eprintln!("\n❌ Load failed: {}\n", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let config = load_config_or_default(&cli.config)?;
    config.validate()?;

    println!("📊 Connecting to database...");
    let store = if cli.create_table {
        let store = PgObservationStore::from_clients(vec![db::connect_with_validation()?], &config.store);
        store.ensure_table()?;
        println!("✓ Table {} ready", config.store.table);
        store
    } else {
        PgObservationStore::connect(1, &config.store)?
    };
    println!("✓ Connected\n");

    let mut total_read = 0;
    let mut total_inserted = 0;
    for path in &cli.files {
        println!("📄 {}", path.display());
        let observations = load_observations(path, &config.store)?;
        let mut inserted = 0;
        for batch in observations.chunks(BATCH_SIZE) {
            inserted += store.insert_observations(batch)?;
        }
        let absent = observations.iter().filter(|o| o.value.is_none()).count();
        println!(
            "   ✓ {} rows read ({} no-data), {} inserted, {} already present",
            observations.len(),
            absent,
            inserted,
            observations.len() as u64 - inserted
        );
        total_read += observations.len();
        total_inserted += inserted;
    }

    println!("\n════════════════════════════════════════");
    println!("Files:    {}", cli.files.len());
    println!("Read:     {}", total_read);
    println!("Inserted: {}", total_inserted);
    Ok(())
}

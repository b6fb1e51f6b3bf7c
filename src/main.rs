//! Storm Pipeline - batch storm detection and aggregation
//!
//! Reads the Highland Lakes hydromet record, detects storms from the
//! system-wide rain moving sum and writes per-storm rain and lake tables
//! for every configured threshold.
//!
//! Usage:
//!   storm_pipeline                                   # storms.toml + DATABASE_URL
//!   storm_pipeline --observations export.csv         # offline, from a CSV export
//!   storm_pipeline -t 0.25 -t 0.5 -t 1 -t 1.5 -t 2.5 # threshold sweep
//!   storm_pipeline --moving-sum-cache moving_sum.csv # reuse the moving sum
//!
//! Environment:
//!   DATABASE_URL - PostgreSQL connection string (not needed with --observations)
//!   RUST_LOG     - log filter (default: info)

use clap::Parser;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use storm_events::analysis::aggregation::CancelFlag;
use storm_events::config::{load_config_or_default, PipelineConfig, DEFAULT_CONFIG_PATH};
use storm_events::gauges::{load_catalog, GaugeCatalog};
use storm_events::ingest::load_observations;
use storm_events::pipeline::{run_pipeline, RunOptions, RunSummary, SUMMARY_FILE};
use storm_events::store::{MemoryObservationStore, ObservationStore, PgObservationStore};

#[derive(Parser)]
#[command(name = "storm_pipeline", version, about = "Detect storms and aggregate gauge data per storm", long_about = None)]
struct Cli {
    /// Pipeline configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Gauge catalog (overrides gauge_catalog in the config file)
    #[arg(short, long)]
    gauges: Option<PathBuf>,

    /// Read observations from a CSV export instead of PostgreSQL
    #[arg(long)]
    observations: Option<PathBuf>,

    /// Storm threshold on the moving sum, in inches (repeat for a sweep)
    #[arg(short, long = "threshold")]
    thresholds: Vec<f64>,

    /// Hours after each sample included in its moving-sum window
    #[arg(long)]
    leading_hours: Option<i64>,

    /// Hours before each sample included in its moving-sum window
    #[arg(long)]
    trailing_hours: Option<i64>,

    /// Worker threads for per-storm queries
    #[arg(short, long)]
    workers: Option<usize>,

    /// Directory for the storm tables and run summary
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// Moving-sum cache file (read if the window matches, else written)
    #[arg(long)]
    moving_sum_cache: Option<PathBuf>,

    /// Also write tables with raw gauge codes and lake elevations
    #[arg(long)]
    raw: bool,

    /// Turn debugging information on
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,
}

impl Cli {
    /// Applies command-line overrides on top of the file configuration.
    fn apply(&self, config: &mut PipelineConfig) {
        if !self.thresholds.is_empty() {
            config.detection.thresholds = self.thresholds.clone();
        }
        if let Some(hours) = self.leading_hours {
            config.window.leading_hours = hours;
        }
        if let Some(hours) = self.trailing_hours {
            config.window.trailing_hours = hours;
        }
        if let Some(workers) = self.workers {
            config.aggregation.workers = workers;
        }
    }
}

fn init_logging(debug: u8) {
    let default_level = match debug {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    println!("🌧️  Storm Event Pipeline");
    println!("========================\n");

    if let Err(e) = run(&cli) {
        eprintln!("\n❌ Pipeline failed: {}\n", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    println!("⚙️  Loading configuration...");
    let mut config = load_config_or_default(&cli.config)?;
    cli.apply(&mut config);
    config.validate()?;

    let catalog_path = cli.gauges.clone().unwrap_or_else(|| config.gauge_catalog_path());
    let catalog = load_catalog(&catalog_path)?;
    println!(
        "✓ {} rain gauges, {} lake gauges from {}",
        catalog.rain_gauges().len(),
        catalog.lake_gauges().len(),
        catalog_path.display()
    );
    println!(
        "   Window: {}h leading / {}h trailing, thresholds: {:?}\n",
        config.window.leading_hours, config.window.trailing_hours, config.detection.thresholds
    );

    let options = RunOptions {
        output_dir: cli.output_dir.clone(),
        moving_sum_cache: cli.moving_sum_cache.clone(),
        write_raw: cli.raw,
    };

    let summary = match &cli.observations {
        Some(path) => {
            println!("📥 Reading observations from {}...", path.display());
            let observations = load_observations(path, &config.store)?;
            println!("✓ {} observations\n", observations.len());
            run_with_store(&config, &catalog, MemoryObservationStore::new(observations), &options)?
        }
        None => {
            println!("📊 Connecting to database...");
            let store = PgObservationStore::connect(config.aggregation.workers, &config.store)?;
            println!("✓ Connected ({} connections)\n", store.connection_count());
            run_with_store(&config, &catalog, store, &options)?
        }
    };

    print_summary(&summary, &options);
    Ok(())
}

fn run_with_store<S: ObservationStore + 'static>(
    config: &PipelineConfig,
    catalog: &GaugeCatalog,
    store: S,
    options: &RunOptions,
) -> Result<RunSummary, Box<dyn Error>> {
    println!("🔍 Detecting and aggregating storms...");
    let summary = run_pipeline(config, catalog, Arc::new(store), options, CancelFlag::new())?;
    Ok(summary)
}

fn print_summary(summary: &RunSummary, options: &RunOptions) {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║                      RUN COMPLETE                          ║");
    println!("╚════════════════════════════════════════════════════════════╝\n");
    println!("Rain rows:   {} (moving sum {:?})", summary.rain_rows, summary.moving_sum_source);
    for threshold in &summary.thresholds {
        println!(
            "   thres {:<6} {:>5} storms  → {}, {}",
            threshold.threshold, threshold.storms, threshold.rain_file, threshold.lake_file
        );
    }
    println!("\nOutputs in {}", options.output_dir.display());
    println!("Summary:    {}", options.output_dir.join(SUMMARY_FILE).display());
}

/// Batch storm pipeline.
///
/// One run:
///
/// 1. Load the lake volume tables named in the gauge catalog (fail fast if
///    a configured file is missing).
/// 2. Load the system-wide rain series and compute its moving sum, or read
///    it from the moving-sum cache when the cached window matches.
/// 3. For each threshold: detect storms, aggregate rain and lake tables,
///    rename gauge columns, convert lake elevations to volumes and write
///    `rain_<lead>_<trail>_thres<t>.csv` / `lake_<lead>_<trail>_thres<t>.csv`.
/// 4. Write `run_summary.json` describing what was produced.
///
/// The pipeline holds no state between runs; every artifact is recomputed
/// from the observation store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::analysis::aggregation::{
    aggregate_from_store, aggregate_parallel, AggregateError, AggregatedTables, AggregationHooks, CancelFlag,
};
use crate::analysis::moving_sum::compute_moving_sum;
use crate::analysis::naming::{convert_volumes, load_volume_tables, rename_columns, VolumeError, VolumeTable};
use crate::analysis::storm_events::detect_storms;
use crate::config::{ConfigError, PipelineConfig, WindowConfig};
use crate::export::{self, ExportError};
use crate::gauges::GaugeCatalog;
use crate::ingest::IngestError;
use crate::model::{AugmentedRainSeries, StormInterval, StormTable};
use crate::store::{ObservationStore, StoreError};

/// Name of the run manifest written next to the tables.
pub const SUMMARY_FILE: &str = "run_summary.json";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Volume(#[from] VolumeError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where and what a run writes.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output_dir: PathBuf,
    /// Moving-sum cache file; read when its window matches, else rewritten.
    pub moving_sum_cache: Option<PathBuf>,
    /// Also write the un-renamed, unconverted tables.
    pub write_raw: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            moving_sum_cache: None,
            write_raw: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MovingSumSource {
    Computed,
    Cache,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdSummary {
    pub threshold: f64,
    pub storms: usize,
    pub rain_file: String,
    pub lake_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_rain_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_lake_file: Option<String>,
}

/// Contents of run_summary.json.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub leading_hours: i64,
    pub trailing_hours: i64,
    pub rain_rows: usize,
    pub moving_sum_source: MovingSumSource,
    pub rain_gauges: usize,
    pub lake_gauges: usize,
    pub thresholds: Vec<ThresholdSummary>,
}

/// Tables produced for one threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdOutput {
    pub threshold: f64,
    pub storms: Vec<StormInterval>,
    /// Gauge-code columns as aggregated.
    pub raw: AggregatedTables,
    /// Display-name rain columns.
    pub rain: StormTable,
    /// Display-name lake columns, converted to volume.
    pub lake: StormTable,
}

/// `<kind>_<lead>_<trail>_thres<threshold>.csv`
pub fn artifact_name(kind: &str, window: &WindowConfig, threshold: f64) -> String {
    format!(
        "{}_{}_{}_thres{}.csv",
        kind, window.leading_hours, window.trailing_hours, threshold
    )
}

/// Loads the rain series and computes its moving sum, going through the
/// cache when one is configured.
pub fn prepare_moving_sum<S: ObservationStore + ?Sized>(
    store: &S,
    window: &WindowConfig,
    cache: Option<&Path>,
) -> Result<(AugmentedRainSeries, MovingSumSource), PipelineError> {
    if let Some(path) = cache {
        if let Some(series) = export::load_cached_moving_sum(path, window.leading(), window.trailing())? {
            log::info!("using cached moving sum from {} ({} rows)", path.display(), series.len());
            return Ok((series, MovingSumSource::Cache));
        }
    }

    let rain = store.rain_series()?;
    log::info!(
        "computing moving sum over {} rain rows (leading {}h, trailing {}h)",
        rain.len(),
        window.leading_hours,
        window.trailing_hours
    );
    let series = compute_moving_sum(&rain, window.leading(), window.trailing());

    if let Some(path) = cache {
        export::write_moving_sum_file(path, &series)?;
        log::info!("wrote moving-sum cache {}", path.display());
    }
    Ok((series, MovingSumSource::Computed))
}

/// Detects, aggregates and post-processes storms for one threshold.
pub fn process_threshold<S: ObservationStore + 'static>(
    series: &AugmentedRainSeries,
    threshold: f64,
    catalog: &GaugeCatalog,
    lookups: &HashMap<String, VolumeTable>,
    store: &Arc<S>,
    workers: usize,
    hooks: &mut AggregationHooks<'_>,
) -> Result<ThresholdOutput, PipelineError> {
    let storms = detect_storms(series, threshold);
    let rain_gauges = catalog.rain_gauges();
    let lake_gauges = catalog.lake_gauges();

    let raw = if workers > 1 {
        aggregate_parallel(&storms, &rain_gauges, &lake_gauges, Arc::clone(store), workers, hooks)?
    } else {
        aggregate_from_store(&storms, &rain_gauges, &lake_gauges, store.as_ref(), hooks)?
    };

    let rain = rename_columns(raw.rain.clone(), catalog);
    let lake = convert_volumes(rename_columns(raw.lake.clone(), catalog), catalog, lookups)?;

    Ok(ThresholdOutput {
        threshold,
        storms,
        raw,
        rain,
        lake,
    })
}

fn write_threshold(
    output: &ThresholdOutput,
    window: &WindowConfig,
    options: &RunOptions,
) -> Result<ThresholdSummary, PipelineError> {
    let rain_file = artifact_name("rain", window, output.threshold);
    let lake_file = artifact_name("lake", window, output.threshold);
    export::write_table_file(options.output_dir.join(&rain_file), &output.rain)?;
    export::write_table_file(options.output_dir.join(&lake_file), &output.lake)?;

    let (raw_rain_file, raw_lake_file) = if options.write_raw {
        let raw_rain = artifact_name("raw_rain", window, output.threshold);
        let raw_lake = artifact_name("raw_lake", window, output.threshold);
        export::write_table_file(options.output_dir.join(&raw_rain), &output.raw.rain)?;
        export::write_table_file(options.output_dir.join(&raw_lake), &output.raw.lake)?;
        (Some(raw_rain), Some(raw_lake))
    } else {
        (None, None)
    };

    Ok(ThresholdSummary {
        threshold: output.threshold,
        storms: output.storms.len(),
        rain_file,
        lake_file,
        raw_rain_file,
        raw_lake_file,
    })
}

/// Runs the full threshold sweep and writes every artifact to
/// `options.output_dir`.
pub fn run_pipeline<S: ObservationStore + 'static>(
    config: &PipelineConfig,
    catalog: &GaugeCatalog,
    store: Arc<S>,
    options: &RunOptions,
    cancel: CancelFlag,
) -> Result<RunSummary, PipelineError> {
    config.validate()?;
    let started_at = Utc::now();

    let lookups = load_volume_tables(catalog)?;
    log::info!("loaded {} lake volume tables", lookups.len());

    std::fs::create_dir_all(&options.output_dir).map_err(|source| PipelineError::OutputDir {
        path: options.output_dir.clone(),
        source,
    })?;

    let (series, source) = prepare_moving_sum(store.as_ref(), &config.window, options.moving_sum_cache.as_deref())?;

    let mut thresholds = Vec::with_capacity(config.detection.thresholds.len());
    for &threshold in &config.detection.thresholds {
        let mut hooks = AggregationHooks::new(config.aggregation.progress_every).with_cancel(cancel.clone());
        let output = process_threshold(
            &series,
            threshold,
            catalog,
            &lookups,
            &store,
            config.aggregation.workers,
            &mut hooks,
        )?;
        let summary = write_threshold(&output, &config.window, options)?;
        log::info!(
            "threshold {}: {} storms -> {}, {}",
            threshold,
            summary.storms,
            summary.rain_file,
            summary.lake_file
        );
        thresholds.push(summary);
    }

    let summary = RunSummary {
        started_at,
        leading_hours: config.window.leading_hours,
        trailing_hours: config.window.trailing_hours,
        rain_rows: series.len(),
        moving_sum_source: source,
        rain_gauges: catalog.rain_gauges().len(),
        lake_gauges: catalog.lake_gauges().len(),
        thresholds,
    };
    export::write_json_file(options.output_dir.join(SUMMARY_FILE), &summary)?;
    Ok(summary)
}

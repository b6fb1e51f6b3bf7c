/// Storm Aggregation
///
/// Turns a list of storms into two wide tables indexed by storm:
///
/// - **rain table**: `start_time`, `end_time`, then one column per rain
///   gauge holding the rainfall summed over the storm window.
/// - **lake table**: `start_time`, `end_time`, then a `<gauge>_min` /
///   `<gauge>_max` column pair per lake gauge.
///
/// Each storm costs exactly one rain query and one lake query. Every
/// configured gauge gets a column whether or not any storm has data for it;
/// a gauge missing from a query result leaves an absent cell, never a zero.
///
/// Storms are independent, so the per-storm queries can run on a thread
/// pool (`aggregate_parallel`). Rows are written by storm index, so the
/// output order is the input order regardless of completion order.
/// Cancellation is checked before every storm; a cancelled run returns
/// `AggregateError::Cancelled` and drops the partial tables.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use thiserror::Error;
use threadpool::ThreadPool;

use crate::model::{StormInterval, StormTable, MAX_SUFFIX, MIN_SUFFIX};
use crate::store::{LakeExtents, ObservationStore, RainTotals, StoreError};

/// Default number of storms between progress reports.
pub const DEFAULT_PROGRESS_EVERY: usize = 50;

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("query for storm {index} ({start} to {end}) failed: {source}")]
    Fetch {
        index: usize,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        #[source]
        source: StoreError,
    },

    #[error("aggregation cancelled after {completed} of {total} storms")]
    Cancelled { completed: usize, total: usize },

    #[error("aggregation worker exited without a result for storm {0}")]
    WorkerLost(usize),
}

/// Rain and lake tables for one storm list; same rows, same order.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedTables {
    pub rain: StormTable,
    pub lake: StormTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationProgress {
    pub completed: usize,
    pub total: usize,
}

/// Shared cancellation switch. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress reporting and cancellation for one aggregation run.
pub struct AggregationHooks<'a> {
    /// Storms between progress reports. The final storm always reports.
    pub progress_every: usize,
    pub on_progress: Box<dyn FnMut(AggregationProgress) + 'a>,
    pub cancel: CancelFlag,
}

impl Default for AggregationHooks<'_> {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_EVERY)
    }
}

impl<'a> AggregationHooks<'a> {
    /// Hooks that log progress every `progress_every` storms.
    pub fn new(progress_every: usize) -> Self {
        Self {
            progress_every: progress_every.max(1),
            on_progress: Box::new(log_progress),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_progress<F>(mut self, on_progress: F) -> Self
    where
        F: FnMut(AggregationProgress) + 'a,
    {
        self.on_progress = Box::new(on_progress);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    fn report(&mut self, completed: usize, total: usize) {
        if completed % self.progress_every.max(1) == 0 || completed == total {
            (self.on_progress)(AggregationProgress { completed, total });
        }
    }
}

fn log_progress(progress: AggregationProgress) {
    log::info!("aggregated {}/{} storms", progress.completed, progress.total);
}

// ---------------------------------------------------------------------------
// Table assembly
// ---------------------------------------------------------------------------

/// Pre-sized rain and lake tables filled by storm index.
struct TableBuilder {
    rain_gauges: Vec<String>,
    lake_gauges: Vec<String>,
    tables: AggregatedTables,
}

impl TableBuilder {
    fn new(storms: &[StormInterval], rain_gauges: &[&str], lake_gauges: &[&str]) -> Self {
        let lake_columns = lake_gauges
            .iter()
            .flat_map(|g| [format!("{}{}", g, MIN_SUFFIX), format!("{}{}", g, MAX_SUFFIX)]);

        Self {
            rain_gauges: rain_gauges.iter().map(|g| g.to_string()).collect(),
            lake_gauges: lake_gauges.iter().map(|g| g.to_string()).collect(),
            tables: AggregatedTables {
                rain: StormTable::with_columns(storms, rain_gauges.iter().copied()),
                lake: StormTable::with_columns(storms, lake_columns),
            },
        }
    }

    fn fill(&mut self, row: usize, rain: &RainTotals, lake: &LakeExtents) {
        for (col, gauge) in self.rain_gauges.iter().enumerate() {
            self.tables.rain.columns[col].values[row] = rain.get(gauge).copied();
        }
        for (pair, gauge) in self.lake_gauges.iter().enumerate() {
            let extent = lake.get(gauge);
            self.tables.lake.columns[2 * pair].values[row] = extent.map(|e| e.min);
            self.tables.lake.columns[2 * pair + 1].values[row] = extent.map(|e| e.max);
        }
    }

    fn finish(self) -> AggregatedTables {
        self.tables
    }
}

fn fetch_error(index: usize, storm: &StormInterval, source: StoreError) -> AggregateError {
    AggregateError::Fetch {
        index,
        start: storm.start(),
        end: storm.end(),
        source,
    }
}

// ---------------------------------------------------------------------------
// Sequential aggregation
// ---------------------------------------------------------------------------

/// Aggregates `storms` with injected range queries, one storm at a time.
///
/// `fetch_rain` and `fetch_lake` are each called exactly once per storm
/// with the storm's `(start, end)`.
pub fn aggregate<R, L>(
    storms: &[StormInterval],
    rain_gauges: &[&str],
    lake_gauges: &[&str],
    mut fetch_rain: R,
    mut fetch_lake: L,
    hooks: &mut AggregationHooks<'_>,
) -> Result<AggregatedTables, AggregateError>
where
    R: FnMut(DateTime<Utc>, DateTime<Utc>) -> Result<RainTotals, StoreError>,
    L: FnMut(DateTime<Utc>, DateTime<Utc>) -> Result<LakeExtents, StoreError>,
{
    let total = storms.len();
    let mut builder = TableBuilder::new(storms, rain_gauges, lake_gauges);

    for (index, storm) in storms.iter().enumerate() {
        if hooks.cancel.is_cancelled() {
            return Err(AggregateError::Cancelled { completed: index, total });
        }
        let rain = fetch_rain(storm.start(), storm.end()).map_err(|e| fetch_error(index, storm, e))?;
        let lake = fetch_lake(storm.start(), storm.end()).map_err(|e| fetch_error(index, storm, e))?;
        builder.fill(index, &rain, &lake);
        hooks.report(index + 1, total);
    }

    Ok(builder.finish())
}

/// Sequential aggregation backed by an observation store.
pub fn aggregate_from_store<S: ObservationStore + ?Sized>(
    storms: &[StormInterval],
    rain_gauges: &[&str],
    lake_gauges: &[&str],
    store: &S,
    hooks: &mut AggregationHooks<'_>,
) -> Result<AggregatedTables, AggregateError> {
    aggregate(
        storms,
        rain_gauges,
        lake_gauges,
        |start, end| store.storm_rainfall(start, end),
        |start, end| store.lake_extents(start, end),
        hooks,
    )
}

// ---------------------------------------------------------------------------
// Parallel aggregation
// ---------------------------------------------------------------------------

type StormResult = Option<Result<(RainTotals, LakeExtents), StoreError>>;

/// Aggregates `storms` on a pool of `workers` threads sharing `store`.
///
/// Produces the same tables as `aggregate_from_store`. Concurrency is
/// bounded by `workers`; size the store's connection pool to match.
pub fn aggregate_parallel<S: ObservationStore + 'static>(
    storms: &[StormInterval],
    rain_gauges: &[&str],
    lake_gauges: &[&str],
    store: Arc<S>,
    workers: usize,
    hooks: &mut AggregationHooks<'_>,
) -> Result<AggregatedTables, AggregateError> {
    let total = storms.len();
    let mut builder = TableBuilder::new(storms, rain_gauges, lake_gauges);
    let pool = ThreadPool::new(workers.max(1));
    // Set when this call returns early so queued jobs skip their queries.
    let abandoned = CancelFlag::new();
    let (tx, rx) = mpsc::channel::<(usize, StormResult)>();

    for (index, storm) in storms.iter().copied().enumerate() {
        let store = Arc::clone(&store);
        let tx = tx.clone();
        let cancel = hooks.cancel.clone();
        let abandoned = abandoned.clone();
        pool.execute(move || {
            let result = if cancel.is_cancelled() || abandoned.is_cancelled() {
                None
            } else {
                Some(
                    store
                        .storm_rainfall(storm.start(), storm.end())
                        .and_then(|rain| Ok((rain, store.lake_extents(storm.start(), storm.end())?))),
                )
            };
            // The receiver is gone once the run has failed or been cancelled.
            let _ = tx.send((index, result));
        });
    }
    drop(tx);

    let mut filled = vec![false; total];
    let mut completed = 0;
    for (index, result) in rx.iter() {
        if hooks.cancel.is_cancelled() {
            abandoned.cancel();
            return Err(AggregateError::Cancelled { completed, total });
        }
        match result {
            Some(Ok((rain, lake))) => builder.fill(index, &rain, &lake),
            Some(Err(e)) => {
                abandoned.cancel();
                return Err(fetch_error(index, &storms[index], e));
            }
            // Skipped after a cancel that raced this check.
            None => {
                abandoned.cancel();
                return Err(AggregateError::Cancelled { completed, total });
            }
        }
        filled[index] = true;
        completed += 1;
        hooks.report(completed, total);
    }

    // A panicking job drops its sender without reporting.
    if let Some(missing) = filled.iter().position(|done| !done) {
        return Err(AggregateError::WorkerLost(missing));
    }

    Ok(builder.finish())
}

/// Core data types for the storm event pipeline.
///
/// This module defines the shared domain model imported by all other modules.
/// It contains no I/O, only types and the small invariants they carry.
///
/// Absent values are always `None`. Nothing downstream of the ingestion
/// boundary ever interprets a string sentinel or treats "no data" as zero.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

// ---------------------------------------------------------------------------
// Observations
// ---------------------------------------------------------------------------

/// What a gauge reading measures.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SensorKind {
    /// Precipitation accumulated since the previous reading, in inches.
    Rain,
    /// Lake surface elevation, in ft-MSL.
    LakeLevel,
    /// Any other sensor the observation store records (stage, flow, ...).
    Other(String),
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorKind::Rain => write!(f, "rain"),
            SensorKind::LakeLevel => write!(f, "lake_level"),
            SensorKind::Other(label) => write!(f, "{}", label),
        }
    }
}

/// A single recorded reading. Immutable once recorded.
///
/// Several sensor kinds may share a timestamp and gauge.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub collection_time: DateTime<Utc>,
    pub gauge: String,
    pub sensor: SensorKind,
    /// `None` when the source reported "no data" for this slot.
    pub value: Option<f64>,
}

// ---------------------------------------------------------------------------
// Rain series
// ---------------------------------------------------------------------------

/// One row of the aggregate rain signal (system-wide max across gauges).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RainSample {
    pub time: DateTime<Utc>,
    pub rain: Option<f64>,
}

impl RainSample {
    pub fn new(time: DateTime<Utc>, rain: Option<f64>) -> Self {
        Self { time, rain }
    }
}

/// Aggregate rain signal as loaded from the observation store.
///
/// Expected to be ordered by time, but consumers sort defensively.
pub type RainSeries = Vec<RainSample>;

/// A rain sample with its sliding-window sum attached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AugmentedSample {
    pub time: DateTime<Utc>,
    pub rain: f64,
    pub moving_sum: f64,
}

/// Rain series sorted by time, with the moving sum over
/// `[t - trailing, t + leading]` computed for every row.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentedRainSeries {
    pub leading: Duration,
    pub trailing: Duration,
    pub samples: Vec<AugmentedSample>,
}

impl AugmentedRainSeries {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// True when the series was computed with the given window.
    pub fn has_window(&self, leading: Duration, trailing: Duration) -> bool {
        self.leading == leading && self.trailing == trailing
    }
}

// ---------------------------------------------------------------------------
// Storms
// ---------------------------------------------------------------------------

/// A detected storm: the interval between a threshold up-crossing and the
/// matching down-crossing. `start` is strictly before `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StormInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl StormInterval {
    /// Returns `None` unless `start < end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Lowest and highest lake elevation recorded by one gauge in a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LakeExtent {
    pub min: f64,
    pub max: f64,
}

// ---------------------------------------------------------------------------
// Storm tables
// ---------------------------------------------------------------------------

/// Suffix for the per-storm lake minimum column.
pub const MIN_SUFFIX: &str = "_min";
/// Suffix for the per-storm lake maximum column.
pub const MAX_SUFFIX: &str = "_max";

/// One value column of a `StormTable`; one cell per storm.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Wide, columnar per-storm table: `start_time`, `end_time`, then one
/// column per gauge (or per gauge statistic).
///
/// Columns are allocated up front with one absent cell per storm and
/// filled by indexed writes, so every configured column is present even
/// when no storm had data for it.
#[derive(Debug, Clone, PartialEq)]
pub struct StormTable {
    pub start_time: Vec<DateTime<Utc>>,
    pub end_time: Vec<DateTime<Utc>>,
    pub columns: Vec<Column>,
}

impl StormTable {
    /// Builds an all-absent table with one row per storm.
    pub fn with_columns<I, S>(storms: &[StormInterval], names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rows = storms.len();
        StormTable {
            start_time: storms.iter().map(|s| s.start()).collect(),
            end_time: storms.iter().map(|s| s.end()).collect(),
            columns: names
                .into_iter()
                .map(|name| Column {
                    name: name.into(),
                    values: vec![None; rows],
                })
                .collect(),
        }
    }

    /// Number of storm rows.
    pub fn len(&self) -> usize {
        self.start_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.start_time.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Value at `(row, column)`; `None` for absent cells and unknown columns.
    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        self.column(name)
            .and_then(|c| c.values.get(row).copied())
            .flatten()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

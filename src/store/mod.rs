/// Read access to recorded observations.
///
/// The pipeline needs three range queries from whatever holds the
/// observations: the system-wide max rain signal, per-gauge rain totals over
/// a storm, and per-gauge lake elevation extremes over a storm. Both
/// implementations share the same semantics:
///
/// - windows are inclusive at both ends,
/// - absent values are skipped, never counted as zero,
/// - a gauge with no present value in the window is missing from the
///   result map (the aggregator turns that into an absent cell).
///
/// Stores are `Send + Sync` so the aggregator can fan per-storm queries out
/// across worker threads.

pub mod memory;
pub mod postgres;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

use crate::db::DbConfigError;
use crate::model::{LakeExtent, RainSeries};

pub use memory::MemoryObservationStore;
pub use postgres::PgObservationStore;

/// Summed rainfall per rain gauge over one window.
pub type RainTotals = HashMap<String, f64>;

/// Min/max elevation per lake gauge over one window.
pub type LakeExtents = HashMap<String, LakeExtent>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Connection(#[from] DbConfigError),

    #[error("observation query failed: {0}")]
    Query(#[from] ::postgres::Error),

    /// A result row did not have the expected column types.
    #[error("malformed query response: {0}")]
    Malformed(String),
}

pub trait ObservationStore: Send + Sync {
    /// Max rain value across all gauges for every recorded timestamp,
    /// ordered by time.
    fn rain_series(&self) -> Result<RainSeries, StoreError>;

    /// Rain totals per gauge for readings in `[start, end]`.
    fn storm_rainfall(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<RainTotals, StoreError>;

    /// Lake elevation extremes per gauge for readings in `[start, end]`.
    fn lake_extents(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<LakeExtents, StoreError>;
}

impl<S: ObservationStore + ?Sized> ObservationStore for std::sync::Arc<S> {
    fn rain_series(&self) -> Result<RainSeries, StoreError> {
        (**self).rain_series()
    }

    fn storm_rainfall(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<RainTotals, StoreError> {
        (**self).storm_rainfall(start, end)
    }

    fn lake_extents(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<LakeExtents, StoreError> {
        (**self).lake_extents(start, end)
    }
}

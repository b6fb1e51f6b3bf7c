/// In-memory observation store.
///
/// Holds a flat list of observations (typically parsed from a CSV export)
/// and answers the pipeline's range queries with the same semantics as the
/// PostgreSQL store. Used for offline runs and tests.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::{LakeExtents, ObservationStore, RainTotals, StoreError};
use crate::model::{LakeExtent, Observation, RainSample, RainSeries, SensorKind};

#[derive(Debug, Clone, Default)]
pub struct MemoryObservationStore {
    observations: Vec<Observation>,
}

impl MemoryObservationStore {
    pub fn new(observations: Vec<Observation>) -> Self {
        Self { observations }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Present values of `sensor` readings inside `[start, end]`.
    fn in_window<'a>(
        &'a self,
        sensor: &'a SensorKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> impl Iterator<Item = (&'a str, f64)> + 'a {
        self.observations
            .iter()
            .filter(move |o| &o.sensor == sensor && o.collection_time >= start && o.collection_time <= end)
            .filter_map(|o| o.value.map(|v| (o.gauge.as_str(), v)))
    }
}

impl ObservationStore for MemoryObservationStore {
    fn rain_series(&self) -> Result<RainSeries, StoreError> {
        // Every rain timestamp gets a row, even when all its values are absent.
        let mut by_time: BTreeMap<DateTime<Utc>, Option<f64>> = BTreeMap::new();
        for obs in self.observations.iter().filter(|o| o.sensor == SensorKind::Rain) {
            let slot = by_time.entry(obs.collection_time).or_insert(None);
            if let Some(v) = obs.value {
                *slot = Some(slot.map_or(v, |current| current.max(v)));
            }
        }
        Ok(by_time
            .into_iter()
            .map(|(time, rain)| RainSample::new(time, rain))
            .collect())
    }

    fn storm_rainfall(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<RainTotals, StoreError> {
        let mut totals = RainTotals::new();
        for (gauge, value) in self.in_window(&SensorKind::Rain, start, end) {
            *totals.entry(gauge.to_string()).or_insert(0.0) += value;
        }
        Ok(totals)
    }

    fn lake_extents(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<LakeExtents, StoreError> {
        let mut extents = LakeExtents::new();
        for (gauge, value) in self.in_window(&SensorKind::LakeLevel, start, end) {
            extents
                .entry(gauge.to_string())
                .and_modify(|e| {
                    e.min = e.min.min(value);
                    e.max = e.max.max(value);
                })
                .or_insert(LakeExtent { min: value, max: value });
        }
        Ok(extents)
    }
}

/// PostgreSQL observation store.
///
/// Observations live in a single table (default `hydromet`):
///
/// ```sql
/// collection_time TIMESTAMP, gauge TEXT, sensor TEXT, value REAL
/// ```
///
/// `value` is NULL where the source reported no data. Timestamps are stored
/// without a zone and are UTC by convention.
///
/// The store owns a fixed set of connections, one per aggregation worker;
/// each query borrows whichever connection is free, so concurrent reads are
/// bounded by the connection count.

use chrono::{DateTime, NaiveDateTime, Utc};
use postgres::{Client, Row};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{LakeExtents, ObservationStore, RainTotals, StoreError};
use crate::config::StoreConfig;
use crate::db;
use crate::model::{LakeExtent, Observation, RainSample, RainSeries};

pub struct PgObservationStore {
    clients: Vec<Mutex<Client>>,
    next: AtomicUsize,
    config: StoreConfig,
}

impl PgObservationStore {
    /// Opens `connections` validated connections (at least one) using
    /// DATABASE_URL and checks the observation table is readable.
    pub fn connect(connections: usize, config: &StoreConfig) -> Result<Self, StoreError> {
        let mut clients = Vec::with_capacity(connections.max(1));
        for _ in 0..connections.max(1) {
            clients.push(db::connect_and_verify(&config.table)?);
        }
        Ok(Self::from_clients(clients, config))
    }

    /// Wraps already-open connections. Performs no validation.
    pub fn from_clients(clients: Vec<Client>, config: &StoreConfig) -> Self {
        Self {
            clients: clients.into_iter().map(Mutex::new).collect(),
            next: AtomicUsize::new(0),
            config: config.clone(),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }

    /// Borrows a free connection, falling back to waiting on the next one
    /// in rotation.
    fn client(&self) -> Result<MutexGuard<'_, Client>, StoreError> {
        if self.clients.is_empty() {
            return Err(StoreError::Malformed("store has no open connections".into()));
        }
        let first = self.next.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        for offset in 0..self.clients.len() {
            let idx = (first + offset) % self.clients.len();
            if let Ok(guard) = self.clients[idx].try_lock() {
                return Ok(guard);
            }
        }
        // A poisoned connection is still usable: each query is self-contained.
        Ok(self.clients[first]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    /// Creates the observation table and its uniqueness constraint if missing.
    pub fn ensure_table(&self) -> Result<(), StoreError> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                collection_time TIMESTAMP NOT NULL,
                gauge TEXT NOT NULL,
                sensor TEXT NOT NULL,
                value REAL,
                UNIQUE (collection_time, gauge, sensor)
             )",
            self.config.table
        );
        self.client()?.batch_execute(&sql)?;
        Ok(())
    }

    /// Inserts observations in one transaction. Rows already present are
    /// skipped, so reloading the same export is harmless. Returns the number
    /// of new rows.
    pub fn insert_observations(&self, observations: &[Observation]) -> Result<u64, StoreError> {
        if observations.is_empty() {
            return Ok(0);
        }

        let mut client = self.client()?;
        let mut transaction = client.transaction()?;
        let stmt = transaction.prepare(&format!(
            "INSERT INTO {} (collection_time, gauge, sensor, value) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (collection_time, gauge, sensor) DO NOTHING",
            self.config.table
        ))?;

        let mut inserted = 0;
        for obs in observations {
            // The value column is REAL.
            let value: Option<f32> = obs.value.map(|v| v as f32);
            inserted += transaction.execute(
                &stmt,
                &[
                    &obs.collection_time.naive_utc(),
                    &obs.gauge,
                    &self.config.label(&obs.sensor),
                    &value,
                ],
            )?;
        }

        transaction.commit()?;
        Ok(inserted)
    }
}

fn malformed(query: &str, column: usize, err: postgres::Error) -> StoreError {
    StoreError::Malformed(format!("{} column {}: {}", query, column, err))
}

fn get_time(row: &Row, query: &str, column: usize) -> Result<DateTime<Utc>, StoreError> {
    row.try_get::<_, NaiveDateTime>(column)
        .map(|t| t.and_utc())
        .map_err(|e| malformed(query, column, e))
}

fn get_text(row: &Row, query: &str, column: usize) -> Result<String, StoreError> {
    row.try_get::<_, String>(column)
        .map_err(|e| malformed(query, column, e))
}

fn get_value(row: &Row, query: &str, column: usize) -> Result<Option<f64>, StoreError> {
    row.try_get::<_, Option<f64>>(column)
        .map_err(|e| malformed(query, column, e))
}

impl ObservationStore for PgObservationStore {
    fn rain_series(&self) -> Result<RainSeries, StoreError> {
        let rows = self.client()?.query(
            &format!(
                "SELECT collection_time, MAX(value)::float8
                 FROM {}
                 WHERE sensor = $1
                 GROUP BY collection_time
                 ORDER BY collection_time",
                self.config.table
            ),
            &[&self.config.rain_sensor],
        )?;

        let mut series = Vec::with_capacity(rows.len());
        for row in &rows {
            series.push(RainSample::new(
                get_time(row, "rain_series", 0)?,
                get_value(row, "rain_series", 1)?,
            ));
        }
        log::debug!("loaded {} rain timestamps from {}", series.len(), self.config.table);
        Ok(series)
    }

    fn storm_rainfall(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<RainTotals, StoreError> {
        let rows = self.client()?.query(
            &format!(
                "SELECT gauge, SUM(value)::float8
                 FROM {}
                 WHERE sensor = $1
                   AND collection_time BETWEEN $2 AND $3
                 GROUP BY gauge",
                self.config.table
            ),
            &[&self.config.rain_sensor, &start.naive_utc(), &end.naive_utc()],
        )?;

        let mut totals = RainTotals::with_capacity(rows.len());
        for row in &rows {
            let gauge = get_text(row, "storm_rainfall", 0)?;
            // SUM over only NULL values is NULL: no data, not zero.
            if let Some(total) = get_value(row, "storm_rainfall", 1)? {
                totals.insert(gauge, total);
            }
        }
        Ok(totals)
    }

    fn lake_extents(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<LakeExtents, StoreError> {
        let rows = self.client()?.query(
            &format!(
                "SELECT gauge, MIN(value)::float8, MAX(value)::float8
                 FROM {}
                 WHERE sensor = $1
                   AND collection_time BETWEEN $2 AND $3
                 GROUP BY gauge",
                self.config.table
            ),
            &[&self.config.lake_sensor, &start.naive_utc(), &end.naive_utc()],
        )?;

        let mut extents = LakeExtents::with_capacity(rows.len());
        for row in &rows {
            let gauge = get_text(row, "lake_extents", 0)?;
            let min = get_value(row, "lake_extents", 1)?;
            let max = get_value(row, "lake_extents", 2)?;
            match (min, max) {
                (Some(min), Some(max)) => {
                    extents.insert(gauge, LakeExtent { min, max });
                }
                (None, None) => {}
                _ => {
                    return Err(StoreError::Malformed(format!(
                        "lake_extents: gauge {} has only one of min/max",
                        gauge
                    )));
                }
            }
        }
        Ok(extents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SensorKind;
    use chrono::{Duration, TimeZone};

    fn test_store() -> PgObservationStore {
        let config = StoreConfig {
            table: "storm_events_test_hydromet".to_string(),
            ..StoreConfig::default()
        };
        let client = db::connect_with_validation().expect("DATABASE_URL must point at a test database");
        let store = PgObservationStore::from_clients(vec![client], &config);
        store.client().unwrap().batch_execute("DROP TABLE IF EXISTS storm_events_test_hydromet").unwrap();
        store.ensure_table().unwrap();
        store
    }

    fn obs(hour: i64, gauge: &str, sensor: SensorKind, value: Option<f64>) -> Observation {
        Observation {
            collection_time: Utc.with_ymd_and_hms(2015, 5, 23, 0, 0, 0).unwrap() + Duration::hours(hour),
            gauge: gauge.to_string(),
            sensor,
            value,
        }
    }

    #[test]
    #[ignore] // Only run when database is available
    fn test_round_trip_queries_against_database() {
        let store = test_store();
        let rows = vec![
            obs(0, "4594", SensorKind::Rain, Some(0.5)),
            obs(0, "3991", SensorKind::Rain, Some(1.0)),
            obs(1, "4594", SensorKind::Rain, None),
            obs(0, "3963", SensorKind::LakeLevel, Some(660.5)),
            obs(1, "3963", SensorKind::LakeLevel, Some(661.0)),
        ];
        assert_eq!(store.insert_observations(&rows).unwrap(), 5);
        assert_eq!(store.insert_observations(&rows).unwrap(), 0, "reload must be idempotent");

        let series = store.rain_series().unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].rain, Some(1.0));
        assert_eq!(series[1].rain, None);

        let start = rows[0].collection_time;
        let end = start + Duration::hours(1);
        let totals = store.storm_rainfall(start, end).unwrap();
        assert_eq!(totals.get("4594"), Some(&0.5));

        let extents = store.lake_extents(start, end).unwrap();
        assert_eq!(extents["3963"], LakeExtent { min: 660.5, max: 661.0 });
    }
}

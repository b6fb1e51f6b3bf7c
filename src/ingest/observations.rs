/// Observation export parsing.
///
/// Reads `collection_time,gauge,sensor,value` CSV exports of the
/// observation table. This is the only place string no-data markers are
/// interpreted: an empty or whitespace cell, a non-breaking space and `---`
/// all become `None`. Everything past this point matches on `Option`.
///
/// Sensor labels are mapped onto `SensorKind` with the configured store
/// labels, so an export written with `Rain (inches)` as the rain label
/// still feeds the rain series.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::StoreConfig;
use crate::model::Observation;

/// Timestamp layout of observation exports (UTC, no offset).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Marker some exports use for a reading that was never taken.
const DASH_MARKER: &str = "---";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {source}")]
    Csv {
        line: u64,
        #[source]
        source: csv::Error,
    },

    #[error("line {line}: unrecognised timestamp '{value}'")]
    Timestamp { line: u64, value: String },

    #[error("line {line}: value '{value}' is not a number")]
    Value { line: u64, value: String },

    #[error("line {line}: missing gauge code")]
    Gauge { line: u64 },
}

#[derive(Debug, Deserialize)]
struct ExportRow {
    collection_time: String,
    gauge: String,
    sensor: String,
    #[serde(default)]
    value: String,
}

/// True for cells that mean "no data". `char::is_whitespace` covers U+00A0.
pub fn is_absent(cell: &str) -> bool {
    let cell = cell.trim();
    cell.is_empty() || cell == DASH_MARKER
}

/// Parses a value cell; `Ok(None)` for no-data markers.
pub fn parse_value(cell: &str) -> Result<Option<f64>, std::num::ParseFloatError> {
    if is_absent(cell) {
        return Ok(None);
    }
    cell.trim().parse::<f64>().map(Some)
}

/// Parses `YYYY-MM-DD HH:MM:SS` (taken as UTC) or RFC 3339.
pub fn parse_timestamp(cell: &str) -> Option<DateTime<Utc>> {
    let cell = cell.trim();
    NaiveDateTime::parse_from_str(cell, TIMESTAMP_FORMAT)
        .map(|t| t.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(cell).map(|t| t.with_timezone(&Utc)))
        .ok()
}

/// Parses an observation export from `reader`.
pub fn parse_observations<R: Read>(reader: R, store: &StoreConfig) -> Result<Vec<Observation>, IngestError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr
        .headers()
        .map_err(|source| IngestError::Csv { line: 1, source })?
        .clone();

    let mut observations = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|source| IngestError::Csv {
            line: source.position().map(|p| p.line()).unwrap_or(0),
            source,
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let row: ExportRow = record
            .deserialize(Some(&headers))
            .map_err(|source| IngestError::Csv { line, source })?;

        let collection_time = parse_timestamp(&row.collection_time).ok_or_else(|| IngestError::Timestamp {
            line,
            value: row.collection_time.clone(),
        })?;
        let gauge = row.gauge.trim();
        if gauge.is_empty() {
            return Err(IngestError::Gauge { line });
        }
        let value = parse_value(&row.value).map_err(|_| IngestError::Value {
            line,
            value: row.value.clone(),
        })?;

        observations.push(Observation {
            collection_time,
            gauge: gauge.to_string(),
            sensor: store.classify(row.sensor.trim()),
            value,
        });
    }

    log::debug!("parsed {} observations", observations.len());
    Ok(observations)
}

/// Loads an observation export from disk.
pub fn load_observations<P: AsRef<Path>>(path: P, store: &StoreConfig) -> Result<Vec<Observation>, IngestError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| IngestError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    parse_observations(file, store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fixtures::{fixture_markers_csv, fixture_storm_csv};
    use crate::model::SensorKind;
    use chrono::TimeZone;

    fn parse(text: &str) -> Result<Vec<Observation>, IngestError> {
        parse_observations(text.as_bytes(), &StoreConfig::default())
    }

    #[test]
    fn test_no_data_markers_become_absent() {
        let observations = parse(fixture_markers_csv()).unwrap();
        assert_eq!(observations.len(), 7);
        assert_eq!(observations[0].value, Some(0.25));
        for obs in &observations[1..5] {
            assert_eq!(obs.value, None, "gauge {} should be absent", obs.gauge);
        }
    }

    #[test]
    fn test_is_absent_markers() {
        assert!(is_absent(""));
        assert!(is_absent("   "));
        assert!(is_absent("\u{a0}"));
        assert!(is_absent(" --- "));
        assert!(!is_absent("0"));
        assert!(!is_absent("0.0"));
    }

    #[test]
    fn test_zero_is_a_value() {
        assert_eq!(parse_value("0.0").unwrap(), Some(0.0));
        assert_eq!(parse_value(" 1.25 ").unwrap(), Some(1.25));
        assert!(parse_value("T").is_err(), "trace marker is not a number");
    }

    #[test]
    fn test_both_timestamp_formats() {
        let observations = parse(fixture_markers_csv()).unwrap();
        let expected = Utc.with_ymd_and_hms(2015, 5, 23, 1, 0, 0).unwrap();
        assert_eq!(observations[5].collection_time, expected, "RFC 3339 row");
        assert_eq!(observations[6].collection_time, expected, "plain row");
        assert_eq!(
            parse_timestamp("2015-05-23T01:00:00-05:00"),
            Some(Utc.with_ymd_and_hms(2015, 5, 23, 6, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_sensor_labels_use_store_config() {
        let observations = parse(fixture_markers_csv()).unwrap();
        assert_eq!(observations[0].sensor, SensorKind::Rain);
        assert_eq!(observations[5].sensor, SensorKind::LakeLevel);
        assert_eq!(observations[6].sensor, SensorKind::Other("stage".into()));

        let store = StoreConfig {
            rain_sensor: "Rain (inches)".into(),
            ..StoreConfig::default()
        };
        let csv = "collection_time,gauge,sensor,value\n2015-05-23 00:00:00,4594,Rain (inches),0.5\n";
        let observations = parse_observations(csv.as_bytes(), &store).unwrap();
        assert_eq!(observations[0].sensor, SensorKind::Rain);
    }

    #[test]
    fn test_non_numeric_value_is_an_error() {
        let err = parse("collection_time,gauge,sensor,value\n2015-05-23 00:00:00,4594,rain,abc\n").unwrap_err();
        match err {
            IngestError::Value { line, value } => {
                assert_eq!(line, 2);
                assert_eq!(value, "abc");
            }
            other => panic!("expected value error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_timestamp_is_an_error() {
        let err = parse("collection_time,gauge,sensor,value\n23/05/2015,4594,rain,0.1\n").unwrap_err();
        assert!(matches!(err, IngestError::Timestamp { line: 2, .. }), "got {:?}", err);
    }

    #[test]
    fn test_missing_value_column_reads_as_absent() {
        let observations = parse("collection_time,gauge,sensor,value\n2015-05-23 00:00:00,4594,rain\n").unwrap();
        assert_eq!(observations[0].value, None);
    }

    #[test]
    fn test_storm_fixture_parses() {
        let observations = parse(fixture_storm_csv()).unwrap();
        assert_eq!(observations.len(), 21);
        let absent = observations.iter().filter(|o| o.value.is_none()).count();
        assert_eq!(absent, 3);
    }

    #[test]
    fn test_missing_file() {
        let err = load_observations("does/not/exist.csv", &StoreConfig::default()).unwrap_err();
        assert!(matches!(err, IngestError::Open { .. }));
    }
}

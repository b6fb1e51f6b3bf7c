/// CSV artifacts: storm tables and the moving-sum cache.
///
/// Storm tables are written as
///
/// ```text
/// start_time,end_time,<column>,<column>,...
/// 2015-05-23T03:00:00Z,2015-05-23T05:00:00Z,1.1,,0
/// ```
///
/// with RFC 3339 UTC timestamps and empty cells for absent values.
///
/// The moving-sum cache stores an augmented rain series as
/// `collection_time,rain,moving_sum` behind a one-line header naming the
/// window it was computed with:
///
/// ```text
/// # leading_seconds=36000 trailing_seconds=86400
/// ```
///
/// A cache whose window differs from the requested one is ignored.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::model::{AugmentedRainSeries, AugmentedSample, Column, StormTable};

const START_COLUMN: &str = "start_time";
const END_COLUMN: &str = "end_time";
const CACHE_HEADER_PREFIX: &str = "# ";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("write failed: {0}")]
    Stream(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("line {line}: bad value '{value}'")]
    Value { line: u64, value: String },

    #[error("not a storm table: {0}")]
    Layout(String),

    #[error("bad moving-sum cache header: {0}")]
    CacheHeader(String),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ExportError + '_ {
    move |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn format_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_time(cell: &str, line: u64) -> Result<DateTime<Utc>, ExportError> {
    DateTime::parse_from_rfc3339(cell.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ExportError::Value {
            line,
            value: cell.to_string(),
        })
}

fn parse_number(cell: &str, line: u64) -> Result<f64, ExportError> {
    cell.trim().parse().map_err(|_| ExportError::Value {
        line,
        value: cell.to_string(),
    })
}

fn format_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Storm tables
// ---------------------------------------------------------------------------

pub fn write_table<W: Write>(writer: W, table: &StormTable) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = vec![START_COLUMN, END_COLUMN];
    header.extend(table.column_names());
    wtr.write_record(&header)?;

    for row in 0..table.len() {
        let mut record = Vec::with_capacity(table.columns.len() + 2);
        record.push(format_time(table.start_time[row]));
        record.push(format_time(table.end_time[row]));
        record.extend(table.columns.iter().map(|c| format_cell(c.values[row])));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_table_file<P: AsRef<Path>>(path: P, table: &StormTable) -> Result<(), ExportError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(io_error(path))?;
    write_table(file, table)
}

pub fn read_table<R: Read>(reader: R) -> Result<StormTable, ExportError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();
    if headers.get(0) != Some(START_COLUMN) || headers.get(1) != Some(END_COLUMN) {
        return Err(ExportError::Layout(format!(
            "expected '{},{}' leading columns, got {:?}",
            START_COLUMN, END_COLUMN, headers
        )));
    }

    let mut table = StormTable {
        start_time: Vec::new(),
        end_time: Vec::new(),
        columns: headers
            .iter()
            .skip(2)
            .map(|name| Column {
                name: name.to_string(),
                values: Vec::new(),
            })
            .collect(),
    };

    for record in rdr.records() {
        let record = record?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        table.start_time.push(parse_time(&record[0], line)?);
        table.end_time.push(parse_time(&record[1], line)?);
        for (column, cell) in table.columns.iter_mut().zip(record.iter().skip(2)) {
            let value = if cell.trim().is_empty() {
                None
            } else {
                Some(parse_number(cell, line)?)
            };
            column.values.push(value);
        }
    }

    Ok(table)
}

pub fn read_table_file<P: AsRef<Path>>(path: P) -> Result<StormTable, ExportError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(io_error(path))?;
    read_table(file)
}

// ---------------------------------------------------------------------------
// Moving-sum cache
// ---------------------------------------------------------------------------

fn cache_header(leading: Duration, trailing: Duration) -> String {
    format!(
        "{}leading_seconds={} trailing_seconds={}",
        CACHE_HEADER_PREFIX,
        leading.num_seconds(),
        trailing.num_seconds()
    )
}

fn parse_cache_header(line: &str) -> Result<(Duration, Duration), ExportError> {
    let bad = || ExportError::CacheHeader(line.trim_end().to_string());
    let body = line.trim_end().strip_prefix(CACHE_HEADER_PREFIX).ok_or_else(bad)?;

    let mut leading = None;
    let mut trailing = None;
    for field in body.split_whitespace() {
        let (key, value) = field.split_once('=').ok_or_else(bad)?;
        let seconds: i64 = value.parse().map_err(|_| bad())?;
        match key {
            "leading_seconds" => leading = Some(Duration::seconds(seconds)),
            "trailing_seconds" => trailing = Some(Duration::seconds(seconds)),
            _ => return Err(bad()),
        }
    }
    leading.zip(trailing).ok_or_else(bad)
}

#[derive(Debug, Serialize)]
struct CacheRow {
    collection_time: String,
    rain: f64,
    moving_sum: f64,
}

pub fn write_moving_sum<W: Write>(mut writer: W, series: &AugmentedRainSeries) -> Result<(), ExportError> {
    writeln!(writer, "{}", cache_header(series.leading, series.trailing))?;

    let mut wtr = csv::Writer::from_writer(writer);
    for sample in &series.samples {
        wtr.serialize(CacheRow {
            collection_time: format_time(sample.time),
            rain: sample.rain,
            moving_sum: sample.moving_sum,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn read_moving_sum<R: Read>(reader: R) -> Result<AugmentedRainSeries, ExportError> {
    let mut reader = BufReader::new(reader);
    let mut first = String::new();
    reader.read_line(&mut first)?;
    let (leading, trailing) = parse_cache_header(&first)?;

    let mut rdr = csv::Reader::from_reader(reader);
    let mut samples = Vec::new();
    for record in rdr.records() {
        let record = record?;
        // Line numbers are relative to the CSV body; +1 for the header line.
        let line = record.position().map(|p| p.line() + 1).unwrap_or(0);
        if record.len() != 3 {
            return Err(ExportError::Value {
                line,
                value: record.iter().collect::<Vec<_>>().join(","),
            });
        }
        samples.push(AugmentedSample {
            time: parse_time(&record[0], line)?,
            rain: parse_number(&record[1], line)?,
            moving_sum: parse_number(&record[2], line)?,
        });
    }

    Ok(AugmentedRainSeries {
        leading,
        trailing,
        samples,
    })
}

pub fn write_moving_sum_file<P: AsRef<Path>>(path: P, series: &AugmentedRainSeries) -> Result<(), ExportError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(io_error(path))?;
    write_moving_sum(file, series)
}

/// Reads a cached series if `path` exists and was computed with the given
/// window. `Ok(None)` means the caller should recompute.
pub fn load_cached_moving_sum<P: AsRef<Path>>(
    path: P,
    leading: Duration,
    trailing: Duration,
) -> Result<Option<AugmentedRainSeries>, ExportError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(path).map_err(io_error(path))?;
    let series = read_moving_sum(file)?;
    if !series.has_window(leading, trailing) {
        log::warn!(
            "ignoring moving-sum cache {}: computed with leading={}h trailing={}h",
            path.display(),
            series.leading.num_hours(),
            series.trailing.num_hours()
        );
        return Ok(None);
    }
    Ok(Some(series))
}

/// Writes `value` as pretty JSON.
pub fn write_json_file<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<(), ExportError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(io_error(path))?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}

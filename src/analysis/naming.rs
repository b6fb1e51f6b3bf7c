/// Column naming and lake volume conversion.
///
/// Post-processing for aggregated storm tables:
///
/// - `rename_columns` swaps gauge codes for catalog display names
///   (`3963_min` → `Mansfield Dam_min`). Unknown columns pass through.
/// - `convert_volumes` replaces lake elevation columns with storage volume
///   via each lake's elevation→volume table. Elevations are rounded to one
///   decimal (0.1 ft) before lookup; an elevation missing from the table
///   becomes absent. Lake columns for lakes without a table are dropped.
///
/// Lookup tables are CSV files with `ft-MSL` and `acre-feet` columns.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::gauges::GaugeCatalog;
use crate::model::{Column, StormTable, MAX_SUFFIX, MIN_SUFFIX};

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("volume table for lake {gauge} not found at {path}: {source}")]
    Missing {
        gauge: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed volume table {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("volume table {path} has no rows")]
    Empty { path: PathBuf },

    #[error("lake {0} has a configured volume table that was not loaded")]
    NotLoaded(String),
}

/// Elevation in tenths of a foot, the lookup key. Halves round to even.
fn elevation_key(elevation_ft: f64) -> i64 {
    (elevation_ft * 10.0).round_ties_even() as i64
}

#[derive(Debug, Deserialize)]
struct VolumeRow {
    #[serde(rename = "ft-MSL")]
    elevation: f64,
    #[serde(rename = "acre-feet")]
    volume: f64,
}

/// Elevation (ft-MSL) → storage volume (acre-feet) for one lake.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumeTable {
    volumes: HashMap<i64, f64>,
}

impl VolumeTable {
    pub fn from_pairs<I: IntoIterator<Item = (f64, f64)>>(pairs: I) -> Self {
        Self {
            volumes: pairs
                .into_iter()
                .map(|(elevation, volume)| (elevation_key(elevation), volume))
                .collect(),
        }
    }

    /// Reads a lookup table. Columns other than `ft-MSL` and `acre-feet`
    /// are ignored.
    pub fn from_reader<R: std::io::Read>(reader: R, origin: &Path) -> Result<Self, VolumeError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut pairs = Vec::new();
        for row in rdr.deserialize::<VolumeRow>() {
            let row = row.map_err(|source| VolumeError::Malformed {
                path: origin.to_path_buf(),
                source,
            })?;
            pairs.push((row.elevation, row.volume));
        }
        if pairs.is_empty() {
            return Err(VolumeError::Empty { path: origin.to_path_buf() });
        }
        Ok(Self::from_pairs(pairs))
    }

    pub fn load(gauge: &str, path: &Path) -> Result<Self, VolumeError> {
        let file = std::fs::File::open(path).map_err(|source| VolumeError::Missing {
            gauge: gauge.to_string(),
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file, path)
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// Volume at `elevation_ft` rounded to 0.1 ft; `None` when not tabulated.
    pub fn volume_at(&self, elevation_ft: f64) -> Option<f64> {
        if !elevation_ft.is_finite() {
            return None;
        }
        self.volumes.get(&elevation_key(elevation_ft)).copied()
    }
}

/// Loads every lake volume table named in the catalog, keyed by gauge code.
/// A configured file that cannot be opened is fatal.
pub fn load_volume_tables(catalog: &GaugeCatalog) -> Result<HashMap<String, VolumeTable>, VolumeError> {
    let mut tables = HashMap::new();
    for gauge in catalog.gauges() {
        if let Some(path) = &gauge.volume_table {
            let table = VolumeTable::load(&gauge.code, path)?;
            log::debug!("loaded {} volume rows for {} from {}", table.len(), gauge.name, path.display());
            tables.insert(gauge.code.clone(), table);
        }
    }
    Ok(tables)
}

/// Display name for a raw column, if the catalog knows it.
fn display_column(name: &str, catalog: &GaugeCatalog) -> Option<String> {
    if let Some(display) = catalog.display_name(name) {
        return Some(display.to_string());
    }
    [MIN_SUFFIX, MAX_SUFFIX].iter().find_map(|suffix| {
        let code = name.strip_suffix(suffix)?;
        catalog
            .display_name(code)
            .map(|display| format!("{}{}", display, suffix))
    })
}

/// Renames gauge-code columns to display names.
pub fn rename_columns(mut table: StormTable, catalog: &GaugeCatalog) -> StormTable {
    for column in &mut table.columns {
        if let Some(display) = display_column(&column.name, catalog) {
            column.name = display;
        }
    }
    table
}

/// Converts lake elevation columns to volumes and drops lake columns that
/// have no lookup table. Non-lake columns are kept unchanged.
pub fn convert_volumes(
    table: StormTable,
    catalog: &GaugeCatalog,
    lookups: &HashMap<String, VolumeTable>,
) -> Result<StormTable, VolumeError> {
    let StormTable { start_time, end_time, columns } = table;
    let mut converted = Vec::with_capacity(columns.len());

    for column in columns {
        let Some(lake) = catalog.lake_for_column(&column.name) else {
            converted.push(column);
            continue;
        };
        match lookups.get(&lake.code) {
            Some(lookup) => {
                let values = column
                    .values
                    .iter()
                    .map(|v| v.and_then(|elevation| lookup.volume_at(elevation)))
                    .collect();
                converted.push(Column { name: column.name, values });
            }
            None if lake.volume_table.is_some() => {
                return Err(VolumeError::NotLoaded(lake.code.clone()));
            }
            None => log::debug!("dropping {}: no volume table for {}", column.name, lake.name),
        }
    }

    Ok(StormTable { start_time, end_time, columns: converted })
}

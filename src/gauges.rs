/// Gauge catalog for the storm event pipeline.
///
/// Defines which rain and lake gauges appear as columns in the per-storm
/// tables, their display names, and which lakes carry an elevation→volume
/// lookup table. Loaded once from gauges.toml and passed explicitly to the
/// aggregator and the name/volume post-processing; no module holds gauge
/// lists of its own.

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ConfigError;
use crate::model::{MAX_SUFFIX, MIN_SUFFIX};

/// Default catalog location, relative to the working directory.
pub const DEFAULT_CATALOG_PATH: &str = "gauges.toml";

// ---------------------------------------------------------------------------
// Gauge metadata
// ---------------------------------------------------------------------------

/// What a gauge contributes to the storm tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GaugeRole {
    /// Summed rainfall per storm.
    Rain,
    /// Min/max lake elevation per storm.
    Lake,
}

/// One `[[gauge]]` entry of gauges.toml.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GaugeConfig {
    /// Numeric gauge code as used by the observation store.
    pub code: String,
    /// Display name used for renamed output columns.
    pub name: String,
    pub role: GaugeRole,
    /// Elevation→volume CSV for lake gauges. Resolved against the catalog
    /// file's directory at load time.
    pub volume_table: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct GaugeRegistry {
    #[serde(default)]
    gauge: Vec<GaugeConfig>,
}

/// Validated, ordered set of configured gauges.
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeCatalog {
    gauges: Vec<GaugeConfig>,
}

impl GaugeCatalog {
    /// Builds a catalog, rejecting duplicate codes, empty names and volume
    /// tables on rain gauges.
    pub fn new(gauges: Vec<GaugeConfig>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for gauge in &gauges {
            if gauge.code.trim().is_empty() {
                return Err(ConfigError::Invalid("gauge code must not be empty".into()));
            }
            if gauge.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "gauge '{}' has an empty name",
                    gauge.code
                )));
            }
            if !seen.insert(gauge.code.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate gauge code '{}'",
                    gauge.code
                )));
            }
            if gauge.role == GaugeRole::Rain && gauge.volume_table.is_some() {
                return Err(ConfigError::Invalid(format!(
                    "rain gauge '{}' cannot have a volume_table",
                    gauge.code
                )));
            }
        }
        Ok(Self { gauges })
    }

    pub fn gauges(&self) -> &[GaugeConfig] {
        &self.gauges
    }

    /// Rain gauge codes in catalog order.
    pub fn rain_gauges(&self) -> Vec<&str> {
        self.codes_with_role(GaugeRole::Rain)
    }

    /// Lake gauge codes in catalog order.
    pub fn lake_gauges(&self) -> Vec<&str> {
        self.codes_with_role(GaugeRole::Lake)
    }

    fn codes_with_role(&self, role: GaugeRole) -> Vec<&str> {
        self.gauges
            .iter()
            .filter(|g| g.role == role)
            .map(|g| g.code.as_str())
            .collect()
    }

    pub fn find(&self, code: &str) -> Option<&GaugeConfig> {
        self.gauges.iter().find(|g| g.code == code)
    }

    pub fn display_name(&self, code: &str) -> Option<&str> {
        self.find(code).map(|g| g.name.as_str())
    }

    /// Resolves a lake table column (`<code|name>_min` / `<code|name>_max`)
    /// to its lake gauge. Columns of any other shape return `None`.
    pub fn lake_for_column(&self, column: &str) -> Option<&GaugeConfig> {
        let base = column
            .strip_suffix(MIN_SUFFIX)
            .or_else(|| column.strip_suffix(MAX_SUFFIX))?;
        self.gauges
            .iter()
            .filter(|g| g.role == GaugeRole::Lake)
            .find(|g| g.code == base || g.name == base)
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Parses a catalog document read from `origin`; relative `volume_table`
/// paths are joined to the directory holding it.
pub fn parse_catalog(contents: &str, origin: &Path) -> Result<GaugeCatalog, ConfigError> {
    let registry: GaugeRegistry = toml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: origin.to_path_buf(),
        source,
    })?;
    let base_dir = origin.parent().unwrap_or_else(|| Path::new(""));

    let gauges = registry
        .gauge
        .into_iter()
        .map(|mut g| {
            g.volume_table = g.volume_table.map(|p| {
                if p.is_relative() { base_dir.join(p) } else { p }
            });
            g
        })
        .collect();

    GaugeCatalog::new(gauges)
}

/// Loads the gauge catalog from `path`.
pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<GaugeCatalog, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_catalog(&contents, path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

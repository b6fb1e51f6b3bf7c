/// Pipeline configuration loader - parses storms.toml
///
/// Separates run parameters (window lengths, thresholds, worker count,
/// observation table layout) from code, so a threshold sweep or a different
/// store layout needs no recompile. Every field has the reference default;
/// sections missing from the file fall back to those defaults.

use chrono::Duration;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::model::SensorKind;

/// Default location of the run configuration, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "storms.toml";

/// Longest accepted moving-sum window on either side of a sample (ten years).
pub const MAX_WINDOW_HOURS: i64 = 10 * 366 * 24;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Root of storms.toml
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Path of the gauge catalog (gauges.toml).
    pub gauge_catalog: Option<PathBuf>,
    pub window: WindowConfig,
    pub detection: DetectionConfig,
    pub aggregation: AggregationConfig,
    pub store: StoreConfig,
}

/// Moving-sum window around each rain sample.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Hours after the sample included in its window.
    pub leading_hours: i64,
    /// Hours before the sample included in its window.
    pub trailing_hours: i64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            leading_hours: 10,
            trailing_hours: 24,
        }
    }
}

impl WindowConfig {
    /// Saturates at `Duration::MAX` for hour counts chrono cannot hold;
    /// `validate` rejects those before a run.
    pub fn leading(&self) -> Duration {
        Duration::try_hours(self.leading_hours).unwrap_or(Duration::MAX)
    }

    pub fn trailing(&self) -> Duration {
        Duration::try_hours(self.trailing_hours).unwrap_or(Duration::MAX)
    }
}

/// Storm threshold(s). More than one threshold runs a sweep.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub thresholds: Vec<f64>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            thresholds: vec![2.0],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Worker threads (and store connections) used for per-storm queries.
    pub workers: usize,
    /// Storms between progress reports.
    pub progress_every: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            progress_every: 50,
        }
    }
}

/// Layout of the observation table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub table: String,
    /// `sensor` column value for rainfall readings.
    pub rain_sensor: String,
    /// `sensor` column value for lake elevation readings.
    pub lake_sensor: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table: "hydromet".to_string(),
            rain_sensor: "rain".to_string(),
            lake_sensor: "lake_level".to_string(),
        }
    }
}

impl StoreConfig {
    /// Maps a stored sensor label onto a `SensorKind`.
    pub fn classify(&self, label: &str) -> SensorKind {
        if label == self.rain_sensor {
            SensorKind::Rain
        } else if label == self.lake_sensor {
            SensorKind::LakeLevel
        } else {
            SensorKind::Other(label.to_string())
        }
    }

    /// Stored label for a `SensorKind`.
    pub fn label<'a>(&'a self, kind: &'a SensorKind) -> &'a str {
        match kind {
            SensorKind::Rain => &self.rain_sensor,
            SensorKind::LakeLevel => &self.lake_sensor,
            SensorKind::Other(label) => label,
        }
    }
}

impl PipelineConfig {
    /// Checks cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.leading_hours < 0 || self.window.trailing_hours < 0 {
            return Err(ConfigError::Invalid(format!(
                "window hours must be non-negative (leading={}, trailing={})",
                self.window.leading_hours, self.window.trailing_hours
            )));
        }
        if self.window.leading_hours > MAX_WINDOW_HOURS || self.window.trailing_hours > MAX_WINDOW_HOURS {
            return Err(ConfigError::Invalid(format!(
                "window hours must be at most {} (leading={}, trailing={})",
                MAX_WINDOW_HOURS, self.window.leading_hours, self.window.trailing_hours
            )));
        }
        if self.detection.thresholds.is_empty() {
            return Err(ConfigError::Invalid("at least one threshold is required".into()));
        }
        if let Some(bad) = self
            .detection
            .thresholds
            .iter()
            .find(|t| !t.is_finite() || **t <= 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "thresholds must be positive, got {}",
                bad
            )));
        }
        if self.aggregation.workers == 0 {
            return Err(ConfigError::Invalid("aggregation.workers must be at least 1".into()));
        }
        if self.aggregation.progress_every == 0 {
            return Err(ConfigError::Invalid("aggregation.progress_every must be at least 1".into()));
        }
        // The table name is interpolated into SQL text.
        if !is_sql_identifier(&self.store.table) {
            return Err(ConfigError::Invalid(format!(
                "store.table '{}' is not a plain SQL identifier",
                self.store.table
            )));
        }
        if self.store.rain_sensor == self.store.lake_sensor {
            return Err(ConfigError::Invalid(
                "store.rain_sensor and store.lake_sensor must differ".into(),
            ));
        }
        Ok(())
    }

    /// Gauge catalog path, defaulting to gauges.toml next to the config.
    pub fn gauge_catalog_path(&self) -> PathBuf {
        self.gauge_catalog
            .clone()
            .unwrap_or_else(|| PathBuf::from(crate::gauges::DEFAULT_CATALOG_PATH))
    }
}

/// `schema.table` or `table`, ASCII letters, digits and underscores only.
fn is_sql_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').count() <= 2
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

/// Parses and validates a configuration document.
pub fn parse_config(contents: &str, origin: &Path) -> Result<PipelineConfig, ConfigError> {
    let config: PipelineConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: origin.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Loads storms.toml from `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&contents, path)
}

/// Loads `path` if it exists, otherwise returns the reference defaults.
pub fn load_config_or_default<P: AsRef<Path>>(path: P) -> Result<PipelineConfig, ConfigError> {
    let path = path.as_ref();
    if path.exists() {
        load_config(path)
    } else {
        log::warn!("{} not found, using default pipeline configuration", path.display());
        Ok(PipelineConfig::default())
    }
}

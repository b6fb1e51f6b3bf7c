/// storm_events: storm detection and per-storm aggregation for the
/// Highland Lakes hydromet record.
///
/// # Module structure
///
/// ```text
/// storm_events
/// ├── model       — shared data types (Observation, RainSample, StormInterval, StormTable, …)
/// ├── config      — pipeline run configuration loader (storms.toml)
/// ├── gauges      — rain/lake gauge catalog (gauges.toml)
/// ├── db          — PostgreSQL connection and table validation
/// ├── store
/// │   ├── postgres — range queries over the hydromet table
/// │   └── memory   — in-memory store for CSV-driven runs
/// ├── ingest
/// │   ├── observations — CSV observation exports, no-data markers → absent
/// │   └── fixtures (test only) — representative export payloads
/// ├── analysis
/// │   ├── moving_sum   — sliding time-window rain sums
/// │   ├── storm_events — threshold-crossing storm detection
/// │   ├── aggregation  — per-storm rain/lake tables (sequential + thread pool)
/// │   └── naming       — display names and lake volume conversion
/// ├── export      — CSV storm tables, moving-sum cache, JSON manifest
/// └── pipeline    — batch entry point (threshold sweep)
/// ```

/// Public modules
pub mod analysis;
pub mod config;
pub mod db;
pub mod export;
pub mod gauges;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod store;

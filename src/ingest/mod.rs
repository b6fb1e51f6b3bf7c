/// Ingestion boundary: observation exports in, typed observations out.
///
/// - `observations` — CSV export parsing with no-data marker handling
/// - `fixtures` (test only) — representative export payloads

pub mod observations;

#[cfg(test)]
pub(crate) mod fixtures;

pub use observations::{load_observations, parse_observations, IngestError};

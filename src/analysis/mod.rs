/// Storm analysis for the Highland Lakes rain record.
///
/// Submodules, in pipeline order:
/// - `moving_sum`   — sliding time-window rain totals
/// - `storm_events` — threshold-crossing storm segmentation
/// - `aggregation`  — per-storm rain totals and lake extents
/// - `naming`       — display names and lake elevation→volume conversion

pub mod aggregation;
pub mod moving_sum;
pub mod naming;
pub mod storm_events;

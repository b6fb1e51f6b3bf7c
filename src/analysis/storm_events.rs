/// Storm Event Detection
///
/// Segments an augmented rain series into storms by scanning consecutive
/// row pairs `(i-1, i)` for threshold crossings of the moving sum:
///
/// - **up-crossing**: `sum[i-1] < threshold` and `sum[i] > threshold`;
///   the storm start becomes the time of row `i`.
/// - **down-crossing**: `sum[i-1] > threshold` and `sum[i] < threshold`;
///   a pending storm ends at the time of row `i` and is emitted.
///
/// Both comparisons are strict. A sum sitting exactly on the threshold is
/// neither above nor below it, so it can never open or close a storm, and a
/// rise that passes *through* the exact threshold value (`1.0, 2.0, 3.0`
/// against `2.0`) is not a crossing at all. A storm still pending when the
/// series ends is dropped. Both rules are kept as-is because downstream
/// datasets were built with them; a consumer sensitive to storms at the
/// window edges should revisit them.
///
/// The detector is a two-state machine. A second up-crossing while a storm
/// is pending overwrites the pending start; a down-crossing while idle is
/// ignored. Emitted storms are therefore ordered and non-overlapping.

use chrono::{DateTime, Utc};

use crate::model::{AugmentedRainSeries, StormInterval};

/// Detector state between row pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Idle,
    Pending { start: DateTime<Utc> },
}

/// What a single row pair does to the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crossing {
    Up,
    Down,
    None,
}

/// Classifies the transition from `previous` to `current` moving sum.
pub fn classify_crossing(previous: f64, current: f64, threshold: f64) -> Crossing {
    if current > threshold && previous < threshold {
        Crossing::Up
    } else if current < threshold && previous > threshold {
        Crossing::Down
    } else {
        Crossing::None
    }
}

/// Incremental storm detector; feed it row pairs in time order.
#[derive(Debug, Clone)]
pub struct StormDetector {
    threshold: f64,
    state: DetectorState,
    storms: Vec<StormInterval>,
}

impl StormDetector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            state: DetectorState::Idle,
            storms: Vec::new(),
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    /// Advances the state machine by one row pair. `time` is the timestamp
    /// of the later row.
    pub fn step(&mut self, previous: f64, current: f64, time: DateTime<Utc>) {
        match (classify_crossing(previous, current, self.threshold), self.state) {
            (Crossing::Up, _) => {
                self.state = DetectorState::Pending { start: time };
            }
            (Crossing::Down, DetectorState::Pending { start }) => {
                match StormInterval::new(start, time) {
                    Some(storm) => self.storms.push(storm),
                    None => log::warn!(
                        "discarding zero-length storm at {} (duplicate timestamps in series?)",
                        start
                    ),
                }
                self.state = DetectorState::Idle;
            }
            (Crossing::Down, DetectorState::Idle) | (Crossing::None, _) => {}
        }
    }

    /// Emitted storms. A storm still pending is not included.
    pub fn finish(self) -> Vec<StormInterval> {
        if let DetectorState::Pending { start } = self.state {
            log::debug!("dropping storm opened at {} with no close before series end", start);
        }
        self.storms
    }
}

/// Detects storms in `series` (sorted ascending, as produced by
/// `compute_moving_sum`) using `threshold` on the moving sum.
pub fn detect_storms(series: &AugmentedRainSeries, threshold: f64) -> Vec<StormInterval> {
    let mut detector = StormDetector::new(threshold);
    for pair in series.samples.windows(2) {
        detector.step(pair[0].moving_sum, pair[1].moving_sum, pair[1].time);
    }
    let storms = detector.finish();
    log::info!(
        "threshold {}: {} storms in {} rows",
        threshold,
        storms.len(),
        series.len()
    );
    storms
}

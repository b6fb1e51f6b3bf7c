/// Sliding time-window rainfall sums.
///
/// For every rain sample at time `t` the moving sum is the total rain of all
/// samples with timestamps in `[t - trailing, t + leading]`, both ends
/// inclusive. The window is measured in time, not rows, so irregular
/// sampling is handled without resampling. Windows running past either end
/// of the record include only the samples that exist.
///
/// `compute_moving_sum` finds each window with a two-pointer sweep and sums
/// its rows in time order, O(n·w) for windows of w rows. Running prefix
/// totals are not used: their rounding error moves sums that land exactly
/// on a threshold. `moving_sum_reference` is the O(n²) brute force kept as
/// a correctness baseline; both produce bit-identical sums.

use chrono::Duration;

use crate::model::{AugmentedRainSeries, AugmentedSample, RainSample};

/// Keeps samples with a defined, non-negative rain value and sorts them by
/// time (stable, so equal timestamps keep their input order).
fn clean_and_sort(series: &[RainSample]) -> Vec<(chrono::DateTime<chrono::Utc>, f64)> {
    let mut rows: Vec<_> = series
        .iter()
        .filter_map(|s| match s.rain {
            Some(v) if v >= 0.0 => Some((s.time, v)),
            _ => None,
        })
        .collect();
    rows.sort_by_key(|(time, _)| *time);
    rows
}

/// Sums a window front to back, the same order the brute force uses.
fn window_sum(window: &[(chrono::DateTime<chrono::Utc>, f64)]) -> f64 {
    window.iter().map(|(_, rain)| rain).sum()
}

/// Computes the moving sum for every usable sample of `series`.
///
/// Absent and negative rain values are dropped before the window is
/// applied; they are neither counted as zero nor given a row of their own.
/// Negative window lengths are treated as zero.
pub fn compute_moving_sum(
    series: &[RainSample],
    leading: Duration,
    trailing: Duration,
) -> AugmentedRainSeries {
    let leading = leading.max(Duration::zero());
    let trailing = trailing.max(Duration::zero());
    let rows = clean_and_sort(series);

    let mut samples = Vec::with_capacity(rows.len());
    let mut lo = 0; // first row with time >= t - trailing
    let mut hi = 0; // first row with time > t + leading

    for (i, &(time, rain)) in rows.iter().enumerate() {
        if let Some(window_start) = time.checked_sub_signed(trailing) {
            while rows[lo].0 < window_start {
                lo += 1;
            }
        }
        // hi never falls behind the current row: the window always covers t.
        hi = hi.max(i + 1);
        match time.checked_add_signed(leading) {
            Some(window_end) => {
                while hi < rows.len() && rows[hi].0 <= window_end {
                    hi += 1;
                }
            }
            None => hi = rows.len(),
        }

        samples.push(AugmentedSample {
            time,
            rain,
            moving_sum: window_sum(&rows[lo..hi]),
        });

        if (i + 1) % 100_000 == 0 {
            log::debug!("moving sum: {} of {} rows", i + 1, rows.len());
        }
    }

    AugmentedRainSeries {
        leading,
        trailing,
        samples,
    }
}

/// Brute-force moving sum: rescans the whole series for every row.
///
/// Same filtering and ordering as `compute_moving_sum`; use it to check the
/// fast path on small inputs, never on a full record.
pub fn moving_sum_reference(
    series: &[RainSample],
    leading: Duration,
    trailing: Duration,
) -> AugmentedRainSeries {
    let leading = leading.max(Duration::zero());
    let trailing = trailing.max(Duration::zero());
    let rows = clean_and_sort(series);
    let samples = rows
        .iter()
        .map(|&(time, rain)| {
            let after_start = |other: &chrono::DateTime<chrono::Utc>| {
                time.checked_sub_signed(trailing).is_none_or(|start| *other >= start)
            };
            let before_end = |other: &chrono::DateTime<chrono::Utc>| {
                time.checked_add_signed(leading).is_none_or(|end| *other <= end)
            };
            let moving_sum = rows
                .iter()
                .filter(|(other, _)| after_start(other) && before_end(other))
                .map(|(_, v)| v)
                .sum();
            AugmentedSample {
                time,
                rain,
                moving_sum,
            }
        })
        .collect();

    AugmentedRainSeries {
        leading,
        trailing,
        samples,
    }
}

/// Fixed-slot bucketing of historical samples for the hourly charts
///
/// The lookback horizon is split into `horizon / window` consecutive
/// windows aligned to window boundaries. Each window averages the samples
/// that fall in it, or reports 0 when it has none, so the output always
/// has exactly one entry per window.
use std::collections::{BTreeMap, HashMap};
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::models::{HistoricalPoint, HourlyBucket};
use crate::utils::minute_label;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketSpec {
    pub horizon: Duration,
    pub window: Duration,
}

pub const LAST_HOUR_BY_MINUTE: BucketSpec = BucketSpec {
    horizon: Duration::HOUR,
    window: Duration::MINUTE,
};

pub const LAST_HOUR_BY_FIVE_MINUTES: BucketSpec = BucketSpec {
    horizon: Duration::HOUR,
    window: Duration::minutes(5),
};

impl BucketSpec {
    pub fn slot_count(&self) -> usize {
        let window = self.window_secs();
        (self.horizon.whole_seconds().max(0) / window) as usize
    }

    fn window_secs(&self) -> i64 {
        self.window.whole_seconds().max(1)
    }

    /// Unix second at which the window containing `at` starts
    fn slot_start(&self, at: OffsetDateTime) -> i64 {
        let window = self.window_secs();
        at.unix_timestamp().div_euclid(window) * window
    }
}

/// Bucket one gas series relative to `now`
pub fn bucket_series(
    points: &[HistoricalPoint],
    now: OffsetDateTime,
    spec: BucketSpec,
    offset: UtcOffset,
) -> Vec<HourlyBucket> {
    let horizon_start = now - spec.horizon;
    let mut sums: HashMap<i64, (f64, usize)> = HashMap::new();

    for point in points
        .iter()
        .filter(|p| p.at > horizon_start && p.at <= now)
    {
        let entry = sums.entry(spec.slot_start(point.at)).or_insert((0.0, 0));
        entry.0 += point.ppm;
        entry.1 += 1;
    }

    let count = spec.slot_count();
    let window = spec.window_secs();
    let newest = spec.slot_start(now);

    (0..count)
        .map(|i| {
            let start = newest - (count - 1 - i) as i64 * window;
            let average_ppm = match sums.get(&start) {
                Some((sum, n)) if *n > 0 => sum / *n as f64,
                _ => 0.0,
            };
            let time_label = OffsetDateTime::from_unix_timestamp(start)
                .map(|at| minute_label(&at, offset))
                .unwrap_or_default();
            HourlyBucket {
                time_label,
                average_ppm,
            }
        })
        .collect()
}

/// Bucket every gas series of a historical payload
pub fn bucket_history(
    history: &HashMap<String, Vec<HistoricalPoint>>,
    now: OffsetDateTime,
    spec: BucketSpec,
    offset: UtcOffset,
) -> BTreeMap<String, Vec<HourlyBucket>> {
    history
        .iter()
        .map(|(gas, points)| (gas.clone(), bucket_series(points, now, spec, offset)))
        .collect()
}

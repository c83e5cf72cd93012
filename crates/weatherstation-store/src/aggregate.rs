//! Fixed-width bucket aggregation.
//!
//! Readings are grouped by `floor(epoch_seconds / width)`. Buckets are aligned
//! to the Unix epoch, not to the start of the queried range, so the same
//! reading always lands in the same bucket for a given width.
//!
//! Each bucket folds its readings with a fixed function per field:
//!
//! | field | function | rounding |
//! |---|---|---|
//! | `id` | minimum | - |
//! | `temperature` | mean | 1 decimal |
//! | `humidity` | mean | whole unit |
//! | `wind_speed` | mean | 2 decimals |
//! | `wind_direction` | circular mean | whole degree in `[0, 360)` |
//! | `precipitation` | sum | 2 decimals |
//!
//! Buckets without readings are not emitted.

use std::collections::BTreeMap;

use serde::Serialize;
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::models::{Reading, wall_clock};

/// Smallest accepted bucket width in seconds.
pub const MIN_BUCKET_SECS: u32 = 10;
/// Largest accepted bucket width in seconds (one day).
pub const MAX_BUCKET_SECS: u32 = 86_400;

/// Resultant vector length below which the mean direction is undefined.
const DEGENERATE_RESULTANT: f64 = 1e-9;

/// A validated bucket width in seconds, within
/// [`MIN_BUCKET_SECS`]..=[`MAX_BUCKET_SECS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketWidth(u32);

impl BucketWidth {
    /// Returns `None` when `seconds` is outside the accepted range.
    pub const fn new(seconds: u32) -> Option<Self> {
        if seconds >= MIN_BUCKET_SECS && seconds <= MAX_BUCKET_SECS {
            Some(Self(seconds))
        } else {
            None
        }
    }

    /// Width in seconds.
    pub const fn seconds(self) -> u32 {
        self.0
    }

    /// Bucket index of an instant. Floors toward negative infinity.
    pub fn index_of(self, instant: OffsetDateTime) -> i64 {
        instant.unix_timestamp().div_euclid(i64::from(self.0))
    }

    /// Epoch seconds of the left boundary of bucket `index`.
    pub fn start_of(self, index: i64) -> i64 {
        index * i64::from(self.0)
    }
}

/// One row of a downsampled series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateBucket {
    /// Smallest reading ID folded into this bucket.
    #[serde(rename = "ID")]
    pub id: i64,
    pub temperature: f64,
    pub humidity: i64,
    pub wind_speed: f64,
    pub wind_direction: i64,
    /// Total precipitation over the bucket.
    pub precipitation: f64,
    /// Left-closed boundary of the bucket.
    #[serde(rename = "timestamp", serialize_with = "wall_clock::serialize")]
    pub bucket_start: OffsetDateTime,
}

/// Running sums for one bucket.
struct Accumulator {
    min_id: i64,
    count: u32,
    temperature: f64,
    humidity: f64,
    wind_speed: f64,
    direction_sin: f64,
    direction_cos: f64,
    precipitation: f64,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            min_id: i64::MAX,
            count: 0,
            temperature: 0.0,
            humidity: 0.0,
            wind_speed: 0.0,
            direction_sin: 0.0,
            direction_cos: 0.0,
            precipitation: 0.0,
        }
    }

    fn push(&mut self, reading: &Reading) {
        let radians = (reading.wind_direction as f64).to_radians();

        self.min_id = self.min_id.min(reading.id);
        self.count += 1;
        self.temperature += reading.temperature;
        self.humidity += reading.humidity as f64;
        self.wind_speed += reading.wind_speed;
        self.direction_sin += radians.sin();
        self.direction_cos += radians.cos();
        self.precipitation += reading.precipitation;
    }

    fn finish(self, bucket_start: OffsetDateTime) -> AggregateBucket {
        let n = f64::from(self.count);

        AggregateBucket {
            id: self.min_id,
            temperature: round_to(self.temperature / n, 1),
            humidity: (self.humidity / n).round() as i64,
            wind_speed: round_to(self.wind_speed / n, 2),
            wind_direction: mean_direction(self.direction_sin / n, self.direction_cos / n),
            precipitation: round_to(self.precipitation, 2),
            bucket_start,
        }
    }
}

/// Fold readings into fixed-width buckets, ordered by bucket start.
///
/// Readings are folded in `(timestamp, id)` order whatever order they are
/// passed in, so the floating-point sums and therefore the output are
/// identical across storage scan orders.
///
/// Bucket starts carry the offset of the first reading so they render in
/// the same wall-clock time as the raw readings.
pub fn aggregate(readings: &[Reading], width: BucketWidth) -> Result<Vec<AggregateBucket>> {
    let Some(first) = readings.first() else {
        return Ok(Vec::new());
    };
    let offset = first.timestamp.offset();

    let mut ordered: Vec<&Reading> = readings.iter().collect();
    ordered.sort_by_key(|r| (r.timestamp, r.id));

    let mut buckets: BTreeMap<i64, Accumulator> = BTreeMap::new();
    for reading in ordered {
        buckets
            .entry(width.index_of(reading.timestamp))
            .or_insert_with(Accumulator::new)
            .push(reading);
    }

    buckets
        .into_iter()
        .map(|(index, acc)| {
            let start = width.start_of(index);
            let bucket_start = OffsetDateTime::from_unix_timestamp(start)
                .map_err(|_| Error::InvalidTimestamp(start))?
                .to_offset(offset);
            Ok(acc.finish(bucket_start))
        })
        .collect()
}

/// Circular mean of compass directions in degrees.
///
/// Returns the mean as a whole degree in `[0, 360)`, or `None` for empty
/// input. Opposing directions with no defined mean (e.g. `{0, 180}`)
/// yield `0`.
pub fn circular_mean_degrees<I>(directions: I) -> Option<i64>
where
    I: IntoIterator<Item = f64>,
{
    let (mut sin, mut cos, mut n) = (0.0_f64, 0.0_f64, 0_u32);
    for degrees in directions {
        let radians = degrees.to_radians();
        sin += radians.sin();
        cos += radians.cos();
        n += 1;
    }

    if n == 0 {
        return None;
    }
    let n = f64::from(n);
    Some(mean_direction(sin / n, cos / n))
}

fn mean_direction(mean_sin: f64, mean_cos: f64) -> i64 {
    if mean_sin.hypot(mean_cos) < DEGENERATE_RESULTANT {
        return 0;
    }

    let mut degrees = mean_sin.atan2(mean_cos).to_degrees();
    if degrees < 0.0 {
        degrees += 360.0;
    }
    // 359.6 rounds up to 360, which is north again
    (degrees.round() as i64).rem_euclid(360)
}

/// Round half away from zero to `decimals` places.
fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use time::macros::{datetime, offset};

    fn reading(id: i64, timestamp: OffsetDateTime, wind_direction: i64) -> Reading {
        Reading {
            id,
            temperature: 20.0,
            humidity: 50,
            wind_speed: 1.0,
            wind_direction,
            precipitation: 0.0,
            timestamp,
        }
    }

    fn width(seconds: u32) -> BucketWidth {
        BucketWidth::new(seconds).unwrap()
    }

    // ==================== BucketWidth ====================

    #[test]
    fn test_bucket_width_bounds() {
        assert!(BucketWidth::new(0).is_none());
        assert!(BucketWidth::new(9).is_none());
        assert_eq!(BucketWidth::new(10).map(BucketWidth::seconds), Some(10));
        assert_eq!(BucketWidth::new(86_400).map(BucketWidth::seconds), Some(86_400));
        assert!(BucketWidth::new(86_401).is_none());
    }

    #[test]
    fn test_bucket_index_floors_before_epoch() {
        let w = width(60);
        assert_eq!(w.index_of(datetime!(1970-01-01 00:00:59 UTC)), 0);
        assert_eq!(w.index_of(datetime!(1970-01-01 00:01:00 UTC)), 1);
        assert_eq!(w.index_of(datetime!(1969-12-31 23:59:30 UTC)), -1);
        assert_eq!(w.start_of(-1), -60);
    }

    // ==================== Circular mean ====================

    #[test]
    fn test_circular_mean_wraps_through_north() {
        assert_eq!(circular_mean_degrees([350.0, 10.0]), Some(0));
        assert_eq!(circular_mean_degrees([340.0, 10.0]), Some(355));
    }

    #[test]
    fn test_circular_mean_simple_cases() {
        assert_eq!(circular_mean_degrees([90.0]), Some(90));
        assert_eq!(circular_mean_degrees([10.0, 20.0, 30.0]), Some(20));
        assert_eq!(circular_mean_degrees([90.0, 180.0]), Some(135));
        assert_eq!(circular_mean_degrees([270.0, 0.0]), Some(315));
    }

    #[test]
    fn test_circular_mean_opposite_directions_is_zero() {
        assert_eq!(circular_mean_degrees([0.0, 180.0]), Some(0));
        assert_eq!(circular_mean_degrees([90.0, 270.0]), Some(0));
        assert_eq!(circular_mean_degrees([0.0, 120.0, 240.0]), Some(0));
    }

    #[test]
    fn test_circular_mean_empty() {
        assert_eq!(circular_mean_degrees(std::iter::empty()), None);
    }

    #[test]
    fn test_circular_mean_never_returns_360() {
        assert_eq!(circular_mean_degrees([359.7]), Some(0));
        assert_eq!(circular_mean_degrees([359.4]), Some(359));
    }

    // ==================== aggregate ====================

    #[test]
    fn test_aggregate_empty_input() {
        assert!(aggregate(&[], width(60)).unwrap().is_empty());
    }

    #[test]
    fn test_aggregate_minute_bucket_across_north() {
        let mut first = reading(1, datetime!(2024-05-01 10:00:00 UTC), 350);
        first.precipitation = 0.5;
        let mut second = reading(2, datetime!(2024-05-01 10:00:30 UTC), 10);
        second.precipitation = 0.25;

        let buckets = aggregate(&[first, second], width(60)).unwrap();

        assert_eq!(buckets.len(), 1);
        let bucket = &buckets[0];
        assert_eq!(bucket.bucket_start, datetime!(2024-05-01 10:00:00 UTC));
        assert_eq!(bucket.wind_direction, 0);
        assert_eq!(bucket.precipitation, 0.75);
        assert_eq!(bucket.id, 1);
    }

    #[test]
    fn test_aggregate_field_functions_and_rounding() {
        let t = datetime!(2024-05-01 10:00:00 UTC);
        let mut a = reading(4, t, 90);
        let mut b = reading(5, t + time::Duration::seconds(1), 90);
        let mut c = reading(6, t + time::Duration::seconds(2), 90);
        a.temperature = 20.0;
        b.temperature = 21.0;
        c.temperature = 21.0;
        a.humidity = 50;
        b.humidity = 51;
        c.humidity = 51;
        a.wind_speed = 1.0;
        b.wind_speed = 2.0;
        c.wind_speed = 2.0;
        a.precipitation = 0.1;
        b.precipitation = 0.2;
        c.precipitation = 0.0;

        let buckets = aggregate(&[a, b, c], width(60)).unwrap();
        let bucket = &buckets[0];

        assert_eq!(bucket.temperature, 20.7);
        assert_eq!(bucket.humidity, 51);
        assert_eq!(bucket.wind_speed, 1.67);
        assert_eq!(bucket.wind_direction, 90);
        assert_eq!(bucket.precipitation, 0.3);
    }

    #[test]
    fn test_aggregate_humidity_half_rounds_up() {
        let t = datetime!(2024-05-01 10:00:00 UTC);
        let mut a = reading(1, t, 0);
        let mut b = reading(2, t, 0);
        a.humidity = 50;
        b.humidity = 51;

        let buckets = aggregate(&[a, b], width(10)).unwrap();
        assert_eq!(buckets[0].humidity, 51);
    }

    #[test]
    fn test_aggregate_omits_empty_buckets() {
        let readings = [
            reading(1, datetime!(2024-05-01 10:00:10 UTC), 0),
            reading(2, datetime!(2024-05-01 10:05:10 UTC), 0),
        ];

        let buckets = aggregate(&readings, width(60)).unwrap();

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].bucket_start, datetime!(2024-05-01 10:00:00 UTC));
        assert_eq!(buckets[1].bucket_start, datetime!(2024-05-01 10:05:00 UTC));
    }

    #[test]
    fn test_aggregate_orders_buckets_and_uses_min_id() {
        // Arrival order differs from time order
        let readings = [
            reading(9, datetime!(2024-05-01 11:30:00 UTC), 0),
            reading(3, datetime!(2024-05-01 10:59:59 UTC), 0),
            reading(7, datetime!(2024-05-01 10:00:00 UTC), 0),
        ];

        let buckets = aggregate(&readings, width(3600)).unwrap();

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].bucket_start, datetime!(2024-05-01 10:00:00 UTC));
        assert_eq!(buckets[0].id, 3);
        assert_eq!(buckets[1].bucket_start, datetime!(2024-05-01 11:00:00 UTC));
        assert_eq!(buckets[1].id, 9);
    }

    #[test]
    fn test_aggregate_aligns_to_epoch_and_keeps_offset() {
        // Daily buckets start at UTC midnight, rendered in the readings' offset
        let ts = datetime!(2024-05-01 10:00:00 UTC).to_offset(offset!(+2));
        let buckets = aggregate(&[reading(1, ts, 0)], width(86_400)).unwrap();

        let start = buckets[0].bucket_start;
        assert_eq!(start, datetime!(2024-05-01 00:00:00 UTC));
        assert_eq!(start.offset(), offset!(+2));
        assert_eq!(wall_clock::format(&start).unwrap(), "2024-05-01T02:00:00");
    }

    #[test]
    fn test_aggregate_bucket_serialization() {
        let buckets = aggregate(
            &[reading(12, datetime!(2024-05-01 10:00:42 UTC), 45)],
            width(60),
        )
        .unwrap();

        let json = serde_json::to_value(&buckets[0]).unwrap();
        assert_eq!(json["ID"], 12);
        assert_eq!(json["timestamp"], "2024-05-01T10:00:00");
        assert_eq!(json["wind_direction"], 45);
        assert!(json.get("bucket_start").is_none());
    }

    // ==================== Properties ====================

    fn arb_readings() -> impl Strategy<Value = Vec<Reading>> {
        prop::collection::vec(
            (0_i64..200_000, 0_i64..360, -30.0_f64..45.0, 0.0_f64..5.0),
            1..60,
        )
        .prop_map(|rows| {
            rows.into_iter()
                .enumerate()
                .map(|(i, (secs, dir, temp, rain))| Reading {
                    id: i as i64 + 1,
                    temperature: temp,
                    humidity: 60,
                    wind_speed: 2.5,
                    wind_direction: dir,
                    precipitation: rain,
                    timestamp: OffsetDateTime::from_unix_timestamp(1_700_000_000 + secs).unwrap(),
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_aggregate_independent_of_input_order(
            readings in arb_readings(),
            seconds in prop::sample::select(vec![10_u32, 60, 300, 3600, 86_400]),
        ) {
            let w = width(seconds);
            let forward = aggregate(&readings, w).unwrap();

            let mut reversed = readings.clone();
            reversed.reverse();
            prop_assert_eq!(&forward, &aggregate(&reversed, w).unwrap());

            // Re-running is idempotent
            prop_assert_eq!(&forward, &aggregate(&readings, w).unwrap());
        }

        #[test]
        fn prop_each_reading_in_exactly_one_bucket(
            readings in arb_readings(),
            seconds in prop::sample::select(vec![10_u32, 60, 300, 3600]),
        ) {
            let w = width(seconds);
            let buckets = aggregate(&readings, w).unwrap();

            let mut indexes: Vec<i64> = readings.iter().map(|r| w.index_of(r.timestamp)).collect();
            indexes.sort_unstable();
            indexes.dedup();
            prop_assert_eq!(buckets.len(), indexes.len());

            for pair in buckets.windows(2) {
                prop_assert!(pair[0].bucket_start < pair[1].bucket_start);
            }
            for r in &readings {
                let owners = buckets
                    .iter()
                    .filter(|b| {
                        let start = b.bucket_start.unix_timestamp();
                        let ts = r.timestamp.unix_timestamp();
                        start <= ts && ts < start + i64::from(seconds)
                    })
                    .count();
                prop_assert_eq!(owners, 1);
            }
            for b in &buckets {
                prop_assert!((0..360).contains(&b.wind_direction));
            }
        }
    }
}

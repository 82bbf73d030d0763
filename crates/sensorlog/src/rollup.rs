//! Rollup rules deriving Month and Year records from finer tiers.
//!
//! Aggregates are always recomputed from the complete finer partition, so a
//! rollup can be repeated after a failure without double counting.
//!
//! - Gauge: the Month slot keeps `(sum, count)` of the day's present samples;
//!   the Year slot keeps `sum / count` over every Month slot of the month.
//! - Counter: Day samples are per-interval increments. Month and Year slots
//!   keep their sum, saturating at the double-width accumulator maximum.

use crate::codec::{MetricKind, Payload, Record, SampleWidth};
use tracing::warn;

/// Computes the Month record of a day from its Day records.
pub fn month_record(kind: MetricKind, width: SampleWidth, day: &[Record]) -> Record {
    match kind {
        MetricKind::Gauge => {
            let (sum, count) = day
                .iter()
                .filter_map(Record::value)
                .fold((0u64, 0u64), |(sum, count), v| (sum + u64::from(v), count + 1));
            let payload = Payload::SumCount {
                sum: u32::try_from(sum).unwrap_or(u32::MAX),
                count: u16::try_from(count).unwrap_or(u16::MAX),
            };
            Record {
                present: count > 0,
                payload,
            }
        }
        MetricKind::Counter => accumulate(width, day),
    }
}

/// Computes the Year record of a month from its Month records.
pub fn year_record(kind: MetricKind, width: SampleWidth, month: &[Record]) -> Record {
    match kind {
        MetricKind::Gauge => {
            let (sum, count) = month
                .iter()
                .filter(|record| record.present)
                .fold((0u64, 0u64), |(sum, count), record| match record.payload {
                    Payload::SumCount { sum: s, count: c } => {
                        (sum + u64::from(s), count + u64::from(c))
                    }
                    _ => (sum, count),
                });
            if count == 0 {
                return Record {
                    present: false,
                    payload: Payload::Raw(0),
                };
            }
            // The average of raw samples never exceeds the raw maximum.
            let average = (sum / count).min(u64::from(width.max_value()));
            Record::present(Payload::Raw(average as u16))
        }
        MetricKind::Counter => accumulate(width, month),
    }
}

/// Sums the present values of `records` into a saturating accumulator.
fn accumulate(width: SampleWidth, records: &[Record]) -> Record {
    let mut present = false;
    let mut total = 0u64;
    for value in records.iter().filter_map(Record::value) {
        present = true;
        total += u64::from(value);
    }

    let max = width.accumulator_max();
    let total = if total > u64::from(max) {
        warn!("Counter accumulator saturated at {} (sum {})", max, total);
        max
    } else {
        total as u32
    };

    Record {
        present,
        payload: Payload::Accumulator(total),
    }
}

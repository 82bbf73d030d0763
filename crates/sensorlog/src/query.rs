//! Range queries over a single tier.
//!
//! A query walks the buckets of a tier between two times, reading each
//! bucket from the partition file of its own period. Buckets with no file,
//! or past the end of their file, come back absent.

use crate::codec::Tier;
use crate::error::{Result, StoreError};
use crate::header::Header;
use crate::partition::{PartitionFile, PartitionLayout};
use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime};
use std::path::PathBuf;

/// One bucket of a query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// Start of the bucket.
    pub timestamp: NaiveDateTime,
    /// Decoded value, `None` when the slot holds no data.
    pub value: Option<u32>,
}

impl Sample {
    /// Returns true if the bucket holds a reading.
    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }
}

/// Start of the `tier` bucket containing `time`.
fn bucket_start(header: &Header, tier: Tier, time: NaiveDateTime) -> Option<NaiveDateTime> {
    let date = time.date();
    match tier {
        Tier::Day => {
            let slot = PartitionLayout::slot(Tier::Day, header.interval, time) as i64;
            let minutes = Duration::minutes(slot * i64::from(header.interval.minutes()));
            date.and_time(NaiveTime::MIN).checked_add_signed(minutes)
        }
        Tier::Month => Some(date.and_time(NaiveTime::MIN)),
        Tier::Year => date.with_day(1).map(|first| first.and_time(NaiveTime::MIN)),
    }
}

/// Start of the bucket following `start`.
fn next_bucket(header: &Header, tier: Tier, start: NaiveDateTime) -> Option<NaiveDateTime> {
    match tier {
        Tier::Day => {
            start.checked_add_signed(Duration::minutes(i64::from(header.interval.minutes())))
        }
        Tier::Month => start.date().succ_opt().map(|d| d.and_time(NaiveTime::MIN)),
        Tier::Year => start.checked_add_months(Months::new(1)),
    }
}

fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

/// Number of buckets of `tier` between `from` and `to`, both inclusive.
///
/// # Errors
///
/// Returns `InvalidRange` if `from` is after `to`.
pub fn sample_count(
    header: &Header,
    tier: Tier,
    from: NaiveDateTime,
    to: NaiveDateTime,
) -> Result<usize> {
    if from > to {
        return Err(StoreError::InvalidRange);
    }
    let first = bucket_start(header, tier, from).ok_or(StoreError::InvalidRange)?;
    let last = bucket_start(header, tier, to).ok_or(StoreError::InvalidRange)?;

    let count = match tier {
        Tier::Day => (last - first).num_minutes() / i64::from(header.interval.minutes()),
        Tier::Month => (last.date() - first.date()).num_days(),
        Tier::Year => month_index(last.date()) - month_index(first.date()),
    };
    Ok(count as usize + 1)
}

/// Reads the buckets of `tier` between `from` and `to` in chronological order.
///
/// # Errors
///
/// Returns `LimitExceeded` if the range covers more than `limit` buckets and
/// `NoMemory` if the result buffer cannot be reserved.
pub fn read(
    layout: &PartitionLayout,
    header: &Header,
    tier: Tier,
    from: NaiveDateTime,
    to: NaiveDateTime,
    limit: usize,
) -> Result<Vec<Sample>> {
    let count = sample_count(header, tier, from, to)?;
    if count > limit {
        return Err(StoreError::LimitExceeded {
            requested: count,
            limit,
        });
    }

    let mut samples = Vec::new();
    samples
        .try_reserve_exact(count)
        .map_err(|_| StoreError::NoMemory(count))?;

    let format = header.format(tier);
    let mut open: Option<(PathBuf, Option<PartitionFile>)> = None;
    let mut timestamp = bucket_start(header, tier, from).ok_or(StoreError::InvalidRange)?;

    for _ in 0..count {
        let date = timestamp.date();
        let path = layout.path(tier, date);
        if open.as_ref().map_or(true, |(current, _)| *current != path) {
            let capacity = PartitionLayout::capacity(tier, header.interval, date);
            let partition = PartitionFile::open_existing(&path, format, capacity)?;
            open = Some((path, partition));
        }

        let slot = PartitionLayout::slot(tier, header.interval, timestamp);
        let value = match open.as_mut().and_then(|(_, partition)| partition.as_mut()) {
            Some(partition) => {
                if slot < partition.current_slot()? {
                    partition.read_slot(slot)?.value()
                } else {
                    None
                }
            }
            None => None,
        };
        samples.push(Sample { timestamp, value });

        match next_bucket(header, tier, timestamp) {
            Some(next) => timestamp = next,
            None => break,
        }
    }

    Ok(samples)
}

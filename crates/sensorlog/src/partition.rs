//! Partition files and the on-disk layout of a store.
//!
//! A partition file is a flat array of fixed-stride records. The slot of a
//! record is its byte offset divided by the stride, so the file carries no
//! index and no per-file header.

use crate::codec::{Record, RecordFormat, SampleInterval, Tier, MAX_RECORD_SIZE};
use crate::config::SyncMode;
use crate::error::{Result, StoreError};
use crate::resume::expected_slot;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Name of the header file inside the base directory.
pub const META_FILENAME: &str = "meta";

/// Number of slots in the Year tier.
pub const MONTHS_PER_YEAR: usize = 12;

/// Provides filesystem paths and slot arithmetic for every tier of a store.
///
/// ```text
/// <base>/meta          header
/// <base>/2024.03.17    Day tier, one slot per sampling interval
/// <base>/2024.03       Month tier, one slot per day
/// <base>/2024          Year tier, one slot per month
/// ```
#[derive(Debug, Clone)]
pub struct PartitionLayout {
    base_dir: PathBuf,
}

impl PartitionLayout {
    /// Creates a layout rooted at `base_dir`.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// Returns the base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Returns the header path.
    pub fn meta_path(&self) -> PathBuf {
        self.base_dir.join(META_FILENAME)
    }

    /// Returns the partition file holding `tier` records for the period of `date`.
    pub fn path(&self, tier: Tier, date: NaiveDate) -> PathBuf {
        self.base_dir.join(Self::file_name(tier, date))
    }

    /// Builds the file name of a partition.
    pub fn file_name(tier: Tier, date: NaiveDate) -> String {
        match tier {
            Tier::Day => format!("{:04}.{:02}.{:02}", date.year(), date.month(), date.day()),
            Tier::Month => format!("{:04}.{:02}", date.year(), date.month()),
            Tier::Year => format!("{:04}", date.year()),
        }
    }

    /// Number of slots of `tier` in the period containing `date`.
    pub fn capacity(tier: Tier, interval: SampleInterval, date: NaiveDate) -> usize {
        match tier {
            Tier::Day => interval.slots_per_day(),
            Tier::Month => days_in_month(date),
            Tier::Year => MONTHS_PER_YEAR,
        }
    }

    /// Slot of `tier` that covers `time`.
    pub fn slot(tier: Tier, interval: SampleInterval, time: NaiveDateTime) -> usize {
        match tier {
            Tier::Day => expected_slot(interval, time),
            Tier::Month => time.day0() as usize,
            Tier::Year => time.month0() as usize,
        }
    }
}

/// Number of days in the month containing `date`.
pub fn days_in_month(date: NaiveDate) -> usize {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(31, |last| last.day() as usize)
}

/// A fixed-capacity file of fixed-stride records for one tier and period.
///
/// The cursor is the slot the next [`append_record`](Self::append_record)
/// writes to. It starts at the number of complete records in the file.
#[derive(Debug)]
pub struct PartitionFile {
    file: File,
    path: PathBuf,
    format: RecordFormat,
    capacity: usize,
    cursor: usize,
    sync_mode: SyncMode,
}

impl PartitionFile {
    /// Opens or creates a writable partition file.
    ///
    /// A partial trailing record left by an interrupted write is truncated
    /// away before the cursor is computed.
    pub fn open(
        path: impl AsRef<Path>,
        format: RecordFormat,
        capacity: usize,
        sync_mode: SyncMode,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let mut partition = Self {
            file,
            path,
            format,
            capacity,
            cursor: 0,
            sync_mode,
        };
        partition.truncate_to_last_complete_record()?;
        partition.cursor = partition.current_slot()?;
        Ok(partition)
    }

    /// Opens an existing partition file read-only.
    ///
    /// Returns `Ok(None)` if the file does not exist.
    pub fn open_existing(
        path: impl AsRef<Path>,
        format: RecordFormat,
        capacity: usize,
    ) -> Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut partition = Self {
            file,
            path,
            format,
            capacity,
            cursor: 0,
            sync_mode: SyncMode::None,
        };
        partition.cursor = partition.current_slot()?;
        Ok(Some(partition))
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the slot the next append writes to.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of complete records currently in the file.
    pub fn current_slot(&self) -> Result<usize> {
        let len = self.file.metadata()?.len();
        Ok((len / self.format.stride() as u64) as usize)
    }

    /// Shrinks the file to the largest multiple of the record stride.
    ///
    /// Returns the number of bytes removed.
    pub fn truncate_to_last_complete_record(&mut self) -> Result<u64> {
        let len = self.file.metadata()?.len();
        let stride = self.format.stride() as u64;
        let rounded = (len / stride) * stride;
        if rounded == len {
            return Ok(0);
        }

        warn!(
            "Truncating partial record in {}: {} -> {} bytes",
            self.path.display(),
            len,
            rounded
        );
        self.file.set_len(rounded)?;
        self.sync_mode.sync(&self.file)?;
        self.cursor = self.cursor.min((rounded / stride) as usize);
        Ok(len - rounded)
    }

    /// Moves the cursor to `slot` without writing.
    ///
    /// The slot must be within the records already in the file.
    pub fn set_cursor(&mut self, slot: usize) -> Result<()> {
        let end = self.current_slot()?;
        if slot > end || slot > self.capacity {
            return Err(StoreError::OutOfRange {
                slot,
                capacity: end.min(self.capacity),
            });
        }
        self.cursor = slot;
        Ok(())
    }

    /// Reads and decodes the record at `slot`.
    pub fn read_slot(&mut self, slot: usize) -> Result<Record> {
        let end = self.current_slot()?;
        if slot >= self.capacity || slot >= end {
            return Err(StoreError::OutOfRange {
                slot,
                capacity: end.min(self.capacity),
            });
        }

        let stride = self.format.stride();
        let mut buf = [0u8; MAX_RECORD_SIZE];
        self.file.seek(SeekFrom::Start((slot * stride) as u64))?;
        self.file.read_exact(&mut buf[..stride])?;
        self.format.decode(&buf[..stride])
    }

    /// Reads the records of slots `[0, end)` in slot order.
    ///
    /// Stops early at the last complete record of the file. Records at or
    /// after `end` are left unread even when present on disk.
    pub fn read_until(&mut self, end: usize) -> Result<Vec<Record>> {
        let count = end.min(self.current_slot()?).min(self.capacity);
        let stride = self.format.stride();

        let mut bytes = vec![0u8; count * stride];
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_exact(&mut bytes)?;

        bytes
            .chunks_exact(stride)
            .map(|chunk| self.format.decode(chunk))
            .collect()
    }

    /// Writes `record` at the cursor and advances it.
    pub fn append_record(&mut self, record: &Record) -> Result<()> {
        if self.cursor >= self.capacity {
            return Err(StoreError::OutOfRange {
                slot: self.cursor,
                capacity: self.capacity,
            });
        }

        let encoded = self.format.encode(record)?;
        let offset = (self.cursor * self.format.stride()) as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(encoded.as_bytes())?;
        self.sync_mode.sync(&self.file)?;
        self.cursor += 1;
        Ok(())
    }

    /// Appends absent records from the cursor up to, not including, `until`.
    ///
    /// Returns the number of records written.
    pub fn fill_absent(&mut self, until: usize) -> Result<usize> {
        if until > self.capacity {
            return Err(StoreError::OutOfRange {
                slot: until,
                capacity: self.capacity,
            });
        }
        if until <= self.cursor {
            return Ok(0);
        }

        let count = until - self.cursor;
        let encoded = self.format.encode(&self.format.absent())?;
        let mut bytes = Vec::with_capacity(count * encoded.as_bytes().len());
        for _ in 0..count {
            bytes.extend_from_slice(encoded.as_bytes());
        }

        let offset = (self.cursor * self.format.stride()) as u64;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&bytes)?;
        self.sync_mode.sync(&self.file)?;
        self.cursor = until;
        Ok(count)
    }

    /// Points the cursor at `slot`, padding the file with absent records if
    /// `slot` lies past its end.
    ///
    /// Existing records are never overwritten by padding. Returns the number
    /// of absent records written.
    pub fn position_at(&mut self, slot: usize) -> Result<usize> {
        if slot >= self.capacity {
            return Err(StoreError::OutOfRange {
                slot,
                capacity: self.capacity,
            });
        }

        let end = self.current_slot()?;
        if slot <= end {
            self.cursor = slot;
            return Ok(0);
        }
        self.cursor = end;
        self.fill_absent(slot)
    }

    /// Writes `record` at `slot`, overwriting or padding as needed.
    pub fn write_slot(&mut self, slot: usize, record: &Record) -> Result<()> {
        self.position_at(slot)?;
        self.append_record(record)
    }

    /// Flushes file contents and metadata to disk.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{MetricKind, Payload, SampleWidth};
    use std::fs;
    use tempfile::TempDir;

    fn day_format() -> RecordFormat {
        RecordFormat::new(MetricKind::Gauge, Tier::Day, SampleWidth::Bits16)
    }

    fn open_day(dir: &TempDir) -> PartitionFile {
        PartitionFile::open(dir.path().join("day"), day_format(), 8, SyncMode::None).unwrap()
    }

    #[test]
    fn test_layout_file_names() {
        let layout = PartitionLayout::new("/data/temp");
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();

        assert_eq!(layout.meta_path(), PathBuf::from("/data/temp/meta"));
        assert_eq!(
            layout.path(Tier::Day, date),
            PathBuf::from("/data/temp/2024.03.07")
        );
        assert_eq!(
            layout.path(Tier::Month, date),
            PathBuf::from("/data/temp/2024.03")
        );
        assert_eq!(layout.path(Tier::Year, date), PathBuf::from("/data/temp/2024"));
    }

    #[test]
    fn test_days_in_month() {
        let day = |y, m| NaiveDate::from_ymd_opt(y, m, 1).unwrap();
        assert_eq!(days_in_month(day(2024, 2)), 29);
        assert_eq!(days_in_month(day(2023, 2)), 28);
        assert_eq!(days_in_month(day(2023, 4)), 30);
        assert_eq!(days_in_month(day(2023, 12)), 31);
    }

    #[test]
    fn test_layout_slots() {
        let time = NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(13, 47, 0)
            .unwrap();
        let interval = SampleInterval::TenMinutes;

        assert_eq!(PartitionLayout::slot(Tier::Day, interval, time), 82);
        assert_eq!(PartitionLayout::slot(Tier::Month, interval, time), 6);
        assert_eq!(PartitionLayout::slot(Tier::Year, interval, time), 2);
        assert_eq!(
            PartitionLayout::capacity(Tier::Month, interval, time.date()),
            31
        );
    }

    #[test]
    fn test_append_and_read_slot() {
        let temp_dir = TempDir::new().unwrap();
        let mut day = open_day(&temp_dir);

        day.append_record(&day_format().absent()).unwrap();
        day.append_record(&Record::present(Payload::Raw(500))).unwrap();

        assert_eq!(day.cursor(), 2);
        assert_eq!(day.current_slot().unwrap(), 2);
        assert_eq!(day.read_slot(1).unwrap().value(), Some(500));
        assert_eq!(day.read_slot(0).unwrap().value(), None);
        assert!(matches!(
            day.read_slot(2),
            Err(StoreError::OutOfRange { slot: 2, .. })
        ));
    }

    #[test]
    fn test_truncate_partial_record_on_open() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("day");
        // Two complete 3-byte records plus a torn third one.
        fs::write(&path, [1, 10, 0, 0, 0, 0, 1, 7]).unwrap();

        let mut day = PartitionFile::open(&path, day_format(), 8, SyncMode::None).unwrap();

        assert_eq!(fs::metadata(&path).unwrap().len(), 6);
        assert_eq!(day.cursor(), 2);
        assert_eq!(day.read_slot(0).unwrap().value(), Some(10));
    }

    #[test]
    fn test_capacity_is_enforced() {
        let temp_dir = TempDir::new().unwrap();
        let mut day = open_day(&temp_dir);

        day.fill_absent(8).unwrap();
        let err = day
            .append_record(&Record::present(Payload::Raw(1)))
            .unwrap_err();
        assert!(matches!(err, StoreError::OutOfRange { slot: 8, capacity: 8 }));
    }

    #[test]
    fn test_write_slot_pads_and_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let mut day = open_day(&temp_dir);

        day.write_slot(3, &Record::present(Payload::Raw(3))).unwrap();
        assert_eq!(day.current_slot().unwrap(), 4);
        assert_eq!(day.cursor(), 4);

        day.write_slot(1, &Record::present(Payload::Raw(1))).unwrap();
        assert_eq!(day.current_slot().unwrap(), 4);

        let values: Vec<_> = day.read_until(8).unwrap().iter().map(Record::value).collect();
        assert_eq!(values, vec![None, Some(1), None, Some(3)]);
    }

    #[test]
    fn test_read_until_ignores_records_past_end() {
        let temp_dir = TempDir::new().unwrap();
        let mut day = open_day(&temp_dir);

        day.write_slot(1, &Record::present(Payload::Raw(1))).unwrap();
        day.write_slot(5, &Record::present(Payload::Raw(5))).unwrap();
        day.position_at(2).unwrap();

        let values: Vec<_> = day.read_until(2).unwrap().iter().map(Record::value).collect();
        assert_eq!(values, vec![None, Some(1)]);
        assert!(day.read_until(0).unwrap().is_empty());
        assert_eq!(day.read_until(100).unwrap().len(), 6);
    }

    #[test]
    fn test_open_existing_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let opened =
            PartitionFile::open_existing(temp_dir.path().join("nope"), day_format(), 8).unwrap();
        assert!(opened.is_none());
    }
}

//! The public store handle tying header, partitions, resume and rollup together.

use crate::codec::{Payload, Record, Tier};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::header::{Header, FORMAT_VERSION};
use crate::partition::{PartitionFile, PartitionLayout};
use crate::query::{self, Sample};
use crate::resume::{self, ResumeOutcome};
use crate::rollup;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Wraps an aggregate failure that happened after the Day write.
fn partial(tier: Tier) -> impl FnOnce(StoreError) -> StoreError {
    move |source| StoreError::Rollup {
        tier,
        source: Box::new(source),
    }
}

/// Lifecycle state reported by [`Store::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenState {
    /// A header was found and the Day partition was resumed.
    Ready,
    /// No header exists; [`Store::setup`] must be called first.
    Empty,
}

/// Open partition files for the period containing one calendar day.
#[derive(Debug)]
struct OpenTiers {
    date: NaiveDate,
    day: PartitionFile,
    month: PartitionFile,
    year: PartitionFile,
}

/// A single-metric sensor log rooted at one base directory.
///
/// The store owns one file handle per tier and releases them when dropped or
/// [closed](Self::close). It takes no locks: the base directory must have a
/// single owner, and access from another thread or process is undefined.
#[derive(Debug)]
pub struct Store {
    layout: PartitionLayout,
    config: StoreConfig,
    header: Option<Header>,
    tiers: Option<OpenTiers>,
}

impl Store {
    /// Opens the store in `base_dir` with the default configuration.
    ///
    /// See [`create_with_config`](Self::create_with_config).
    pub fn create(now: NaiveDateTime, base_dir: impl AsRef<Path>) -> Result<(Self, OpenState)> {
        Self::create_with_config(now, base_dir, StoreConfig::default())
    }

    /// Opens the store in `base_dir`.
    ///
    /// If the directory holds a header, the Day partition of `now` is resumed
    /// and [`OpenState::Ready`] is returned. Otherwise the store is returned in
    /// [`OpenState::Empty`] and only [`setup`](Self::setup) is allowed.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedVersion` if the header was written by another format
    /// version, or an I/O error if the directory or partitions cannot be opened.
    pub fn create_with_config(
        now: NaiveDateTime,
        base_dir: impl AsRef<Path>,
        config: StoreConfig,
    ) -> Result<(Self, OpenState)> {
        let layout = PartitionLayout::new(base_dir);
        fs::create_dir_all(layout.base_dir())?;

        let header = Header::load(&layout.meta_path())?;
        let mut store = Self {
            layout,
            config,
            header,
            tiers: None,
        };

        if store.header.is_none() {
            debug!("No header in {}", store.layout.base_dir().display());
            return Ok((store, OpenState::Empty));
        }

        store.open_tiers(now)?;
        Ok((store, OpenState::Ready))
    }

    /// Initializes an empty store with `header` and resumes the Day partition.
    ///
    /// # Errors
    ///
    /// Returns `NonEmpty` if the store already has a header.
    pub fn setup(&mut self, now: NaiveDateTime, header: Header) -> Result<()> {
        if self.header.is_some() || Header::load(&self.layout.meta_path())?.is_some() {
            return Err(StoreError::NonEmpty);
        }
        if header.version != FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion(header.version));
        }

        header.save(&self.layout.meta_path())?;
        self.header = Some(header);
        info!(
            "Initialized sensor log in {}: {:?}",
            self.layout.base_dir().display(),
            header
        );

        self.open_tiers(now)
    }

    /// Appends a reading for the sampling interval containing `now`.
    ///
    /// The Day record is written first, then the Month and Year aggregates of
    /// `now` are recomputed.
    ///
    /// # Errors
    ///
    /// Returns `Empty` before setup, `ValueOutOfRange` if `value` does not fit
    /// the sample width, and `Rollup` if the Day record is durable but an
    /// aggregate could not be written.
    pub fn append(&mut self, value: u32, now: NaiveDateTime) -> Result<()> {
        let header = self.header.ok_or(StoreError::Empty)?;
        let max = header.width.max_value();
        if value > max {
            return Err(StoreError::ValueOutOfRange { value, max });
        }

        let tiers = self.tiers_for(now)?;
        let slot = PartitionLayout::slot(Tier::Day, header.interval, now);
        if let ResumeOutcome::Repositioned { from, to } = resume::advance(&mut tiers.day, slot)? {
            debug!("Overwriting day slot {} (cursor was {})", to, from);
        }
        // `value` fits the sample width, which is at most 16 bits.
        tiers
            .day
            .append_record(&Record::present(Payload::Raw(value as u16)))?;

        Self::rollup_tiers(&header, tiers, now)
    }

    /// Recomputes the Month and Year records for `now` from the Day partition.
    ///
    /// This is the retry path after [`append`](Self::append) returned a
    /// `Rollup` error.
    pub fn rollup(&mut self, now: NaiveDateTime) -> Result<()> {
        let header = self.header.ok_or(StoreError::Empty)?;
        let tiers = self.tiers_for(now)?;
        Self::rollup_tiers(&header, tiers, now)
    }

    /// Reads `tier` between `from` and `to`, bounded by the configured
    /// `max_query_samples`.
    pub fn read(&self, tier: Tier, from: NaiveDateTime, to: NaiveDateTime) -> Result<Vec<Sample>> {
        self.read_bounded(tier, from, to, self.config.max_query_samples)
    }

    /// Reads `tier` between `from` and `to`, returning at most `limit` samples.
    ///
    /// One sample is returned per bucket, absent buckets included.
    ///
    /// # Errors
    ///
    /// Returns `Empty` before setup, `InvalidRange` if `from > to` and
    /// `LimitExceeded` if the range covers more than `limit` buckets.
    pub fn read_bounded(
        &self,
        tier: Tier,
        from: NaiveDateTime,
        to: NaiveDateTime,
        limit: usize,
    ) -> Result<Vec<Sample>> {
        let header = self.header.as_ref().ok_or(StoreError::Empty)?;
        query::read(&self.layout, header, tier, from, to, limit)
    }

    /// Syncs and releases every partition file.
    pub fn close(mut self) -> Result<()> {
        if let Some(tiers) = self.tiers.take() {
            tiers.day.sync()?;
            tiers.month.sync()?;
            tiers.year.sync()?;
        }
        Ok(())
    }

    /// Returns the header, if the store has been set up.
    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    /// Returns true if the store still needs [`setup`](Self::setup).
    pub fn is_empty(&self) -> bool {
        self.header.is_none()
    }

    /// Returns the base directory.
    pub fn base_dir(&self) -> &Path {
        self.layout.base_dir()
    }

    /// Returns the cursor of the open Day partition.
    pub fn day_cursor(&self) -> Option<usize> {
        self.tiers.as_ref().map(|tiers| tiers.day.cursor())
    }

    /// Opens the partitions of `now` and resumes its Day partition.
    fn open_tiers(&mut self, now: NaiveDateTime) -> Result<()> {
        let header = self.header.ok_or(StoreError::Empty)?;
        // Release the previous period before opening the next one.
        self.tiers = None;

        let date = now.date();
        let sync_mode = self.config.sync_mode;
        let open = |tier: Tier| {
            PartitionFile::open(
                self.layout.path(tier, date),
                header.format(tier),
                PartitionLayout::capacity(tier, header.interval, date),
                sync_mode,
            )
        };

        let mut day = open(Tier::Day)?;
        let month = open(Tier::Month)?;
        let year = open(Tier::Year)?;

        let expected = PartitionLayout::slot(Tier::Day, header.interval, now);
        let outcome = resume::resume(&mut day, expected)?;
        debug!(
            "Resumed {} at slot {}: {:?}",
            day.path().display(),
            expected,
            outcome
        );

        self.tiers = Some(OpenTiers {
            date,
            day,
            month,
            year,
        });
        Ok(())
    }

    /// Returns the partitions for the day of `now`, switching files when the
    /// calendar day has changed since the last write.
    fn tiers_for(&mut self, now: NaiveDateTime) -> Result<&mut OpenTiers> {
        let current = self.tiers.as_ref().map(|tiers| tiers.date);
        if current != Some(now.date()) {
            if let Some(previous) = current {
                info!("Switching partitions from {} to {}", previous, now.date());
            }
            self.open_tiers(now)?;
        }
        self.tiers.as_mut().ok_or(StoreError::Empty)
    }

    fn rollup_tiers(header: &Header, tiers: &mut OpenTiers, now: NaiveDateTime) -> Result<()> {
        // Day slots past `now` hold stale records from before a clock step
        // back; they are overwritten later and never rolled up.
        let day_end = PartitionLayout::slot(Tier::Day, header.interval, now) + 1;
        let month_record = tiers
            .day
            .read_until(day_end)
            .map(|day| rollup::month_record(header.kind, header.width, &day))
            .map_err(partial(Tier::Month))?;
        tiers
            .month
            .write_slot(now.day0() as usize, &month_record)
            .map_err(partial(Tier::Month))?;

        let year_record = tiers
            .month
            .read_until(now.day0() as usize + 1)
            .map(|month| rollup::year_record(header.kind, header.width, &month))
            .map_err(partial(Tier::Year))?;
        tiers
            .year
            .write_slot(now.month0() as usize, &year_record)
            .map_err(partial(Tier::Year))?;

        debug!(
            "Rolled up {}: month {:?}, year {:?}",
            now.date(),
            month_record,
            year_record
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{MetricKind, SampleInterval, SampleWidth};
    use crate::config::SyncMode;
    use tempfile::TempDir;

    fn time(d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    fn header() -> Header {
        Header::new(
            SampleInterval::TenMinutes,
            MetricKind::Gauge,
            SampleWidth::Bits12,
        )
    }

    fn create(dir: &TempDir, now: NaiveDateTime) -> (Store, OpenState) {
        let config = StoreConfig::default().with_sync_mode(SyncMode::None);
        Store::create_with_config(now, dir.path(), config).unwrap()
    }

    #[test]
    fn test_empty_store_rejects_operations() {
        let temp_dir = TempDir::new().unwrap();
        let (mut store, state) = create(&temp_dir, time(1, 0, 0));

        assert_eq!(state, OpenState::Empty);
        assert!(store.is_empty());
        assert!(store.day_cursor().is_none());
        assert!(matches!(
            store.append(1, time(1, 0, 0)),
            Err(StoreError::Empty)
        ));
        assert!(matches!(
            store.read(Tier::Day, time(1, 0, 0), time(1, 1, 0)),
            Err(StoreError::Empty)
        ));
    }

    #[test]
    fn test_setup_once() {
        let temp_dir = TempDir::new().unwrap();
        let (mut store, _) = create(&temp_dir, time(1, 0, 0));

        store.setup(time(1, 0, 30), header()).unwrap();
        assert_eq!(store.header(), Some(&header()));
        assert_eq!(store.day_cursor(), Some(4));

        let err = store.setup(time(1, 0, 30), header()).unwrap_err();
        assert!(matches!(err, StoreError::NonEmpty));
    }

    #[test]
    fn test_setup_rejected_on_initialized_directory() {
        let temp_dir = TempDir::new().unwrap();
        let (mut first, _) = create(&temp_dir, time(1, 0, 0));
        let (mut second, state) = create(&temp_dir, time(1, 0, 0));
        assert_eq!(state, OpenState::Empty);

        first.setup(time(1, 0, 0), header()).unwrap();
        let err = second.setup(time(1, 0, 0), header()).unwrap_err();
        assert!(matches!(err, StoreError::NonEmpty));
    }

    #[test]
    fn test_reopen_is_ready() {
        let temp_dir = TempDir::new().unwrap();
        let (mut store, _) = create(&temp_dir, time(1, 0, 0));
        store.setup(time(1, 0, 0), header()).unwrap();
        store.close().unwrap();

        let (store, state) = create(&temp_dir, time(1, 1, 0));
        assert_eq!(state, OpenState::Ready);
        assert_eq!(store.day_cursor(), Some(7));
    }

    #[test]
    fn test_value_wider_than_sample_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let (mut store, _) = create(&temp_dir, time(1, 0, 0));
        store.setup(time(1, 0, 0), header()).unwrap();

        let err = store.append(4096, time(1, 0, 10)).unwrap_err();
        assert!(matches!(
            err,
            StoreError::ValueOutOfRange {
                value: 4096,
                max: 4095
            }
        ));
    }

    #[test]
    fn test_append_switches_day() {
        let temp_dir = TempDir::new().unwrap();
        let (mut store, _) = create(&temp_dir, time(1, 23, 50));
        store.setup(time(1, 23, 50), header()).unwrap();

        store.append(100, time(1, 23, 50)).unwrap();
        store.append(200, time(2, 0, 10)).unwrap();

        assert_eq!(store.day_cursor(), Some(2));
        let month = store
            .read(Tier::Month, time(1, 0, 0), time(2, 0, 0))
            .unwrap();
        let values: Vec<_> = month.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![Some(100), Some(200)]);
    }
}

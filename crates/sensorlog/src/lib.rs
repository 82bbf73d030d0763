//! Sensorlog - fixed-schema time series storage for constrained devices
//!
//! A store holds one metric under one base directory and keeps three nested
//! resolutions of it on disk: a Day tier with one record per sampling
//! interval, a Month tier with one record per day and a Year tier with one
//! record per month. Month and Year records are recomputed from the finer
//! tier on every append, so storage per period is fixed by the schema.
//!
//! # Components
//!
//! - [`codec`]: record widths and encoding per (kind, tier, width)
//! - [`Header`]: the immutable schema stored in `<base>/meta`
//! - [`PartitionFile`]: fixed-stride record file of one tier and period
//! - [`resume`]: reconciles the Day cursor with wall-clock time
//! - [`rollup`]: Month and Year aggregation rules
//! - [`query`]: range reads with per-bucket presence
//! - [`Store`]: the handle combining all of the above
//!
//! The caller always supplies the current time; the store never reads the
//! system clock.
//!
//! # Example
//!
//! ```rust,ignore
//! use sensorlog::{Header, MetricKind, OpenState, SampleInterval, SampleWidth, Store, Tier};
//!
//! let (mut store, state) = Store::create(now, "/data/temperature")?;
//! if state == OpenState::Empty {
//!     let header = Header::new(SampleInterval::FiveMinutes, MetricKind::Gauge, SampleWidth::Bits12);
//!     store.setup(now, header)?;
//! }
//!
//! store.append(2048, now)?;
//! let samples = store.read(Tier::Day, midnight, now)?;
//! ```

#![deny(missing_docs)]

pub mod codec;
pub mod config;
pub mod error;
pub mod header;
pub mod partition;
pub mod query;
pub mod resume;
pub mod rollup;
pub mod store;

pub use codec::{MetricKind, Payload, Record, RecordFormat, SampleInterval, SampleWidth, Tier};
pub use config::{StoreConfig, SyncMode};
pub use error::{Result, StoreError};
pub use header::{Header, FORMAT_VERSION};
pub use partition::{PartitionFile, PartitionLayout};
pub use query::Sample;
pub use resume::ResumeOutcome;
pub use store::{OpenState, Store};

//! Error and Result types for sensor log operations.

use crate::codec::{MetricKind, Tier};
use std::io;
use thiserror::Error;

/// A convenience `Result` type for sensor log operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// The error type for sensor log operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store has no header yet and must be set up first.
    #[error("Store is empty, setup is required")]
    Empty,

    /// Setup was attempted on a store that already has a header.
    #[error("Store is already initialized")]
    NonEmpty,

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The header file exists but could not be decoded.
    #[error("Corrupt header: {0}")]
    CorruptHeader(String),

    /// A record read from a partition file could not be decoded.
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// A buffer for query results could not be allocated.
    #[error("Out of memory reserving {0} samples")]
    NoMemory(usize),

    /// The on-disk format version is not supported by this build.
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u8),

    /// A payload does not match the layout of the (kind, tier) pair.
    #[error("Unsupported schema: {kind:?} metric has no such {tier:?} payload")]
    UnsupportedSchema {
        /// Metric kind of the store.
        kind: MetricKind,
        /// Tier the payload was destined for.
        tier: Tier,
    },

    /// A raw enum value is outside the range this build understands.
    #[error("Unhandled value {value} for {field}")]
    EnumNotHandled {
        /// Name of the decoded field.
        field: &'static str,
        /// Raw value found.
        value: u8,
    },

    /// Slot index outside the tier capacity or past the end of the file.
    #[error("Slot {slot} out of range (capacity {capacity})")]
    OutOfRange {
        /// Requested slot.
        slot: usize,
        /// Number of addressable slots.
        capacity: usize,
    },

    /// Query range start is after its end.
    #[error("Invalid range: from is after to")]
    InvalidRange,

    /// Query would produce more samples than the caller allows.
    #[error("Query needs {requested} samples, limit is {limit}")]
    LimitExceeded {
        /// Number of samples the range covers.
        requested: usize,
        /// Caller supplied bound.
        limit: usize,
    },

    /// Appended value does not fit the configured sample width.
    #[error("Value {value} exceeds sample maximum {max}")]
    ValueOutOfRange {
        /// Rejected value.
        value: u32,
        /// Largest representable value.
        max: u32,
    },

    /// The Day record was written but recomputing an aggregate failed.
    ///
    /// The Day data is durable; [`Store::rollup`](crate::Store::rollup) retries the
    /// aggregation without the original value.
    #[error("Rollup of {tier:?} tier failed after day write: {source}")]
    Rollup {
        /// Tier whose aggregate could not be written.
        tier: Tier,
        /// Underlying failure.
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    /// Returns true if the Day write of the failed operation is durable.
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::Rollup { .. })
    }
}

//! Store configuration.

use std::fs::File;
use std::io;

/// Default bound on the number of samples a single query may return.
///
/// One day of one-minute samples.
pub const DEFAULT_MAX_QUERY_SAMPLES: usize = 1440;

/// Sync mode for write durability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Fsync after each durable write (default, highest durability).
    #[default]
    Fsync,
    /// Use fdatasync (skip metadata update, faster).
    Fdatasync,
    /// No sync (fastest, lowest durability - for testing only).
    None,
}

impl SyncMode {
    /// Applies the sync mode to a file that was just written.
    pub fn sync(self, file: &File) -> io::Result<()> {
        match self {
            Self::Fsync => file.sync_all(),
            Self::Fdatasync => file.sync_data(),
            Self::None => Ok(()),
        }
    }
}

/// Configuration for a [`Store`](crate::Store).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Sync mode applied after every record write.
    pub sync_mode: SyncMode,
    /// Bound on the samples returned by [`Store::read`](crate::Store::read).
    pub max_query_samples: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::default(),
            max_query_samples: DEFAULT_MAX_QUERY_SAMPLES,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with a custom sync mode.
    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    /// Creates a new configuration with a custom query bound.
    pub fn with_max_query_samples(mut self, max: usize) -> Self {
        self.max_query_samples = max;
        self
    }
}

//! Header store: the four-byte `meta` file that fixes the store schema.
//!
//! ```text
//! ┌─────────┬──────────┬──────┬───────┐
//! │ version │ interval │ kind │ width │
//! │   u8    │    u8    │  u8  │  u8   │
//! └─────────┴──────────┴──────┴───────┘
//! ```

use crate::codec::{MetricKind, RecordFormat, SampleInterval, SampleWidth, Tier};
use crate::error::{Result, StoreError};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::debug;

/// Current on-disk format version.
pub const FORMAT_VERSION: u8 = 1;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 4;

/// Schema of a store, immutable once written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Format version.
    pub version: u8,
    /// Day tier cadence.
    pub interval: SampleInterval,
    /// Counter or gauge.
    pub kind: MetricKind,
    /// Raw sample width.
    pub width: SampleWidth,
}

impl Header {
    /// Creates a header for the current format version.
    pub fn new(interval: SampleInterval, kind: MetricKind, width: SampleWidth) -> Self {
        Self {
            version: FORMAT_VERSION,
            interval,
            kind,
            width,
        }
    }

    /// Returns the record layout of a tier under this header.
    pub fn format(&self, tier: Tier) -> RecordFormat {
        RecordFormat::new(self.kind, tier, self.width)
    }

    /// Serializes the header.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        [
            self.version,
            self.interval as u8,
            self.kind as u8,
            self.width as u8,
        ]
    }

    /// Deserializes a header, validating version and every enum byte.
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Result<Self> {
        let version = bytes[0];
        if version != FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion(version));
        }
        let interval = SampleInterval::from_u8(bytes[1]).ok_or(StoreError::EnumNotHandled {
            field: "sample interval",
            value: bytes[1],
        })?;
        let kind = MetricKind::from_u8(bytes[2]).ok_or(StoreError::EnumNotHandled {
            field: "metric kind",
            value: bytes[2],
        })?;
        let width = SampleWidth::from_u8(bytes[3]).ok_or(StoreError::EnumNotHandled {
            field: "sample width",
            value: bytes[3],
        })?;
        Ok(Self {
            version,
            interval,
            kind,
            width,
        })
    }

    /// Loads the header from `path`.
    ///
    /// Returns `Ok(None)` if no header exists yet.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedVersion` for a foreign format version and
    /// `CorruptHeader` for a truncated file.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut version = [0u8; 1];
        if file.read(&mut version)? == 0 {
            return Err(StoreError::CorruptHeader("empty header file".to_string()));
        }
        if version[0] != FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion(version[0]));
        }

        let mut bytes = [version[0], 0, 0, 0];
        match file.read_exact(&mut bytes[1..]) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(StoreError::CorruptHeader(format!(
                    "truncated header in {}",
                    path.display()
                )))
            }
            Err(e) => return Err(e.into()),
        }

        Self::from_bytes(&bytes).map(Some)
    }

    /// Writes the header to `path`.
    ///
    /// The bytes go to a sibling temporary file that is synced and renamed over
    /// `path`, and the containing directory is synced after the rename, so a
    /// power loss leaves either the old header or the new one.
    pub fn save(&self, path: &Path) -> Result<()> {
        let temp_path = path.with_extension("tmp");
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&temp_path)?;
            file.write_all(&self.to_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, path)?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        File::open(dir)?.sync_all()?;
        debug!("Wrote header {:?} to {}", self, path.display());
        Ok(())
    }
}

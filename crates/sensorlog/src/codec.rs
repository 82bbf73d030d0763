//! Schema enums and the fixed-width record codec.
//!
//! Every record on disk is a presence byte followed by a payload whose width
//! depends only on the metric kind, the tier and the sample width:
//!
//! ```text
//! ┌──────────────┬───────────────┬──────────────┬──────────────┐
//! │ kind / tier  │ Day           │ Month        │ Year         │
//! ├──────────────┼───────────────┼──────────────┼──────────────┤
//! │ Counter      │ raw (w)       │ accum (2w)   │ accum (2w)   │
//! │ Gauge        │ raw (w)       │ sum u32 +    │ raw (w)      │
//! │              │               │ count u16    │              │
//! └──────────────┴───────────────┴──────────────┴──────────────┘
//! ```
//!
//! `w` is 1 byte for 8-bit samples and 2 bytes for 12 and 16-bit samples.
//! All multi-byte fields are little-endian.

use crate::error::{Result, StoreError};

/// Size of the presence flag in bytes.
pub const PRESENCE_SIZE: usize = 1;

/// Largest record stride of any (kind, tier, width) combination.
pub const MAX_RECORD_SIZE: usize = PRESENCE_SIZE + 6;

const ABSENT: u8 = 0x00;
const PRESENT: u8 = 0x01;

/// Kind of metric stored in a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MetricKind {
    /// Per-interval increments of a monotonic counter.
    Counter = 0,
    /// Instantaneous readings.
    Gauge = 1,
}

impl MetricKind {
    /// Creates a MetricKind from a u8 value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Counter),
            1 => Some(Self::Gauge),
            _ => None,
        }
    }
}

/// Resolution tier of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Tier {
    /// One record per sampling interval of a day.
    Day = 0,
    /// One record per day of a month.
    Month = 1,
    /// One record per month of a year.
    Year = 2,
}

impl Tier {
    /// All tiers, finest first.
    pub const ALL: [Tier; 3] = [Tier::Day, Tier::Month, Tier::Year];
}

/// Sampling cadence of the Day tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SampleInterval {
    /// 1440 samples per day.
    OneMinute = 0,
    /// 288 samples per day.
    FiveMinutes = 1,
    /// 144 samples per day.
    TenMinutes = 2,
}

impl SampleInterval {
    /// Creates a SampleInterval from a u8 value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::OneMinute),
            1 => Some(Self::FiveMinutes),
            2 => Some(Self::TenMinutes),
            _ => None,
        }
    }

    /// Minutes covered by one Day slot.
    pub fn minutes(self) -> u32 {
        match self {
            Self::OneMinute => 1,
            Self::FiveMinutes => 5,
            Self::TenMinutes => 10,
        }
    }

    /// Number of Day slots in a calendar day.
    pub fn slots_per_day(self) -> usize {
        match self {
            Self::OneMinute => 1440,
            Self::FiveMinutes => 288,
            Self::TenMinutes => 144,
        }
    }
}

/// Bit-width of a raw sample, normally the ADC resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SampleWidth {
    /// 8-bit samples, stored in one byte.
    Bits8 = 0,
    /// 12-bit samples, stored in two bytes.
    Bits12 = 1,
    /// 16-bit samples, stored in two bytes.
    Bits16 = 2,
}

impl SampleWidth {
    /// Creates a SampleWidth from a u8 value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Bits8),
            1 => Some(Self::Bits12),
            2 => Some(Self::Bits16),
            _ => None,
        }
    }

    /// Bytes used to store one raw sample.
    pub fn bytes(self) -> usize {
        match self {
            Self::Bits8 => 1,
            Self::Bits12 | Self::Bits16 => 2,
        }
    }

    /// Largest raw sample value.
    pub fn max_value(self) -> u32 {
        match self {
            Self::Bits8 => 0xFF,
            Self::Bits12 => 0x0FFF,
            Self::Bits16 => 0xFFFF,
        }
    }

    /// Largest value of a double-width counter accumulator.
    pub fn accumulator_max(self) -> u32 {
        match self.bytes() {
            1 => u32::from(u16::MAX),
            _ => u32::MAX,
        }
    }
}

/// Decoded payload of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// Raw sample or averaged gauge value.
    Raw(u16),
    /// Double-width counter accumulator.
    Accumulator(u32),
    /// Gauge running sum and sample count.
    SumCount {
        /// Sum of present samples.
        sum: u32,
        /// Number of present samples.
        count: u16,
    },
}

/// A single slot of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    /// Whether a value was written to the slot.
    pub present: bool,
    /// Payload, zeroed when absent.
    pub payload: Payload,
}

impl Record {
    /// Creates a present record.
    pub fn present(payload: Payload) -> Self {
        Self {
            present: true,
            payload,
        }
    }

    /// Returns the value a reader sees for this record.
    ///
    /// Sum/count payloads yield their integer average; a zero count is absent.
    pub fn value(&self) -> Option<u32> {
        if !self.present {
            return None;
        }
        match self.payload {
            Payload::Raw(v) => Some(u32::from(v)),
            Payload::Accumulator(v) => Some(v),
            Payload::SumCount { count: 0, .. } => None,
            Payload::SumCount { sum, count } => Some(sum / u32::from(count)),
        }
    }
}

/// Payload width in bytes, excluding the presence flag.
pub fn payload_width(kind: MetricKind, tier: Tier, width: SampleWidth) -> usize {
    match (kind, tier) {
        (MetricKind::Counter, Tier::Day) => width.bytes(),
        (MetricKind::Counter, Tier::Month | Tier::Year) => 2 * width.bytes(),
        (MetricKind::Gauge, Tier::Day | Tier::Year) => width.bytes(),
        (MetricKind::Gauge, Tier::Month) => 4 + 2,
    }
}

/// Encoded record bytes, sized for the largest layout.
#[derive(Debug, Clone, Copy)]
pub struct RecordBytes {
    buf: [u8; MAX_RECORD_SIZE],
    len: usize,
}

impl RecordBytes {
    /// Returns the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// Record layout of one partition: the (kind, tier, width) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordFormat {
    kind: MetricKind,
    tier: Tier,
    width: SampleWidth,
}

impl RecordFormat {
    /// Creates the layout for a tier of a store.
    pub fn new(kind: MetricKind, tier: Tier, width: SampleWidth) -> Self {
        Self { kind, tier, width }
    }

    /// Metric kind of the layout.
    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Tier of the layout.
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Sample width of the layout.
    pub fn width(&self) -> SampleWidth {
        self.width
    }

    /// Payload width in bytes.
    pub fn payload_width(&self) -> usize {
        payload_width(self.kind, self.tier, self.width)
    }

    /// On-disk size of one record.
    pub fn stride(&self) -> usize {
        PRESENCE_SIZE + self.payload_width()
    }

    /// Returns the absent record with a zeroed payload of the right shape.
    pub fn absent(&self) -> Record {
        let payload = match (self.kind, self.tier) {
            (MetricKind::Counter, Tier::Month | Tier::Year) => Payload::Accumulator(0),
            (MetricKind::Gauge, Tier::Month) => Payload::SumCount { sum: 0, count: 0 },
            _ => Payload::Raw(0),
        };
        Record {
            present: false,
            payload,
        }
    }

    /// Encodes a record.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedSchema` if the payload variant does not belong to
    /// this layout and `ValueOutOfRange` if it does not fit its field width.
    pub fn encode(&self, record: &Record) -> Result<RecordBytes> {
        let mut buf = [0u8; MAX_RECORD_SIZE];
        buf[0] = if record.present { PRESENT } else { ABSENT };
        let field = &mut buf[PRESENCE_SIZE..self.stride()];

        match (self.kind, self.tier, record.payload) {
            (MetricKind::Counter, Tier::Day, Payload::Raw(v))
            | (MetricKind::Gauge, Tier::Day | Tier::Year, Payload::Raw(v)) => {
                write_uint(field, u32::from(v))?;
            }
            (MetricKind::Counter, Tier::Month | Tier::Year, Payload::Accumulator(v)) => {
                write_uint(field, v)?;
            }
            (MetricKind::Gauge, Tier::Month, Payload::SumCount { sum, count }) => {
                field[..4].copy_from_slice(&sum.to_le_bytes());
                field[4..6].copy_from_slice(&count.to_le_bytes());
            }
            _ => {
                return Err(StoreError::UnsupportedSchema {
                    kind: self.kind,
                    tier: self.tier,
                })
            }
        }

        Ok(RecordBytes {
            buf,
            len: self.stride(),
        })
    }

    /// Decodes a record from exactly `stride()` bytes or more.
    pub fn decode(&self, bytes: &[u8]) -> Result<Record> {
        let stride = self.stride();
        if bytes.len() < stride {
            return Err(StoreError::CorruptRecord(format!(
                "expected {} bytes, got {}",
                stride,
                bytes.len()
            )));
        }

        let present = match bytes[0] {
            ABSENT => false,
            PRESENT => true,
            other => {
                return Err(StoreError::CorruptRecord(format!(
                    "invalid presence flag {:#04x}",
                    other
                )))
            }
        };
        let field = &bytes[PRESENCE_SIZE..stride];

        let payload = match (self.kind, self.tier) {
            (MetricKind::Counter, Tier::Day) | (MetricKind::Gauge, Tier::Day | Tier::Year) => {
                // Raw fields are at most two bytes wide.
                Payload::Raw(read_uint(field) as u16)
            }
            (MetricKind::Counter, Tier::Month | Tier::Year) => {
                Payload::Accumulator(read_uint(field))
            }
            (MetricKind::Gauge, Tier::Month) => Payload::SumCount {
                sum: u32::from_le_bytes([field[0], field[1], field[2], field[3]]),
                count: u16::from_le_bytes([field[4], field[5]]),
            },
        };

        Ok(Record { present, payload })
    }
}

/// Writes `value` little-endian into a 1, 2 or 4 byte field.
fn write_uint(field: &mut [u8], value: u32) -> Result<()> {
    let max = match field.len() {
        1 => u32::from(u8::MAX),
        2 => u32::from(u16::MAX),
        _ => u32::MAX,
    };
    if value > max {
        return Err(StoreError::ValueOutOfRange { value, max });
    }
    let bytes = value.to_le_bytes();
    field.copy_from_slice(&bytes[..field.len()]);
    Ok(())
}

fn read_uint(field: &[u8]) -> u32 {
    let mut bytes = [0u8; 4];
    bytes[..field.len()].copy_from_slice(field);
    u32::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_width_table() {
        use MetricKind::*;
        use SampleWidth::*;
        use Tier::*;

        assert_eq!(payload_width(Counter, Day, Bits8), 1);
        assert_eq!(payload_width(Counter, Month, Bits8), 2);
        assert_eq!(payload_width(Counter, Year, Bits16), 4);
        assert_eq!(payload_width(Gauge, Day, Bits12), 2);
        assert_eq!(payload_width(Gauge, Year, Bits8), 1);
        for width in [Bits8, Bits12, Bits16] {
            assert_eq!(payload_width(Gauge, Month, width), 6);
        }
    }

    #[test]
    fn test_encode_day_layout() {
        let format = RecordFormat::new(MetricKind::Gauge, Tier::Day, SampleWidth::Bits16);
        let bytes = format.encode(&Record::present(Payload::Raw(0x1234))).unwrap();
        assert_eq!(bytes.as_bytes(), &[0x01, 0x34, 0x12]);
    }

    #[test]
    fn test_encode_gauge_month_layout() {
        let format = RecordFormat::new(MetricKind::Gauge, Tier::Month, SampleWidth::Bits8);
        let record = Record::present(Payload::SumCount { sum: 10, count: 1 });
        let bytes = format.encode(&record).unwrap();
        assert_eq!(bytes.as_bytes(), &[0x01, 10, 0, 0, 0, 1, 0]);
        assert_eq!(format.decode(bytes.as_bytes()).unwrap(), record);
    }

    #[test]
    fn test_absent_record_is_zeroed() {
        let format = RecordFormat::new(MetricKind::Counter, Tier::Month, SampleWidth::Bits12);
        let bytes = format.encode(&format.absent()).unwrap();
        assert_eq!(bytes.as_bytes(), &[0, 0, 0, 0, 0]);
        assert_eq!(format.decode(bytes.as_bytes()).unwrap().value(), None);
    }

    #[test]
    fn test_mismatched_payload_is_unsupported_schema() {
        let format = RecordFormat::new(MetricKind::Counter, Tier::Day, SampleWidth::Bits8);
        let err = format
            .encode(&Record::present(Payload::SumCount { sum: 1, count: 1 }))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::UnsupportedSchema {
                kind: MetricKind::Counter,
                tier: Tier::Day
            }
        ));
    }

    #[test]
    fn test_value_wider_than_field_is_rejected() {
        let format = RecordFormat::new(MetricKind::Gauge, Tier::Day, SampleWidth::Bits8);
        let err = format.encode(&Record::present(Payload::Raw(256))).unwrap_err();
        assert!(matches!(err, StoreError::ValueOutOfRange { value: 256, max: 255 }));
    }

    #[test]
    fn test_decode_rejects_bad_presence_and_short_input() {
        let format = RecordFormat::new(MetricKind::Gauge, Tier::Day, SampleWidth::Bits8);
        assert!(matches!(
            format.decode(&[0x07, 0x01]),
            Err(StoreError::CorruptRecord(_))
        ));
        assert!(matches!(
            format.decode(&[0x01]),
            Err(StoreError::CorruptRecord(_))
        ));
    }

    #[test]
    fn test_gauge_month_value_is_average() {
        let record = Record::present(Payload::SumCount { sum: 30, count: 4 });
        assert_eq!(record.value(), Some(7));

        let empty = Record::present(Payload::SumCount { sum: 0, count: 0 });
        assert_eq!(empty.value(), None);
    }

    #[test]
    fn test_enum_from_u8() {
        assert_eq!(SampleInterval::from_u8(1), Some(SampleInterval::FiveMinutes));
        assert_eq!(SampleInterval::from_u8(3), None);
        assert_eq!(SampleWidth::from_u8(2), Some(SampleWidth::Bits16));
        assert_eq!(MetricKind::from_u8(2), None);
        assert_eq!(SampleInterval::FiveMinutes.slots_per_day(), 288);
        assert_eq!(SampleWidth::Bits8.accumulator_max(), 65_535);
    }
}

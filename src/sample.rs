use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;

/// Size in bytes of one encoded sample record.
pub const SAMPLE_WIRE_SIZE: usize = 16;

pub const FLAG_NEW_SAMPLE: u32 = 1 << 0;
pub const FLAG_THRESHOLD_ALERT: u32 = 1 << 1;

const_assert_eq!(SAMPLE_WIRE_SIZE, 8 + 4 + 4);

/// Event flags attached to a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleFlags(u32);

impl SampleFlags {
    pub const NEW_SAMPLE: Self = Self(FLAG_NEW_SAMPLE);
    pub const THRESHOLD_ALERT: Self = Self(FLAG_THRESHOLD_ALERT);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// One generated reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp_ns: u64,
    pub temp_mc: i32,
    pub flags: SampleFlags,
}

impl Sample {
    /// Builds a freshly generated sample, flagging an alert when
    /// `temp_mc >= threshold_mc`.
    pub fn generated(timestamp_ns: u64, temp_mc: i32, threshold_mc: i32) -> Self {
        let mut flags = SampleFlags::NEW_SAMPLE;
        if temp_mc >= threshold_mc {
            flags = flags.with(SampleFlags::THRESHOLD_ALERT);
        }
        Self {
            timestamp_ns,
            temp_mc,
            flags,
        }
    }

    pub fn is_alert(&self) -> bool {
        self.flags.contains(SampleFlags::THRESHOLD_ALERT)
    }

    pub fn temp_celsius(&self) -> f64 {
        f64::from(self.temp_mc) / 1000.0
    }

    /// Encodes the little-endian wire record.
    pub fn to_bytes(&self) -> [u8; SAMPLE_WIRE_SIZE] {
        let mut out = [0u8; SAMPLE_WIRE_SIZE];
        out[0..8].copy_from_slice(&self.timestamp_ns.to_le_bytes());
        out[8..12].copy_from_slice(&self.temp_mc.to_le_bytes());
        out[12..16].copy_from_slice(&self.flags.bits().to_le_bytes());
        out
    }

    /// Decodes a wire record. Returns `None` when fewer than
    /// [`SAMPLE_WIRE_SIZE`] bytes are supplied; trailing bytes are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let record: &[u8; SAMPLE_WIRE_SIZE] = bytes.get(..SAMPLE_WIRE_SIZE)?.try_into().ok()?;

        let mut ts = [0u8; 8];
        ts.copy_from_slice(&record[0..8]);
        let mut temp = [0u8; 4];
        temp.copy_from_slice(&record[8..12]);
        let mut flags = [0u8; 4];
        flags.copy_from_slice(&record[12..16]);

        Some(Self {
            timestamp_ns: u64::from_le_bytes(ts),
            temp_mc: i32::from_le_bytes(temp),
            flags: SampleFlags::from_bits(u32::from_le_bytes(flags)),
        })
    }
}

/// Wall-clock nanoseconds since the Unix epoch.
pub fn now_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_layout() {
        let sample = Sample {
            timestamp_ns: 0x0102_0304_0506_0708,
            temp_mc: -2,
            flags: SampleFlags::NEW_SAMPLE.with(SampleFlags::THRESHOLD_ALERT),
        };

        let bytes = sample.to_bytes();
        assert_eq!(&bytes[0..8], &[0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[8..12], &[0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(&bytes[12..16], &[0x03, 0x00, 0x00, 0x00]);
        assert_eq!(Sample::from_bytes(&bytes), Some(sample));
    }

    #[test]
    fn test_short_record_rejected() {
        assert_eq!(Sample::from_bytes(&[0u8; 15]), None);
    }

    #[test]
    fn test_alert_flag_at_threshold() {
        assert!(Sample::generated(1, 45000, 45000).is_alert());
        assert!(!Sample::generated(1, 44999, 45000).is_alert());
        assert!(Sample::generated(1, 44999, 45000).flags.contains(SampleFlags::NEW_SAMPLE));
    }
}

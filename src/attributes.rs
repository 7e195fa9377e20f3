//! Text attribute surface, one value per attribute, newline terminated.

use crate::device::SimTempDevice;
use crate::error::DeviceError;
use arrayvec::ArrayString;
use core::fmt::Write;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const ATTR_BUFFER_SIZE: usize = 128;

pub type AttrBuffer = ArrayString<ATTR_BUFFER_SIZE>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attribute {
    SamplingMs,
    ThresholdMc,
    Mode,
    Stats,
}

impl Attribute {
    pub const ALL: [Attribute; 4] = [
        Attribute::SamplingMs,
        Attribute::ThresholdMc,
        Attribute::Mode,
        Attribute::Stats,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Attribute::SamplingMs => "sampling_ms",
            Attribute::ThresholdMc => "threshold_mC",
            Attribute::Mode => "mode",
            Attribute::Stats => "stats",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|attr| attr.name() == name)
    }

    pub fn is_writable(self) -> bool {
        !matches!(self, Attribute::Stats)
    }
}

impl core::fmt::Display for Attribute {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

fn lookup(name: &str) -> Result<Attribute, DeviceError> {
    Attribute::from_name(name).ok_or_else(|| DeviceError::UnknownAttribute(name.to_owned()))
}

/// Parses a sampling interval from decimal text, or from a raw 4-byte
/// little-endian integer when the input is not printable text.
fn parse_interval(input: &[u8]) -> Option<u32> {
    if let Ok(text) = core::str::from_utf8(input) {
        if let Ok(value) = text.trim().parse::<u32>() {
            return Some(value);
        }
    }

    let printable = input
        .iter()
        .all(|b| b.is_ascii_graphic() || b.is_ascii_whitespace());
    if printable {
        return None;
    }
    let raw: [u8; 4] = input.try_into().ok()?;
    Some(u32::from_le_bytes(raw))
}

impl SimTempDevice {
    /// Renders the current value of an attribute.
    pub fn show_attribute(&self, name: &str) -> Result<AttrBuffer, DeviceError> {
        let attr = lookup(name)?;
        let mut out = AttrBuffer::new();
        let written = match attr {
            Attribute::SamplingMs => writeln!(out, "{}", self.sampling_ms()),
            Attribute::ThresholdMc => writeln!(out, "{}", self.threshold_mc()),
            Attribute::Mode => writeln!(out, "{}", self.mode()),
            Attribute::Stats => writeln!(out, "{}", self.stats()),
        };
        written.map_err(|_| {
            DeviceError::InvalidArgument(format!("attribute {attr} does not fit the show buffer"))
        })?;
        Ok(out)
    }

    /// Applies a raw attribute write and returns the number of bytes
    /// consumed. Malformed input is counted in `errors`.
    pub fn store_attribute(&self, name: &str, input: &[u8]) -> Result<usize, DeviceError> {
        let attr = lookup(name)?;
        match attr {
            Attribute::SamplingMs => {
                let ms = parse_interval(input).ok_or_else(|| self.reject(attr, input))?;
                self.set_sampling_ms(ms);
            }
            Attribute::ThresholdMc => {
                let mc = core::str::from_utf8(input)
                    .ok()
                    .and_then(|text| text.trim().parse::<i32>().ok())
                    .ok_or_else(|| self.reject(attr, input))?;
                self.set_threshold_mc(mc);
            }
            Attribute::Mode => {
                let text = core::str::from_utf8(input).map_err(|_| {
                    self.record_error();
                    DeviceError::Validation("mode must be text".to_owned())
                })?;
                self.set_mode(text)?;
            }
            Attribute::Stats => return Err(DeviceError::PermissionDenied(attr.name().to_owned())),
        }

        Ok(input.len())
    }

    fn reject(&self, attr: Attribute, input: &[u8]) -> DeviceError {
        self.record_error();
        let shown = String::from_utf8_lossy(input);
        warn!(device = self.name(), %attr, input = %shown.trim(), "rejected attribute write");
        DeviceError::InvalidArgument(format!("cannot parse '{}' for {attr}", shown.trim()))
    }
}

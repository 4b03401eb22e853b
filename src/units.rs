//! Conversions between physical engineering units and device-native codes.
//!
//! The digitizer front end only accepts a fixed set of full-scale input
//! ranges and expresses trigger levels and samples as ADC counts. Everything
//! in this module is a pure function; the device-specific saturation
//! constant (`max_adc_code`) is queried from the driver and passed in.

use std::time::Duration;

/// Full-scale input ranges supported by the digitizer front end.
///
/// Each range maps 1:1 to a device-native range code. Anything not in this
/// enumeration is a configuration error, never a silent clamp to the
/// nearest range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoltageRange {
    Mv20,
    Mv50,
    Mv100,
    Mv200,
    Mv500,
    V1,
    V2,
    V5,
    V10,
    V20,
}

impl VoltageRange {
    /// All supported ranges, in ascending full-scale order.
    pub const ALL: [Self; 10] = [
        Self::Mv20,
        Self::Mv50,
        Self::Mv100,
        Self::Mv200,
        Self::Mv500,
        Self::V1,
        Self::V2,
        Self::V5,
        Self::V10,
        Self::V20,
    ];

    /// Device-native range code.
    pub fn code(self) -> u32 {
        match self {
            Self::Mv20 => 1,
            Self::Mv50 => 2,
            Self::Mv100 => 3,
            Self::Mv200 => 4,
            Self::Mv500 => 5,
            Self::V1 => 6,
            Self::V2 => 7,
            Self::V5 => 8,
            Self::V10 => 9,
            Self::V20 => 10,
        }
    }

    /// Full-scale value in volts.
    pub fn volts(self) -> f64 {
        match self {
            Self::Mv20 => 0.02,
            Self::Mv50 => 0.05,
            Self::Mv100 => 0.1,
            Self::Mv200 => 0.2,
            Self::Mv500 => 0.5,
            Self::V1 => 1.0,
            Self::V2 => 2.0,
            Self::V5 => 5.0,
            Self::V10 => 10.0,
            Self::V20 => 20.0,
        }
    }

    /// Full-scale value in millivolts.
    pub fn millivolts(self) -> f64 {
        self.volts() * 1000.0
    }

    /// Look up the range whose full-scale value matches `volts` exactly.
    pub fn from_volts(volts: f64) -> Result<Self, ConfigError> {
        Self::ALL
            .iter()
            .copied()
            .find(|range| range.volts() == volts)
            .ok_or(ConfigError::UnsupportedRange { volts })
    }
}

/// Caller-supplied parameters were invalid. Detected before any device call
/// and never retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("unsupported voltage range: {volts} V full scale is not one of the discrete device ranges")]
    UnsupportedRange { volts: f64 },

    #[error("capture duration {requested:?} is shorter than one sample interval ({sample_interval:?})")]
    DurationTooShort {
        requested: Duration,
        sample_interval: Duration,
    },

    #[error("pre-trigger percentage {0} is outside 0..=100")]
    InvalidPreTrigger(u8),

    #[error("stimulus frequency {0} Hz is not positive")]
    InvalidFrequency(f64),
}

/// Convert a trigger threshold in volts to ADC counts for the given range.
///
/// A threshold of 0 V maps to count 0, i.e. no trigger offset.
pub fn threshold_to_counts(threshold_volts: f64, range: VoltageRange, adc_bits: u32) -> i32 {
    let lsb = range.volts() / (((1u64 << adc_bits) - 1) as f64);
    (threshold_volts / lsb).round() as i32
}

/// Convert raw ADC counts to millivolts.
///
/// `max_adc_code` is the device's saturation count, queried once per
/// session; it is not a fixed literal across hardware variants.
pub fn counts_to_millivolts(raw: &[i16], range: VoltageRange, max_adc_code: i32) -> Vec<f64> {
    let scale = range.millivolts() / f64::from(max_adc_code);
    raw.iter().map(|&count| f64::from(count) * scale).collect()
}

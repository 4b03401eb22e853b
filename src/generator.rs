//! Stimulus configuration for the built-in signal generator.

use crate::digitizer::{DeviceError, Digitizer, ScopeSession, Waveform};

/// One fixed tone for the built-in generator.
///
/// The device keeps the last-set stimulus until it is overwritten or the
/// session closes. During a sweep the frequency field is substituted per
/// point; the remaining fields act as a template.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StimulusConfig {
    pub waveform: Waveform,
    pub amplitude_volts: f64,
    pub frequency_hz: f64,
    pub offset_volts: f64,
}

impl StimulusConfig {
    /// Sine tone with no offset.
    pub fn sine(amplitude_volts: f64, frequency_hz: f64) -> Self {
        Self {
            waveform: Waveform::Sine,
            amplitude_volts,
            frequency_hz,
            offset_volts: 0.0,
        }
    }

    pub fn with_offset(mut self, offset_volts: f64) -> Self {
        self.offset_volts = offset_volts;
        self
    }

    /// Amplitude in device-native integer microvolts (truncated).
    pub(crate) fn amplitude_microvolts(&self) -> i32 {
        (self.amplitude_volts * 1_000_000.0) as i32
    }

    pub(crate) fn offset_microvolts(&self) -> i32 {
        (self.offset_volts * 1_000_000.0) as i32
    }
}

impl<D: Digitizer> ScopeSession<D> {
    /// Program the generator with a fixed tone.
    ///
    /// Device rejection (e.g. amplitude outside the generator's range)
    /// surfaces as [`DeviceError::SignalGenerator`].
    pub fn set_stimulus(&mut self, stimulus: &StimulusConfig) -> Result<(), DeviceError> {
        log::debug!(
            "stimulus: {:?} {} Vpk at {} Hz (offset {} V)",
            stimulus.waveform,
            stimulus.amplitude_volts,
            stimulus.frequency_hz,
            stimulus.offset_volts
        );
        self.driver.set_stimulus(
            stimulus.waveform,
            stimulus.amplitude_microvolts(),
            stimulus.frequency_hz,
            stimulus.offset_microvolts(),
        )
    }
}

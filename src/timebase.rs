//! Timebase arithmetic: sample interval, sample counts, pre/post split.
//!
//! The device exposes sampling as an opaque timebase index; resolving that
//! index to a physical sample interval is a driver call
//! ([`crate::Digitizer::get_timebase`]). The helpers here turn the resolved
//! interval plus a requested capture duration into concrete sample counts.

use std::time::Duration;

use crate::units::ConfigError;

/// Resolved sampling parameters for one device-native timebase index.
///
/// The same index may be reused across captures as long as the channel
/// configuration is unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimebaseInfo {
    /// Physical time between consecutive samples.
    pub sample_interval: Duration,
    /// On-device buffer capacity at this timebase.
    pub max_samples: u32,
}

/// Number of samples needed to span `duration` at `sample_interval`.
///
/// A duration shorter than one sample interval is a caller error, not a
/// clamp to a single sample.
pub fn samples_for_duration(
    duration: Duration,
    sample_interval: Duration,
) -> Result<u32, ConfigError> {
    let count = (duration.as_secs_f64() / sample_interval.as_secs_f64()).round();
    if count < 1.0 {
        return Err(ConfigError::DurationTooShort {
            requested: duration,
            sample_interval,
        });
    }
    Ok(count as u32)
}

/// Split a total sample count into pre- and post-trigger parts.
///
/// `pre_trigger_percent` is the percentage of samples taken before the
/// trigger event. `pre` truncates; `post` takes the remainder, so the parts
/// always sum to `total_samples`.
pub fn split_pre_post(
    total_samples: u32,
    pre_trigger_percent: u8,
) -> Result<(u32, u32), ConfigError> {
    if pre_trigger_percent > 100 {
        return Err(ConfigError::InvalidPreTrigger(pre_trigger_percent));
    }
    let pre = (u64::from(total_samples) * u64::from(pre_trigger_percent) / 100) as u32;
    Ok((pre, total_samples - pre))
}

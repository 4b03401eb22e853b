//! Single triggered block acquisition, driven to completion.
//!
//! One [`ScopeSession::capture`] call performs the whole protocol: configure
//! channel and trigger, resolve the timebase, launch the block run, wait for
//! readiness under a deadline, retrieve the raw counts and convert them to
//! physical units, then stop the acquisition. Any step failing aborts the
//! operation with a typed error; the stop is issued on every path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use polars::prelude::*;

use crate::digitizer::{Channel, Coupling, DeviceError, Digitizer, ScopeSession, TriggerDirection};
use crate::timebase::{samples_for_duration, split_pre_post};
use crate::units::{self, ConfigError, VoltageRange};

/// Device-native timebase index used for every block run.
const DEFAULT_TIMEBASE: u32 = 10;

/// Sample-count hint passed to the timebase query.
const TIMEBASE_SAMPLE_HINT: u32 = 1276;

/// Poll spacing while waiting for the acquisition to complete.
const READY_POLL_INTERVAL: Duration = Duration::from_micros(100);

/// Default ready deadline is `READY_TIMEOUT_FACTOR * duration` plus this
/// slack, covering trigger latency on short windows.
const READY_TIMEOUT_SLACK: Duration = Duration::from_secs(1);
const READY_TIMEOUT_FACTOR: u32 = 4;

/// Parameters for one triggered block acquisition. Immutable per call.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    /// Channel to capture.
    pub channel: Channel,
    /// Full-scale input range.
    pub voltage_range: VoltageRange,
    /// Physical length of the capture window.
    pub duration: Duration,
    /// Edge trigger level. `None` arms the trigger at 0 V.
    pub trigger_threshold_volts: Option<f64>,
    /// Channel the trigger watches. Defaults to the capture channel; a
    /// mismatch is legal but logged as a warning.
    pub trigger_channel: Option<Channel>,
    /// Percentage of samples taken before the trigger event (0..=100).
    pub pre_trigger_percent: u8,
    /// Overrides the derived ready-poll deadline.
    pub ready_timeout: Option<Duration>,
}

impl CaptureRequest {
    pub fn new(channel: Channel, voltage_range: VoltageRange, duration: Duration) -> Self {
        Self {
            channel,
            voltage_range,
            duration,
            trigger_threshold_volts: None,
            trigger_channel: None,
            pre_trigger_percent: 0,
            ready_timeout: None,
        }
    }

    pub fn with_threshold(mut self, volts: f64) -> Self {
        self.trigger_threshold_volts = Some(volts);
        self
    }

    pub fn with_trigger_channel(mut self, channel: Channel) -> Self {
        self.trigger_channel = Some(channel);
        self
    }

    pub fn with_pre_trigger_percent(mut self, percent: u8) -> Self {
        self.pre_trigger_percent = percent;
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = Some(timeout);
        self
    }

    fn ready_deadline(&self) -> Duration {
        self.ready_timeout
            .unwrap_or_else(|| self.duration * READY_TIMEOUT_FACTOR + READY_TIMEOUT_SLACK)
    }
}

/// One completed acquisition in physical units.
///
/// Both series have exactly `sample_count` entries with matching indices;
/// timestamps start at 0 and advance by `sample_interval`.
#[derive(Debug, Clone)]
pub struct CaptureResult {
    /// Timestamps in seconds, `i * sample_interval`.
    pub time_s: Vec<f64>,
    /// Sample values in millivolts.
    pub voltage_mv: Vec<f64>,
    pub sample_count: usize,
    pub sample_interval: Duration,
}

impl CaptureResult {
    /// Difference between the largest and smallest voltage in the window.
    pub fn peak_to_peak_mv(&self) -> f64 {
        if self.voltage_mv.is_empty() {
            return 0.0;
        }
        let max = self
            .voltage_mv
            .iter()
            .fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        let min = self.voltage_mv.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        max - min
    }

    /// Both series as a two-column DataFrame (`time`, `voltage_mv`).
    pub fn to_dataframe(&self) -> Result<DataFrame, PolarsError> {
        let time: Column = Series::new("time".into(), &self.time_s).into();
        let voltage: Column = Series::new("voltage_mv".into(), &self.voltage_mv).into();
        DataFrame::new(vec![time, voltage])
    }
}

/// Why a capture aborted.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CaptureError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("acquisition did not become ready within {waited:?}")]
    Timeout { waited: Duration },

    #[error("capture cancelled")]
    Cancelled,
}

/// Cooperative cancellation flag for a capture in flight.
///
/// Clone the token before starting the capture and call
/// [`CancelToken::cancel`] from elsewhere (e.g. a ctrl-c handler) to abort
/// the ready-poll deterministically.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl<D: Digitizer> ScopeSession<D> {
    /// Run one triggered block acquisition and return the waveform in
    /// physical units.
    pub fn capture(&mut self, request: &CaptureRequest) -> Result<CaptureResult, CaptureError> {
        self.capture_with_cancel(request, &CancelToken::new())
    }

    /// [`ScopeSession::capture`] with an external cancellation token.
    pub fn capture_with_cancel(
        &mut self,
        request: &CaptureRequest,
        cancel: &CancelToken,
    ) -> Result<CaptureResult, CaptureError> {
        // Request validation happens before any device call.
        if request.pre_trigger_percent > 100 {
            return Err(ConfigError::InvalidPreTrigger(request.pre_trigger_percent).into());
        }

        let result = self.run_capture(request, cancel);

        // Stopping the acquisition is the final device effect on every
        // path, including timeouts and retrieval failures.
        let stopped = self.driver.stop();
        match result {
            Ok(capture) => {
                stopped?;
                Ok(capture)
            }
            Err(e) => {
                let _ = stopped;
                Err(e)
            }
        }
    }

    fn run_capture(
        &mut self,
        request: &CaptureRequest,
        cancel: &CancelToken,
    ) -> Result<CaptureResult, CaptureError> {
        let range = request.voltage_range;
        let trigger_channel = request.trigger_channel.unwrap_or(request.channel);
        if trigger_channel != request.channel {
            log::warn!(
                "trigger watches channel {trigger_channel:?} while capturing {:?}",
                request.channel
            );
        }

        self.driver
            .configure_channel(request.channel, true, Coupling::Dc, range)?;

        let threshold_counts = request
            .trigger_threshold_volts
            .map_or(0, |volts| units::threshold_to_counts(volts, range, self.driver.adc_bits()));
        self.driver.configure_trigger(
            trigger_channel,
            threshold_counts,
            TriggerDirection::Rising,
            0,
        )?;

        let info = self
            .driver
            .get_timebase(DEFAULT_TIMEBASE, TIMEBASE_SAMPLE_HINT)?;
        log::debug!(
            "timebase {DEFAULT_TIMEBASE}: interval {:?}, capacity {} samples",
            info.sample_interval,
            info.max_samples
        );

        let total_samples = samples_for_duration(request.duration, info.sample_interval)?;
        if total_samples > info.max_samples {
            return Err(DeviceError::TimebaseUnavailable {
                timebase: DEFAULT_TIMEBASE,
                samples: total_samples,
            }
            .into());
        }
        let (pre_samples, post_samples) =
            split_pre_post(total_samples, request.pre_trigger_percent)?;
        log::debug!("capturing {total_samples} samples ({pre_samples} pre-trigger)");

        self.driver
            .run_block(pre_samples, post_samples, DEFAULT_TIMEBASE)?;
        self.wait_ready(request.ready_deadline(), cancel)?;

        let mut raw = vec![0i16; total_samples as usize];
        let retrieved = self.driver.retrieve_samples(&mut raw)?;
        raw.truncate(retrieved);

        let max_adc_code = self.max_adc_code()?;
        let voltage_mv = units::counts_to_millivolts(&raw, range, max_adc_code);
        let dt = info.sample_interval.as_secs_f64();
        let time_s = (0..voltage_mv.len()).map(|i| i as f64 * dt).collect();

        Ok(CaptureResult {
            time_s,
            sample_count: voltage_mv.len(),
            voltage_mv,
            sample_interval: info.sample_interval,
        })
    }

    /// Bounded, cancellable replacement for the driver's busy-wait: polls
    /// readiness with a cooperative sleep until `timeout` elapses.
    fn wait_ready(&mut self, timeout: Duration, cancel: &CancelToken) -> Result<(), CaptureError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.driver.is_ready()? {
                return Ok(());
            }
            if cancel.is_cancelled() {
                return Err(CaptureError::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(CaptureError::Timeout { waited: timeout });
            }
            thread::sleep(READY_POLL_INTERVAL);
        }
    }
}

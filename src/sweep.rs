//! Frequency sweep: one stimulus tone and one block capture per frequency,
//! reduced to a peak-to-peak response curve.

use std::time::Duration;

use polars::prelude::*;

use crate::capture::{CancelToken, CaptureError, CaptureRequest};
use crate::digitizer::{Digitizer, ScopeSession};
use crate::generator::StimulusConfig;
use crate::units::ConfigError;

/// Number of stimulus cycles each capture window spans. Enough cycles for a
/// stable peak-to-peak read at low frequencies while bounding total capture
/// time at high frequencies.
pub const DEFAULT_CYCLES_PER_CAPTURE: f64 = 2000.0;

/// Spacing of generated sweep frequencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisScale {
    Log,
    Linear,
}

/// What to do when a single frequency point fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Abort the sweep, returning the partial result inside the error.
    Abort,
    /// Record the gap and continue with the next frequency.
    SkipPoint,
}

/// Sweep parameters, passed in explicitly at invocation time.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub start_frequency_hz: f64,
    pub end_frequency_hz: f64,
    pub step_count: usize,
    pub axis_scale: AxisScale,
    pub cycles_per_capture: f64,
    pub on_error: ErrorPolicy,
}

impl SweepConfig {
    /// Logarithmic sweep with the default cycles-per-capture and abort-on-
    /// error policy.
    pub fn new(start_frequency_hz: f64, end_frequency_hz: f64, step_count: usize) -> Self {
        Self {
            start_frequency_hz,
            end_frequency_hz,
            step_count,
            axis_scale: AxisScale::Log,
            cycles_per_capture: DEFAULT_CYCLES_PER_CAPTURE,
            on_error: ErrorPolicy::Abort,
        }
    }

    pub fn linear(mut self) -> Self {
        self.axis_scale = AxisScale::Linear;
        self
    }

    pub fn with_cycles_per_capture(mut self, cycles: f64) -> Self {
        self.cycles_per_capture = cycles;
        self
    }

    pub fn skip_failed_points(mut self) -> Self {
        self.on_error = ErrorPolicy::SkipPoint;
        self
    }

    /// Generate the sweep's frequency list. `run_sweep` accepts any ordered
    /// slice of positive frequencies; this is the common case.
    pub fn frequencies(&self) -> Vec<f64> {
        let n = self.step_count;
        if n == 0 {
            return Vec::new();
        }
        if n == 1 {
            return vec![self.start_frequency_hz];
        }
        (0..n)
            .map(|i| {
                let fraction = i as f64 / (n - 1) as f64;
                match self.axis_scale {
                    AxisScale::Log => {
                        self.start_frequency_hz
                            * (self.end_frequency_hz / self.start_frequency_hz).powf(fraction)
                    }
                    AxisScale::Linear => {
                        self.start_frequency_hz
                            + (self.end_frequency_hz - self.start_frequency_hz) * fraction
                    }
                }
            })
            .collect()
    }

    /// Capture window for one frequency: `cycles_per_capture` periods.
    pub fn capture_duration(&self, frequency_hz: f64) -> Duration {
        Duration::from_secs_f64(self.cycles_per_capture / frequency_hz)
    }
}

/// One measured point of the response curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepPoint {
    pub frequency_hz: f64,
    pub peak_to_peak_mv: f64,
}

/// A frequency point dropped under [`ErrorPolicy::SkipPoint`].
#[derive(Debug, Clone)]
pub struct SkippedPoint {
    pub frequency_hz: f64,
    pub error: CaptureError,
}

/// Accumulated response curve. Point order equals input frequency order.
#[derive(Debug, Clone, Default)]
pub struct SweepResult {
    pub points: Vec<SweepPoint>,
    pub skipped: Vec<SkippedPoint>,
}

impl SweepResult {
    /// The curve as a two-column DataFrame (`frequency_hz`, `amplitude_mv`),
    /// ready for downstream plotting or export.
    pub fn to_dataframe(&self) -> Result<DataFrame, PolarsError> {
        let frequency: Column = Series::new(
            "frequency_hz".into(),
            self.points.iter().map(|p| p.frequency_hz).collect::<Vec<_>>(),
        )
        .into();
        let amplitude: Column = Series::new(
            "amplitude_mv".into(),
            self.points
                .iter()
                .map(|p| p.peak_to_peak_mv)
                .collect::<Vec<_>>(),
        )
        .into();
        DataFrame::new(vec![frequency, amplitude])
    }
}

/// The sweep aborted partway through. Carries whatever was measured before
/// the failing frequency.
#[derive(Debug, thiserror::Error)]
#[error("sweep aborted at {frequency_hz} Hz after {} points: {source}", partial.points.len())]
pub struct SweepError {
    pub frequency_hz: f64,
    pub partial: SweepResult,
    #[source]
    pub source: CaptureError,
}

/// Drives the sweep: owns the device session for the sweep's duration.
///
/// Idle between calls; one `run_sweep` call is one sweep. The session can be
/// taken back with [`SweepController::into_session`].
pub struct SweepController<D: Digitizer> {
    session: ScopeSession<D>,
    config: SweepConfig,
}

impl<D: Digitizer> SweepController<D> {
    pub fn new(session: ScopeSession<D>, config: SweepConfig) -> Self {
        Self { session, config }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    pub fn into_session(self) -> ScopeSession<D> {
        self.session
    }

    /// Sweep across `frequencies` in order. `capture_template` supplies the
    /// channel, range and trigger settings; its duration is replaced by the
    /// per-frequency window derived from `cycles_per_capture`. The
    /// `stimulus` frequency is likewise substituted per point.
    pub fn run_sweep(
        &mut self,
        frequencies: &[f64],
        stimulus: &StimulusConfig,
        capture_template: &CaptureRequest,
    ) -> Result<SweepResult, SweepError> {
        self.run_sweep_with_cancel(frequencies, stimulus, capture_template, &CancelToken::new())
    }

    /// [`SweepController::run_sweep`] with an external cancellation token.
    /// Cancellation always aborts, regardless of the error policy.
    pub fn run_sweep_with_cancel(
        &mut self,
        frequencies: &[f64],
        stimulus: &StimulusConfig,
        capture_template: &CaptureRequest,
        cancel: &CancelToken,
    ) -> Result<SweepResult, SweepError> {
        let mut result = SweepResult::default();

        for &frequency_hz in frequencies {
            match self.measure_point(frequency_hz, stimulus, capture_template, cancel) {
                Ok(peak_to_peak_mv) => {
                    log::debug!("{frequency_hz:.1} Hz: {peak_to_peak_mv:.2} mVpp");
                    result.points.push(SweepPoint {
                        frequency_hz,
                        peak_to_peak_mv,
                    });
                }
                Err(error) => {
                    let abort = self.config.on_error == ErrorPolicy::Abort
                        || matches!(error, CaptureError::Cancelled);
                    if abort {
                        return Err(SweepError {
                            frequency_hz,
                            partial: result,
                            source: error,
                        });
                    }
                    log::warn!("skipping {frequency_hz:.1} Hz: {error}");
                    result.skipped.push(SkippedPoint {
                        frequency_hz,
                        error,
                    });
                }
            }
        }

        Ok(result)
    }

    fn measure_point(
        &mut self,
        frequency_hz: f64,
        stimulus: &StimulusConfig,
        capture_template: &CaptureRequest,
        cancel: &CancelToken,
    ) -> Result<f64, CaptureError> {
        if !(frequency_hz > 0.0) {
            return Err(ConfigError::InvalidFrequency(frequency_hz).into());
        }

        let tone = StimulusConfig {
            frequency_hz,
            ..*stimulus
        };
        self.session.set_stimulus(&tone)?;

        let request = CaptureRequest {
            duration: self.config.capture_duration(frequency_hz),
            ..capture_template.clone()
        };
        let capture = self.session.capture_with_cancel(&request, cancel)?;
        Ok(capture.peak_to_peak_mv())
    }
}

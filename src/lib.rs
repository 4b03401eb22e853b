//! # bodescope
//!
//! Frequency response sweeps for block-mode digitizers with a built-in
//! signal generator.
//!
//! The crate drives a sine tone at a sequence of frequencies through the
//! device's signal generator, runs one triggered block capture per
//! frequency, and reduces each captured waveform to a peak-to-peak
//! amplitude, yielding an ordered (frequency, amplitude) response curve.
//!
//! Vendor drivers sit behind the [`Digitizer`] capability trait, so the one
//! capture engine serves every hardware series; the concrete implementation
//! is chosen once, at session-open time.
//!
//! ## Features
//!
//! - **Unit conversion**: physical volts/durations to device-native range
//!   codes, ADC counts and sample counts, and back
//! - **Block capture**: one call drives configure → run → poll → retrieve →
//!   convert → stop, with a bounded, cancellable ready-wait
//! - **Sweep control**: per-frequency capture windows derived from a fixed
//!   cycle count, with abort or skip-point error policies
//! - **DataFrame output**: `polars` export of capture and sweep series
//!
//! ## Example
//!
//! ```rust,no_run
//! use bodescope::{
//!     CaptureRequest, Channel, Digitizer, ScopeSession, StimulusConfig, SweepConfig,
//!     SweepController, VoltageRange,
//! };
//! use std::time::Duration;
//!
//! fn measure<D: Digitizer>(driver: D) -> Result<(), Box<dyn std::error::Error>> {
//!     let session = ScopeSession::open(driver)?;
//!
//!     let config = SweepConfig::new(100.0, 20_000.0, 1000);
//!     let frequencies = config.frequencies();
//!     let mut controller = SweepController::new(session, config);
//!
//!     let stimulus = StimulusConfig::sine(0.9, 0.0); // frequency set per point
//!     let capture = CaptureRequest::new(
//!         Channel::A,
//!         VoltageRange::Mv500,
//!         Duration::from_millis(1), // replaced by the derived window
//!     )
//!     .with_threshold(0.2);
//!
//!     let curve = controller.run_sweep(&frequencies, &stimulus, &capture)?;
//!     for point in &curve.points {
//!         println!("{:.1} Hz: {:.2} mVpp", point.frequency_hz, point.peak_to_peak_mv);
//!     }
//!     Ok(())
//! }
//! ```

pub mod capture;
pub mod digitizer;
pub mod generator;
pub mod sweep;
pub mod timebase;
pub mod units;

// Re-export the main types for convenience
pub use capture::{CancelToken, CaptureError, CaptureRequest, CaptureResult};

pub use digitizer::{
    Channel, Coupling, DeviceError, Digitizer, OpenError, PowerSource, ScopeSession,
    TriggerDirection, Waveform,
};

pub use generator::StimulusConfig;

pub use sweep::{
    AxisScale, ErrorPolicy, SkippedPoint, SweepConfig, SweepController, SweepError, SweepPoint,
    SweepResult,
};

pub use timebase::TimebaseInfo;

pub use units::{ConfigError, VoltageRange};

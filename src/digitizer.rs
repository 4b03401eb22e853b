//! Capability interface over the vendor digitizer driver, plus the owned
//! device session.
//!
//! Two hardware series share the exact same acquisition logic and differ
//! only in which driver namespace they call. The [`Digitizer`] trait is that
//! shared surface; the concrete implementation is selected once, when the
//! device is opened, never per call.

use crate::timebase::TimebaseInfo;
use crate::units::VoltageRange;

/// Analog input channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    A,
    B,
}

impl Channel {
    /// Device-native channel index.
    pub fn index(self) -> u32 {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

/// Input coupling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coupling {
    Ac,
    Dc,
}

/// Edge direction for the simple trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDirection {
    Rising,
    Falling,
}

/// Built-in signal generator waveform shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
    Triangle,
    RampUp,
    RampDown,
    DcVoltage,
}

impl Waveform {
    /// Device-native waveform code.
    pub fn code(self) -> u32 {
        match self {
            Self::Sine => 0,
            Self::Square => 1,
            Self::Triangle => 2,
            Self::RampUp => 3,
            Self::RampDown => 4,
            Self::DcVoltage => 5,
        }
    }
}

/// Power-source conditions the driver can report at open time. Both are
/// recoverable by renegotiating the power source once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerSource {
    /// The external supply is not connected (the device runs on USB power).
    SupplyNotConnected,
    /// A USB 3.0 device is plugged into a non-USB 3.0 port.
    Usb3DeviceOnUsb2Port,
}

/// Failure to open the device session.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OpenError {
    #[error("device requested a power source renegotiation ({0:?})")]
    PowerSource(PowerSource),

    #[error("failed to open digitizer: {0}")]
    Fatal(String),
}

/// The device rejected a protocol step. Surfaced immediately; aborts the
/// current capture with no automatic retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("timebase {timebase} with {samples} samples exceeds device limits")]
    TimebaseUnavailable { timebase: u32, samples: u32 },

    #[error("device is busy with a previous acquisition")]
    Busy,

    #[error("input overflow while retrieving samples")]
    Overflow,

    #[error("signal generator rejected the stimulus: {0}")]
    SignalGenerator(String),

    #[error("driver call failed: {0}")]
    Driver(String),
}

/// Driver primitives for one block-mode digitizer with a built-in signal
/// generator.
///
/// Implementations wrap the vendor SDK for a specific hardware series and
/// are assumed to expose these operations as already-correct primitives.
/// Sessions are not thread-safe by contract; a driver instance has exactly
/// one logical owner at a time.
pub trait Digitizer {
    /// Open the unit. May report a recoverable [`OpenError::PowerSource`]
    /// condition that [`ScopeSession::open`] resolves by calling
    /// [`Digitizer::change_power_source`] once.
    fn open(&mut self) -> Result<(), OpenError>;

    /// Renegotiate the power source after a recoverable open failure.
    fn change_power_source(&mut self, source: PowerSource) -> Result<(), OpenError>;

    fn configure_channel(
        &mut self,
        channel: Channel,
        enabled: bool,
        coupling: Coupling,
        range: VoltageRange,
    ) -> Result<(), DeviceError>;

    /// Arm a single edge trigger at `threshold_counts` on `channel`.
    fn configure_trigger(
        &mut self,
        channel: Channel,
        threshold_counts: i32,
        direction: TriggerDirection,
        delay_samples: u32,
    ) -> Result<(), DeviceError>;

    /// Resolve a timebase index to a sample interval and buffer capacity.
    fn get_timebase(&mut self, timebase: u32, sample_hint: u32)
        -> Result<TimebaseInfo, DeviceError>;

    /// Launch a triggered block acquisition.
    fn run_block(
        &mut self,
        pre_samples: u32,
        post_samples: u32,
        timebase: u32,
    ) -> Result<(), DeviceError>;

    /// Whether the block acquisition launched by `run_block` has completed.
    fn is_ready(&mut self) -> Result<bool, DeviceError>;

    /// Copy the acquired raw counts into `buffer`. Returns the number of
    /// samples actually written.
    fn retrieve_samples(&mut self, buffer: &mut [i16]) -> Result<usize, DeviceError>;

    /// The device's maximum ADC count (its saturation constant).
    fn max_adc_code(&mut self) -> Result<i32, DeviceError>;

    /// ADC resolution in bits, used for trigger threshold conversion.
    fn adc_bits(&self) -> u32 {
        16
    }

    /// Program the built-in waveform generator with a fixed tone: equal
    /// start/stop frequency, zero sweep rate, single-shot trigger-immediate
    /// mode. Amplitude and offset are in integer microvolts.
    fn set_stimulus(
        &mut self,
        waveform: Waveform,
        amplitude_microvolts: i32,
        frequency_hz: f64,
        offset_microvolts: i32,
    ) -> Result<(), DeviceError>;

    /// Stop any acquisition in progress.
    fn stop(&mut self) -> Result<(), DeviceError>;

    /// Release the device handle. Called exactly once, on session drop.
    fn close(&mut self);
}

/// Exclusive handle to an open digitizer session.
///
/// Owns the driver for the session's lifetime; stopping and closing happen
/// exactly once, on drop, on every exit path. Each driver call returns its
/// own result value; there is no shared status side channel.
pub struct ScopeSession<D: Digitizer> {
    pub(crate) driver: D,
    max_adc_code: Option<i32>,
}

impl<D: Digitizer> ScopeSession<D> {
    /// Open the device, renegotiating the power source once if the driver
    /// asks for it. Any other open failure is fatal.
    pub fn open(mut driver: D) -> Result<Self, OpenError> {
        match driver.open() {
            Ok(()) => {}
            Err(OpenError::PowerSource(source)) => {
                log::warn!("digitizer requested power source renegotiation: {source:?}");
                driver.change_power_source(source)?;
            }
            Err(e) => return Err(e),
        }
        Ok(Self {
            driver,
            max_adc_code: None,
        })
    }

    /// The device's maximum ADC count, queried once and cached for the
    /// session. The cache is valid only while this session is open.
    pub(crate) fn max_adc_code(&mut self) -> Result<i32, DeviceError> {
        if let Some(code) = self.max_adc_code {
            return Ok(code);
        }
        let code = self.driver.max_adc_code()?;
        log::debug!("device max ADC code: {code}");
        self.max_adc_code = Some(code);
        Ok(code)
    }
}

impl<D: Digitizer> Drop for ScopeSession<D> {
    fn drop(&mut self) {
        let _ = self.driver.stop();
        self.driver.close();
    }
}

/// Scripted digitizer for unit tests: records every call, synthesizes
/// samples from a plain function, and fails on demand.
#[cfg(test)]
pub(crate) mod mock {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    use super::{
        Channel, Coupling, DeviceError, Digitizer, OpenError, PowerSource, TriggerDirection,
        Waveform,
    };
    use crate::timebase::TimebaseInfo;
    use crate::units::VoltageRange;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Open,
        ChangePowerSource(PowerSource),
        ConfigureChannel {
            channel: Channel,
            enabled: bool,
            coupling: Coupling,
            range: VoltageRange,
        },
        ConfigureTrigger {
            channel: Channel,
            threshold_counts: i32,
            direction: TriggerDirection,
        },
        GetTimebase {
            timebase: u32,
            sample_hint: u32,
        },
        RunBlock {
            pre: u32,
            post: u32,
            timebase: u32,
        },
        RetrieveSamples {
            capacity: usize,
        },
        MaxAdcCode,
        SetStimulus {
            waveform: Waveform,
            amplitude_microvolts: i32,
            frequency_hz: f64,
            offset_microvolts: i32,
        },
        Stop,
        Close,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum OpenBehavior {
        Ok,
        NeedsPower(PowerSource),
        /// Renegotiation fails too.
        PowerUnrecoverable(PowerSource),
        Fatal,
    }

    pub(crate) struct MockState {
        pub calls: Vec<Call>,
        pub sample_interval: Duration,
        pub max_samples: u32,
        pub max_adc_code: i32,
        pub open_behavior: OpenBehavior,
        /// `is_ready` reports true after this many polls. `None` = never.
        pub ready_after_polls: Option<u32>,
        pub polls: u32,
        pub closes: u32,
        /// Synthesized raw count for sample index `i`.
        pub sample_fn: fn(usize) -> i16,
        /// Fail the Nth (0-based) `set_stimulus` call.
        pub fail_stimulus_at: Option<u32>,
        pub stimulus_calls: u32,
        pub fail_timebase: bool,
        pub fail_retrieve: bool,
    }

    impl Default for MockState {
        fn default() -> Self {
            Self {
                calls: Vec::new(),
                sample_interval: Duration::from_nanos(4),
                max_samples: 100_000_000,
                max_adc_code: 32767,
                open_behavior: OpenBehavior::Ok,
                ready_after_polls: Some(0),
                polls: 0,
                closes: 0,
                sample_fn: |i| (i % 100) as i16,
                fail_stimulus_at: None,
                stimulus_calls: 0,
                fail_timebase: false,
                fail_retrieve: false,
            }
        }
    }

    pub(crate) struct MockDigitizer {
        pub state: Rc<RefCell<MockState>>,
    }

    impl MockDigitizer {
        pub fn new() -> (Self, Rc<RefCell<MockState>>) {
            let state = Rc::new(RefCell::new(MockState::default()));
            (
                Self {
                    state: Rc::clone(&state),
                },
                state,
            )
        }
    }

    impl Digitizer for MockDigitizer {
        fn open(&mut self) -> Result<(), OpenError> {
            let mut state = self.state.borrow_mut();
            state.calls.push(Call::Open);
            match state.open_behavior {
                OpenBehavior::Ok => Ok(()),
                OpenBehavior::NeedsPower(source)
                | OpenBehavior::PowerUnrecoverable(source) => {
                    Err(OpenError::PowerSource(source))
                }
                OpenBehavior::Fatal => Err(OpenError::Fatal("unit not found".into())),
            }
        }

        fn change_power_source(&mut self, source: PowerSource) -> Result<(), OpenError> {
            let mut state = self.state.borrow_mut();
            state.calls.push(Call::ChangePowerSource(source));
            match state.open_behavior {
                OpenBehavior::PowerUnrecoverable(_) => {
                    Err(OpenError::Fatal("power source renegotiation failed".into()))
                }
                _ => Ok(()),
            }
        }

        fn configure_channel(
            &mut self,
            channel: Channel,
            enabled: bool,
            coupling: Coupling,
            range: VoltageRange,
        ) -> Result<(), DeviceError> {
            self.state.borrow_mut().calls.push(Call::ConfigureChannel {
                channel,
                enabled,
                coupling,
                range,
            });
            Ok(())
        }

        fn configure_trigger(
            &mut self,
            channel: Channel,
            threshold_counts: i32,
            direction: TriggerDirection,
            _delay_samples: u32,
        ) -> Result<(), DeviceError> {
            self.state.borrow_mut().calls.push(Call::ConfigureTrigger {
                channel,
                threshold_counts,
                direction,
            });
            Ok(())
        }

        fn get_timebase(
            &mut self,
            timebase: u32,
            sample_hint: u32,
        ) -> Result<TimebaseInfo, DeviceError> {
            let mut state = self.state.borrow_mut();
            state.calls.push(Call::GetTimebase {
                timebase,
                sample_hint,
            });
            if state.fail_timebase {
                return Err(DeviceError::TimebaseUnavailable {
                    timebase,
                    samples: sample_hint,
                });
            }
            Ok(TimebaseInfo {
                sample_interval: state.sample_interval,
                max_samples: state.max_samples,
            })
        }

        fn run_block(
            &mut self,
            pre_samples: u32,
            post_samples: u32,
            timebase: u32,
        ) -> Result<(), DeviceError> {
            let mut state = self.state.borrow_mut();
            state.polls = 0;
            state.calls.push(Call::RunBlock {
                pre: pre_samples,
                post: post_samples,
                timebase,
            });
            Ok(())
        }

        fn is_ready(&mut self) -> Result<bool, DeviceError> {
            let mut state = self.state.borrow_mut();
            let ready = state
                .ready_after_polls
                .is_some_and(|after| state.polls >= after);
            state.polls += 1;
            Ok(ready)
        }

        fn retrieve_samples(&mut self, buffer: &mut [i16]) -> Result<usize, DeviceError> {
            let mut state = self.state.borrow_mut();
            state.calls.push(Call::RetrieveSamples {
                capacity: buffer.len(),
            });
            if state.fail_retrieve {
                return Err(DeviceError::Overflow);
            }
            for (i, slot) in buffer.iter_mut().enumerate() {
                *slot = (state.sample_fn)(i);
            }
            Ok(buffer.len())
        }

        fn max_adc_code(&mut self) -> Result<i32, DeviceError> {
            let mut state = self.state.borrow_mut();
            state.calls.push(Call::MaxAdcCode);
            Ok(state.max_adc_code)
        }

        fn set_stimulus(
            &mut self,
            waveform: Waveform,
            amplitude_microvolts: i32,
            frequency_hz: f64,
            offset_microvolts: i32,
        ) -> Result<(), DeviceError> {
            let mut state = self.state.borrow_mut();
            let call_index = state.stimulus_calls;
            state.stimulus_calls += 1;
            state.calls.push(Call::SetStimulus {
                waveform,
                amplitude_microvolts,
                frequency_hz,
                offset_microvolts,
            });
            if state.fail_stimulus_at == Some(call_index) {
                return Err(DeviceError::SignalGenerator("amplitude out of range".into()));
            }
            Ok(())
        }

        fn stop(&mut self) -> Result<(), DeviceError> {
            self.state.borrow_mut().calls.push(Call::Stop);
            Ok(())
        }

        fn close(&mut self) {
            let mut state = self.state.borrow_mut();
            state.calls.push(Call::Close);
            state.closes += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{Call, MockDigitizer, OpenBehavior};
    use super::*;

    #[test]
    fn open_renegotiates_power_source_once() {
        let (driver, state) = MockDigitizer::new();
        state.borrow_mut().open_behavior =
            OpenBehavior::NeedsPower(PowerSource::SupplyNotConnected);

        let session = ScopeSession::open(driver).unwrap();
        drop(session);

        let calls = state.borrow().calls.clone();
        assert_eq!(calls[0], Call::Open);
        assert_eq!(
            calls[1],
            Call::ChangePowerSource(PowerSource::SupplyNotConnected)
        );
    }

    #[test]
    fn unrecoverable_power_failure_propagates() {
        let (driver, _state) = MockDigitizer::new();
        _state.borrow_mut().open_behavior =
            OpenBehavior::PowerUnrecoverable(PowerSource::Usb3DeviceOnUsb2Port);

        assert!(matches!(
            ScopeSession::open(driver),
            Err(OpenError::Fatal(_))
        ));
    }

    #[test]
    fn fatal_open_failure_propagates() {
        let (driver, state) = MockDigitizer::new();
        state.borrow_mut().open_behavior = OpenBehavior::Fatal;

        assert!(matches!(
            ScopeSession::open(driver),
            Err(OpenError::Fatal(_))
        ));
        // No renegotiation attempted for fatal failures.
        assert_eq!(state.borrow().calls, vec![Call::Open]);
    }

    #[test]
    fn session_drop_closes_exactly_once() {
        let (driver, state) = MockDigitizer::new();
        let session = ScopeSession::open(driver).unwrap();
        drop(session);

        let state = state.borrow();
        assert_eq!(state.closes, 1);
        assert_eq!(
            state.calls.last(),
            Some(&Call::Close),
            "close must be the final driver call"
        );
        assert!(state.calls.contains(&Call::Stop));
    }

    #[test]
    fn max_adc_code_is_cached_per_session() {
        let (driver, state) = MockDigitizer::new();
        let mut session = ScopeSession::open(driver).unwrap();

        assert_eq!(session.max_adc_code().unwrap(), 32767);
        assert_eq!(session.max_adc_code().unwrap(), 32767);

        let queries = state
            .borrow()
            .calls
            .iter()
            .filter(|c| **c == Call::MaxAdcCode)
            .count();
        assert_eq!(queries, 1);
    }

    #[test]
    fn waveform_and_channel_codes_are_stable() {
        assert_eq!(Waveform::Sine.code(), 0);
        assert_eq!(Waveform::Square.code(), 1);
        assert_eq!(Waveform::DcVoltage.code(), 5);
        assert_eq!(Channel::A.index(), 0);
        assert_eq!(Channel::B.index(), 1);
    }
}

// Frequency response sweep against a simulated device under test.
//
// A software digitizer stands in for real hardware: its "device under test"
// is a first-order RC low-pass filter, so the measured curve should roll off
// by 3 dB around the configured cutoff frequency.

use std::time::Duration;

use clap::Parser;

use bodescope::timebase::TimebaseInfo;
use bodescope::{
    CaptureRequest, Channel, Coupling, DeviceError, Digitizer, OpenError, PowerSource,
    ScopeSession, StimulusConfig, SweepConfig, SweepController, TriggerDirection, VoltageRange,
    Waveform,
};

#[derive(Parser, Debug)]
#[command(about = "Sweep a simulated low-pass filter and print its response curve")]
struct Args {
    /// Sweep start frequency in Hz
    #[arg(long, default_value_t = 100.0)]
    start: f64,

    /// Sweep end frequency in Hz
    #[arg(long, default_value_t = 20_000.0)]
    end: f64,

    /// Number of logarithmically spaced sweep points
    #[arg(long, default_value_t = 25)]
    steps: usize,

    /// Cutoff frequency of the simulated filter in Hz
    #[arg(long, default_value_t = 2_000.0)]
    cutoff: f64,

    /// Stimulus amplitude in volts
    #[arg(long, default_value_t = 0.2)]
    amplitude: f64,
}

/// Software digitizer wired through a first-order low-pass filter.
struct SimulatedScope {
    cutoff_hz: f64,
    range: VoltageRange,
    stimulus_frequency_hz: f64,
    stimulus_amplitude_v: f64,
    sample_interval: Duration,
}

impl SimulatedScope {
    const MAX_ADC_CODE: i32 = 32767;

    fn new(cutoff_hz: f64) -> Self {
        Self {
            cutoff_hz,
            range: VoltageRange::V1,
            stimulus_frequency_hz: 1000.0,
            stimulus_amplitude_v: 0.0,
            sample_interval: Duration::from_micros(1),
        }
    }
}

impl Digitizer for SimulatedScope {
    fn open(&mut self) -> Result<(), OpenError> {
        Ok(())
    }

    fn change_power_source(&mut self, _source: PowerSource) -> Result<(), OpenError> {
        Ok(())
    }

    fn configure_channel(
        &mut self,
        _channel: Channel,
        _enabled: bool,
        _coupling: Coupling,
        range: VoltageRange,
    ) -> Result<(), DeviceError> {
        self.range = range;
        Ok(())
    }

    fn configure_trigger(
        &mut self,
        _channel: Channel,
        _threshold_counts: i32,
        _direction: TriggerDirection,
        _delay_samples: u32,
    ) -> Result<(), DeviceError> {
        Ok(())
    }

    fn get_timebase(
        &mut self,
        _timebase: u32,
        _sample_hint: u32,
    ) -> Result<TimebaseInfo, DeviceError> {
        Ok(TimebaseInfo {
            sample_interval: self.sample_interval,
            max_samples: 64_000_000,
        })
    }

    fn run_block(
        &mut self,
        _pre_samples: u32,
        _post_samples: u32,
        _timebase: u32,
    ) -> Result<(), DeviceError> {
        Ok(())
    }

    fn is_ready(&mut self) -> Result<bool, DeviceError> {
        Ok(true)
    }

    fn retrieve_samples(&mut self, buffer: &mut [i16]) -> Result<usize, DeviceError> {
        // First-order low-pass gain at the stimulus frequency.
        let gain = 1.0 / (1.0 + (self.stimulus_frequency_hz / self.cutoff_hz).powi(2)).sqrt();
        let peak_counts = self.stimulus_amplitude_v * gain / self.range.volts()
            * f64::from(Self::MAX_ADC_CODE);

        let dt = self.sample_interval.as_secs_f64();
        let omega = std::f64::consts::TAU * self.stimulus_frequency_hz;
        for (i, slot) in buffer.iter_mut().enumerate() {
            *slot = (peak_counts * (omega * i as f64 * dt).sin()) as i16;
        }
        Ok(buffer.len())
    }

    fn max_adc_code(&mut self) -> Result<i32, DeviceError> {
        Ok(Self::MAX_ADC_CODE)
    }

    fn set_stimulus(
        &mut self,
        _waveform: Waveform,
        amplitude_microvolts: i32,
        frequency_hz: f64,
        _offset_microvolts: i32,
    ) -> Result<(), DeviceError> {
        self.stimulus_amplitude_v = f64::from(amplitude_microvolts) / 1_000_000.0;
        self.stimulus_frequency_hz = frequency_hz;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn close(&mut self) {}
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let session = ScopeSession::open(SimulatedScope::new(args.cutoff))?;

    let config = SweepConfig::new(args.start, args.end, args.steps)
        // Keep the demo fast; real measurements use the 2000-cycle default.
        .with_cycles_per_capture(50.0);
    let frequencies = config.frequencies();
    let mut controller = SweepController::new(session, config);

    let stimulus = StimulusConfig::sine(args.amplitude, 0.0);
    let capture = CaptureRequest::new(Channel::A, VoltageRange::Mv500, Duration::from_millis(1));

    let curve = controller.run_sweep(&frequencies, &stimulus, &capture)?;

    println!("{:>12}  {:>14}", "freq [Hz]", "Vpp [mV]");
    for point in &curve.points {
        println!("{:>12.1}  {:>14.2}", point.frequency_hz, point.peak_to_peak_mv);
    }
    println!("\n{}", curve.to_dataframe()?);

    Ok(())
}

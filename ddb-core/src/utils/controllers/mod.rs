//! Module Exports
//!
//! This file exports the hardware-facing controllers and the control loop that
//! ties them together.
//!
//! - `motor`: H-bridge channels and the two-wheel drive train.
//! - `imu`: MPU-6050 driver and the infallible sensor reader.
//! - `estop`: debounced emergency button.
//! - `interlock`: the safety state machine gating motor output.
//! - `status`: LED status indication.

pub mod estop;
pub mod imu;
pub mod interlock;
pub mod motor;
pub mod status;

use embassy_time::{Instant, Ticker};
use embedded_hal::{
    delay::DelayNs,
    digital::{InputPin, OutputPin},
    i2c::I2c,
};

use crate::utils::{
    config::ControlConfig,
    connection::gain::GainParameter,
};
use estop::EmergencyInput;
use imu::{ImuError, InertialSample, InertialSensor, Mpu6050, SensorReader};
use interlock::{InterlockDecision, InterlockState, SafetyInterlock};
use motor::{DriveCommand, DriveTrain, MotorChannel, NoStandby};

pub use status::{notify, StatusEvent, StatusIndicator, STATUS_CHANNEL};

/// Startup failures. The control loop must not start after one of these.
#[derive(Debug)]
pub enum InitError<E: core::fmt::Debug> {
    Imu(ImuError<E>),
}

/// Bring up the MPU-6050 with the configured accelerometer range.
pub fn init_imu<I2C, E>(
    i2c: I2C,
    address: u8,
    config: &ControlConfig,
    delay: &mut impl DelayNs,
) -> Result<Mpu6050<I2C>, InitError<E>>
where
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
{
    let mut imu = Mpu6050::new(i2c, address);
    imu.init(config.accel_range, delay).map_err(InitError::Imu)?;
    Ok(imu)
}

/// Outcome of one control cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub sample: InertialSample,
    pub emergency: bool,
    /// Gain used for this cycle's command.
    pub gain: f32,
    /// `gain × sample[drive_axis]` after mixing.
    pub computed: DriveCommand,
    /// What was sent to the drive train.
    pub applied: DriveCommand,
    pub decision: InterlockDecision,
    pub state: InterlockState,
    /// A heartbeat was emitted on this cycle.
    pub heartbeat: bool,
}

/// The fixed-period sense → decide → actuate loop.
///
/// Owns every piece of hardware it touches. The only thing it shares is the
/// gain cell, which it reads once at the end of each cycle; the value takes
/// effect on the next cycle.
pub struct SystemController<S, P, D, L, R, T = NoStandby> {
    sensor: SensorReader<S>,
    emergency: EmergencyInput<P, D>,
    interlock: SafetyInterlock,
    drive: DriveTrain<L, R, T>,
    gain_cell: &'static GainParameter,
    gain: f32,
    config: ControlConfig,
    cycles: u32,
}

impl<S, P, D, L, R, T> SystemController<S, P, D, L, R, T>
where
    S: InertialSensor,
    P: InputPin,
    D: DelayNs,
    L: MotorChannel,
    R: MotorChannel,
    T: OutputPin,
{
    pub fn new(
        sensor: S,
        emergency: EmergencyInput<P, D>,
        drive: DriveTrain<L, R, T>,
        gain_cell: &'static GainParameter,
        config: ControlConfig,
    ) -> Self {
        let mut drive = drive;
        drive.stop_all();
        SystemController {
            sensor: SensorReader::new(sensor),
            emergency,
            interlock: SafetyInterlock::new(config.interlock),
            drive,
            gain_cell,
            gain: gain_cell.get_gain(),
            config,
            cycles: 0,
        }
    }

    /// Run one control cycle at time `now`.
    pub fn step(
        &mut self,
        now: Instant,
    ) -> CycleReport {
        let sample = self.sensor.read();
        let emergency = self.emergency.is_active();

        let was_tripped = self.interlock.is_tripped();
        let decision = self.interlock.evaluate(&sample, emergency, now);
        let computed = self
            .config
            .mix
            .command(self.gain, sample.axis(self.config.drive_axis));
        let applied = match decision {
            InterlockDecision::Pass => computed,
            InterlockDecision::Override(forced) => forced,
        };
        self.drive.apply(applied);

        match (was_tripped, self.interlock.is_tripped()) {
            (false, true) => notify(StatusEvent::Tripped),
            (true, false) => notify(StatusEvent::Released),
            _ => {}
        }

        let every = self.config.heartbeat_every;
        let heartbeat = every != 0 && self.cycles % every == 0;
        let report = CycleReport {
            sample,
            emergency,
            gain: self.gain,
            computed,
            applied,
            decision,
            state: self.interlock.state(now),
            heartbeat,
        };
        tracing::trace!(?report, "cycle");

        let next = self.gain_cell.get_gain();
        if next.to_bits() != self.gain.to_bits() {
            tracing::info!(from = self.gain, to = next, "applying new gain");
        }
        self.gain = next;

        if heartbeat {
            notify(StatusEvent::Heartbeat);
            tracing::debug!(
                cycles = self.cycles,
                gain = self.gain,
                left = applied.left,
                right = applied.right,
                "heartbeat"
            );
        }
        self.cycles = self.cycles.wrapping_add(1);

        report
    }

    /// Drive `step` from a fixed-period ticker forever.
    pub async fn run(&mut self) -> ! {
        tracing::info!(period_ms = self.config.period_ms, gain = self.gain, "control loop started");
        let mut ticker = Ticker::every(self.config.period());
        loop {
            self.step(Instant::now());
            ticker.next().await;
        }
    }

    /// Gain that the next cycle will use.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn interlock(&self) -> &SafetyInterlock {
        &self.interlock
    }

    pub fn drive(&self) -> &DriveTrain<L, R, T> {
        &self.drive
    }

    pub fn sensor(&self) -> &SensorReader<S> {
        &self.sensor
    }

    pub fn cycles(&self) -> u32 {
        self.cycles
    }
}

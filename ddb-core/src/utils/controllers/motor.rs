//! Motor actuation for the two drive wheels.
//!
//! Each wheel is an H-bridge: two direction lines plus one PWM magnitude line.
//! Speeds are signed fractions in `[-1.0, 1.0]`; anything outside that range is
//! clamped rather than rejected, and write errors are logged and dropped, so
//! actuation never stalls the control loop.

use core::convert::Infallible;

use embedded_hal::{digital::OutputPin, pwm::SetDutyCycle};
use serde::Deserialize;

/// Wheel selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wheel {
    Left,
    Right,
}

/// Bridge direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Command for a single H-bridge, already scaled to the PWM resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorCommand {
    /// Duty counts, `0..=max_duty`.
    pub magnitude: u16,
    pub direction: Direction,
}

impl MotorCommand {
    pub const STOP: Self = Self {
        magnitude: 0,
        direction: Direction::Forward,
    };

    /// Map a signed speed onto `max_duty` counts.
    ///
    /// The speed is clamped to `[-1.0, 1.0]` and NaN counts as zero. The
    /// fractional duty is truncated.
    pub fn from_speed(
        speed: f32,
        max_duty: u16,
    ) -> Self {
        let speed = if speed.is_nan() {
            0.0
        } else {
            speed.clamp(-1.0, 1.0)
        };
        let direction = if speed >= 0.0 {
            Direction::Forward
        } else {
            Direction::Backward
        };
        Self {
            magnitude: (libm::fabsf(speed) * max_duty as f32) as u16,
            direction,
        }
    }

    pub fn is_stop(&self) -> bool {
        self.magnitude == 0
    }
}

/// Signed per-wheel speeds before scaling.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct DriveCommand {
    pub left: f32,
    pub right: f32,
}

impl DriveCommand {
    pub const STOP: Self = Self {
        left: 0.0,
        right: 0.0,
    };

    pub fn new(
        left: f32,
        right: f32,
    ) -> Self {
        Self { left, right }
    }
}

/// One motor output.
///
/// Implementations always accept the command; there is no error path.
pub trait MotorChannel {
    /// Full-scale duty count of the PWM output.
    fn max_duty(&self) -> u16;

    fn apply(
        &mut self,
        command: MotorCommand,
    );

    /// Put the bridge in its non-driving state.
    fn stop(&mut self) {
        self.apply(MotorCommand::STOP);
    }
}

/// H-bridge channel built from a PWM output and two direction lines.
///
/// A zero magnitude drives both direction lines low (coast).
pub struct HBridge<P, F, B> {
    pwm: P,
    forward: F,
    backward: B,
}

impl<P, F, B> HBridge<P, F, B>
where
    P: SetDutyCycle,
    F: OutputPin,
    B: OutputPin,
{
    pub fn new(
        pwm: P,
        forward: F,
        backward: B,
    ) -> Self {
        let mut bridge = Self {
            pwm,
            forward,
            backward,
        };
        bridge.stop();
        bridge
    }

    fn set_lines(
        &mut self,
        direction: Option<Direction>,
    ) {
        // Release the inactive line first so both are never high together.
        match direction {
            Some(Direction::Forward) => {
                drive(&mut self.backward, false);
                drive(&mut self.forward, true);
            }
            Some(Direction::Backward) => {
                drive(&mut self.forward, false);
                drive(&mut self.backward, true);
            }
            None => {
                drive(&mut self.forward, false);
                drive(&mut self.backward, false);
            }
        }
    }
}

fn drive<T: OutputPin>(
    pin: &mut T,
    high: bool,
) {
    let res = if high { pin.set_high() } else { pin.set_low() };
    if let Err(error) = res {
        tracing::error!(?error, "output line write failed");
    }
}

impl<P, F, B> MotorChannel for HBridge<P, F, B>
where
    P: SetDutyCycle,
    F: OutputPin,
    B: OutputPin,
{
    fn max_duty(&self) -> u16 {
        self.pwm.max_duty_cycle()
    }

    fn apply(
        &mut self,
        command: MotorCommand,
    ) {
        let duty = command.magnitude.min(self.pwm.max_duty_cycle());
        if duty == 0 {
            if let Err(error) = self.pwm.set_duty_cycle(0) {
                tracing::error!(?error, "PWM write failed");
            }
            self.set_lines(None);
            return;
        }

        self.set_lines(Some(command.direction));
        if let Err(error) = self.pwm.set_duty_cycle(duty) {
            tracing::error!(?error, "PWM write failed");
        }
    }
}

/// Standby line for bridge drivers that have none.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoStandby;

impl embedded_hal::digital::ErrorType for NoStandby {
    type Error = Infallible;
}

impl OutputPin for NoStandby {
    fn set_low(&mut self) -> Result<(), Infallible> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

/// Left and right channels of a differential drive.
///
/// `S` is the driver's shared active-high standby (enable) line. It is raised
/// once at construction and left high.
pub struct DriveTrain<L, R, S = NoStandby> {
    left: L,
    right: R,
    standby: S,
    last: [MotorCommand; 2],
}

impl<L, R> DriveTrain<L, R, NoStandby>
where
    L: MotorChannel,
    R: MotorChannel,
{
    pub fn new(
        left: L,
        right: R,
    ) -> Self {
        Self::with_standby(left, right, NoStandby)
    }
}

impl<L, R, S> DriveTrain<L, R, S>
where
    L: MotorChannel,
    R: MotorChannel,
    S: OutputPin,
{
    /// Take the bridge driver out of standby and own its enable line.
    pub fn with_standby(
        left: L,
        right: R,
        standby: S,
    ) -> Self {
        let mut train = Self {
            left,
            right,
            standby,
            last: [MotorCommand::STOP; 2],
        };
        drive(&mut train.standby, true);
        train
    }

    /// Set one wheel to a signed speed in `[-1.0, 1.0]`; out-of-range values clamp.
    pub fn set_speed(
        &mut self,
        wheel: Wheel,
        speed: f32,
    ) {
        let command = match wheel {
            Wheel::Left => MotorCommand::from_speed(speed, self.left.max_duty()),
            Wheel::Right => MotorCommand::from_speed(speed, self.right.max_duty()),
        };
        self.send(wheel, command);
    }

    /// Equivalent to `set_speed(wheel, 0.0)`.
    pub fn stop(
        &mut self,
        wheel: Wheel,
    ) {
        self.set_speed(wheel, 0.0);
    }

    pub fn apply(
        &mut self,
        command: DriveCommand,
    ) {
        self.set_speed(Wheel::Left, command.left);
        self.set_speed(Wheel::Right, command.right);
    }

    pub fn stop_all(&mut self) {
        self.stop(Wheel::Left);
        self.stop(Wheel::Right);
    }

    /// Last command written to `wheel`.
    pub fn last(
        &self,
        wheel: Wheel,
    ) -> MotorCommand {
        self.last[wheel as usize]
    }

    pub fn channels(&self) -> (&L, &R) {
        (&self.left, &self.right)
    }

    fn send(
        &mut self,
        wheel: Wheel,
        command: MotorCommand,
    ) {
        match wheel {
            Wheel::Left => self.left.apply(command),
            Wheel::Right => self.right.apply(command),
        }
        self.last[wheel as usize] = command;
    }
}

//! Wheel mixing for a two-wheeled differential drive.
//!
//! The control law produces one signed effort, `gain × sensor value`. The mix
//! decides how that effort reaches the wheels: `Mirrored` drives them in
//! opposite directions (pivot in place), `Uniform` drives both the same way
//! (straight-line correction).
//!
//! # Example
//! ```rust
//! use ddb_core::utils::math::mixing::WheelMix;
//! let cmd = WheelMix::Mirrored.command(2.0, 0.2);
//! assert!((cmd.left - 0.4).abs() < 1e-6);
//! assert!((cmd.right + 0.4).abs() < 1e-6);
//! ```

use serde::Deserialize;

use crate::utils::controllers::motor::DriveCommand;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WheelMix {
    /// Left = +effort, right = -effort.
    #[default]
    Mirrored,
    /// Both wheels = effort.
    Uniform,
}

impl WheelMix {
    /// Proportional effort for one sensor reading.
    ///
    /// Not clamped; the drive train clamps when it scales to PWM counts, and
    /// efforts below one duty count truncate to zero there.
    pub fn effort(
        gain: f32,
        value: f32,
    ) -> f32 {
        gain * value
    }

    /// Distribute a signed effort over the two wheels.
    pub fn split(
        self,
        effort: f32,
    ) -> DriveCommand {
        match self {
            WheelMix::Mirrored => DriveCommand::new(effort, -effort),
            WheelMix::Uniform => DriveCommand::new(effort, effort),
        }
    }

    /// `split(effort(gain, value))`.
    pub fn command(
        self,
        gain: f32,
        value: f32,
    ) -> DriveCommand {
        self.split(Self::effort(gain, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirrored_drives_wheels_oppositely() {
        let cmd = WheelMix::Mirrored.command(2.0, 0.2);
        assert!((cmd.left - 0.4).abs() < 1e-6);
        assert!((cmd.right + 0.4).abs() < 1e-6);
    }

    #[test]
    fn uniform_drives_wheels_equally() {
        let cmd = WheelMix::Uniform.command(-1.5, 0.5);
        assert_eq!(cmd.left, cmd.right);
        assert!((cmd.left + 0.75).abs() < 1e-6);
    }

    #[test]
    fn effort_is_not_clamped_here() {
        assert_eq!(WheelMix::effort(10.0, 0.5), 5.0);
    }

    #[test]
    fn tiny_effort_passes_through_unchanged() {
        let cmd = WheelMix::Mirrored.command(1e-4, 1e-4);
        assert_eq!(cmd, DriveCommand::new(1e-4 * 1e-4, -(1e-4 * 1e-4)));
        assert!(cmd.left > 0.0);
    }
}

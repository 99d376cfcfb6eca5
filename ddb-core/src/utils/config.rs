//! Tunable constants for the control loop and the safety interlock.
//!
//! Every struct here implements `Default` with the reference tuning of the bot
//! and derives `Deserialize` with `#[serde(default)]`, so a host can override a
//! single field from JSON without restating the rest:
//!
//! ```rust
//! use ddb_core::utils::config::ControlConfig;
//! let cfg: ControlConfig = serde_json::from_str(r#"{"period_ms": 50}"#).unwrap();
//! assert_eq!(cfg.period_ms, 50);
//! assert_eq!(cfg.interlock.cooldown_ms, 4000);
//! ```

use embassy_time::Duration;
use serde::Deserialize;

use crate::utils::{
    controllers::{
        imu::{AccelRange, Axis},
        motor::DriveCommand,
    },
    math::mixing::WheelMix,
};

/// Default control cycle interval.
pub const DEFAULT_PERIOD_MS: u64 = 100;
/// Default interlock cooldown after a trip.
pub const DEFAULT_COOLDOWN_MS: u64 = 4000;
/// Default gyroscope trip threshold (deg/s).
pub const DEFAULT_GYRO_THRESHOLD_DPS: f32 = 420.0;
/// Default accelerometer trip threshold (g).
pub const DEFAULT_ACCEL_THRESHOLD_G: f32 = 0.85;
/// Default settle delay applied before confirming an emergency press.
pub const DEFAULT_EMERGENCY_SETTLE_US: u32 = 2_000;
/// Default limit on network association at startup.
pub const DEFAULT_ASSOCIATION_TIMEOUT_MS: u64 = 80_000;

/// Control loop configuration.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Fixed cycle interval (ms).
    pub period_ms: u64,
    /// Gain used until the first remote update arrives.
    pub initial_gain: f32,
    /// Sensor axis multiplied by the gain to produce the drive effort.
    pub drive_axis: Axis,
    /// How the effort is distributed over the two wheels.
    pub mix: WheelMix,
    /// Accelerometer measurement range programmed at init.
    pub accel_range: AccelRange,
    /// Emit a heartbeat status every N cycles (0 disables it).
    pub heartbeat_every: u32,
    /// Settle delay for the emergency input (µs).
    pub emergency_settle_us: u32,
    /// Startup fails if the network is not up within this time (ms).
    pub association_timeout_ms: u64,
    pub interlock: InterlockConfig,
}

impl ControlConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn association_timeout(&self) -> Duration {
        Duration::from_millis(self.association_timeout_ms)
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            period_ms: DEFAULT_PERIOD_MS,
            initial_gain: 0.0,
            drive_axis: Axis::AccelX,
            mix: WheelMix::Mirrored,
            accel_range: AccelRange::G2,
            heartbeat_every: 10,
            emergency_settle_us: DEFAULT_EMERGENCY_SETTLE_US,
            association_timeout_ms: DEFAULT_ASSOCIATION_TIMEOUT_MS,
            interlock: InterlockConfig::default(),
        }
    }
}

/// Safety interlock thresholds and timing.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct InterlockConfig {
    /// Accelerometer axis watched for excess tilt.
    pub accel_axis: Axis,
    /// Trip when `|accel[accel_axis]|` reaches this value (g).
    pub accel_threshold_g: f32,
    /// Gyroscope axis watched for excess rotation.
    pub gyro_axis: Axis,
    /// Trip when `|gyro[gyro_axis]|` reaches this value (deg/s).
    pub gyro_threshold_dps: f32,
    /// Fixed cooldown measured from the trip cycle (ms).
    pub cooldown_ms: u64,
    /// Command emitted on the cycle the interlock releases.
    ///
    /// Stop by default. Some builds resume at a fixed forward power here;
    /// that motion starts whether or not the trip condition has cleared.
    pub resume: DriveCommand,
}

impl InterlockConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Default for InterlockConfig {
    fn default() -> Self {
        Self {
            accel_axis: Axis::AccelX,
            accel_threshold_g: DEFAULT_ACCEL_THRESHOLD_G,
            gyro_axis: Axis::GyroY,
            gyro_threshold_dps: DEFAULT_GYRO_THRESHOLD_DPS,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            resume: DriveCommand::STOP,
        }
    }
}

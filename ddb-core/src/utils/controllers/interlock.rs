//! Safety interlock gating motor output.
//!
//! Two states. In `Normal` the control loop's command passes through. A trip
//! (excess tilt on the watched accelerometer axis, excess rate on the watched
//! gyroscope axis, or the emergency button) moves to `Tripped` and forces a
//! stop for a fixed cooldown that starts at the trip cycle. Triggers seen while
//! tripped do not move the deadline.
//!
//! Release is purely time-based: on the first cycle at or past the deadline the
//! interlock returns to `Normal` and emits the configured resume command without
//! re-checking the trip condition. If the condition is still present, the next
//! cycle trips again. That window is accepted behaviour.

use embassy_time::{Duration, Instant};

use crate::utils::{
    config::InterlockConfig,
    controllers::{imu::InertialSample, motor::DriveCommand},
};

/// Externally visible interlock state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterlockState {
    Normal,
    Tripped { remaining: Duration },
}

/// What the control loop must do with its computed command this cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InterlockDecision {
    /// Use the computed command.
    Pass,
    /// Replace the computed command.
    Override(DriveCommand),
}

/// Conditions that fired in one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TripCause {
    pub tilt: bool,
    pub rotation: bool,
    pub emergency: bool,
}

impl TripCause {
    pub fn any(&self) -> bool {
        self.tilt || self.rotation || self.emergency
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Normal,
    Tripped { until: Instant },
}

pub struct SafetyInterlock {
    config: InterlockConfig,
    phase: Phase,
    trips: u32,
}

impl SafetyInterlock {
    pub fn new(config: InterlockConfig) -> Self {
        Self {
            config,
            phase: Phase::Normal,
            trips: 0,
        }
    }

    /// Which trip conditions hold for `sample` and the emergency level.
    pub fn check(
        &self,
        sample: &InertialSample,
        emergency: bool,
    ) -> TripCause {
        let tilt = libm::fabsf(sample.axis(self.config.accel_axis));
        let rate = libm::fabsf(sample.axis(self.config.gyro_axis));
        TripCause {
            tilt: tilt >= self.config.accel_threshold_g,
            rotation: rate >= self.config.gyro_threshold_dps,
            emergency,
        }
    }

    /// Advance the state machine by one control cycle.
    pub fn evaluate(
        &mut self,
        sample: &InertialSample,
        emergency: bool,
        now: Instant,
    ) -> InterlockDecision {
        match self.phase {
            Phase::Tripped { until } if now >= until => {
                self.phase = Phase::Normal;
                tracing::info!(resume = ?self.config.resume, "interlock released");
                InterlockDecision::Override(self.config.resume)
            }
            Phase::Tripped { .. } => InterlockDecision::Override(DriveCommand::STOP),
            Phase::Normal => {
                let cause = self.check(sample, emergency);
                if !cause.any() {
                    return InterlockDecision::Pass;
                }
                self.phase = Phase::Tripped {
                    until: now + self.config.cooldown(),
                };
                self.trips = self.trips.wrapping_add(1);
                tracing::warn!(
                    ?cause,
                    accel = sample.axis(self.config.accel_axis),
                    gyro = sample.axis(self.config.gyro_axis),
                    cooldown_ms = self.config.cooldown_ms,
                    "interlock tripped"
                );
                InterlockDecision::Override(DriveCommand::STOP)
            }
        }
    }

    pub fn state(
        &self,
        now: Instant,
    ) -> InterlockState {
        match self.phase {
            Phase::Normal => InterlockState::Normal,
            Phase::Tripped { until } => InterlockState::Tripped {
                remaining: if now >= until {
                    Duration::from_ticks(0)
                } else {
                    until - now
                },
            },
        }
    }

    pub fn is_tripped(&self) -> bool {
        matches!(self.phase, Phase::Tripped { .. })
    }

    /// Number of NORMAL → TRIPPED transitions so far.
    pub fn trip_count(&self) -> u32 {
        self.trips
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::controllers::imu::Axis;

    const STOP: InterlockDecision = InterlockDecision::Override(DriveCommand::STOP);

    fn config() -> InterlockConfig {
        InterlockConfig {
            accel_axis: Axis::AccelX,
            accel_threshold_g: 0.8,
            gyro_axis: Axis::GyroY,
            gyro_threshold_dps: 420.0,
            cooldown_ms: 4000,
            resume: DriveCommand::STOP,
        }
    }

    fn sample(ax: f32, gy: f32) -> InertialSample {
        InertialSample {
            accel: [ax, 0.0, 1.0],
            gyro: [0.0, gy, 0.0],
            temperature: 25.0,
        }
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn below_thresholds_passes() {
        let mut il = SafetyInterlock::new(config());
        for (i, (ax, gy)) in [(0.0, 0.0), (0.79, -419.9), (-0.79, 419.0)].into_iter().enumerate() {
            assert_eq!(il.evaluate(&sample(ax, gy), false, at(i as u64 * 100)), InterlockDecision::Pass);
        }
        assert_eq!(il.state(at(300)), InterlockState::Normal);
        assert_eq!(il.trip_count(), 0);
    }

    #[test]
    fn each_condition_trips_at_threshold() {
        for (ax, gy, estop) in [(0.8, 0.0, false), (-0.8, 0.0, false), (0.0, -420.0, false), (0.0, 0.0, true)] {
            let mut il = SafetyInterlock::new(config());
            assert_eq!(il.evaluate(&sample(ax, gy), estop, at(0)), STOP);
            assert!(il.is_tripped());
        }
    }

    #[test]
    fn simultaneous_causes_count_once() {
        let mut il = SafetyInterlock::new(config());
        let cause = il.check(&sample(2.0, 500.0), true);
        assert!(cause.tilt && cause.rotation && cause.emergency);
        il.evaluate(&sample(2.0, 500.0), true, at(0));
        assert_eq!(il.trip_count(), 1);
    }

    #[test]
    fn cooldown_is_fixed_from_trip_cycle() {
        let mut il = SafetyInterlock::new(config());
        assert_eq!(il.evaluate(&sample(0.0, 450.0), false, at(1000)), STOP);

        // Retriggering at every cycle of the cooldown must not move the deadline.
        for t in (1100..5000).step_by(100) {
            assert_eq!(il.evaluate(&sample(1.5, 450.0), true, at(t)), STOP);
        }
        assert_eq!(
            il.state(at(4900)),
            InterlockState::Tripped {
                remaining: Duration::from_millis(100)
            }
        );
        assert_eq!(il.trip_count(), 1);

        // Released exactly 4000 ms after the trip.
        assert_eq!(il.evaluate(&sample(0.0, 0.0), false, at(5000)), STOP);
        assert_eq!(il.state(at(5000)), InterlockState::Normal);
        assert_eq!(il.evaluate(&sample(0.0, 0.0), false, at(5100)), InterlockDecision::Pass);
    }

    #[test]
    fn release_ignores_persisting_condition() {
        let mut il = SafetyInterlock::new(config());
        il.evaluate(&sample(0.0, 450.0), false, at(0));

        // Condition still present when the cooldown ends: released anyway.
        let d = il.evaluate(&sample(0.0, 450.0), false, at(4000));
        assert_eq!(d, STOP);
        assert!(!il.is_tripped());

        // The next cycle sees it again and trips afresh with a new deadline.
        assert_eq!(il.evaluate(&sample(0.0, 450.0), false, at(4100)), STOP);
        assert_eq!(il.trip_count(), 2);
        assert_eq!(
            il.state(at(4100)),
            InterlockState::Tripped {
                remaining: Duration::from_millis(4000)
            }
        );
    }

    #[test]
    fn release_emits_configured_resume_command() {
        let resume = DriveCommand::new(0.3, 0.3);
        let mut il = SafetyInterlock::new(InterlockConfig { resume, ..config() });
        il.evaluate(&sample(0.0, 0.0), true, at(0));
        assert_eq!(il.evaluate(&sample(0.0, 0.0), false, at(3999)), STOP);
        assert_eq!(il.evaluate(&sample(0.0, 0.0), false, at(4000)), InterlockDecision::Override(resume));
        assert_eq!(il.evaluate(&sample(0.0, 0.0), false, at(4100)), InterlockDecision::Pass);
    }
}

//! Status indication for the differential-drive bot.
//!
//! Drives a short addressable LED chain via `SmartLedsWrite`. The control loop
//! posts `StatusEvent`s to `STATUS_CHANNEL` without waiting; a separate task
//! drains the channel and updates the LEDs.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use smart_leds_trait::{SmartLedsWrite, RGB8};

/// Channel carrying status events from the control loop to the indicator task.
pub static STATUS_CHANNEL: embassy_sync::channel::Channel<CriticalSectionRawMutex, StatusEvent, 8> =
    embassy_sync::channel::Channel::new();

/// Number of LEDs in the attached chain.
const LED_COUNT: usize = 1;

const OFF: RGB8 = RGB8 { r: 0, g: 0, b: 0 };
const RUNNING: RGB8 = RGB8 { r: 0, g: 64, b: 0 };
const TRIPPED: RGB8 = RGB8 { r: 255, g: 64, b: 0 };
const FAULT: RGB8 = RGB8 { r: 255, g: 0, b: 0 };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// Periodic sign of life from the control loop.
    Heartbeat,
    /// The interlock tripped.
    Tripped,
    /// The interlock released.
    Released,
    /// Startup failed; sent repeatedly to blink.
    Fault,
}

/// Post an event without blocking. Dropped if the channel is full.
pub fn notify(event: StatusEvent) {
    if STATUS_CHANNEL.try_send(event).is_err() {
        tracing::trace!(?event, "status channel full, event dropped");
    }
}

/// LED indicator state machine.
///
/// Heartbeats toggle the LED; the colour reflects whether the interlock is
/// currently tripped. `Fault` blinks red regardless.
pub struct StatusIndicator<Driver> {
    driver: Driver,
    lit: bool,
    tripped: bool,
}

impl<Driver, E> StatusIndicator<Driver>
where
    Driver: SmartLedsWrite<Color = RGB8, Error = E>,
{
    pub fn new(driver: Driver) -> Self {
        Self {
            driver,
            lit: false,
            tripped: false,
        }
    }

    pub fn ex_event(
        &mut self,
        event: StatusEvent,
    ) -> Result<(), E> {
        match event {
            StatusEvent::Heartbeat => {
                self.lit = !self.lit;
                self.refresh()
            }
            StatusEvent::Tripped => {
                self.tripped = true;
                self.lit = true;
                self.refresh()
            }
            StatusEvent::Released => {
                self.tripped = false;
                self.refresh()
            }
            StatusEvent::Fault => {
                self.lit = !self.lit;
                self.set_all(if self.lit { FAULT } else { OFF })
            }
        }
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    fn refresh(&mut self) -> Result<(), E> {
        let color = match (self.lit, self.tripped) {
            (false, _) => OFF,
            (true, true) => TRIPPED,
            (true, false) => RUNNING,
        };
        self.set_all(color)
    }

    /// Set all LEDs in the chain to the specified color.
    fn set_all(
        &mut self,
        color: RGB8,
    ) -> Result<(), E> {
        let data = core::iter::repeat(color).take(LED_COUNT);
        self.driver.write(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;

    #[derive(Default)]
    struct Recorder(std::vec::Vec<RGB8>);

    impl SmartLedsWrite for Recorder {
        type Color = RGB8;
        type Error = Infallible;

        fn write<T, I>(
            &mut self,
            iterator: T,
        ) -> Result<(), Self::Error>
        where
            T: IntoIterator<Item = I>,
            I: Into<Self::Color>,
        {
            self.0.extend(iterator.into_iter().map(Into::into));
            Ok(())
        }
    }

    #[test]
    fn heartbeat_toggles() {
        let mut ind = StatusIndicator::new(Recorder::default());
        ind.ex_event(StatusEvent::Heartbeat).unwrap();
        ind.ex_event(StatusEvent::Heartbeat).unwrap();
        assert_eq!(ind.driver.0, [RUNNING, OFF]);
    }

    #[test]
    fn trip_colour_until_release() {
        let mut ind = StatusIndicator::new(Recorder::default());
        ind.ex_event(StatusEvent::Tripped).unwrap();
        ind.ex_event(StatusEvent::Heartbeat).unwrap();
        ind.ex_event(StatusEvent::Heartbeat).unwrap();
        ind.ex_event(StatusEvent::Released).unwrap();
        assert_eq!(ind.driver.0, [TRIPPED, OFF, TRIPPED, RUNNING]);
    }

    #[test]
    fn fault_blinks() {
        let mut ind = StatusIndicator::new(Recorder::default());
        for _ in 0..3 {
            ind.ex_event(StatusEvent::Fault).unwrap();
        }
        assert_eq!(ind.driver.0, [FAULT, OFF, FAULT]);
        assert!(ind.is_lit());
    }
}

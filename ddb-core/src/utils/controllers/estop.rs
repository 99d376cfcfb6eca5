//! Emergency stop button input.
//!
//! The button is wired to a pulled-up, active-low line. A low level is only
//! reported after it survives a fixed settle delay, which filters contact
//! bounce and short glitches.

use embedded_hal::{delay::DelayNs, digital::InputPin};

pub struct EmergencyInput<P, D> {
    pin: P,
    delay: D,
    settle_us: u32,
}

impl<P, D> EmergencyInput<P, D>
where
    P: InputPin,
    D: DelayNs,
{
    pub fn new(
        pin: P,
        delay: D,
        settle_us: u32,
    ) -> Self {
        Self {
            pin,
            delay,
            settle_us,
        }
    }

    /// Sample the button once; `true` while it is pressed.
    ///
    /// A line that cannot be read counts as pressed.
    pub fn is_active(&mut self) -> bool {
        if !self.read_low() {
            return false;
        }
        self.delay.delay_us(self.settle_us);
        self.read_low()
    }

    fn read_low(&mut self) -> bool {
        match self.pin.is_low() {
            Ok(low) => low,
            Err(error) => {
                tracing::error!(?error, "emergency input unreadable, treating as pressed");
                true
            }
        }
    }
}

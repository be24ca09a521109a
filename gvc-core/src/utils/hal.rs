//! Capability traits the controller needs on top of `embedded-hal`.
//!
//! `embedded-hal` 1.0 covers digital pins, PWM and delays. It has no single-channel ADC read,
//! no pulse-width capture and no monotonic clock, so those three live here. Board crates
//! implement them over their timers and converters; tests and the simulator implement them
//! over plain memory.

use embassy_time::{Duration, Instant};
use embedded_hal::digital::{self, InputPin};

/// Monotonic time source driving the loop cadence and echo timing.
pub trait Clock {
    fn now(&self) -> Instant;
}

impl<C: Clock> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// Blocking single-channel analog read.
pub trait AdcChannel {
    type Error: core::fmt::Debug;

    /// Take one raw conversion (right-aligned, `0..=full_scale`).
    fn read_raw(&mut self) -> Result<u16, Self::Error>;
}

/// Width of the next high pulse on an echo line.
pub trait EchoPulse {
    type Error: digital::Error;

    /// Wait for a rising edge and return how long the line stayed high, in microseconds.
    ///
    /// Returns `0` when either edge does not arrive within `timeout_us`.
    fn pulse_width_us(
        &mut self,
        timeout_us: u32,
    ) -> Result<u32, Self::Error>;
}

/// `EchoPulse` for any input pin, measured by polling the pin against a clock.
///
/// Resolution is bounded by how fast the pin can be sampled; a timer input-capture channel
/// should be preferred where the MCU has one free.
pub struct PolledEcho<P, C> {
    pin: P,
    clock: C,
}

impl<P, C> PolledEcho<P, C>
where
    P: InputPin,
    C: Clock,
{
    pub fn new(
        pin: P,
        clock: C,
    ) -> Self {
        Self { pin, clock }
    }

    pub fn free(self) -> (P, C) {
        (self.pin, self.clock)
    }
}

impl<P, C> EchoPulse for PolledEcho<P, C>
where
    P: InputPin,
    C: Clock,
{
    type Error = P::Error;

    fn pulse_width_us(
        &mut self,
        timeout_us: u32,
    ) -> Result<u32, Self::Error> {
        let timeout = Duration::from_micros(u64::from(timeout_us));

        let start = self.clock.now();
        while self.pin.is_low()? {
            if self.clock.now() - start > timeout {
                return Ok(0);
            }
        }

        let rise = self.clock.now();
        while self.pin.is_high()? {
            if self.clock.now() - rise > timeout {
                return Ok(0);
            }
        }

        let width = self.clock.now() - rise;
        Ok(u32::try_from(width.as_micros()).unwrap_or(u32::MAX))
    }
}

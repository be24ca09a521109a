//! Hardware error type shared by every controller component.
//!
//! Each HAL implementation brings its own error type. Components collapse them into
//! `DeviceError` through the `kind()` accessor the `embedded-hal` error traits provide, so
//! the main loop deals with one concrete, `Copy` error.

use core::fmt;

use embedded_hal::{digital, pwm};
use embedded_hal_nb::serial;

/// Errors that can occur when touching the vehicle's hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// A digital input or output pin failed.
    Pin(digital::ErrorKind),
    /// A PWM channel rejected a duty cycle.
    Pwm(pwm::ErrorKind),
    /// One of the serial channels reported a fault (overrun, framing, noise, ...).
    Serial(serial::ErrorKind),
    /// The ADC conversion did not complete.
    Adc,
}

impl DeviceError {
    pub fn pin<E: digital::Error>(e: E) -> Self {
        DeviceError::Pin(e.kind())
    }

    pub fn pwm<E: pwm::Error>(e: E) -> Self {
        DeviceError::Pwm(e.kind())
    }

    pub fn serial<E: serial::Error>(e: E) -> Self {
        DeviceError::Serial(e.kind())
    }
}

impl fmt::Display for DeviceError {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            DeviceError::Pin(kind) => write!(f, "digital pin error: {kind:?}"),
            DeviceError::Pwm(kind) => write!(f, "pwm error: {kind:?}"),
            DeviceError::Serial(kind) => write!(f, "serial error: {kind:?}"),
            DeviceError::Adc => f.write_str("adc conversion failed"),
        }
    }
}

impl core::error::Error for DeviceError {}

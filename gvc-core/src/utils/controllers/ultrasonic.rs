//! Ultrasonic ranger array (HC-SR04 style trigger/echo pairs).
//!
//! Sensors are fired one after another, never together, so one sensor's echo cannot be heard
//! by its neighbour. A sweep blocks for at most four echo timeouts.

use embedded_hal::{delay::DelayNs, digital::OutputPin};

use crate::utils::{
    config::{ControllerConfig, SONAR_COUNT},
    error::DeviceError,
    hal::EchoPulse,
};

/// Speed of sound in cm/µs.
pub const SOUND_CM_PER_US: f32 = 0.034;

/// Convert a round-trip echo time into a one-way distance in centimeters.
#[inline]
pub fn echo_to_cm(duration_us: u32) -> f32 {
    duration_us as f32 * SOUND_CM_PER_US / 2.0
}

/// Trigger pulse shape and echo timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseTiming {
    pub settle_us: u32,
    pub pulse_us: u32,
    pub timeout_us: u32,
}

impl From<&ControllerConfig> for PulseTiming {
    fn from(cfg: &ControllerConfig) -> Self {
        Self {
            settle_us: cfg.trigger_settle_us,
            pulse_us: cfg.trigger_pulse_us,
            timeout_us: cfg.echo_timeout_us,
        }
    }
}

/// One trigger/echo pair.
pub struct UltrasonicSensor<T, E> {
    trigger: T,
    echo: E,
}

impl<T, E> UltrasonicSensor<T, E>
where
    T: OutputPin,
    E: EchoPulse,
{
    pub fn new(
        trigger: T,
        echo: E,
    ) -> Self {
        Self { trigger, echo }
    }

    /// Fire the trigger and time the echo. A missing echo reads as `0.0`.
    pub fn measure<D: DelayNs>(
        &mut self,
        delay: &mut D,
        timing: PulseTiming,
    ) -> Result<f32, DeviceError> {
        self.trigger.set_low().map_err(DeviceError::pin)?;
        delay.delay_us(timing.settle_us);
        self.trigger.set_high().map_err(DeviceError::pin)?;
        delay.delay_us(timing.pulse_us);
        self.trigger.set_low().map_err(DeviceError::pin)?;

        let duration = self
            .echo
            .pulse_width_us(timing.timeout_us)
            .map_err(DeviceError::pin)?;
        Ok(echo_to_cm(duration))
    }

    pub fn free(self) -> (T, E) {
        (self.trigger, self.echo)
    }
}

/// The four rangers around the chassis.
pub struct UltrasonicArray<T, E> {
    sensors: [UltrasonicSensor<T, E>; SONAR_COUNT],
    timing: PulseTiming,
}

impl<T, E> UltrasonicArray<T, E>
where
    T: OutputPin,
    E: EchoPulse,
{
    pub fn new(
        sensors: [UltrasonicSensor<T, E>; SONAR_COUNT],
        timing: PulseTiming,
    ) -> Self {
        Self { sensors, timing }
    }

    /// Measure every sensor in order, writing into `out`.
    ///
    /// A failing sensor leaves its slot untouched; the first error is returned once the
    /// remaining sensors have been measured.
    pub fn refresh<D: DelayNs>(
        &mut self,
        delay: &mut D,
        out: &mut [f32; SONAR_COUNT],
    ) -> Result<(), DeviceError> {
        let mut first_err = None;
        for (i, (sensor, slot)) in self.sensors.iter_mut().zip(out.iter_mut()).enumerate() {
            match sensor.measure(delay, self.timing) {
                Ok(cm) => *slot = cm,
                Err(e) => {
                    tracing::warn!(sensor = i, error = ?e, "ultrasonic measurement failed");
                    first_err.get_or_insert(e);
                }
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

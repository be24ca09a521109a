//! Compile-time configuration for the vehicle controller.
//!
//! Everything here is fixed when the firmware is built. `ControllerConfig` also derives serde
//! so the simulator can override it from a file, but nothing is negotiated with the host at
//! runtime.

use serde::{Deserialize, Serialize};

/// Number of drive motors.
pub const MOTOR_COUNT: usize = 4;
/// Number of ultrasonic trigger/echo pairs.
pub const SONAR_COUNT: usize = 4;

/// Tunable constants used by the sensor and loop components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// ADC reference voltage (V).
    pub reference_voltage: f32,
    /// Battery voltage divided by the voltage seen on the ADC pin.
    pub divider_ratio: f32,
    /// Highest raw count the ADC produces (1023 for a 10-bit converter).
    pub adc_full_scale: u16,
    /// Longest wait for each echo edge before the reading is reported as 0.
    pub echo_timeout_us: u32,
    /// Time the trigger is held low before the pulse.
    pub trigger_settle_us: u32,
    /// Width of the trigger pulse.
    pub trigger_pulse_us: u32,
    /// Loop period (ms).
    pub loop_period_ms: u32,
    /// Host link baud rate.
    pub host_baud: u32,
    /// LiDAR link baud rate.
    pub lidar_baud: u32,
    /// Verify the LiDAR frame checksum byte.
    pub lidar_checksum: bool,
    /// Upper bound on bytes taken from a serial channel in one poll.
    pub max_bytes_per_poll: usize,
}

impl ControllerConfig {
    pub const DEFAULT: Self = Self {
        reference_voltage: 5.0,
        divider_ratio: 3.0,
        adc_full_scale: 1023,
        echo_timeout_us: 6_000,
        trigger_settle_us: 2,
        trigger_pulse_us: 10,
        loop_period_ms: 50,
        host_baud: 9_600,
        lidar_baud: 115_200,
        lidar_checksum: false,
        max_bytes_per_poll: 64,
    };
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Direction and enable pins of one H-bridge channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MotorPinout {
    pub in1: u8,
    pub in2: u8,
    /// PWM-capable enable line.
    pub en: u8,
}

/// Trigger and echo pins of one ultrasonic ranger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SonarPinout {
    pub trig: u8,
    pub echo: u8,
}

/// Board wiring, by MCU pin number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PinMap {
    pub motors: [MotorPinout; MOTOR_COUNT],
    pub sonars: [SonarPinout; SONAR_COUNT],
    /// Analog input behind the battery divider (A0).
    pub battery_adc: u8,
    pub charge_control: u8,
    pub charge_status: u8,
}

/// Wiring of the reference vehicle (Arduino Mega header numbering).
pub const PIN_MAP: PinMap = PinMap {
    motors: [
        MotorPinout { in1: 22, in2: 23, en: 2 },
        MotorPinout { in1: 24, in2: 25, en: 3 },
        MotorPinout { in1: 26, in2: 27, en: 4 },
        MotorPinout { in1: 28, in2: 29, en: 5 },
    ],
    sonars: [
        SonarPinout { trig: 30, echo: 31 },
        SonarPinout { trig: 32, echo: 33 },
        SonarPinout { trig: 34, echo: 35 },
        SonarPinout { trig: 36, echo: 37 },
    ],
    battery_adc: 0,
    charge_control: 38,
    charge_status: 39,
};

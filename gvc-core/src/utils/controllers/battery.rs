//! Battery voltage and charger lines.
//!
//! The pack voltage is read through a resistive divider on one ADC input. The charger has a
//! control output (enable/disable charging) and a status input (charging active).

use embedded_hal::digital::{InputPin, OutputPin};
use serde::Serialize;

use crate::utils::{config::ControllerConfig, error::DeviceError, hal::AdcChannel};

/// Instantaneous battery snapshot. Each refresh replaces the previous one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BatteryState {
    pub voltage: f32,
    pub charging: bool,
}

/// Scaling from raw ADC counts to pack volts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoltageScale {
    pub reference_voltage: f32,
    pub full_scale: u16,
    pub divider_ratio: f32,
}

impl VoltageScale {
    #[inline]
    pub fn volts(
        &self,
        raw: u16,
    ) -> f32 {
        f32::from(raw) * (self.reference_voltage / f32::from(self.full_scale)) * self.divider_ratio
    }
}

impl From<&ControllerConfig> for VoltageScale {
    fn from(cfg: &ControllerConfig) -> Self {
        Self {
            reference_voltage: cfg.reference_voltage,
            full_scale: cfg.adc_full_scale,
            divider_ratio: cfg.divider_ratio,
        }
    }
}

pub struct BatteryMonitor<A, S> {
    adc: A,
    status: S,
    scale: VoltageScale,
}

impl<A, S> BatteryMonitor<A, S>
where
    A: AdcChannel,
    S: InputPin,
{
    pub fn new(
        adc: A,
        status: S,
        scale: VoltageScale,
    ) -> Self {
        Self { adc, status, scale }
    }

    /// Take one voltage sample and read the charger status line.
    pub fn refresh(&mut self) -> Result<BatteryState, DeviceError> {
        let raw = self.adc.read_raw().map_err(|e| {
            tracing::warn!(error = ?e, "battery adc read failed");
            DeviceError::Adc
        })?;
        let charging = self.status.is_high().map_err(DeviceError::pin)?;

        Ok(BatteryState {
            voltage: self.scale.volts(raw),
            charging,
        })
    }

    pub fn free(self) -> (A, S) {
        (self.adc, self.status)
    }
}

/// Charger enable output.
pub struct ChargeSwitch<O> {
    pin: O,
    enabled: bool,
}

impl<O: OutputPin> ChargeSwitch<O> {
    /// Wrap the control pin. The line is not touched until the first `set`.
    pub fn new(pin: O) -> Self {
        Self {
            pin,
            enabled: false,
        }
    }

    pub fn set(
        &mut self,
        enabled: bool,
    ) -> Result<(), DeviceError> {
        if enabled {
            self.pin.set_high().map_err(DeviceError::pin)?;
        } else {
            self.pin.set_low().map_err(DeviceError::pin)?;
        }
        self.enabled = enabled;
        Ok(())
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn free(self) -> O {
        self.pin
    }
}

//! Vehicle-to-host sensor report.
//!
//! ```text
//! DATA:<u0>,<u1>,<u2>,<u3>,<lidar>,<battery>,<charging>\n
//! ```
//!
//! Distances are centimeters, battery is volts, all printed with two decimals; `charging` is
//! `1` or `0`. A report is only sent in reply to `S`.

use core::fmt::{self, Write as _};

use embedded_hal_nb::serial;
use serde::Serialize;

use crate::utils::{config::SONAR_COUNT, error::DeviceError};

/// Snapshot carried by one `DATA:` line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Report {
    pub ultrasonic: [f32; SONAR_COUNT],
    pub lidar: f32,
    pub battery: f32,
    pub charging: bool,
}

impl Report {
    pub const PREFIX: &'static str = "DATA:";
    const FIELDS: usize = SONAR_COUNT + 3;

    /// Write the report line, newline included, to `port`.
    pub fn emit<W>(
        &self,
        port: &mut W,
    ) -> Result<(), DeviceError>
    where
        W: serial::Write<u8>,
    {
        let mut out = SerialWriter { port, error: None };
        if writeln!(out, "{self}").is_err() {
            return Err(out
                .error
                .unwrap_or(DeviceError::Serial(serial::ErrorKind::Other)));
        }
        Ok(())
    }

    /// Parse a `DATA:` line as the host does. Returns `None` unless all seven fields parse.
    pub fn parse(line: &str) -> Option<Self> {
        let body = line.trim().strip_prefix(Self::PREFIX)?;

        let mut fields = body.split(',');
        let mut values = [0f32; Self::FIELDS - 1];
        for v in values.iter_mut() {
            *v = fields.next()?.trim().parse().ok()?;
        }
        let charging = fields.next()?.trim() == "1";
        if fields.next().is_some() {
            return None;
        }

        let mut ultrasonic = [0f32; SONAR_COUNT];
        ultrasonic.copy_from_slice(&values[..SONAR_COUNT]);
        Some(Self {
            ultrasonic,
            lidar: values[SONAR_COUNT],
            battery: values[SONAR_COUNT + 1],
            charging,
        })
    }
}

/// Wire form without the trailing newline.
impl fmt::Display for Report {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(Self::PREFIX)?;
        for u in self.ultrasonic {
            write!(f, "{u:.2},")?;
        }
        write!(
            f,
            "{:.2},{:.2},{}",
            self.lidar,
            self.battery,
            u8::from(self.charging)
        )
    }
}

/// `fmt::Write` over a blocking serial port, remembering the first port error.
struct SerialWriter<'a, W> {
    port: &'a mut W,
    error: Option<DeviceError>,
}

impl<W: serial::Write<u8>> fmt::Write for SerialWriter<'_, W> {
    fn write_str(
        &mut self,
        s: &str,
    ) -> fmt::Result {
        for &b in s.as_bytes() {
            if let Err(e) = nb::block!(self.port.write(b)) {
                self.error = Some(DeviceError::serial(e));
                return Err(fmt::Error);
            }
        }
        Ok(())
    }
}

//! Host-to-vehicle commands.
//!
//! One command per newline-terminated ASCII line:
//!
//! | line | meaning |
//! | ---- | ------- |
//! | `M,<s0>,<s1>,<s2>,<s3>` | motor speeds, each `-255..=255` |
//! | `S` | send a `DATA:` report |
//! | `C,<n>` | charging on (`n != 0`) or off (`n == 0`) |
//!
//! Anything else parses to [`Command::Unrecognized`] and is dropped without a reply.

use core::fmt;

use embedded_hal_nb::serial;
use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::utils::{
    config::MOTOR_COUNT,
    controllers::motors::clamp_speed,
    error::DeviceError,
};

/// Longest accepted command line, excluding the terminator.
pub const MAX_LINE_LEN: usize = 64;

/// A parsed host command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Speeds for motors 0..4, already clamped to `-255..=255`.
    SetMotors { speeds: [i16; MOTOR_COUNT] },
    RequestSensorData,
    SetCharging { enabled: bool },
    Unrecognized,
}

impl Command {
    /// Parse one line (terminator optional, surrounding whitespace ignored).
    ///
    /// A motor command with fewer than four values leaves the missing motors at 0; values past
    /// the fourth are ignored. Any value that is not an integer rejects the whole line.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("M,") {
            parse_speeds(rest).map_or(Command::Unrecognized, |speeds| Command::SetMotors {
                speeds,
            })
        } else if line.starts_with('S') {
            Command::RequestSensorData
        } else if let Some(rest) = line.strip_prefix("C,") {
            match rest.trim().parse::<i32>() {
                Ok(n) => Command::SetCharging { enabled: n != 0 },
                Err(_) => Command::Unrecognized,
            }
        } else {
            Command::Unrecognized
        }
    }
}

fn parse_speeds(fields: &str) -> Option<[i16; MOTOR_COUNT]> {
    let mut speeds = [0i16; MOTOR_COUNT];
    for (slot, field) in speeds.iter_mut().zip(fields.split(',')) {
        *slot = clamp_speed(field.trim().parse::<i32>().ok()?);
    }
    Some(speeds)
}

/// Wire form without the trailing newline. `Unrecognized` writes nothing.
impl fmt::Display for Command {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Command::SetMotors { speeds: [a, b, c, d] } => write!(f, "M,{a},{b},{c},{d}"),
            Command::RequestSensorData => f.write_str("S"),
            Command::SetCharging { enabled } => write!(f, "C,{}", u8::from(*enabled)),
            Command::Unrecognized => Ok(()),
        }
    }
}

/// Assembles command lines from the host byte stream.
///
/// `\r` is ignored so both LF and CRLF terminals work. A line longer than
/// [`MAX_LINE_LEN`] is discarded up to its newline and reported as `Unrecognized`.
#[derive(Default)]
pub struct CommandReader {
    line: Vec<u8, MAX_LINE_LEN>,
    overflowed: bool,
}

impl CommandReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a single incoming byte. Returns `Some(Command)` when it terminates a line.
    pub fn push(
        &mut self,
        byte: u8,
    ) -> Option<Command> {
        match byte {
            b'\n' => {
                let cmd = if self.overflowed {
                    tracing::debug!("dropping over-long command line");
                    Command::Unrecognized
                } else {
                    core::str::from_utf8(&self.line).map_or(Command::Unrecognized, Command::parse)
                };
                self.line.clear();
                self.overflowed = false;
                Some(cmd)
            }
            b'\r' => None,
            _ => {
                if self.line.push(byte).is_err() {
                    self.overflowed = true;
                }
                None
            }
        }
    }

    /// Read buffered bytes from `port` until one line completes, the port runs dry, or
    /// `max_bytes` have been consumed. Never blocks.
    pub fn poll<S>(
        &mut self,
        port: &mut S,
        max_bytes: usize,
    ) -> Result<Option<Command>, DeviceError>
    where
        S: serial::Read<u8>,
    {
        for _ in 0..max_bytes {
            match port.read() {
                Ok(byte) => {
                    if let Some(cmd) = self.push(byte) {
                        return Ok(Some(cmd));
                    }
                }
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(e)) => return Err(DeviceError::serial(e)),
            }
        }
        Ok(None)
    }
}

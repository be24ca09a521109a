//! Frame reader for the single-point serial LiDAR (TF-Luna / TFmini wire format).
//!
//! The sensor streams 9-byte frames:
//!
//! | byte | content |
//! | ---- | ------- |
//! | 0, 1 | sync `0x59 0x59` |
//! | 2, 3 | distance (cm), little-endian |
//! | 4..8 | strength, temperature (ignored) |
//! | 8    | checksum: low byte of the sum of bytes 0..8 |
//!
//! Bytes are pushed one at a time; a distance only comes out after two sync bytes and seven
//! more bytes have been seen. Anything else is dropped byte by byte until the stream lines up
//! again.

use embedded_hal_nb::serial;

use crate::utils::error::DeviceError;

/// Frame sync byte.
pub const SYNC_BYTE: u8 = 0x59;
/// Full frame length including both sync bytes.
pub const FRAME_LEN: usize = 9;
/// Bytes following the two sync bytes.
pub const PAYLOAD_LEN: usize = FRAME_LEN - 2;

/// How a completed frame is validated before its distance is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameCheck {
    /// Accept every correctly synchronized frame.
    #[default]
    None,
    /// Require the trailing checksum byte to match.
    Sum,
}

impl FrameCheck {
    fn accepts(
        self,
        payload: &[u8; PAYLOAD_LEN],
    ) -> bool {
        match self {
            FrameCheck::None => true,
            FrameCheck::Sum => {
                let sum = payload[..PAYLOAD_LEN - 1]
                    .iter()
                    .fold(SYNC_BYTE.wrapping_add(SYNC_BYTE), |acc, &b| acc.wrapping_add(b));
                sum == payload[PAYLOAD_LEN - 1]
            }
        }
    }
}

enum State {
    Idle,
    SyncSeen,
    FrameBody { len: usize },
}

pub struct LidarFrameReader {
    state: State,
    payload: [u8; PAYLOAD_LEN],
    check: FrameCheck,
    frames: u32,
    rejected: u32,
}

impl LidarFrameReader {
    pub fn new(check: FrameCheck) -> Self {
        Self {
            state: State::Idle,
            payload: [0; PAYLOAD_LEN],
            check,
            frames: 0,
            rejected: 0,
        }
    }

    /// Frames whose distance was accepted.
    #[inline]
    pub fn frames(&self) -> u32 {
        self.frames
    }

    /// Frames dropped by the checksum.
    #[inline]
    pub fn rejected(&self) -> u32 {
        self.rejected
    }

    /// Process a single incoming byte. Returns the distance (cm) when it completes a frame.
    pub fn push(
        &mut self,
        byte: u8,
    ) -> Option<u16> {
        match self.state {
            State::Idle => {
                if byte == SYNC_BYTE {
                    self.state = State::SyncSeen;
                }
                None
            }
            State::SyncSeen => {
                if byte == SYNC_BYTE {
                    self.state = State::FrameBody { len: 0 };
                    None
                } else {
                    // not a second sync byte; it may still open the next frame
                    self.state = State::Idle;
                    self.push(byte)
                }
            }
            State::FrameBody { len } => {
                self.payload[len] = byte;
                let len = len + 1;
                if len < PAYLOAD_LEN {
                    self.state = State::FrameBody { len };
                    return None;
                }

                self.state = State::Idle;
                if self.check.accepts(&self.payload) {
                    self.frames = self.frames.wrapping_add(1);
                    Some(u16::from_le_bytes([self.payload[0], self.payload[1]]))
                } else {
                    self.rejected = self.rejected.wrapping_add(1);
                    tracing::debug!(frame = ?self.payload, "lidar frame failed checksum");
                    None
                }
            }
        }
    }

    /// Drain up to `max_bytes` already-buffered bytes from `port` without blocking.
    ///
    /// Returns the distance of the last frame completed during this call, if any.
    pub fn poll<S>(
        &mut self,
        port: &mut S,
        max_bytes: usize,
    ) -> Result<Option<u16>, DeviceError>
    where
        S: serial::Read<u8>,
    {
        let mut latest = None;
        for _ in 0..max_bytes {
            match port.read() {
                Ok(byte) => {
                    if let Some(cm) = self.push(byte) {
                        latest = Some(cm);
                    }
                }
                Err(nb::Error::WouldBlock) => break,
                Err(nb::Error::Other(e)) => return Err(DeviceError::serial(e)),
            }
        }
        Ok(latest)
    }
}

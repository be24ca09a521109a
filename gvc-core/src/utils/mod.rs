//! Utility re-exports for the ground-vehicle controller.
//!
//! - `hal`: capability traits the controller needs beyond `embedded-hal`
//! - `config`: compile-time configuration and the board pin map
//! - `error`: the unified hardware error type
//! - `timing`: fixed-period tick scheduling over an injectable clock
//! - `controllers`: motor, sensor and battery components plus the main loop
//! - `connection`: the ASCII command/report protocol on the host link

pub mod config;
pub mod connection;
pub mod controllers;
pub mod error;
pub mod hal;
pub mod timing;

pub use config::{ControllerConfig, PIN_MAP};
pub use connection::{Command, Report};
pub use controllers::{Board, Peripherals, SystemController};
pub use embassy_time::{Duration, Instant};
pub use error::DeviceError;

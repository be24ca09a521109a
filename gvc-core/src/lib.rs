//! Core firmware loop for the four-motor ground vehicle on no-std embedded platforms.
//!
//! The vehicle drives four DC motors, samples four ultrasonic rangers and a serial LiDAR,
//! watches the battery and exchanges a line-oriented ASCII protocol with a host computer.
//! Hardware is reached only through `embedded-hal` traits, so the whole loop also runs on a
//! desktop against simulated pins (see `gvc-app/sim-mcu`).
#![no_std]

pub mod utils;

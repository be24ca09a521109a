//! Host link protocol.
//!
//! - `command`: parsing and encoding of `M,` / `S` / `C,` lines
//! - `report`: the `DATA:` reply line

pub mod command;
pub mod report;

pub use command::{Command, CommandReader};
pub use report::Report;

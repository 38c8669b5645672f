//! Hardware-independent core library for the climate-logger
//!
//! This crate contains everything the logger does that is not tied to a
//! particular microcontroller: the DHT11, BMP180 and DS3231 drivers, the CSV
//! row format, the SD card log sink, tick scheduling, the startup sequence and
//! the acquisition loop itself.
//!
//! It is `#![no_std]` and never allocates, so it compiles for the ESP32-S3
//! firmware as well as for desktop hosts (the simulator and the tests).

#![cfg_attr(not(test), no_std)]

pub mod acquisition;
pub mod cadence;
pub mod config;
pub mod record;
pub mod sensors;
pub mod startup;
pub mod storage;
pub mod time;

#[cfg(test)]
mod testing;

pub use acquisition::Logger;
pub use record::Reading;
pub use startup::{Halted, LoggerParts, RunState};
pub use time::DateTime;

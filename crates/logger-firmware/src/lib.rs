//! ESP32-S3 specific pieces of the climate-logger firmware
//!
//! Peripheral setup lives here so that `main` reads as the wiring diagram.
//! Everything the logger actually does is in `logger-core`.

#![no_std]

pub mod hardware;

/// Commissioning datetime baked in by `build.rs`, if one was configured.
pub const COMMISSION_DATETIME: Option<&str> = option_env!("LOGGER_COMMISSION_DATETIME");

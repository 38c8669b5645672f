//! Sensor traits, reading types and drivers
//!
//! Each physical part has its own driver module. The acquisition loop only
//! talks to the traits defined here, so the simulator and the tests can stand
//! in their own sources.

pub mod bmp180;
pub mod dht11;
pub mod ds3231;

use thiserror_no_std::Error;

use crate::time::DateTime;

pub use bmp180::Bmp180;
pub use dht11::Dht11;
pub use ds3231::Ds3231;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: {operation} failed ({details})")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: initialization failed ({details})")]
    InitializationFailed {
        sensor: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: bus error during {operation}")]
    Bus {
        sensor: &'static str,
        operation: &'static str,
    },
    #[error("{sensor}: timed out waiting for {operation}")]
    Timeout {
        sensor: &'static str,
        operation: &'static str,
    },
    #[error("{sensor}: checksum mismatch")]
    ChecksumMismatch { sensor: &'static str },
    #[error("{sensor}: unexpected chip id {found:#04x}")]
    InvalidChipId { sensor: &'static str, found: u8 },
    #[error("{sensor}: sensor not initialized")]
    NotInitialized { sensor: &'static str },
}

/// Trait for sensors that produce typed readings.
pub trait Sensor {
    /// The type of readings this sensor produces.
    type Readings;

    /// Read the sensor and return typed readings.
    fn read(&mut self) -> impl Future<Output = Result<Self::Readings, SensorError>>;
}

/// Temperature and relative humidity from the environmental sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReadings {
    pub temperature_celsius: f32,
    pub humidity_percent: f32,
}

impl ClimateReadings {
    /// Both fields not-a-number, what a failed read degrades to.
    pub const UNAVAILABLE: Self = Self {
        temperature_celsius: f32::NAN,
        humidity_percent: f32::NAN,
    };
}

/// One pressure measurement event. `pressure_hpa` is `None` when the event
/// carried no pressure value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureEvent {
    pub pressure_hpa: Option<f32>,
}

/// A barometric sensor that needs explicit initialization and can also be
/// asked for its die temperature on its own.
pub trait PressureSensor: Sensor<Readings = PressureEvent> {
    /// Probe the part and load whatever it needs before the first read.
    fn init(&mut self) -> impl Future<Output = Result<(), SensorError>>;

    /// Direct temperature read, independent of any pressure event.
    fn read_temperature(&mut self) -> impl Future<Output = Result<f32, SensorError>>;
}

/// Battery-backed calendar clock with an auxiliary temperature register.
pub trait Clock {
    fn now(&mut self) -> impl Future<Output = Result<DateTime, SensorError>>;

    /// Chip temperature in whole degrees Celsius, truncated toward zero.
    fn temperature(&mut self) -> impl Future<Output = Result<i16, SensorError>>;

    /// Overwrite the stored calendar. Only used when commissioning.
    fn set(&mut self, datetime: &DateTime) -> impl Future<Output = Result<(), SensorError>>;
}

//! Power-on sequence
//!
//! The device has two states. `initialize` either hands back a running
//! [`Logger`] or reports [`Halted`], after which the caller parks forever in
//! [`halt`]. The only fatal fault is a card that cannot be mounted; a missing
//! pressure sensor or a log file that cannot be prepared only degrades the
//! session.

use core::convert::Infallible;
use core::fmt::Write;

use embedded_hal::digital::OutputPin;
use log::{error, info, warn};
use thiserror_no_std::Error;

use crate::acquisition::Logger;
use crate::config::{BootMode, LOG_FILE_NAME};
use crate::record::{HEADER, preamble};
use crate::sensors::{ClimateReadings, Clock, PressureSensor, Sensor};
use crate::storage::{LogStorage, StorageError};

/// Everything the logger drives, before initialization.
pub struct LoggerParts<E, P, C, S, W, L> {
    pub climate: E,
    pub pressure: P,
    pub clock: C,
    pub storage: S,
    pub console: W,
    pub indicator: L,
}

/// Startup could not mount the storage. Terminal for this power cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("halted: {0}")]
pub struct Halted(pub StorageError);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Halted,
}

impl RunState {
    pub fn of<T>(outcome: &Result<T, Halted>) -> Self {
        match outcome {
            Ok(_) => Self::Running,
            Err(_) => Self::Halted,
        }
    }
}

/// Bring the logger up. Console output follows the order of the steps so a
/// serial capture shows exactly how far startup got.
pub async fn initialize<E, P, C, S, W, L>(
    parts: LoggerParts<E, P, C, S, W, L>,
    mode: BootMode,
) -> Result<Logger<E, P, C, S, W, L>, Halted>
where
    E: Sensor<Readings = ClimateReadings>,
    P: PressureSensor,
    C: Clock,
    S: LogStorage,
    W: Write,
    L: OutputPin,
{
    let LoggerParts {
        climate,
        mut pressure,
        mut clock,
        mut storage,
        mut console,
        mut indicator,
    } = parts;

    let _ = indicator.set_low();

    let _ = console.write_str("# Initializing SD card...");
    if let Err(e) = storage.mount() {
        error!("Storage mount failed: {}", e);
        let _ = writeln!(console, "initialization failed!");
        return Err(Halted(e));
    }
    let _ = writeln!(console, "initialization done.");

    if let Err(e) = prepare_log(&mut storage) {
        error!("Unable to prepare {}: {}", LOG_FILE_NAME, e);
        let _ = writeln!(console, "# Unable to open card for writing");
    }

    // The DHT11 has no handshake outside a measurement.
    let _ = writeln!(console, "# Starting DHT sensor ... done.");

    let _ = console.write_str("# Starting BMP180 sensor ... ");
    let init = pressure.init().await;
    let pressure = match init {
        Ok(()) => {
            let _ = writeln!(console, "done.");
            Some(pressure)
        }
        Err(e) => {
            warn!("Continuing without pressure sensor: {}", e);
            let _ = writeln!(console, "oops, no BMP found");
            None
        }
    };

    let _ = writeln!(console, "{}", HEADER);

    if let BootMode::Commission(datetime) = mode {
        match clock.set(&datetime).await {
            Ok(()) => {
                info!("Commissioned clock to {}", datetime);
                let _ = writeln!(console, "# Clock set to {}", datetime);
            }
            Err(e) => {
                error!("Commissioning failed: {}", e);
                let _ = writeln!(console, "# Unable to set clock");
            }
        }
    }

    info!("Logger initialized");
    Ok(Logger::new(climate, pressure, clock, storage, console, indicator))
}

/// Header if the log is new, then a restart marker, in one append.
fn prepare_log<S: LogStorage>(storage: &mut S) -> Result<(), StorageError> {
    let is_new = storage.is_empty(LOG_FILE_NAME)?;
    if is_new {
        info!("Starting new log {}", LOG_FILE_NAME);
    }
    storage.append(LOG_FILE_NAME, preamble(is_new).as_bytes(), || {})
}

/// Park forever. Nothing leaves the halted state short of a power cycle.
pub async fn halt() -> ! {
    error!("Logger halted, power cycle to retry");
    let never: Infallible = core::future::pending().await;
    match never {}
}

//! Desktop simulator for the climate-logger.
//!
//! Runs the real logger-core startup sequence and acquisition loop against
//! synthetic sensors, the host clock, and a directory standing in for the SD
//! card. Rows go to `DATA.CSV` in that directory and to stdout.
//!
//! # Environment
//!
//! | Variable                | Meaning                                        |
//! |-------------------------|------------------------------------------------|
//! | `LOGGER_SIM_DIR`        | Directory used as the card (default: `.`)      |
//! | `LOGGER_SIM_NO_BMP`     | Set to simulate a missing pressure sensor      |
//! | `LOGGER_SIM_COMMISSION` | `YYYY-MM-DD HH:MM:SS` to commission the clock  |
//! | `RUST_LOG`              | Log filter (default: `info`)                   |

use std::convert::Infallible;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write as _};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use embassy_executor::Spawner;
use embedded_hal::digital::{ErrorType, OutputPin};
use log::{info, warn};

use logger_core::config::{BootMode, LOG_FILE_NAME, RESTART_MARKER};
use logger_core::record::{Line, parse_row};
use logger_core::sensors::{
    ClimateReadings, Clock, PressureEvent, PressureSensor, Sensor, SensorError,
};
use logger_core::storage::{LogStorage, StorageError};
use logger_core::{DateTime, LoggerParts, startup};

// ---------------------------------------------------------------------------
// Synthetic sensors
// ---------------------------------------------------------------------------

/// Seconds since the Unix epoch on the host.
fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Temperature and humidity drifting on slow sinusoids. Every 13th read
/// fails the way a DHT11 with a bad checksum does.
struct SimulatedClimate {
    reads: u64,
}

impl Sensor for SimulatedClimate {
    type Readings = ClimateReadings;

    async fn read(&mut self) -> Result<ClimateReadings, SensorError> {
        self.reads += 1;
        if self.reads % 13 == 0 {
            return Err(SensorError::ChecksumMismatch { sensor: "DHT11" });
        }

        let t = unix_now() as f64;
        let temperature = 23.0 + 3.0 * (t / 120.0).sin() + 0.5 * (t / 37.0).cos();
        let humidity = 50.0 + 10.0 * (t / 180.0).sin() + 2.0 * (t / 23.0).cos();

        // The DHT11 reports tenths.
        Ok(ClimateReadings {
            temperature_celsius: ((temperature * 10.0).round() / 10.0) as f32,
            humidity_percent: ((humidity * 10.0).round() / 10.0) as f32,
        })
    }
}

/// Barometric pressure around 1013 hPa. Every 7th event has no pressure.
struct SimulatedPressure {
    present: bool,
    events: u64,
}

impl Sensor for SimulatedPressure {
    type Readings = PressureEvent;

    async fn read(&mut self) -> Result<PressureEvent, SensorError> {
        self.events += 1;
        if self.events % 7 == 0 {
            return Ok(PressureEvent { pressure_hpa: None });
        }
        let t = unix_now() as f64;
        let pressure = 1013.25 + 4.0 * (t / 600.0).sin() + 0.3 * (t / 45.0).cos();
        Ok(PressureEvent {
            pressure_hpa: Some(pressure as f32),
        })
    }
}

impl PressureSensor for SimulatedPressure {
    async fn init(&mut self) -> Result<(), SensorError> {
        if self.present {
            Ok(())
        } else {
            Err(SensorError::Bus {
                sensor: "BMP180",
                operation: "read chip id",
            })
        }
    }

    async fn read_temperature(&mut self) -> Result<f32, SensorError> {
        let t = unix_now() as f64;
        Ok((22.5 + 2.5 * (t / 120.0).sin()) as f32)
    }
}

/// Host wall clock (UTC) with an offset that commissioning adjusts.
struct HostClock {
    offset_secs: i64,
}

impl Clock for HostClock {
    async fn now(&mut self) -> Result<DateTime, SensorError> {
        let secs = unix_now() + self.offset_secs;
        Ok(DateTime::from_unix_secs(secs.max(0) as u64))
    }

    async fn temperature(&mut self) -> Result<i16, SensorError> {
        let t = unix_now() as f64;
        Ok((24.0 + 1.5 * (t / 300.0).sin()) as i16)
    }

    async fn set(&mut self, datetime: &DateTime) -> Result<(), SensorError> {
        let target = unix_secs(datetime);
        self.offset_secs = target - unix_now();
        info!("Host clock offset is now {} s", self.offset_secs);
        Ok(())
    }
}

/// Inverse of `DateTime::from_unix_secs` (Hinnant's `days_from_civil`).
fn unix_secs(datetime: &DateTime) -> i64 {
    let month = i64::from(datetime.month);
    let year = i64::from(datetime.year) - i64::from(month <= 2);
    let era = year.div_euclid(400);
    let yoe = year.rem_euclid(400);
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + i64::from(datetime.day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    let days = era * 146_097 + doe - 719_468;

    days * 86_400
        + i64::from(datetime.hour) * 3_600
        + i64::from(datetime.minute) * 60
        + i64::from(datetime.second)
}

// ---------------------------------------------------------------------------
// Host sinks
// ---------------------------------------------------------------------------

/// A host directory acting as the card's root directory.
struct DirectoryStorage {
    root: PathBuf,
}

impl LogStorage for DirectoryStorage {
    fn mount(&mut self) -> Result<(), StorageError> {
        match fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StorageError::mount(&"not a directory")),
            Err(e) => Err(StorageError::mount(&e.kind())),
        }
    }

    fn is_empty(&mut self, file_name: &str) -> Result<bool, StorageError> {
        match fs::metadata(self.root.join(file_name)) {
            Ok(meta) => Ok(meta.len() == 0),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
            Err(e) => Err(StorageError::open(&e.kind())),
        }
    }

    fn append(
        &mut self,
        file_name: &str,
        data: &[u8],
        on_open: impl FnOnce(),
    ) -> Result<(), StorageError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(file_name))
            .map_err(|e| StorageError::open(&e.kind()))?;
        on_open();
        file.write_all(data).map_err(|e| StorageError::write(&e.kind()))?;
        file.sync_data().map_err(|e| StorageError::close(&e.kind()))
    }
}

struct Stdout;

impl fmt::Write for Stdout {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let mut out = io::stdout().lock();
        out.write_all(s.as_bytes()).map_err(|_| fmt::Error)?;
        out.flush().map_err(|_| fmt::Error)
    }
}

/// Stands in for the status LED.
struct TraceIndicator;

impl ErrorType for TraceIndicator {
    type Error = Infallible;
}

impl OutputPin for TraceIndicator {
    fn set_low(&mut self) -> Result<(), Infallible> {
        log::trace!("indicator off");
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        log::trace!("indicator on");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Existing log
// ---------------------------------------------------------------------------

/// Tally of a log file's lines.
#[derive(Debug, Default, PartialEq)]
struct LogSummary {
    rows: usize,
    restarts: usize,
    last: Option<DateTime>,
}

fn summarize(path: &Path, contents: &str) -> LogSummary {
    let mut summary = LogSummary::default();
    for (number, line) in contents.lines().enumerate() {
        match parse_row(line) {
            Ok(Line::Data(reading)) => {
                summary.rows += 1;
                summary.last = reading.timestamp.or(summary.last);
            }
            Ok(Line::Comment) if line.trim_end() == RESTART_MARKER => summary.restarts += 1,
            Ok(Line::Comment | Line::Header | Line::Blank) => {}
            Err(e) => warn!("{}:{}: {}", path.display(), number + 1, e),
        }
    }
    summary
}

/// Summarize a log left behind by earlier runs.
fn report_existing_log(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        info!("No existing log at {}", path.display());
        return;
    };

    let LogSummary {
        rows,
        restarts,
        last,
    } = summarize(path, &contents);
    match last {
        Some(timestamp) => info!(
            "Existing log holds {} rows over {} boots, last at {}",
            rows, restarts, timestamp
        ),
        None => info!("Existing log holds {} rows over {} boots", rows, restarts),
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting climate-logger simulator");

    let root = std::env::var_os("LOGGER_SIM_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    report_existing_log(&root.join(LOG_FILE_NAME));

    let commission = std::env::var("LOGGER_SIM_COMMISSION").ok();
    let mode = BootMode::select(commission.is_some(), commission.as_deref());

    let parts = LoggerParts {
        climate: SimulatedClimate { reads: 0 },
        pressure: SimulatedPressure {
            present: std::env::var_os("LOGGER_SIM_NO_BMP").is_none(),
            events: 0,
        },
        clock: HostClock { offset_secs: 0 },
        storage: DirectoryStorage { root },
        console: Stdout,
        indicator: TraceIndicator,
    };

    match startup::initialize(parts, mode).await {
        Ok(logger) => logger.run().await,
        Err(e) => {
            log::error!("{}", e);
            startup::halt().await
        }
    }
}

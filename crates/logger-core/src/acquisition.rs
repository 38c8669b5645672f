//! Acquisition loop
//!
//! A [`Logger`] owns every sensor and both sinks. Each tick it reads all
//! sources once, turns whatever failed into sentinels, and writes a single
//! row to the console and to the log file. Nothing a sensor or the card does
//! during a tick can stop the loop.

use core::fmt::Write;

use embassy_time::{Instant, Timer};
use embedded_hal::digital::OutputPin;
use log::{debug, error, info, warn};

use crate::cadence::Cadence;
use crate::config::{LOG_FILE_NAME, SAMPLE_PERIOD};
use crate::record::{Reading, SENTINEL, SENTINEL_INT, sanitize};
use crate::sensors::{ClimateReadings, Clock, PressureEvent, PressureSensor, Sensor};
use crate::storage::{LogStorage, time_source};

/// Console line printed when a row could not be appended.
pub const APPEND_FAILED: &str = "# Unable to write data to disk";

/// The running logger. Built by [`crate::startup::initialize`].
pub struct Logger<E, P, C, S, W, L> {
    climate: E,
    /// `None` when the pressure sensor failed to initialize.
    pressure: Option<P>,
    clock: C,
    storage: S,
    console: W,
    indicator: L,
}

impl<E, P, C, S, W, L> Logger<E, P, C, S, W, L>
where
    E: Sensor<Readings = ClimateReadings>,
    P: PressureSensor,
    C: Clock,
    S: LogStorage,
    W: Write,
    L: OutputPin,
{
    pub(crate) fn new(
        climate: E,
        pressure: Option<P>,
        clock: C,
        storage: S,
        console: W,
        indicator: L,
    ) -> Self {
        Self {
            climate,
            pressure,
            clock,
            storage,
            console,
            indicator,
        }
    }

    pub fn console(&self) -> &W {
        &self.console
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn pressure_available(&self) -> bool {
        self.pressure.is_some()
    }

    /// Sample every source once and record the row.
    pub async fn tick(&mut self) -> Reading {
        let timestamp = match self.clock.now().await {
            Ok(now) => {
                time_source::publish(now);
                Some(now)
            }
            Err(e) => {
                error!("Clock read failed, timestamp unknown: {}", e);
                None
            }
        };

        let climate = self.climate.read().await.unwrap_or_else(|e| {
            warn!("Climate reading unavailable: {}", e);
            ClimateReadings::UNAVAILABLE
        });

        let (pressure_temp_c, pressure_hpa) = self.read_pressure().await;

        let clock_temp_c = self.clock.temperature().await.unwrap_or_else(|e| {
            warn!("Clock temperature unavailable: {}", e);
            SENTINEL_INT
        });

        let reading = Reading {
            timestamp,
            env_temp_c: sanitize(climate.temperature_celsius),
            env_humidity_pct: sanitize(climate.humidity_percent),
            pressure_temp_c,
            pressure_hpa,
            clock_temp_c,
        };

        self.record(&reading);
        reading
    }

    /// Pressure and the pressure sensor's own temperature. The temperature
    /// is read directly every tick, whether or not the event had a pressure.
    async fn read_pressure(&mut self) -> (f32, f32) {
        let Some(sensor) = self.pressure.as_mut() else {
            return (SENTINEL, SENTINEL);
        };

        let pressure_hpa = match sensor.read().await {
            Ok(PressureEvent {
                pressure_hpa: Some(hpa),
            }) if hpa != 0.0 => hpa,
            Ok(_) => {
                debug!("Pressure event carried no pressure");
                SENTINEL
            }
            Err(e) => {
                warn!("Pressure reading unavailable: {}", e);
                SENTINEL
            }
        };

        let temperature = sensor.read_temperature().await.unwrap_or_else(|e| {
            warn!("Pressure sensor temperature unavailable: {}", e);
            SENTINEL
        });

        (sanitize(temperature), sanitize(pressure_hpa))
    }

    /// Console first, then exactly one append of the whole row. The
    /// indicator is lit from the moment the file is open until the append
    /// returns, and stays off when the file cannot be opened.
    fn record(&mut self, reading: &Reading) {
        let row = match reading.to_row() {
            Ok(row) => row,
            Err(e) => {
                error!("Dropping reading {:?}: {}", reading, e);
                return;
            }
        };

        let _ = self.console.write_str(&row);

        let mut opened = false;
        let appended = self.storage.append(LOG_FILE_NAME, row.as_bytes(), || {
            opened = true;
            let _ = self.indicator.set_high();
        });
        if opened {
            let _ = self.indicator.set_low();
        }

        if let Err(e) = appended {
            error!("Row lost: {}", e);
            let _ = writeln!(self.console, "{}", APPEND_FAILED);
        }
    }

    /// Tick forever on the sample period.
    pub async fn run(mut self) -> ! {
        let mut cadence = Cadence::new(Instant::now(), SAMPLE_PERIOD);
        info!(
            "Sampling every {} s into {}",
            cadence.period().as_secs(),
            LOG_FILE_NAME
        );

        loop {
            let reading = self.tick().await;
            debug!("Tick at {:?}: {:?}", cadence.current(), reading);

            let (deadline, skipped) = cadence.advance(Instant::now());
            if skipped > 0 {
                warn!("Tick overran the sample period, skipping {} ticks", skipped);
            }
            Timer::at(deadline).await;
        }
    }
}

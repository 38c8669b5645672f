//! Fixed logger configuration and boot mode selection
//!
//! The sampling policy is deliberately not configurable. The only input the
//! device takes is an optional commissioning datetime, baked in at build time
//! and applied when the commissioning button is held during power-on.

use embassy_time::Duration;
use thiserror_no_std::Error;

use crate::time::DateTime;

/// Log file in the root directory of volume 0 (FAT 8.3 name).
pub const LOG_FILE_NAME: &str = "DATA.CSV";

/// Time between tick starts.
pub const SAMPLE_PERIOD: Duration = Duration::from_secs(10);

/// Comment row appended to the log on every boot.
pub const RESTART_MARKER: &str = "# Restarting ...";

/// Oldest and newest years the DS3231 can hold.
pub const MIN_CLOCK_YEAR: u16 = 2000;
pub const MAX_CLOCK_YEAR: u16 = 2199;

/// How the device should behave for this power cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootMode {
    /// Normal acquisition.
    Run,
    /// Write the given datetime to the RTC, then run normally.
    Commission(DateTime),
}

impl BootMode {
    /// Select the boot mode from the commissioning request line and the
    /// build-time datetime.
    ///
    /// Commissioning only happens when it was both requested (button held)
    /// and configured. A malformed datetime is reported and ignored.
    pub fn select(requested: bool, configured: Option<&str>) -> Self {
        match (requested, configured) {
            (true, Some(text)) => match parse_datetime(text) {
                Ok(datetime) => Self::Commission(datetime),
                Err(e) => {
                    log::error!("Ignoring commissioning datetime {:?}: {}", text, e);
                    Self::Run
                }
            },
            (true, None) => {
                log::warn!("Commissioning requested but no datetime was configured");
                Self::Run
            }
            (false, _) => Self::Run,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateTimeError {
    #[error("expected YYYY-MM-DD HH:MM:SS")]
    Format,
    #[error("year {year} outside {}..={}", MIN_CLOCK_YEAR, MAX_CLOCK_YEAR)]
    YearOutOfRange { year: u16 },
    #[error("not a calendar date/time")]
    OutOfRange,
}

/// Parse `YYYY-MM-DD HH:MM:SS` (a `T` separator is accepted too).
pub fn parse_datetime(text: &str) -> Result<DateTime, DateTimeError> {
    let text = text.trim();
    let bytes = text.as_bytes();
    if bytes.len() != 19
        || bytes[4] != b'-'
        || bytes[7] != b'-'
        || !matches!(bytes[10], b' ' | b'T')
        || bytes[13] != b':'
        || bytes[16] != b':'
    {
        return Err(DateTimeError::Format);
    }

    let year = number(&text[0..4])?;
    let datetime = DateTime::new(
        year,
        number(&text[5..7])? as u8,
        number(&text[8..10])? as u8,
        number(&text[11..13])? as u8,
        number(&text[14..16])? as u8,
        number(&text[17..19])? as u8,
    );

    if !(MIN_CLOCK_YEAR..=MAX_CLOCK_YEAR).contains(&year) {
        return Err(DateTimeError::YearOutOfRange { year });
    }
    if !datetime.is_valid() {
        return Err(DateTimeError::OutOfRange);
    }

    Ok(datetime)
}

fn number(digits: &str) -> Result<u16, DateTimeError> {
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DateTimeError::Format);
    }
    digits.parse().map_err(|_| DateTimeError::Format)
}

//! CSV row model: one `Reading` per tick, serialized as one log row.
//!
//! Column order is fixed:
//!
//! | # | column            | format            |
//! |---|-------------------|-------------------|
//! | 0-5 | year..second    | integer           |
//! | 6 | DHT temp (C)      | float, 2 decimals |
//! | 7 | DHT humidity (%)  | float, 2 decimals |
//! | 8 | BMP temp (C)      | float, 2 decimals |
//! | 9 | BMP pressure (hPa)| float, 2 decimals |
//! | 10 | DS3231 temp (C)  | integer           |
//!
//! A reading that was unavailable for the tick is written as the sentinel
//! `-1.00` (or `-1` for integer columns), never as `NaN`.

use core::fmt::Write;

use heapless::String;
use thiserror_no_std::Error;

use crate::config::RESTART_MARKER;
use crate::time::DateTime;

/// Sentinel for an unavailable float reading.
pub const SENTINEL: f32 = -1.0;

/// Sentinel for an unavailable integer reading.
pub const SENTINEL_INT: i16 = -1;

/// Header row (without line terminator).
pub const HEADER: &str = "year,month,day,hour,minute,second,\
DHT temp (C),DHT humidity (%),\
BMP temp (C),BMP pressure (hPa),\
DS3231 temp (C)";

/// Number of columns in every row.
pub const COLUMN_COUNT: usize = 11;

/// Row buffer size. Large enough for any `f32` printed with two decimals in
/// each float column, so serialization never truncates.
pub const ROW_CAPACITY: usize = 256;

/// A serialized row, including the trailing `\n`.
pub type LogRow = String<ROW_CAPACITY>;

/// Immutable snapshot of one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// `None` when the clock could not be read this tick.
    pub timestamp: Option<DateTime>,
    pub env_temp_c: f32,
    pub env_humidity_pct: f32,
    pub pressure_temp_c: f32,
    pub pressure_hpa: f32,
    pub clock_temp_c: i16,
}

impl Reading {
    /// Serialize to a single `\n`-terminated CSV row.
    pub fn to_row(&self) -> Result<LogRow, RowError> {
        let mut row = LogRow::new();

        let timestamp = match self.timestamp {
            Some(t) => write!(
                row,
                "{},{},{},{},{},{}",
                t.year, t.month, t.day, t.hour, t.minute, t.second
            ),
            None => row.write_str("-1,-1,-1,-1,-1,-1"),
        };
        timestamp.map_err(|_| RowError::Capacity)?;

        writeln!(
            row,
            ",{:.2},{:.2},{:.2},{:.2},{}",
            sanitize(self.env_temp_c),
            sanitize(self.env_humidity_pct),
            sanitize(self.pressure_temp_c),
            sanitize(self.pressure_hpa),
            self.clock_temp_c
        )
        .map_err(|_| RowError::Capacity)?;

        Ok(row)
    }
}

const _: () = assert!(HEADER.len() + RESTART_MARKER.len() + 2 <= ROW_CAPACITY);

/// What gets appended to the log at boot. A new file gets the header, then
/// the restart marker. An existing file gets a line break first, so the
/// marker starts its own line even after a row cut short by a power loss.
pub fn preamble(new_file: bool) -> LogRow {
    let mut lines = LogRow::new();
    // Both fit, see the assertion above.
    if new_file {
        let _ = lines.push_str(HEADER);
    }
    let _ = lines.push('\n');
    let _ = lines.push_str(RESTART_MARKER);
    let _ = lines.push('\n');
    lines
}

/// Replace a NaN reading with the sentinel.
pub fn sanitize(value: f32) -> f32 {
    if value.is_nan() { SENTINEL } else { value }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowError {
    #[error("row exceeds {} bytes", ROW_CAPACITY)]
    Capacity,
}

/// What a line read back from the log turned out to be.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Line {
    Header,
    /// Restart markers and any other `#` line.
    Comment,
    Blank,
    Data(Reading),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected {} fields, found {found}", COLUMN_COUNT)]
    FieldCount { found: usize },
    #[error("field {index} is not a number")]
    InvalidField { index: usize },
}

/// Classify one line of a log file and decode data rows.
///
/// A timestamp whose six fields are all `-1` decodes to `None`.
pub fn parse_row(line: &str) -> Result<Line, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(Line::Blank);
    }
    if line.starts_with('#') {
        return Ok(Line::Comment);
    }
    if line == HEADER {
        return Ok(Line::Header);
    }

    let found = line.split(',').count();
    if found != COLUMN_COUNT {
        return Err(ParseError::FieldCount { found });
    }

    let mut date = [0_i32; 6];
    let mut values = [0_f32; 4];
    let mut clock_temp_c = 0_i16;

    for (index, field) in line.split(',').enumerate() {
        let field = field.trim();
        let invalid = ParseError::InvalidField { index };
        match index {
            0..=5 => date[index] = field.parse().map_err(|_| invalid)?,
            6..=9 => values[index - 6] = field.parse().map_err(|_| invalid)?,
            _ => clock_temp_c = field.parse().map_err(|_| invalid)?,
        }
    }

    let timestamp = if date.iter().all(|&v| v == -1) {
        None
    } else {
        let field = |index: usize, max: i32| {
            if (0..=max).contains(&date[index]) {
                Ok(date[index])
            } else {
                Err(ParseError::InvalidField { index })
            }
        };
        Some(DateTime::new(
            field(0, u16::MAX as i32)? as u16,
            field(1, 12)? as u8,
            field(2, 31)? as u8,
            field(3, 23)? as u8,
            field(4, 59)? as u8,
            field(5, 59)? as u8,
        ))
    };

    Ok(Line::Data(Reading {
        timestamp,
        env_temp_c: values[0],
        env_humidity_pct: values[1],
        pressure_temp_c: values[2],
        pressure_hpa: values[3],
        clock_temp_c,
    }))
}

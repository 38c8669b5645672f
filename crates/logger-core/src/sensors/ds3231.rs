//! Maxim DS3231 real-time clock (I2C, address 0x68)
//!
//! Time registers 0x00..=0x06 hold seconds, minutes, hours, weekday, date,
//! month/century and year in BCD. The die temperature lives at 0x11 (signed
//! integer part) and 0x12 (bits 7:6, quarter degrees).

use embedded_hal_async::i2c::I2c;
use log::{error, info};

use super::{Clock, SensorError};
use crate::config::{MAX_CLOCK_YEAR, MIN_CLOCK_YEAR};
use crate::time::DateTime;

const SENSOR: &str = "DS3231";

pub const ADDRESS: u8 = 0x68;

const REG_SECONDS: u8 = 0x00;
const REG_STATUS: u8 = 0x0F;
const REG_TEMPERATURE: u8 = 0x11;

const HOUR_12H_MODE: u8 = 0x40;
const HOUR_PM: u8 = 0x20;
const MONTH_CENTURY: u8 = 0x80;
/// Oscillator stop flag, set whenever the clock lost power with no battery.
const STATUS_OSF: u8 = 0x80;

pub struct Ds3231<I> {
    i2c: I,
}

impl<I: I2c> Ds3231<I> {
    pub fn new(i2c: I) -> Self {
        Self { i2c }
    }

    async fn read_registers<const N: usize>(
        &mut self,
        register: u8,
        operation: &'static str,
    ) -> Result<[u8; N], SensorError> {
        let mut buf = [0_u8; N];
        self.i2c
            .write_read(ADDRESS, &[register], &mut buf)
            .await
            .map_err(|e| {
                error!("DS3231 {} failed: {:?}", operation, e);
                bus(operation)
            })?;
        Ok(buf)
    }

    async fn write_registers(&mut self, data: &[u8], operation: &'static str) -> Result<(), SensorError> {
        self.i2c.write(ADDRESS, data).await.map_err(|e| {
            error!("DS3231 {} failed: {:?}", operation, e);
            bus(operation)
        })
    }
}

fn bus(operation: &'static str) -> SensorError {
    SensorError::Bus {
        sensor: SENSOR,
        operation,
    }
}

fn from_bcd(value: u8) -> u8 {
    (value >> 4) * 10 + (value & 0x0f)
}

fn to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

/// Decode the seven time registers.
fn decode_time(raw: &[u8; 7]) -> DateTime {
    let second = from_bcd(raw[0] & 0x7f);
    let minute = from_bcd(raw[1] & 0x7f);
    let hour = if raw[2] & HOUR_12H_MODE != 0 {
        let hour12 = from_bcd(raw[2] & 0x1f) % 12;
        if raw[2] & HOUR_PM != 0 {
            hour12 + 12
        } else {
            hour12
        }
    } else {
        from_bcd(raw[2] & 0x3f)
    };
    let day = from_bcd(raw[4] & 0x3f);
    let month = from_bcd(raw[5] & 0x1f);
    let century = if raw[5] & MONTH_CENTURY != 0 { 100 } else { 0 };
    let year = MIN_CLOCK_YEAR + century + u16::from(from_bcd(raw[6]));

    DateTime::new(year, month, day, hour, minute, second)
}

/// Encode a datetime as the seven time registers, 24-hour mode.
fn encode_time(datetime: &DateTime) -> [u8; 7] {
    let offset = datetime.year - MIN_CLOCK_YEAR;
    let century = if offset >= 100 { MONTH_CENTURY } else { 0 };
    [
        to_bcd(datetime.second),
        to_bcd(datetime.minute),
        to_bcd(datetime.hour),
        weekday(datetime),
        to_bcd(datetime.day),
        to_bcd(datetime.month) | century,
        to_bcd((offset % 100) as u8),
    ]
}

/// Day of week, 1 = Sunday .. 7 = Saturday (Sakamoto's method).
fn weekday(datetime: &DateTime) -> u8 {
    const OFFSETS: [u16; 12] = [0, 3, 2, 5, 0, 3, 5, 1, 4, 6, 2, 4];
    let month = usize::from(datetime.month.clamp(1, 12));
    let year = if month < 3 {
        datetime.year - 1
    } else {
        datetime.year
    };
    let dow = (year + year / 4 - year / 100 + year / 400 + OFFSETS[month - 1]
        + u16::from(datetime.day))
        % 7;
    dow as u8 + 1
}

/// Quarter-degree register pair to whole degrees, truncated toward zero.
fn decode_temperature(msb: u8, lsb: u8) -> i16 {
    let quarters = i16::from(msb as i8) * 4 + i16::from(lsb >> 6);
    quarters / 4
}

impl<I: I2c> Clock for Ds3231<I> {
    async fn now(&mut self) -> Result<DateTime, SensorError> {
        let raw: [u8; 7] = self.read_registers(REG_SECONDS, "read time").await?;
        let datetime = decode_time(&raw);
        if !datetime.is_valid() {
            error!("DS3231 returned an invalid time: {:02x?}", raw);
            return Err(SensorError::ReadFailed {
                sensor: SENSOR,
                operation: "read time",
                details: "registers do not hold a calendar date",
            });
        }
        Ok(datetime)
    }

    async fn temperature(&mut self) -> Result<i16, SensorError> {
        let [msb, lsb] = self
            .read_registers::<2>(REG_TEMPERATURE, "read temperature")
            .await?;
        Ok(decode_temperature(msb, lsb))
    }

    async fn set(&mut self, datetime: &DateTime) -> Result<(), SensorError> {
        if !datetime.is_valid() || !(MIN_CLOCK_YEAR..=MAX_CLOCK_YEAR).contains(&datetime.year) {
            return Err(SensorError::ReadFailed {
                sensor: SENSOR,
                operation: "set time",
                details: "datetime outside the range the clock can hold",
            });
        }

        let registers = encode_time(datetime);
        let mut frame = [0_u8; 8];
        frame[0] = REG_SECONDS;
        frame[1..].copy_from_slice(&registers);
        self.write_registers(&frame, "set time").await?;

        // The time is trustworthy again, clear the oscillator stop flag.
        let [status] = self.read_registers::<1>(REG_STATUS, "read status").await?;
        if status & STATUS_OSF != 0 {
            self.write_registers(&[REG_STATUS, status & !STATUS_OSF], "clear oscillator stop flag")
                .await?;
        }

        info!("DS3231: clock set to {}", datetime);
        Ok(())
    }
}

//! FAT timestamps from the last clock reading
//!
//! `embedded-sdmmc` asks its `TimeSource` for the time whenever it updates a
//! directory entry. The RTC is async and sits on a shared bus, so instead of
//! reading it from inside the storage layer the acquisition loop publishes
//! every successful clock read here.

use core::cell::Cell;

#[cfg(not(test))]
use critical_section::Mutex;
use embedded_sdmmc::{TimeSource, Timestamp};

use crate::config::MIN_CLOCK_YEAR;
use crate::time::DateTime;

#[cfg(not(test))]
fn with_latest<R>(f: impl FnOnce(&Cell<Option<DateTime>>) -> R) -> R {
    static LATEST: Mutex<Cell<Option<DateTime>>> = Mutex::new(Cell::new(None));
    critical_section::with(|cs| f(LATEST.borrow(cs)))
}

// Each test runs on its own thread and sees only its own readings.
#[cfg(test)]
fn with_latest<R>(f: impl FnOnce(&Cell<Option<DateTime>>) -> R) -> R {
    std::thread_local! {
        static LATEST: Cell<Option<DateTime>> = const { Cell::new(None) };
    }
    LATEST.with(f)
}

/// Record the most recent clock reading.
pub fn publish(datetime: DateTime) {
    with_latest(|latest| latest.set(Some(datetime)));
}

/// The most recent clock reading, if any tick has read the clock yet.
pub fn latest() -> Option<DateTime> {
    with_latest(Cell::get)
}

/// `TimeSource` backed by [`latest`]. Before the first clock read, files
/// are stamped 2000-01-01 00:00:00.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockTimeSource;

impl TimeSource for ClockTimeSource {
    fn get_timestamp(&self) -> Timestamp {
        to_timestamp(latest().unwrap_or(DateTime::new(MIN_CLOCK_YEAR, 1, 1, 0, 0, 0)))
    }
}

fn to_timestamp(datetime: DateTime) -> Timestamp {
    Timestamp {
        year_since_1970: datetime.year.saturating_sub(1970).min(255) as u8,
        zero_indexed_month: datetime.month.clamp(1, 12) - 1,
        zero_indexed_day: datetime.day.clamp(1, 31) - 1,
        hours: datetime.hour.min(23),
        minutes: datetime.minute.min(59),
        seconds: datetime.second.min(59),
    }
}

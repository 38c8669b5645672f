//! Absolute-deadline tick schedule
//!
//! Ticks start at `start + k * period`. How long a tick takes never shifts
//! later deadlines, and a tick that overruns one or more periods does not
//! cause a burst of catch-up ticks: the boundaries it ran over are skipped.

use embassy_time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    last: Instant,
    period: Duration,
}

impl Cadence {
    /// Schedule whose first tick is due at `start`.
    pub const fn new(start: Instant, period: Duration) -> Self {
        Self {
            last: start,
            period,
        }
    }

    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Deadline of the tick in progress.
    pub const fn current(&self) -> Instant {
        self.last
    }

    /// Called once a tick has finished at `now`. Returns the next deadline
    /// and how many boundaries were already in the past and got skipped.
    pub fn advance(&mut self, now: Instant) -> (Instant, u64) {
        let period = self.period.as_ticks().max(1);
        let mut next = self.last + Duration::from_ticks(period);
        let mut skipped = 0;

        if now > next {
            skipped = (now - next).as_ticks().div_ceil(period);
            next += Duration::from_ticks(period * skipped);
        }

        self.last = next;
        (next, skipped)
    }
}

//! Timezone-aware clock abstraction and calendar helpers.
//!
//! Every day-boundary computation in the crate (warm-up day, daily counter,
//! window membership) is made in the timezone carried by the [`Clock`], never
//! in the host's ambient local time.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;

/// Source of the current instant in the configured timezone.
pub trait Clock: Send + Sync {
    /// Current time in the configured timezone.
    fn now(&self) -> DateTime<Tz>;

    /// Timezone used for calendar computations.
    fn timezone(&self) -> Tz;
}

/// Wall clock backed by the system time.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    /// Create a system clock reporting time in `tz`.
    pub const fn new(tz: Tz) -> Self {
        Self { tz }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }

    fn timezone(&self) -> Tz {
        self.tz
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Tz>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Tz>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Create a clock frozen at the given local wall time, if it exists in `tz`.
    pub fn at(tz: Tz, year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Option<Self> {
        tz.with_ymd_and_hms(year, month, day, hour, minute, 0)
            .single()
            .map(Self::new)
    }

    /// Jump to an absolute instant.
    pub fn set(&self, now: DateTime<Tz>) {
        *self.now.lock() = now;
    }

    /// Move the clock forward (or backward, for negative durations).
    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Tz> {
        *self.now.lock()
    }

    fn timezone(&self) -> Tz {
        self.now.lock().timezone()
    }
}

/// First instant of the local calendar day containing `now`.
///
/// If local midnight does not exist (a DST jump at 00:00), the first valid
/// top-of-hour of that day is used instead.
pub fn start_of_day(now: &DateTime<Tz>) -> DateTime<Utc> {
    let tz = now.timezone();
    let date = now.date_naive();
    (0..24)
        .find_map(|hour| {
            let local = date.and_hms_opt(hour, 0, 0)?;
            tz.from_local_datetime(&local).earliest()
        })
        .map_or_else(|| now.with_timezone(&Utc), |t| t.with_timezone(&Utc))
}

/// Local calendar date of `instant` in `tz`.
pub fn local_date(instant: &DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

//! Static admission policy values: the warm-up quota schedule and the
//! time-of-day window.

use std::fmt;

use chrono::Timelike;
use serde::{Deserialize, Serialize};

use crate::core::ConfigError;

/// Daily quotas indexed 1-based by warm-up day.
///
/// Never empty, every entry strictly positive. The last value is sticky: it
/// applies to every day past the end of the schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub struct QuotaSchedule(Vec<u32>);

impl QuotaSchedule {
    /// Validate and wrap a schedule.
    pub fn new(values: Vec<u32>) -> Result<Self, ConfigError> {
        if values.is_empty() {
            return Err(ConfigError::Invalid("warm-up schedule cannot be empty".into()));
        }
        if let Some(pos) = values.iter().position(|v| *v == 0) {
            return Err(ConfigError::Invalid(format!(
                "warm-up schedule entry {} must be positive",
                pos + 1
            )));
        }
        Ok(Self(values))
    }

    /// Parse a comma separated list such as `"50,100,200"`.
    pub fn parse_list(raw: &str) -> Result<Self, ConfigError> {
        let values = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<u32>().map_err(|e| {
                    ConfigError::Invalid(format!("warm-up schedule entry `{s}`: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(values)
    }

    /// Quota for a 1-based warm-up day; sticks at the last entry.
    pub fn quota_for_day(&self, day: u32) -> u32 {
        let last = self.0.len();
        let idx = usize::try_from(day).unwrap_or(usize::MAX).clamp(1, last) - 1;
        self.0[idx]
    }

    /// Number of configured days.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw entries.
    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }
}

impl TryFrom<Vec<u32>> for QuotaSchedule {
    type Error = ConfigError;

    fn try_from(values: Vec<u32>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<QuotaSchedule> for Vec<u32> {
    fn from(schedule: QuotaSchedule) -> Self {
        schedule.0
    }
}

/// Inclusive hour range during which submissions are allowed.
///
/// `start <= end` is a same-day range, `start > end` wraps past midnight.
/// An `end_hour` of `0` or `24` means "through the end of the day".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start_hour: u32,
    end_hour: u32,
}

impl TimeWindow {
    /// Validate hour bounds: `start_hour` in `0..=23`, `end_hour` in `0..=24`.
    pub fn new(start_hour: u32, end_hour: u32) -> Result<Self, ConfigError> {
        if start_hour > 23 {
            return Err(ConfigError::Invalid(format!(
                "start_hour {start_hour} must be between 0 and 23"
            )));
        }
        if end_hour > 24 {
            return Err(ConfigError::Invalid(format!(
                "end_hour {end_hour} must be between 0 and 24"
            )));
        }
        Ok(Self {
            start_hour,
            end_hour,
        })
    }

    /// Configured start hour.
    pub const fn start_hour(&self) -> u32 {
        self.start_hour
    }

    /// Configured end hour, before normalization.
    pub const fn end_hour(&self) -> u32 {
        self.end_hour
    }

    const fn normalized_end(&self) -> u32 {
        if self.end_hour == 0 {
            24
        } else {
            self.end_hour
        }
    }

    /// Whether `hour` (0..=23) falls in the window.
    pub const fn contains_hour(&self, hour: u32) -> bool {
        let start = self.start_hour;
        let end = self.normalized_end();
        if start <= end {
            start <= hour && hour <= end
        } else {
            hour >= start || hour <= end
        }
    }

    /// Whether the wall-clock time `t` falls in the window.
    pub fn contains<T: Timelike>(&self, t: &T) -> bool {
        self.contains_hour(t.hour())
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = match self.normalized_end() {
            24 => 23,
            h => h,
        };
        write!(f, "{:02}:00-{end:02}:59", self.start_hour)
    }
}

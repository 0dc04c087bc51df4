//! Randomized pre-submission delay.

use std::time::Duration;

use rand::Rng;

/// Uniform random delay drawn from an inclusive range.
///
/// Desynchronizes concurrent orchestrators and keeps outbound requests off a
/// fixed-period signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jitter {
    min: Duration,
    max: Duration,
}

impl Jitter {
    /// Create a jitter range; the bounds are ordered if given reversed.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    /// Jitter range expressed in whole seconds.
    pub fn from_secs(min_secs: u64, max_secs: u64) -> Self {
        Self::new(Duration::from_secs(min_secs), Duration::from_secs(max_secs))
    }

    /// A range that never delays.
    pub const fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Lower bound.
    pub const fn min(&self) -> Duration {
        self.min
    }

    /// Upper bound.
    pub const fn max(&self) -> Duration {
        self.max
    }

    /// Whether every sample is zero.
    pub fn is_zero(&self) -> bool {
        self.max.is_zero()
    }

    /// Draw a delay using the thread-local generator.
    pub fn sample(&self) -> Duration {
        self.sample_with(&mut rand::rng())
    }

    /// Draw a delay with millisecond resolution from `rng`.
    pub fn sample_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let lo = u64::try_from(self.min.as_millis()).unwrap_or(u64::MAX);
        let hi = u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rng.random_range(lo..=hi))
    }
}

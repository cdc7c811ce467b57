//! The four-valued outcome tag and the time-unit conversions used when
//! recording a sample.

use std::time::Duration;

/// Classifies a recorded call along (success/failure) × (fast/slow).
///
/// Carrying both axes in one tag avoids re-deriving slowness downstream:
/// a window never needs to know the caller's slow-call threshold, only
/// whether this particular call crossed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Completed successfully, within the slow-call threshold.
    Success,
    /// Completed with a failure, within the slow-call threshold.
    Error,
    /// Completed successfully, but exceeded the slow-call threshold.
    SlowSuccess,
    /// Completed with a failure, and exceeded the slow-call threshold.
    SlowError,
}

impl Outcome {
    /// Whether this outcome counts toward the failure rate.
    pub fn is_failure(self) -> bool {
        matches!(self, Outcome::Error | Outcome::SlowError)
    }

    /// Whether this outcome counts toward the slow-call rate.
    pub fn is_slow(self) -> bool {
        matches!(self, Outcome::SlowSuccess | Outcome::SlowError)
    }
}

/// A unit a caller may supply a raw duration in. Normalized to nanoseconds
/// internally; over-large inputs at any realistic attempt count fit in the
/// `u64` nanosecond representation without overflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    /// Nanoseconds.
    Nanos,
    /// Microseconds.
    Micros,
    /// Milliseconds.
    Millis,
    /// Seconds.
    Seconds,
    /// Minutes.
    Minutes,
    /// Hours.
    Hours,
    /// Days.
    Days,
}

impl TimeUnit {
    /// Convert a raw magnitude in this unit to nanoseconds, saturating
    /// rather than overflowing.
    pub fn to_nanos(self, raw: u64) -> u64 {
        let multiplier: u64 = match self {
            TimeUnit::Nanos => 1,
            TimeUnit::Micros => 1_000,
            TimeUnit::Millis => 1_000_000,
            TimeUnit::Seconds => 1_000_000_000,
            TimeUnit::Minutes => 60 * 1_000_000_000,
            TimeUnit::Hours => 60 * 60 * 1_000_000_000,
            TimeUnit::Days => 24 * 60 * 60 * 1_000_000_000,
        };
        raw.saturating_mul(multiplier)
    }
}

/// Convert a [`Duration`] to a nanosecond count, the internal
/// representation every window bucket uses.
pub fn duration_to_nanos(duration: Duration) -> u64 {
    duration.as_nanos().min(u64::MAX as u128) as u64
}

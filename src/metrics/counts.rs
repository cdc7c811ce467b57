//! `Counts` is the shared aggregation shape used both as a bucket's payload
//! and as the window's running aggregate; `Snapshot` is the immutable view
//! derived from it.

use super::outcome::Outcome;

/// Counters aggregated over some subset of recorded samples (either a
/// single sample, for a count-window bucket, or every sample landing in a
/// given second, for a time-window bucket, or the whole window).
///
/// Invariants: `failed <= total`, `slow <= total`,
/// `slow_failed <= min(failed, slow)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Counts {
    pub total: u64,
    pub failed: u64,
    pub slow: u64,
    pub slow_failed: u64,
    pub total_duration_ns: u64,
}

impl Counts {
    /// The contribution of a single recorded sample.
    pub fn for_sample(duration_ns: u64, outcome: Outcome) -> Self {
        Counts {
            total: 1,
            failed: outcome.is_failure() as u64,
            slow: outcome.is_slow() as u64,
            slow_failed: (outcome == Outcome::SlowError) as u64,
            total_duration_ns: duration_ns,
        }
    }

    pub fn add_assign(&mut self, other: &Counts) {
        self.total += other.total;
        self.failed += other.failed;
        self.slow += other.slow;
        self.slow_failed += other.slow_failed;
        self.total_duration_ns += other.total_duration_ns;
    }

    pub fn sub_assign(&mut self, other: &Counts) {
        self.total -= other.total;
        self.failed -= other.failed;
        self.slow -= other.slow;
        self.slow_failed -= other.slow_failed;
        self.total_duration_ns -= other.total_duration_ns;
    }
}

/// An immutable, by-value snapshot of a metrics window's aggregate state.
/// Carries no reference to the window it was derived from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    /// Total number of calls contributing to this snapshot.
    pub total_calls: u64,
    /// `total_calls - failed_calls`.
    pub successful_calls: u64,
    /// Number of calls classified as a failure (fast or slow).
    pub failed_calls: u64,
    /// Number of calls classified as slow (succeeded or failed).
    pub slow_calls: u64,
    /// `slow_calls - slow_failed_calls`.
    pub slow_successful_calls: u64,
    /// Number of calls that were both slow and a failure.
    pub slow_failed_calls: u64,
    /// `failed_calls / total_calls * 100`, or `0.0` if `total_calls == 0`.
    pub failure_rate_pct: f64,
    /// `slow_calls / total_calls * 100`, or `0.0` if `total_calls == 0`.
    pub slow_call_rate_pct: f64,
    /// Sum of every recorded call's duration.
    pub total_duration: std::time::Duration,
    /// `total_duration / total_calls`, or zero if `total_calls == 0`.
    pub average_duration: std::time::Duration,
}

impl Snapshot {
    pub(crate) fn from_counts(counts: &Counts) -> Self {
        let total = counts.total;
        let rate = |numerator: u64| {
            if total == 0 {
                0.0
            } else {
                100.0 * numerator as f64 / total as f64
            }
        };
        let total_duration = std::time::Duration::from_nanos(counts.total_duration_ns);
        let average_duration = if total == 0 {
            std::time::Duration::ZERO
        } else {
            total_duration / total as u32
        };
        Snapshot {
            total_calls: total,
            successful_calls: total - counts.failed,
            failed_calls: counts.failed,
            slow_calls: counts.slow,
            slow_successful_calls: counts.slow - counts.slow_failed,
            slow_failed_calls: counts.slow_failed,
            failure_rate_pct: rate(counts.failed),
            slow_call_rate_pct: rate(counts.slow),
            total_duration,
            average_duration,
        }
    }

    /// An all-zero snapshot, as returned by a freshly constructed window.
    pub fn empty() -> Self {
        Snapshot::from_counts(&Counts::default())
    }
}

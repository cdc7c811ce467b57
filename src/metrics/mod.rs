//! The sliding-window metrics engine (component G): records `(duration,
//! outcome)` samples into either a count-bounded or time-bounded ring of
//! buckets and produces aggregated [`Snapshot`]s in O(1).

mod count_window;
mod counts;
mod outcome;
mod time_window;

pub use count_window::{CountWindow, LockFreeCountWindow};
pub use counts::Snapshot;
pub use outcome::{duration_to_nanos, Outcome, TimeUnit};
pub use time_window::{LockFreeTimeWindow, TimeWindow};

use std::time::Duration;

/// Common surface shared by every window variant (mutex-guarded and
/// lock-free, count-bounded and time-bounded).
///
/// Never fails: a window with zero samples returns a well-formed,
/// all-zero [`Snapshot`].
pub trait MetricsWindow: Send + Sync {
    /// Record one sample and return the snapshot immediately after it was
    /// folded in. The returned snapshot always reflects this record, even
    /// if other threads are concurrently recording.
    fn record(&self, duration: Duration, outcome: Outcome) -> Snapshot;

    /// The current snapshot, without recording anything. May miss records
    /// made concurrently by other threads, but never a torn view.
    fn snapshot(&self) -> Snapshot;

    /// Convenience wrapper accepting a raw magnitude and [`TimeUnit`]
    /// instead of a [`Duration`], for callers bridging from a system whose
    /// durations are not already `Duration`-typed.
    fn record_raw(&self, raw: u64, unit: TimeUnit, outcome: Outcome) -> Snapshot {
        self.record(Duration::from_nanos(unit.to_nanos(raw)), outcome)
    }
}

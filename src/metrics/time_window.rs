//! Time-based sliding window (component G.2): only samples recorded within
//! the last *W* whole seconds contribute to the snapshot.

use std::time::Duration;

use crossbeam::atomic::AtomicCell;
use parking_lot::Mutex;

use super::{
    counts::{Counts, Snapshot},
    outcome::{duration_to_nanos, Outcome},
    MetricsWindow,
};
use crate::clock::{Clock, SystemClock};
use crate::error::{CoreError, CoreResult};

/// The second a bucket last covered, plus its accumulated counts. `sec ==
/// None` means the slot has never been written (equivalent to "stale", for
/// recycling purposes).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Slot {
    sec: Option<u64>,
    counts: Counts,
}

fn current_epoch_second(clock: &impl Clock) -> u64 {
    clock.monotonic_time_ns() / 1_000_000_000
}

struct Inner {
    buckets: Vec<Slot>,
    aggregate: Counts,
}

impl Inner {
    /// Recycle every bucket whose covered second is more than `window_secs`
    /// behind `now_sec`, so a snapshot never reflects a sample older than
    /// the window. Cheap: `window_secs` buckets, checked unconditionally.
    fn sweep(&mut self, now_sec: u64, window_secs: u64) {
        for slot in &mut self.buckets {
            if let Some(sec) = slot.sec {
                if sec + window_secs <= now_sec {
                    self.aggregate.sub_assign(&slot.counts);
                    *slot = Slot::default();
                }
            }
        }
    }

    fn record_into(&mut self, now_sec: u64, window_secs: u64, new: Counts) {
        self.sweep(now_sec, window_secs);
        let idx = (now_sec % window_secs) as usize;
        if self.buckets[idx].sec != Some(now_sec) {
            self.aggregate.sub_assign(&self.buckets[idx].counts);
            self.buckets[idx] = Slot {
                sec: Some(now_sec),
                counts: Counts::default(),
            };
        }
        self.buckets[idx].counts.add_assign(&new);
        self.aggregate.add_assign(&new);
    }
}

/// A time-bounded window of `window_secs` seconds, guarded by a single
/// mutex around both `record` and `snapshot`.
pub struct TimeWindow<C: Clock + Clone = SystemClock> {
    clock: C,
    window_secs: u64,
    inner: Mutex<Inner>,
}

impl TimeWindow<SystemClock> {
    /// A window driven by the real system clock.
    pub fn new(window_secs: u64) -> CoreResult<Self> {
        Self::with_clock(window_secs, SystemClock)
    }
}

impl<C: Clock + Clone> TimeWindow<C> {
    /// A window driven by `clock`. `window_secs` must be `>= 1`.
    pub fn with_clock(window_secs: u64, clock: C) -> CoreResult<Self> {
        if window_secs == 0 {
            return Err(CoreError::validation("time window size must be >= 1 second"));
        }
        Ok(TimeWindow {
            clock,
            window_secs,
            inner: Mutex::new(Inner {
                buckets: vec![Slot::default(); window_secs as usize],
                aggregate: Counts::default(),
            }),
        })
    }

    /// The configured window size, in seconds.
    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }
}

impl<C: Clock + Clone> MetricsWindow for TimeWindow<C> {
    fn record(&self, duration: Duration, outcome: Outcome) -> Snapshot {
        let new = Counts::for_sample(duration_to_nanos(duration), outcome);
        let now_sec = current_epoch_second(&self.clock);
        let mut inner = self.inner.lock();
        inner.record_into(now_sec, self.window_secs, new);
        Snapshot::from_counts(&inner.aggregate)
    }

    fn snapshot(&self) -> Snapshot {
        let now_sec = current_epoch_second(&self.clock);
        let mut inner = self.inner.lock();
        inner.sweep(now_sec, self.window_secs);
        Snapshot::from_counts(&inner.aggregate)
    }
}

/// The lock-free counterpart of [`TimeWindow`]. Each bucket is an
/// `AtomicCell<Slot>`; writers and the periodic sweep retry a
/// compare-exchange loop per bucket rather than holding a window-wide lock.
pub struct LockFreeTimeWindow<C: Clock + Clone = SystemClock> {
    clock: C,
    window_secs: u64,
    buckets: Vec<AtomicCell<Slot>>,
    aggregate: AtomicCell<Counts>,
}

impl LockFreeTimeWindow<SystemClock> {
    /// A window driven by the real system clock.
    pub fn new(window_secs: u64) -> CoreResult<Self> {
        Self::with_clock(window_secs, SystemClock)
    }
}

impl<C: Clock + Clone> LockFreeTimeWindow<C> {
    /// A window driven by `clock`. `window_secs` must be `>= 1`.
    pub fn with_clock(window_secs: u64, clock: C) -> CoreResult<Self> {
        if window_secs == 0 {
            return Err(CoreError::validation("time window size must be >= 1 second"));
        }
        Ok(LockFreeTimeWindow {
            clock,
            window_secs,
            buckets: (0..window_secs)
                .map(|_| AtomicCell::new(Slot::default()))
                .collect(),
            aggregate: AtomicCell::new(Counts::default()),
        })
    }

    fn fold_aggregate(&self, delta_sub: Counts, delta_add: Counts) {
        loop {
            let current = self.aggregate.load();
            let mut next = current;
            next.sub_assign(&delta_sub);
            next.add_assign(&delta_add);
            if self.aggregate.compare_exchange(current, next).is_ok() {
                return;
            }
        }
    }

    fn sweep(&self, now_sec: u64) {
        for bucket in &self.buckets {
            loop {
                let current = bucket.load();
                let Some(sec) = current.sec else { break };
                if sec + self.window_secs > now_sec {
                    break;
                }
                if bucket
                    .compare_exchange(current, Slot::default())
                    .is_ok()
                {
                    self.fold_aggregate(current.counts, Counts::default());
                    break;
                }
            }
        }
    }

    /// The configured window size, in seconds.
    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }
}

impl<C: Clock + Clone> MetricsWindow for LockFreeTimeWindow<C> {
    fn record(&self, duration: Duration, outcome: Outcome) -> Snapshot {
        let new = Counts::for_sample(duration_to_nanos(duration), outcome);
        let now_sec = current_epoch_second(&self.clock);
        self.sweep(now_sec);

        let idx = (now_sec % self.window_secs) as usize;
        loop {
            let current = self.buckets[idx].load();
            if current.sec == Some(now_sec) {
                let mut next = current;
                next.counts.add_assign(&new);
                if self.buckets[idx].compare_exchange(current, next).is_ok() {
                    self.fold_aggregate(Counts::default(), new);
                    break;
                }
            } else {
                let next = Slot {
                    sec: Some(now_sec),
                    counts: new,
                };
                if self.buckets[idx].compare_exchange(current, next).is_ok() {
                    self.fold_aggregate(current.counts, new);
                    break;
                }
            }
        }
        Snapshot::from_counts(&self.aggregate.load())
    }

    fn snapshot(&self) -> Snapshot {
        let now_sec = current_epoch_second(&self.clock);
        self.sweep(now_sec);
        Snapshot::from_counts(&self.aggregate.load())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::clock::testing::ManualClock;

    #[test]
    fn scenario_three_time_window_eviction() {
        let clock = Arc::new(ManualClock::new());
        let w = TimeWindow::with_clock(2, clock.clone()).unwrap();

        // t = 0
        w.record(Duration::from_nanos(100), Outcome::Error);

        // t = 1
        clock.advance(Duration::from_secs(1));
        let s = w.record(Duration::from_nanos(100), Outcome::Success);
        assert_eq!(s.total_calls, 2);
        assert_eq!(s.failed_calls, 1);

        // t = 2: snapshot only, no new record
        clock.advance(Duration::from_secs(1));
        let s = w.snapshot();
        assert_eq!(s.total_calls, 1);
        assert_eq!(s.failed_calls, 0);
    }

    #[test]
    fn lock_free_time_window_matches_scenario_three() {
        let clock = Arc::new(ManualClock::new());
        let w = LockFreeTimeWindow::with_clock(2, clock.clone()).unwrap();

        w.record(Duration::from_nanos(100), Outcome::Error);
        clock.advance(Duration::from_secs(1));
        let s = w.record(Duration::from_nanos(100), Outcome::Success);
        assert_eq!(s.total_calls, 2);
        assert_eq!(s.failed_calls, 1);

        clock.advance(Duration::from_secs(1));
        let s = w.snapshot();
        assert_eq!(s.total_calls, 1);
        assert_eq!(s.failed_calls, 0);
    }

    #[test]
    fn sparse_writes_still_evict_on_snapshot() {
        let clock = Arc::new(ManualClock::new());
        let w = TimeWindow::with_clock(3, clock.clone()).unwrap();
        w.record(Duration::from_nanos(1), Outcome::Success);
        clock.advance(Duration::from_secs(10));
        let s = w.snapshot();
        assert_eq!(s.total_calls, 0);
    }
}

//! Count-based sliding window (component G.1): the last *N* recorded
//! samples — no more, no less — contribute to the snapshot.

use std::time::Duration;

use crossbeam::atomic::AtomicCell;
use parking_lot::Mutex;

use super::{
    counts::{Counts, Snapshot},
    outcome::{duration_to_nanos, Outcome},
    MetricsWindow,
};
use crate::error::{CoreError, CoreResult};

struct Inner {
    buckets: Vec<Counts>,
    index: usize,
    aggregate: Counts,
}

/// A count-bounded window of size *N*, guarded by a single mutex around
/// both `record` and `snapshot`. The reference implementation: simple,
/// correct, bounded worst-case.
pub struct CountWindow {
    inner: Mutex<Inner>,
    size: usize,
}

impl CountWindow {
    /// `size` must be `>= 1`.
    pub fn new(size: usize) -> CoreResult<Self> {
        if size == 0 {
            return Err(CoreError::validation("count window size must be >= 1"));
        }
        Ok(CountWindow {
            inner: Mutex::new(Inner {
                buckets: vec![Counts::default(); size],
                index: 0,
                aggregate: Counts::default(),
            }),
            size,
        })
    }

    /// The configured window size.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl MetricsWindow for CountWindow {
    fn record(&self, duration: Duration, outcome: Outcome) -> Snapshot {
        let new = Counts::for_sample(duration_to_nanos(duration), outcome);
        let mut inner = self.inner.lock();
        let idx = inner.index;
        let old = inner.buckets[idx];
        inner.aggregate.sub_assign(&old);
        inner.aggregate.add_assign(&new);
        inner.buckets[idx] = new;
        inner.index = (idx + 1) % inner.buckets.len();
        Snapshot::from_counts(&inner.aggregate)
    }

    fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();
        Snapshot::from_counts(&inner.aggregate)
    }
}

/// The lock-free counterpart of [`CountWindow`]. Each bucket and the
/// aggregate are independent `AtomicCell`s; a writer claims the next slot
/// with a fetch-add on the index, then retries a compare-exchange loop to
/// fold its delta into the aggregate. Produces the same snapshot values as
/// `CountWindow` under any interleaving equivalent to some serialization of
/// the same `record` calls.
pub struct LockFreeCountWindow {
    buckets: Vec<AtomicCell<Counts>>,
    index: std::sync::atomic::AtomicUsize,
    aggregate: AtomicCell<Counts>,
    size: usize,
}

impl LockFreeCountWindow {
    /// `size` must be `>= 1`.
    pub fn new(size: usize) -> CoreResult<Self> {
        if size == 0 {
            return Err(CoreError::validation("count window size must be >= 1"));
        }
        Ok(LockFreeCountWindow {
            buckets: (0..size).map(|_| AtomicCell::new(Counts::default())).collect(),
            index: std::sync::atomic::AtomicUsize::new(0),
            aggregate: AtomicCell::new(Counts::default()),
            size,
        })
    }

    /// The configured window size.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl MetricsWindow for LockFreeCountWindow {
    fn record(&self, duration: Duration, outcome: Outcome) -> Snapshot {
        use std::sync::atomic::Ordering;

        let new = Counts::for_sample(duration_to_nanos(duration), outcome);
        let slot = self.index.fetch_add(1, Ordering::Relaxed) % self.buckets.len();
        let old = self.buckets[slot].swap(new);

        loop {
            let current = self.aggregate.load();
            let mut next = current;
            next.sub_assign(&old);
            next.add_assign(&new);
            if self
                .aggregate
                .compare_exchange(current, next)
                .is_ok()
            {
                return Snapshot::from_counts(&next);
            }
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot::from_counts(&self.aggregate.load())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn basic_sequence(w: &dyn MetricsWindow) -> Snapshot {
        w.record(Duration::from_nanos(100), Outcome::Success);
        w.record(Duration::from_nanos(200), Outcome::Error);
        w.record(Duration::from_nanos(300), Outcome::SlowSuccess);
        w.record(Duration::from_nanos(400), Outcome::SlowError);
        w.record(Duration::from_nanos(500), Outcome::Success)
    }

    #[test]
    fn scenario_one_count_window_basic() {
        let w = CountWindow::new(5).unwrap();
        let s = basic_sequence(&w);
        assert_eq!(s.total_calls, 5);
        assert_eq!(s.failed_calls, 2);
        assert_eq!(s.slow_calls, 2);
        assert_eq!(s.slow_failed_calls, 1);
        assert_eq!(s.successful_calls, 3);
        assert_eq!(s.slow_successful_calls, 1);
        assert_eq!(s.total_duration, Duration::from_nanos(1500));
        assert_eq!(s.average_duration, Duration::from_nanos(300));
        assert_eq!(s.failure_rate_pct, 40.0);
        assert_eq!(s.slow_call_rate_pct, 40.0);
    }

    #[test]
    fn scenario_two_count_window_eviction() {
        let w = CountWindow::new(5).unwrap();
        basic_sequence(&w);
        let s = w.record(Duration::from_nanos(600), Outcome::Success);
        assert_eq!(s.total_calls, 5);
        assert_eq!(s.failed_calls, 1);
        assert_eq!(s.slow_calls, 2);
        assert_eq!(s.slow_failed_calls, 1);
        assert_eq!(s.total_duration, Duration::from_nanos(2000));
        assert_eq!(s.average_duration, Duration::from_nanos(400));
        assert_eq!(s.failure_rate_pct, 20.0);
    }

    #[test]
    fn lock_free_matches_mutex_guarded_reference() {
        let mutex_w = CountWindow::new(5).unwrap();
        let lock_free_w = LockFreeCountWindow::new(5).unwrap();
        let samples = [
            (100u64, Outcome::Success),
            (200, Outcome::Error),
            (300, Outcome::SlowSuccess),
            (400, Outcome::SlowError),
            (500, Outcome::Success),
            (600, Outcome::Success),
        ];
        for (ns, outcome) in samples {
            mutex_w.record(Duration::from_nanos(ns), outcome);
            lock_free_w.record(Duration::from_nanos(ns), outcome);
        }
        assert_eq!(mutex_w.snapshot(), lock_free_w.snapshot());
    }

    #[test]
    fn before_full_only_recorded_samples_contribute() {
        let w = CountWindow::new(5).unwrap();
        w.record(Duration::from_nanos(100), Outcome::Success);
        let s = w.record(Duration::from_nanos(200), Outcome::Error);
        assert_eq!(s.total_calls, 2);
    }

    #[test]
    fn aggregate_equals_sum_of_buckets_after_many_records() {
        let w = CountWindow::new(4).unwrap();
        for i in 0..20u64 {
            let outcome = match i % 4 {
                0 => Outcome::Success,
                1 => Outcome::Error,
                2 => Outcome::SlowSuccess,
                _ => Outcome::SlowError,
            };
            w.record(Duration::from_nanos(i + 1), outcome);
        }
        let inner = w.inner.lock();
        let mut expected = Counts::default();
        for c in &inner.buckets {
            expected.add_assign(c);
        }
        assert_eq!(inner.aggregate, expected);
    }
}

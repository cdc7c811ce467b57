//! Abstract time sources (component A) and the stopwatch built on top of
//! them (component B).
//!
//! Wall time is for human-visible timestamps only; every duration
//! measurement in this crate goes through `monotonic_time_ns`.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A source of wall-clock and monotonic time.
///
/// Implementations must make `monotonic_time_ns` non-decreasing across the
/// lifetime of a single process; `wall_time_ms` may jump (NTP adjustment,
/// manual test clock, etc.) and must never be used to measure an interval.
pub trait Clock: Send + Sync {
    /// Current wall-clock time, in milliseconds since the Unix epoch.
    fn wall_time_ms(&self) -> u64;

    /// Current monotonic time, in nanoseconds. Only the deltas between two
    /// calls on the same `Clock` are meaningful.
    fn monotonic_time_ns(&self) -> u64;
}

/// The process-wide real clock. Zero-sized; cheap to pass by value.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

/// The always-available process clock instance.
pub static SYSTEM: SystemClock = SystemClock;

impl Clock for SystemClock {
    fn wall_time_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn monotonic_time_ns(&self) -> u64 {
        // Instant has no fixed epoch, so we anchor to a process-start
        // instant captured once and measure elapsed nanoseconds from it.
        // This keeps `monotonic_time_ns` cheap (no global lock) while still
        // satisfying "non-decreasing across a single process".
        static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        let start = *START.get_or_init(Instant::now);
        start.elapsed().as_nanos() as u64
    }
}

impl<T: Clock + ?Sized> Clock for std::sync::Arc<T> {
    fn wall_time_ms(&self) -> u64 {
        (**self).wall_time_ms()
    }

    fn monotonic_time_ns(&self) -> u64 {
        (**self).monotonic_time_ns()
    }
}

/// Records a start instant and yields elapsed duration on demand.
///
/// Immutable after construction: there is no `reset`. Borrows the clock
/// rather than boxing it so the common case (measuring against
/// [`SYSTEM`]) costs no indirection.
pub struct Stopwatch<'c, C: Clock> {
    clock: &'c C,
    start_ns: u64,
}

impl<'c, C: Clock> Stopwatch<'c, C> {
    /// Start a stopwatch against `clock`.
    pub fn start(clock: &'c C) -> Self {
        Stopwatch {
            clock,
            start_ns: clock.monotonic_time_ns(),
        }
    }

    /// Elapsed duration since `start`. May be called repeatedly.
    pub fn elapsed(&self) -> Duration {
        let now = self.clock.monotonic_time_ns();
        Duration::from_nanos(now.saturating_sub(self.start_ns))
    }
}

/// Test doubles for [`Clock`]: a clock whose wall and monotonic readings are
/// advanced explicitly by the test rather than by wall-clock time passing.
#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::Clock;

    /// A clock fully controlled by the test: `advance` moves both wall and
    /// monotonic time forward by the same amount, matching how a single
    /// real clock behaves.
    #[derive(Debug, Default)]
    pub struct ManualClock {
        wall_ms: AtomicU64,
        monotonic_ns: AtomicU64,
    }

    impl ManualClock {
        /// Create a clock starting at time zero.
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a clock starting at the given wall time, with monotonic
        /// time starting at zero.
        pub fn starting_at(wall_ms: u64) -> Self {
            ManualClock {
                wall_ms: AtomicU64::new(wall_ms),
                monotonic_ns: AtomicU64::new(0),
            }
        }

        /// Advance both wall and monotonic time by `duration`.
        pub fn advance(&self, duration: std::time::Duration) {
            self.wall_ms
                .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
            self.monotonic_ns
                .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
        }

        /// Advance monotonic time only, leaving wall time untouched. Useful
        /// for tests that want to simulate clock skew.
        pub fn advance_monotonic_only(&self, duration: std::time::Duration) {
            self.monotonic_ns
                .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn wall_time_ms(&self) -> u64 {
            self.wall_ms.load(Ordering::SeqCst)
        }

        fn monotonic_time_ns(&self) -> u64 {
            self.monotonic_ns.load(Ordering::SeqCst)
        }
    }
}

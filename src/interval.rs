//! Interval functions (component C): pure mappings from attempt number to a
//! backoff delay, plus the "biased" variant that may additionally consult
//! the outcome of the attempt.

use std::time::Duration;

use crate::error::{CoreError, CoreResult};

/// Default initial interval: 500ms.
pub const DEFAULT_INITIAL_INTERVAL_MS: u64 = 500;
/// Default exponential multiplier: 1.5.
pub const DEFAULT_MULTIPLIER: f64 = 1.5;
/// Default randomization factor: 0.5.
pub const DEFAULT_RANDOMIZATION_FACTOR: f64 = 0.5;

/// A total function from a 1-based attempt number to a delay.
///
/// `attempt` must be `>= 1`; callers passing `0` get
/// [`CoreError::Validation`]. Implementations never block or allocate on
/// the common path besides what the family itself requires (e.g.
/// `CustomBackoff` iterating its closure).
pub trait IntervalFunction: Send + Sync {
    /// Compute the delay for `attempt`.
    fn apply(&self, attempt: u64) -> CoreResult<Duration>;
}

/// The outcome half of a biased interval function: either the attempt
/// succeeded with a value, or it failed with an error.
#[derive(Debug, Clone, Copy)]
pub enum AttemptResult<'a, T, E> {
    /// The attempt succeeded.
    Success(&'a T),
    /// The attempt failed.
    Failure(&'a E),
}

/// A function from attempt number *and* outcome to a delay. Every plain
/// [`IntervalFunction`] lifts to this by ignoring the outcome.
pub trait BiasedIntervalFunction<T, E>: Send + Sync {
    /// Compute the delay for `attempt`, given how that attempt concluded.
    fn apply(&self, attempt: u64, result: AttemptResult<'_, T, E>) -> CoreResult<Duration>;
}

impl<T, E, F: IntervalFunction> BiasedIntervalFunction<T, E> for F {
    fn apply(&self, attempt: u64, _result: AttemptResult<'_, T, E>) -> CoreResult<Duration> {
        IntervalFunction::apply(self, attempt)
    }
}

fn validate_attempt(attempt: u64) -> CoreResult<()> {
    if attempt < 1 {
        return Err(CoreError::validation(format!(
            "attempt must be >= 1, got {attempt}"
        )));
    }
    Ok(())
}

fn validate_interval_ms(interval_ms: u64) -> CoreResult<()> {
    if interval_ms < 1 {
        return Err(CoreError::validation(format!(
            "interval must be >= 1ms, got {interval_ms}ms"
        )));
    }
    Ok(())
}

fn validate_randomization_factor(r: f64) -> CoreResult<()> {
    if !(0.0..=1.0).contains(&r) {
        return Err(CoreError::validation(format!(
            "randomization factor must be within [0, 1], got {r}"
        )));
    }
    Ok(())
}

/// A constant delay, independent of attempt number.
pub struct Fixed {
    interval_ms: u64,
}

impl Fixed {
    /// `interval_ms` must be `>= 1`.
    pub fn new(interval_ms: u64) -> CoreResult<Self> {
        validate_interval_ms(interval_ms)?;
        Ok(Fixed { interval_ms })
    }
}

impl IntervalFunction for Fixed {
    fn apply(&self, attempt: u64) -> CoreResult<Duration> {
        validate_attempt(attempt)?;
        Ok(Duration::from_millis(self.interval_ms))
    }
}

/// Applies a user-supplied function `f` iteratively to the initial
/// interval, `n - 1` times: `delay(n) = f^(n-1)(initial)`.
///
/// Computed naively (not memoized) so that a non-deterministic `f` still
/// produces the same sequence of intermediate values a caller re-deriving
/// `delay(n)` by hand would see; see the Open Questions note this resolves.
pub struct CustomBackoff {
    initial_ms: u64,
    f: Box<dyn Fn(Duration) -> Duration + Send + Sync>,
}

impl CustomBackoff {
    /// `initial_ms` must be `>= 1`.
    pub fn new(
        initial_ms: u64,
        f: impl Fn(Duration) -> Duration + Send + Sync + 'static,
    ) -> CoreResult<Self> {
        validate_interval_ms(initial_ms)?;
        Ok(CustomBackoff {
            initial_ms,
            f: Box::new(f),
        })
    }
}

impl IntervalFunction for CustomBackoff {
    fn apply(&self, attempt: u64) -> CoreResult<Duration> {
        validate_attempt(attempt)?;
        let mut delay = Duration::from_millis(self.initial_ms);
        for _ in 1..attempt {
            delay = (self.f)(delay);
        }
        Ok(delay)
    }
}

/// `delay(n) = initial * multiplier^(n-1)`, computed directly (not by
/// iterated multiplication) since the closed form is exact for this
/// family — see spec Open Questions.
pub struct Exponential {
    initial_ms: u64,
    multiplier: f64,
}

impl Exponential {
    /// `initial_ms` must be `>= 1`.
    pub fn new(initial_ms: u64, multiplier: f64) -> CoreResult<Self> {
        validate_interval_ms(initial_ms)?;
        Ok(Exponential {
            initial_ms,
            multiplier,
        })
    }
}

fn exponential_delay_ms(initial_ms: u64, multiplier: f64, attempt: u64) -> f64 {
    initial_ms as f64 * multiplier.powi((attempt - 1) as i32)
}

impl IntervalFunction for Exponential {
    fn apply(&self, attempt: u64) -> CoreResult<Duration> {
        validate_attempt(attempt)?;
        let ms = exponential_delay_ms(self.initial_ms, self.multiplier, attempt);
        Ok(Duration::from_millis(ms as u64))
    }
}

/// Exponential backoff capped at `cap_ms`.
pub struct ExponentialCapped {
    initial_ms: u64,
    multiplier: f64,
    cap_ms: u64,
}

impl ExponentialCapped {
    /// `initial_ms` must be `>= 1`.
    pub fn new(initial_ms: u64, multiplier: f64, cap_ms: u64) -> CoreResult<Self> {
        validate_interval_ms(initial_ms)?;
        Ok(ExponentialCapped {
            initial_ms,
            multiplier,
            cap_ms,
        })
    }
}

impl IntervalFunction for ExponentialCapped {
    fn apply(&self, attempt: u64) -> CoreResult<Duration> {
        validate_attempt(attempt)?;
        let ms = exponential_delay_ms(self.initial_ms, self.multiplier, attempt);
        Ok(Duration::from_millis((ms as u64).min(self.cap_ms)))
    }
}

/// Uniformly randomizes a base interval within `±randomization_factor`,
/// clamped to at least 1ms.
pub struct Randomized {
    interval_ms: u64,
    randomization_factor: f64,
}

impl Randomized {
    /// `interval_ms` must be `>= 1`; `randomization_factor` must be in
    /// `[0, 1]`.
    pub fn new(interval_ms: u64, randomization_factor: f64) -> CoreResult<Self> {
        validate_interval_ms(interval_ms)?;
        validate_randomization_factor(randomization_factor)?;
        Ok(Randomized {
            interval_ms,
            randomization_factor,
        })
    }
}

fn randomize_ms(base_ms: f64, randomization_factor: f64) -> u64 {
    let lo = base_ms * (1.0 - randomization_factor);
    let hi = base_ms * (1.0 + randomization_factor);
    let sampled = if hi > lo {
        lo + fastrand::f64() * (hi - lo)
    } else {
        lo
    };
    (sampled.max(1.0)) as u64
}

impl IntervalFunction for Randomized {
    fn apply(&self, attempt: u64) -> CoreResult<Duration> {
        validate_attempt(attempt)?;
        let ms = randomize_ms(self.interval_ms as f64, self.randomization_factor);
        Ok(Duration::from_millis(ms))
    }
}

/// Exponential backoff, randomized, uncapped.
pub struct ExponentialRandomized {
    initial_ms: u64,
    multiplier: f64,
    randomization_factor: f64,
}

impl ExponentialRandomized {
    /// `initial_ms` must be `>= 1`; `randomization_factor` must be in
    /// `[0, 1]`.
    pub fn new(initial_ms: u64, multiplier: f64, randomization_factor: f64) -> CoreResult<Self> {
        validate_interval_ms(initial_ms)?;
        validate_randomization_factor(randomization_factor)?;
        Ok(ExponentialRandomized {
            initial_ms,
            multiplier,
            randomization_factor,
        })
    }
}

impl IntervalFunction for ExponentialRandomized {
    fn apply(&self, attempt: u64) -> CoreResult<Duration> {
        validate_attempt(attempt)?;
        let base = exponential_delay_ms(self.initial_ms, self.multiplier, attempt);
        let ms = randomize_ms(base, self.randomization_factor);
        Ok(Duration::from_millis(ms))
    }
}

/// Exponential backoff, randomized, then capped.
pub struct ExponentialRandomizedCapped {
    initial_ms: u64,
    multiplier: f64,
    randomization_factor: f64,
    cap_ms: u64,
}

impl ExponentialRandomizedCapped {
    /// `initial_ms` must be `>= 1`; `randomization_factor` must be in
    /// `[0, 1]`.
    pub fn new(
        initial_ms: u64,
        multiplier: f64,
        randomization_factor: f64,
        cap_ms: u64,
    ) -> CoreResult<Self> {
        validate_interval_ms(initial_ms)?;
        validate_randomization_factor(randomization_factor)?;
        Ok(ExponentialRandomizedCapped {
            initial_ms,
            multiplier,
            randomization_factor,
            cap_ms,
        })
    }
}

impl IntervalFunction for ExponentialRandomizedCapped {
    fn apply(&self, attempt: u64) -> CoreResult<Duration> {
        validate_attempt(attempt)?;
        let base = exponential_delay_ms(self.initial_ms, self.multiplier, attempt);
        let ms = randomize_ms(base, self.randomization_factor).min(self.cap_ms);
        Ok(Duration::from_millis(ms))
    }
}

//! Cross-component wiring tests: these primitives are meant to be composed
//! by a resilience policy built on top of this crate (a circuit breaker, a
//! retry, a rate limiter) — none of which lives here. Each test below
//! exercises one such composition end to end, using only the public API.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use knhk_resilience_core::metrics::{CountWindow, Outcome};
use knhk_resilience_core::{
    CorrelationContext, IntervalFunction, MetricsWindow, Registry, ScheduledExecutor,
};

#[test]
fn registry_of_metrics_windows_reports_lifecycle_and_aggregates() {
    let registry: Registry<CountWindow> = Registry::new((), HashMap::new());
    let added = Arc::new(AtomicUsize::new(0));
    let a = added.clone();
    registry.on_entry_added(move |_, _| {
        a.fetch_add(1, Ordering::SeqCst);
    });

    let window = registry
        .compute_if_absent("payments-service", |_| CountWindow::new(10).unwrap())
        .unwrap();
    // A second lookup for the same name does not re-create, so the lifecycle
    // listener fires exactly once.
    let same_window = registry
        .compute_if_absent("payments-service", |_| CountWindow::new(10).unwrap())
        .unwrap();
    assert!(Arc::ptr_eq(&window, &same_window));
    assert_eq!(added.load(Ordering::SeqCst), 1);

    window.record(Duration::from_millis(50), Outcome::Success);
    window.record(Duration::from_millis(900), Outcome::SlowError);

    let snapshot = window.snapshot();
    assert_eq!(snapshot.total_calls, 2);
    assert_eq!(snapshot.failed_calls, 1);
    assert_eq!(snapshot.slow_calls, 1);
}

#[test]
fn scheduled_retry_uses_an_exponential_interval_function() {
    use knhk_resilience_core::interval::ExponentialCapped;

    let backoff = ExponentialCapped::new(50, 2.0, 400).unwrap();
    let executor = ScheduledExecutor::new(2, "retry-pool").unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));

    // Simulate a caller retrying a failing operation three times, scheduling
    // each attempt after the delay the interval function prescribes.
    let mut delay_so_far = Duration::ZERO;
    let mut handles = Vec::new();
    for attempt in 1..=3u32 {
        let delay = backoff.apply(attempt).unwrap();
        delay_so_far += Duration::from_millis(1);
        let attempts = attempts.clone();
        handles.push(
            executor
                .schedule(delay_so_far, move || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap(),
        );
        assert!(delay >= Duration::from_millis(50));
    }

    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while attempts.load(Ordering::SeqCst) < 3 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    drop(handles);
    executor.join();
}

#[test]
fn registry_config_round_trip_propagates_errors_via_anyhow() -> anyhow::Result<()> {
    use anyhow::Context;

    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let registry: Registry<CountWindow> = Registry::new(10u32, HashMap::new());
    registry.add_config("fast-path", 2u32);

    let fast = registry
        .get_config::<u32>("fast-path")
        .context("fast-path config should exist right after add_config")?;
    assert_eq!(*fast, 2);

    registry.remove_config("fast-path")?;
    let missing = registry.get_config::<u32>("fast-path");
    assert!(missing.is_err());

    Ok(())
}

#[test]
fn correlation_context_survives_a_round_trip_through_the_scheduler() {
    CorrelationContext::clear_all();
    CorrelationContext::set("request_id", "abc-123");

    let executor = ScheduledExecutor::new(1, "correlation-demo").unwrap();
    let (tx, rx) = std::sync::mpsc::channel();
    executor
        .schedule(Duration::from_millis(1), move || {
            tx.send(CorrelationContext::get("request_id")).unwrap();
        })
        .unwrap();

    let seen = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(seen, Some("abc-123".to_string()));

    CorrelationContext::clear_all();
    executor.join();
}

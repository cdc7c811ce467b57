//! Generic typed pub/sub (component D): register global or per-event-class
//! consumers, then dispatch one event to all matching consumers.
//!
//! Every component in this crate that needs to publish lifecycle
//! notifications (the registry, in particular) owns one of these rather
//! than inheriting publish behavior from a base type.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

/// A type that can be dispatched through an [`EventProcessor`]. The
/// `type_name` is what `register` keys on; it does not have to be (and
/// usually isn't) `std::any::type_name::<Self>()` — it is whatever the
/// publisher considers the event's variant name to be.
pub trait Event: Send + Sync + 'static {
    /// The runtime type name consumers register against with `register`.
    fn type_name(&self) -> &'static str;
}

/// Receives events dispatched through an [`EventProcessor`].
pub trait Consumer<E: Event>: Send + Sync {
    /// Handle one event. A panic here is caught and logged by the
    /// processor; it never aborts dispatch to other consumers.
    fn on_event(&self, event: &E);
}

impl<E, F> Consumer<E> for F
where
    E: Event,
    F: Fn(&E) + Send + Sync + 'static,
{
    fn on_event(&self, event: &E) {
        self(event)
    }
}

type ConsumerList<E> = Arc<Vec<Arc<dyn Consumer<E>>>>;

fn push_copy_on_write<E: Event>(list: &ConsumerList<E>, consumer: Arc<dyn Consumer<E>>) -> ConsumerList<E> {
    let mut next = Vec::with_capacity(list.len() + 1);
    next.extend(list.iter().cloned());
    next.push(consumer);
    Arc::new(next)
}

/// A single event processor instance serves one event hierarchy (one `E`).
/// Registration is serialized under a mutex; dispatch takes no lock across
/// a consumer invocation — it clones the (cheap, `Arc`-backed) consumer
/// list under a brief read lock, then iterates outside of it.
pub struct EventProcessor<E: Event> {
    has_consumers: AtomicBool,
    registration_lock: Mutex<()>,
    global: RwLock<ConsumerList<E>>,
    keyed: DashMap<&'static str, RwLock<ConsumerList<E>>>,
}

impl<E: Event> Default for EventProcessor<E> {
    fn default() -> Self {
        EventProcessor {
            has_consumers: AtomicBool::new(false),
            registration_lock: Mutex::new(()),
            global: RwLock::new(Arc::new(Vec::new())),
            keyed: DashMap::new(),
        }
    }
}

impl<E: Event> EventProcessor<E> {
    /// An empty processor with no registered consumers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer that receives every event dispatched through
    /// this processor, regardless of `type_name`.
    pub fn on_event(&self, consumer: impl Consumer<E> + 'static) {
        let _serialize = self.registration_lock.lock();
        let consumer: Arc<dyn Consumer<E>> = Arc::new(consumer);
        let mut guard = self.global.write();
        *guard = push_copy_on_write(&guard, consumer);
        self.has_consumers.store(true, Ordering::Release);
    }

    /// Register a consumer that receives only events whose `type_name`
    /// equals `event_type_name`.
    pub fn register(&self, event_type_name: &'static str, consumer: impl Consumer<E> + 'static) {
        let _serialize = self.registration_lock.lock();
        let consumer: Arc<dyn Consumer<E>> = Arc::new(consumer);
        let bucket = self
            .keyed
            .entry(event_type_name)
            .or_insert_with(|| RwLock::new(Arc::new(Vec::new())));
        let mut guard = bucket.write();
        *guard = push_copy_on_write(&guard, consumer);
        self.has_consumers.store(true, Ordering::Release);
    }

    /// Dispatch `event` to every global consumer, then every consumer
    /// keyed by `event.type_name()`. Returns whether any consumer was
    /// invoked. Fast path: returns `false` immediately if no consumer has
    /// ever been registered.
    pub fn process(&self, event: &E) -> bool {
        if !self.has_consumers.load(Ordering::Acquire) {
            return false;
        }

        let mut invoked = false;

        let global_list = self.global.read().clone();
        for consumer in global_list.iter() {
            invoke_catching(consumer.as_ref(), event);
            invoked = true;
        }

        if let Some(bucket) = self.keyed.get(event.type_name()) {
            let keyed_list = bucket.read().clone();
            for consumer in keyed_list.iter() {
                invoke_catching(consumer.as_ref(), event);
                invoked = true;
            }
        }

        invoked
    }
}

fn invoke_catching<E: Event>(consumer: &dyn Consumer<E>, event: &E) {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        consumer.on_event(event);
    }));
    if let Err(panic) = result {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        tracing::warn!(panic = %message, "event consumer panicked; other consumers still ran");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Arc;

    use super::*;

    struct Ping;
    impl Event for Ping {
        fn type_name(&self) -> &'static str {
            "Ping"
        }
    }
    struct Pong;
    impl Event for Pong {
        fn type_name(&self) -> &'static str {
            "Pong"
        }
    }

    enum AnyEvent {
        Ping,
        Pong,
    }
    impl Event for AnyEvent {
        fn type_name(&self) -> &'static str {
            match self {
                AnyEvent::Ping => "Ping",
                AnyEvent::Pong => "Pong",
            }
        }
    }

    #[test]
    fn global_consumer_sees_every_event() {
        let processor: EventProcessor<AnyEvent> = EventProcessor::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        processor.on_event(move |_: &AnyEvent| {
            c.fetch_add(1, AtomicOrdering::SeqCst);
        });

        assert!(processor.process(&AnyEvent::Ping));
        assert!(processor.process(&AnyEvent::Pong));
        assert_eq!(count.load(AtomicOrdering::SeqCst), 2);
    }

    #[test]
    fn keyed_consumer_only_sees_matching_type_name() {
        let processor: EventProcessor<AnyEvent> = EventProcessor::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        processor.register("Ping", move |_: &AnyEvent| {
            c.fetch_add(1, AtomicOrdering::SeqCst);
        });

        processor.process(&AnyEvent::Ping);
        processor.process(&AnyEvent::Pong);
        assert_eq!(count.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn process_returns_false_fast_path_with_no_consumers() {
        let processor: EventProcessor<AnyEvent> = EventProcessor::new();
        assert!(!processor.process(&AnyEvent::Ping));
    }

    #[test]
    fn panicking_consumer_does_not_block_others() {
        let processor: EventProcessor<AnyEvent> = EventProcessor::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        processor.on_event(|_: &AnyEvent| panic!("boom"));
        processor.on_event(move |_: &AnyEvent| {
            c.fetch_add(1, AtomicOrdering::SeqCst);
        });

        let invoked = processor.process(&AnyEvent::Ping);
        assert!(invoked);
        assert_eq!(count.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn registering_after_dispatch_does_not_see_past_events() {
        let processor: EventProcessor<AnyEvent> = EventProcessor::new();
        processor.process(&AnyEvent::Ping);

        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        processor.on_event(move |_: &AnyEvent| {
            c.fetch_add(1, AtomicOrdering::SeqCst);
        });
        assert_eq!(count.load(AtomicOrdering::SeqCst), 0);

        processor.process(&AnyEvent::Pong);
        assert_eq!(count.load(AtomicOrdering::SeqCst), 1);
    }
}

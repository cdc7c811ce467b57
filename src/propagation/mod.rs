//! Ambient context propagation (component H): carry per-thread state (most
//! commonly a logging correlation map) across a thread-pool boundary.
//!
//! A propagator is the triple `(retrieve, apply, clear)` from spec §4.H:
//! `retrieve` runs on the submitting thread, `apply`/`clear` run on the
//! executing thread bracketing the task body. [`decorate`] builds that
//! bracket for a single typed propagator; [`PropagatorList`] does the same
//! for a heterogeneous, type-erased collection — the shape the scheduled
//! executor needs, since its configured propagators are not all the same
//! `T`.

pub mod correlation;

pub use correlation::CorrelationContext;

use std::any::Any;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Carries one kind of ambient value across a concurrency boundary.
///
/// `retrieve` is called once, on the submitting thread, before the task
/// crosses the boundary. `apply` installs the retrieved value on the
/// executing thread immediately before the task body runs; `clear` tears
/// it back down immediately after, whether the body returned normally or
/// panicked.
pub trait ContextPropagator<T: Send + 'static>: Send + Sync {
    /// Capture the current value of this propagator's ambient state.
    fn retrieve(&self) -> Option<T>;

    /// Install `value` as this propagator's ambient state.
    fn apply(&self, value: Option<T>);

    /// Tear down this propagator's ambient state. Always called after the
    /// task body, even if it panicked; `value` is the same value `apply`
    /// received, for propagators whose clear behavior depends on it.
    fn clear(&self, value: Option<T>);
}

/// The empty propagator: retrieves nothing, applies and clears nothing.
/// Required by spec §4.H "for composition" — a default slot that can stand
/// in anywhere a real propagator is expected.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPropagator;

impl<T: Send + 'static> ContextPropagator<T> for NoopPropagator {
    fn retrieve(&self) -> Option<T> {
        None
    }

    fn apply(&self, _value: Option<T>) {}

    fn clear(&self, _value: Option<T>) {}
}

/// Wrap `body` so that, when the returned closure is invoked (possibly on
/// a different thread), `propagator`'s value as observed *now* is applied
/// before `body` runs and cleared after, regardless of whether `body`
/// panics.
pub fn decorate<T, P, F, R>(propagator: P, body: F) -> impl FnOnce() -> R
where
    T: Clone + Send + 'static,
    P: ContextPropagator<T>,
    F: FnOnce() -> R,
{
    let captured = propagator.retrieve();
    move || {
        propagator.apply(captured.clone());
        let result = panic::catch_unwind(AssertUnwindSafe(body));
        propagator.clear(captured);
        match result {
            Ok(value) => value,
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}

/// Object-safe form of [`ContextPropagator`], erasing its value type behind
/// `Any` so propagators of different `T` can live in one `Vec`.
///
/// `install`/`teardown` both borrow the captured value rather than consuming
/// it, so the same capture can bracket a task body more than once — needed
/// for a recurring scheduled task, whose context is captured once at
/// submission but applied and cleared around every run.
pub trait ErasedPropagator: Send + Sync {
    /// Capture this propagator's current value, boxed as `Option<T>`.
    fn capture(&self) -> Box<dyn Any + Send>;

    /// Install a previously captured value (an `Option<T>` boxed by
    /// [`Self::capture`]).
    fn install(&self, value: &(dyn Any + Send));

    /// Clear, given the same boxed value `install` received.
    fn teardown(&self, value: &(dyn Any + Send));
}

/// Adapts a concrete [`ContextPropagator<T>`] to the object-safe
/// [`ErasedPropagator`] surface.
struct Erased<P, T> {
    propagator: P,
    _value: PhantomData<fn() -> T>,
}

// `PhantomData<fn() -> T>` carries no `T` value, so `Erased` is `Send + Sync`
// whenever the wrapped propagator is, independent of `T`'s own variance.
unsafe impl<P: Send, T> Send for Erased<P, T> {}
unsafe impl<P: Sync, T> Sync for Erased<P, T> {}

impl<P, T> ErasedPropagator for Erased<P, T>
where
    T: Clone + Send + 'static,
    P: ContextPropagator<T>,
{
    fn capture(&self) -> Box<dyn Any + Send> {
        Box::new(self.propagator.retrieve())
    }

    fn install(&self, value: &(dyn Any + Send)) {
        let value = value
            .downcast_ref::<Option<T>>()
            .expect("ErasedPropagator::install received a value from a different propagator")
            .clone();
        self.propagator.apply(value);
    }

    fn teardown(&self, value: &(dyn Any + Send)) {
        let value = value
            .downcast_ref::<Option<T>>()
            .expect("ErasedPropagator::teardown received a value from a different propagator")
            .clone();
        self.propagator.clear(value);
    }
}

/// Erase `propagator` so it can be stored in a [`PropagatorList`] alongside
/// propagators of other value types.
pub fn erase<T, P>(propagator: P) -> Arc<dyn ErasedPropagator>
where
    T: Clone + Send + 'static,
    P: ContextPropagator<T> + 'static,
{
    Arc::new(Erased {
        propagator,
        _value: PhantomData,
    })
}

/// An ordered collection of type-erased propagators, decorated over a task
/// body as one unit: every entry's value is captured once at submission
/// time, `apply` runs for every entry before the body, and `clear` runs for
/// every entry after — per spec §4.H, relative ordering between distinct
/// propagators is not guaranteed, but each propagator's own apply/clear
/// pair is always correctly matched.
#[derive(Clone, Default)]
pub struct PropagatorList {
    propagators: Vec<Arc<dyn ErasedPropagator>>,
}

impl PropagatorList {
    /// An empty list; decorating with it is equivalent to not decorating.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a propagator to the list.
    pub fn push(&mut self, propagator: Arc<dyn ErasedPropagator>) {
        self.propagators.push(propagator);
    }

    /// Capture every propagator's value once, then return a closure that
    /// applies that capture, runs `body`, and clears the capture again,
    /// every time it is called. Used by the scheduled executor: context is
    /// captured once at submission but applied and cleared around every
    /// run of a (possibly recurring) task.
    pub fn decorate_repeating<F>(&self, mut body: F) -> impl FnMut()
    where
        F: FnMut() + Send + 'static,
    {
        let captured: Vec<(Arc<dyn ErasedPropagator>, Box<dyn Any + Send>)> = self
            .propagators
            .iter()
            .map(|p| (p.clone(), p.capture()))
            .collect();

        move || {
            for (propagator, value) in &captured {
                propagator.install(value.as_ref());
            }
            let result = panic::catch_unwind(AssertUnwindSafe(|| body()));
            for (propagator, value) in &captured {
                propagator.teardown(value.as_ref());
            }
            if let Err(payload) = result {
                panic::resume_unwind(payload);
            }
        }
    }

    /// Wrap `body` so every propagator in this list brackets it, in the
    /// manner of [`decorate`] but for the whole collection at once.
    pub fn decorate<F, R>(&self, body: F) -> impl FnOnce() -> R
    where
        F: FnOnce() -> R,
    {
        let captured: Vec<(Arc<dyn ErasedPropagator>, Box<dyn Any + Send>)> = self
            .propagators
            .iter()
            .map(|p| (p.clone(), p.capture()))
            .collect();

        move || {
            for (propagator, value) in &captured {
                propagator.install(value.as_ref());
            }
            let result = panic::catch_unwind(AssertUnwindSafe(body));
            for (propagator, value) in &captured {
                propagator.teardown(value.as_ref());
            }
            match result {
                Ok(value) => value,
                Err(payload) => panic::resume_unwind(payload),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::propagation::correlation::CorrelationContext;

    #[test]
    fn decorate_restores_and_clears() {
        CorrelationContext::set("k", "v");
        let task = decorate(CorrelationContext, || {
            assert_eq!(CorrelationContext::get("k"), Some("v".to_string()));
        });

        // Simulate running on a fresh "worker thread" by clearing first.
        CorrelationContext::clear_all();
        task();

        assert_eq!(CorrelationContext::get("k"), None);
    }

    #[test]
    fn decorate_clears_even_if_body_panics() {
        CorrelationContext::set("k", "v");
        let task = decorate(CorrelationContext, || -> () {
            panic!("boom");
        });

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task));
        assert!(result.is_err());
        assert_eq!(CorrelationContext::get("k"), None);
    }

    #[test]
    fn noop_propagator_is_truly_inert() {
        let ran = Arc::new(AtomicBool::new(false));
        let r = ran.clone();
        let task = decorate(NoopPropagator, move || {
            r.store(true, Ordering::SeqCst);
        });
        task();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn propagator_list_applies_and_clears_every_entry() {
        CorrelationContext::set("k", "v");
        let mut list = PropagatorList::new();
        list.push(erase(CorrelationContext));

        let task = list.decorate(|| {
            assert_eq!(CorrelationContext::get("k"), Some("v".to_string()));
        });

        CorrelationContext::clear_all();
        task();
        assert_eq!(CorrelationContext::get("k"), None);
    }

    #[test]
    fn empty_propagator_list_is_a_pure_passthrough() {
        let list = PropagatorList::new();
        let task = list.decorate(|| 7);
        assert_eq!(task(), 7);
    }
}

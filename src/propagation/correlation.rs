//! The crate's one built-in propagator (spec §6 "correlation context
//! surface"): a thread-local `string → string` mapping. The library reads
//! and writes it only through the propagator contract below; it never
//! inspects a key or value.

use std::cell::RefCell;
use std::collections::HashMap;

use super::ContextPropagator;

thread_local! {
    static CORRELATION: RefCell<HashMap<String, String>> = RefCell::new(HashMap::new());
}

/// The logging-correlation propagator every scheduled task is decorated
/// with automatically, ahead of any user-configured [`super::PropagatorList`].
/// Zero-sized: all state lives in the thread-local map.
#[derive(Debug, Default, Clone, Copy)]
pub struct CorrelationContext;

impl CorrelationContext {
    /// Set `key = value` in the calling thread's correlation map.
    pub fn set(key: impl Into<String>, value: impl Into<String>) {
        CORRELATION.with(|map| {
            map.borrow_mut().insert(key.into(), value.into());
        });
    }

    /// Read `key` from the calling thread's correlation map.
    pub fn get(key: &str) -> Option<String> {
        CORRELATION.with(|map| map.borrow().get(key).cloned())
    }

    /// Every key/value pair currently set on the calling thread.
    pub fn snapshot() -> HashMap<String, String> {
        CORRELATION.with(|map| map.borrow().clone())
    }

    /// Empty the calling thread's correlation map.
    pub fn clear_all() {
        CORRELATION.with(|map| map.borrow_mut().clear());
    }
}

impl ContextPropagator<HashMap<String, String>> for CorrelationContext {
    fn retrieve(&self) -> Option<HashMap<String, String>> {
        let snapshot = Self::snapshot();
        if snapshot.is_empty() {
            None
        } else {
            Some(snapshot)
        }
    }

    fn apply(&self, value: Option<HashMap<String, String>>) {
        CORRELATION.with(|map| {
            *map.borrow_mut() = value.unwrap_or_default();
        });
    }

    fn clear(&self, _value: Option<HashMap<String, String>>) {
        Self::clear_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_and_clear_round_trip() {
        CorrelationContext::clear_all();
        assert_eq!(CorrelationContext::get("k"), None);
        CorrelationContext::set("k", "v");
        assert_eq!(CorrelationContext::get("k"), Some("v".to_string()));
        CorrelationContext::clear_all();
        assert_eq!(CorrelationContext::get("k"), None);
    }

    #[test]
    fn retrieve_is_none_when_map_is_empty() {
        CorrelationContext::clear_all();
        assert_eq!(ContextPropagator::retrieve(&CorrelationContext), None);
    }

    #[test]
    fn apply_replaces_the_whole_map() {
        CorrelationContext::clear_all();
        CorrelationContext::set("stale", "value");
        let mut fresh = HashMap::new();
        fresh.insert("k".to_string(), "v".to_string());
        ContextPropagator::apply(&CorrelationContext, Some(fresh));
        assert_eq!(CorrelationContext::get("stale"), None);
        assert_eq!(CorrelationContext::get("k"), Some("v".to_string()));
        CorrelationContext::clear_all();
    }
}

//! The registry (component F): a thin shell over [`store::RegistryStore`]
//! adding named configuration, immutable tags, and a lifecycle event
//! stream. See the [`super::event`] module for the underlying pub/sub
//! mechanism — the registry owns an [`event::EventProcessor`] by value
//! rather than inheriting publish behavior from a base type.

pub mod store;

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{CoreError, CoreResult};
use crate::event::{Consumer, Event, EventProcessor};
pub use store::RegistryStore;

/// The name every registry's seed configuration is stored under. Never
/// removable.
pub const DEFAULT_CONFIG_NAME: &str = "default";

/// A lifecycle notification published whenever a registry's entry map
/// changes. Each variant carries the entry's name so subscribers don't
/// need to inspect the entry itself to know which key changed.
pub enum RegistryEvent<V> {
    /// A new entry was created by `compute_if_absent`.
    Added {
        /// The entry's name.
        name: String,
        /// The entry that was added.
        entry: Arc<V>,
    },
    /// An existing entry was replaced.
    Replaced {
        /// The entry's name.
        name: String,
        /// The entry that was replaced.
        old: Arc<V>,
        /// The entry that replaced it.
        new: Arc<V>,
    },
    /// An entry was removed.
    Removed {
        /// The entry's name.
        name: String,
        /// The entry that was removed.
        entry: Arc<V>,
    },
}

impl<V: Send + Sync + 'static> Event for RegistryEvent<V> {
    fn type_name(&self) -> &'static str {
        match self {
            RegistryEvent::Added { .. } => "EntryAdded",
            RegistryEvent::Replaced { .. } => "EntryReplaced",
            RegistryEvent::Removed { .. } => "EntryRemoved",
        }
    }
}

/// A named, concurrent, observable container of entries of type `V`, plus
/// a side table of named configurations and an immutable tag map.
pub struct Registry<V: Send + Sync + 'static> {
    store: RegistryStore<String, Arc<V>>,
    configs: DashMap<String, Arc<dyn Any + Send + Sync>>,
    tags: HashMap<String, String>,
    events: EventProcessor<RegistryEvent<V>>,
}

impl<V: Send + Sync + 'static> Registry<V> {
    /// A registry seeded with `default_config` under [`DEFAULT_CONFIG_NAME`]
    /// and the given immutable tags.
    pub fn new<C: Send + Sync + 'static>(default_config: C, tags: HashMap<String, String>) -> Self {
        let configs = DashMap::new();
        configs.insert(
            DEFAULT_CONFIG_NAME.to_string(),
            Arc::new(default_config) as Arc<dyn Any + Send + Sync>,
        );
        Registry {
            store: RegistryStore::new(),
            configs,
            tags,
            events: EventProcessor::new(),
        }
    }

    fn validate_name(name: &str) -> CoreResult<()> {
        if name.is_empty() {
            return Err(CoreError::validation("entry name must not be empty"));
        }
        Ok(())
    }

    /// Return the entry named `name`, creating it via `factory` if absent.
    /// `factory` is invoked at most once across any number of concurrent
    /// callers; every caller observes the same returned entry. Publishes
    /// [`RegistryEvent::Added`] exactly when `factory` actually ran.
    pub fn compute_if_absent(
        &self,
        name: impl Into<String>,
        factory: impl FnOnce(&str) -> V,
    ) -> CoreResult<Arc<V>> {
        let name = name.into();
        Self::validate_name(&name)?;
        let (entry, created) = self
            .store
            .compute_if_absent_detailed(name.clone(), |k| Arc::new(factory(k)));
        if created {
            tracing::debug!(entry = %name, "registry entry added");
            self.events.process(&RegistryEvent::Added {
                name,
                entry: entry.clone(),
            });
        }
        Ok(entry)
    }

    /// Look up an entry by name without creating one.
    pub fn find(&self, name: &str) -> Option<Arc<V>> {
        self.store.find(&name.to_string())
    }

    /// Replace the entry named `name` with `new`. A no-op returning `Ok(None)`
    /// if `name` is absent. Publishes [`RegistryEvent::Replaced`] on success.
    pub fn replace(&self, name: &str, new: V) -> CoreResult<Option<Arc<V>>> {
        Self::validate_name(name)?;
        let new = Arc::new(new);
        let old = self.store.replace(&name.to_string(), new.clone());
        if let Some(old) = &old {
            tracing::debug!(entry = %name, "registry entry replaced");
            self.events.process(&RegistryEvent::Replaced {
                name: name.to_string(),
                old: old.clone(),
                new,
            });
        }
        Ok(old)
    }

    /// Remove the entry named `name`. Publishes [`RegistryEvent::Removed`]
    /// on success; a second removal of an already-absent name publishes
    /// nothing.
    pub fn remove(&self, name: &str) -> Option<Arc<V>> {
        let removed = self.store.remove(&name.to_string());
        if let Some(entry) = &removed {
            tracing::debug!(entry = %name, "registry entry removed");
            self.events.process(&RegistryEvent::Removed {
                name: name.to_string(),
                entry: entry.clone(),
            });
        }
        removed
    }

    /// A weakly-consistent snapshot of every entry currently registered.
    pub fn entries(&self) -> Vec<Arc<V>> {
        self.store.values()
    }

    /// This registry's immutable tag map, set at construction.
    pub fn tags(&self) -> &HashMap<String, String> {
        &self.tags
    }

    /// Add a named configuration.
    pub fn add_config<C: Send + Sync + 'static>(&self, name: impl Into<String>, config: C) {
        self.configs
            .insert(name.into(), Arc::new(config) as Arc<dyn Any + Send + Sync>);
    }

    /// Look up a named configuration and downcast it to `C`.
    ///
    /// Fails with [`CoreError::ConfigurationNotFound`] if `name` is
    /// unregistered (including the caller asking for the wrong concrete
    /// type for a registered name, which is treated the same as absent
    /// since there is nothing of type `C` under that name).
    pub fn get_config<C: Send + Sync + 'static>(&self, name: &str) -> CoreResult<Arc<C>> {
        self.configs
            .get(name)
            .and_then(|entry| entry.clone().downcast::<C>().ok())
            .ok_or_else(|| CoreError::configuration_not_found(name))
    }

    /// Remove a named configuration. The default configuration
    /// ([`DEFAULT_CONFIG_NAME`]) can never be removed.
    pub fn remove_config(&self, name: &str) -> CoreResult<()> {
        if name == DEFAULT_CONFIG_NAME {
            return Err(CoreError::validation(
                "the default configuration cannot be removed",
            ));
        }
        self.configs
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| CoreError::configuration_not_found(name))
    }

    /// Subscribe to [`RegistryEvent::Added`] notifications.
    pub fn on_entry_added(&self, consumer: impl Fn(&str, &Arc<V>) + Send + Sync + 'static) {
        self.events.on_event(move |event: &RegistryEvent<V>| {
            if let RegistryEvent::Added { name, entry } = event {
                consumer(name, entry);
            }
        });
    }

    /// Subscribe to [`RegistryEvent::Removed`] notifications.
    pub fn on_entry_removed(&self, consumer: impl Fn(&str, &Arc<V>) + Send + Sync + 'static) {
        self.events.on_event(move |event: &RegistryEvent<V>| {
            if let RegistryEvent::Removed { name, entry } = event {
                consumer(name, entry);
            }
        });
    }

    /// Subscribe to [`RegistryEvent::Replaced`] notifications.
    pub fn on_entry_replaced(
        &self,
        consumer: impl Fn(&str, &Arc<V>, &Arc<V>) + Send + Sync + 'static,
    ) {
        self.events.on_event(move |event: &RegistryEvent<V>| {
            if let RegistryEvent::Replaced { name, old, new } = event {
                consumer(name, old, new);
            }
        });
    }

    /// Register a consumer of every lifecycle event this registry emits,
    /// without narrowing to one variant. Escape hatch for subscribers that
    /// want the raw [`RegistryEvent`].
    pub fn on_any_event(&self, consumer: impl Consumer<RegistryEvent<V>> + 'static) {
        self.events.on_event(consumer);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn scenario_five_registry_lifecycle() {
        let registry: Registry<String> = Registry::new((), HashMap::new());
        let added = Arc::new(AtomicUsize::new(0));
        let replaced = Arc::new(AtomicUsize::new(0));
        let removed = Arc::new(AtomicUsize::new(0));

        {
            let added = added.clone();
            registry.on_entry_added(move |name, _| {
                assert_eq!(name, "a");
                added.fetch_add(1, Ordering::SeqCst);
            });
        }
        {
            let replaced = replaced.clone();
            registry.on_entry_replaced(move |_, _, _| {
                replaced.fetch_add(1, Ordering::SeqCst);
            });
        }
        {
            let removed = removed.clone();
            registry.on_entry_removed(move |_, _| {
                removed.fetch_add(1, Ordering::SeqCst);
            });
        }

        registry
            .compute_if_absent("a", |_| "first".to_string())
            .unwrap();
        assert_eq!(added.load(Ordering::SeqCst), 1);

        registry.replace("a", "second".to_string()).unwrap();
        assert_eq!(replaced.load(Ordering::SeqCst), 1);

        registry.remove("a");
        assert_eq!(removed.load(Ordering::SeqCst), 1);

        // A second removal of an already-absent name emits nothing.
        registry.remove("a");
        assert_eq!(removed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn compute_if_absent_rejects_empty_name() {
        let registry: Registry<String> = Registry::new((), HashMap::new());
        assert!(matches!(
            registry.compute_if_absent("", |_| "x".to_string()),
            Err(CoreError::Validation { .. })
        ));
    }

    #[test]
    fn default_config_present_and_not_removable() {
        let registry: Registry<String> = Registry::new(42u32, HashMap::new());
        assert_eq!(
            *registry.get_config::<u32>(DEFAULT_CONFIG_NAME).unwrap(),
            42
        );
        assert!(registry.remove_config(DEFAULT_CONFIG_NAME).is_err());
    }

    #[test]
    fn add_get_remove_config_round_trip() {
        let registry: Registry<String> = Registry::new(0u32, HashMap::new());
        registry.add_config("custom", "value".to_string());
        assert_eq!(*registry.get_config::<String>("custom").unwrap(), "value");
        registry.remove_config("custom").unwrap();
        assert!(matches!(
            registry.get_config::<String>("custom"),
            Err(CoreError::ConfigurationNotFound { .. })
        ));
    }

    #[test]
    fn tags_are_enumerable_and_immutable() {
        let mut tags = HashMap::new();
        tags.insert("env".to_string(), "prod".to_string());
        let registry: Registry<String> = Registry::new((), tags);
        assert_eq!(registry.tags().get("env"), Some(&"prod".to_string()));
    }

    #[test]
    fn compute_if_absent_is_idempotent_across_threads() {
        let registry: Arc<Registry<AtomicUsize>> = Arc::new(Registry::new((), HashMap::new()));
        let factory_calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                let factory_calls = factory_calls.clone();
                std::thread::spawn(move || {
                    registry
                        .compute_if_absent("shared", |_| {
                            factory_calls.fetch_add(1, Ordering::SeqCst);
                            AtomicUsize::new(0)
                        })
                        .unwrap()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(factory_calls.load(Ordering::SeqCst), 1);
        let first = Arc::as_ptr(&results[0]);
        assert!(results.iter().all(|r| Arc::as_ptr(r) == first));
    }
}

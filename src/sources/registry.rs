//! Source Registry
//!
//! Concurrent map of registered state sources keyed by source id.
//! Listeners observe register/unregister after the mutation has committed.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::StateSource;
use crate::errors::ChronosError;
use crate::timeline::DeterminismClass;

/// Registry mutation notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRegistryEvent {
    Registered {
        source_id: String,
        class: DeterminismClass,
    },
    Unregistered {
        source_id: String,
    },
}

pub trait RegistryListener: Send + Sync {
    fn on_registry_event(&self, event: &SourceRegistryEvent);
}

/// Unique-id map of registered state sources with class metadata.
#[derive(Default)]
pub struct SourceRegistry {
    sources: DashMap<String, Arc<dyn StateSource>>,
    listeners: RwLock<Vec<Arc<dyn RegistryListener>>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source. Fails when the id is already present.
    pub fn register(&self, source: Arc<dyn StateSource>) -> Result<(), ChronosError> {
        let source_id = source.source_id().to_string();
        let class = source.declared_class();

        match self.sources.entry(source_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                warn!("rejected duplicate source registration");
                Err(ChronosError::RegistrationConflict { source_id })
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(source);
                debug!(class = %class, "source registered");
                self.notify(&SourceRegistryEvent::Registered { source_id, class });
                Ok(())
            }
        }
    }

    /// Remove a source. Returns whether it was present.
    pub fn unregister(&self, source_id: &str) -> bool {
        let removed = self.sources.remove(source_id).is_some();
        if removed {
            debug!("source unregistered");
            self.notify(&SourceRegistryEvent::Unregistered {
                source_id: source_id.to_string(),
            });
        }
        removed
    }

    pub fn get(&self, source_id: &str) -> Option<Arc<dyn StateSource>> {
        self.sources.get(source_id).map(|e| Arc::clone(e.value()))
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.sources.contains_key(source_id)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Snapshot of all registered sources.
    pub fn get_all(&self) -> Vec<Arc<dyn StateSource>> {
        self.sources.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Snapshot filtered to the given determinism classes.
    pub fn get_by_class(&self, classes: &[DeterminismClass]) -> Vec<Arc<dyn StateSource>> {
        self.sources
            .iter()
            .filter(|e| classes.contains(&e.value().declared_class()))
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    /// Whether any registered source carries the `Unsafe` class.
    pub fn has_unsafe_sources(&self) -> bool {
        self.sources
            .iter()
            .any(|e| e.value().declared_class() == DeterminismClass::Unsafe)
    }

    pub fn add_listener(&self, listener: Arc<dyn RegistryListener>) {
        self.listeners.write().push(listener);
    }

    fn notify(&self, event: &SourceRegistryEvent) {
        let listeners = self.listeners.read();
        for listener in listeners.iter() {
            listener.on_registry_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{TypeDescriptor, TypeShape};
    use parking_lot::Mutex;

    struct FixedSource {
        id: String,
        class: DeterminismClass,
    }

    impl StateSource for FixedSource {
        fn source_id(&self) -> &str {
            &self.id
        }

        fn display_name(&self) -> &str {
            &self.id
        }

        fn declared_class(&self) -> DeterminismClass {
            self.class
        }

        fn descriptor(&self) -> TypeDescriptor {
            TypeDescriptor::new("test::Fixed", TypeShape::PureData)
        }

        fn capture_state(&self) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::json!({"id": self.id}))
        }
    }

    fn source(id: &str, class: DeterminismClass) -> Arc<dyn StateSource> {
        Arc::new(FixedSource {
            id: id.to_string(),
            class,
        })
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = SourceRegistry::new();
        registry
            .register(source("session", DeterminismClass::Guaranteed))
            .unwrap();

        assert!(registry.contains("session"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("session").unwrap().source_id(), "session");
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = SourceRegistry::new();
        registry
            .register(source("session", DeterminismClass::Guaranteed))
            .unwrap();

        let err = registry
            .register(source("session", DeterminismClass::Verifiable))
            .unwrap_err();
        assert!(matches!(
            err,
            ChronosError::RegistrationConflict { source_id } if source_id == "session"
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister() {
        let registry = SourceRegistry::new();
        registry
            .register(source("session", DeterminismClass::Guaranteed))
            .unwrap();
        assert!(registry.unregister("session"));
        assert!(!registry.unregister("session"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_class_queries() {
        let registry = SourceRegistry::new();
        registry
            .register(source("a", DeterminismClass::Guaranteed))
            .unwrap();
        registry
            .register(source("b", DeterminismClass::Unsafe))
            .unwrap();
        registry
            .register(source("c", DeterminismClass::Conditional))
            .unwrap();

        assert!(registry.has_unsafe_sources());
        let filtered = registry.get_by_class(&[
            DeterminismClass::Guaranteed,
            DeterminismClass::Conditional,
        ]);
        assert_eq!(filtered.len(), 2);

        registry.unregister("b");
        assert!(!registry.has_unsafe_sources());
    }

    #[test]
    fn test_listeners_observe_committed_mutations() {
        struct Recording {
            events: Mutex<Vec<SourceRegistryEvent>>,
        }
        impl RegistryListener for Recording {
            fn on_registry_event(&self, event: &SourceRegistryEvent) {
                self.events.lock().push(event.clone());
            }
        }

        let registry = SourceRegistry::new();
        let listener = Arc::new(Recording {
            events: Mutex::new(Vec::new()),
        });
        registry.add_listener(listener.clone());

        registry
            .register(source("session", DeterminismClass::Verifiable))
            .unwrap();
        registry.unregister("session");

        let events = listener.events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            SourceRegistryEvent::Registered {
                source_id: "session".to_string(),
                class: DeterminismClass::Verifiable,
            }
        );
        assert_eq!(
            events[1],
            SourceRegistryEvent::Unregistered {
                source_id: "session".to_string(),
            }
        );
    }
}

use crate::di::{BindingDescriptor, DependencyGraph, ServiceId, ServiceKey};
use crate::error::{MelderError, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

#[derive(Default)]
struct InterfaceBindings {
    unnamed: Vec<Arc<BindingDescriptor>>,
    named: BTreeMap<Arc<str>, Arc<BindingDescriptor>>,
}

impl InterfaceBindings {
    fn len(&self) -> usize {
        self.unnamed.len() + self.named.len()
    }
}

#[derive(Default)]
struct RegistryState {
    bindings: HashMap<ServiceId, InterfaceBindings>,
    graph: DependencyGraph,
}

impl RegistryState {
    fn lookup(&self, key: &ServiceKey) -> Option<&Arc<BindingDescriptor>> {
        let bindings = self.bindings.get(&key.id())?;
        match key.name() {
            Some(name) => bindings.named.get(name),
            None => bindings.unnamed.first(),
        }
    }

    fn store(&mut self, descriptor: Arc<BindingDescriptor>) -> Option<Arc<BindingDescriptor>> {
        let bindings = self.bindings.entry(descriptor.interface()).or_default();
        match descriptor.key().name_arc().cloned() {
            Some(name) => bindings.named.insert(name, descriptor),
            None => std::mem::replace(&mut bindings.unnamed, vec![descriptor]).into_iter().next(),
        }
    }
}

/// Thread-safe store of binding descriptors and the dependency graph they form.
///
/// Registration validates the graph before the descriptor becomes visible, so
/// a descriptor that would close a cycle is never observable by resolution.
#[derive(Default)]
pub struct ServiceRegistry {
    state: RwLock<RegistryState>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor. Returns the descriptor it replaced when `overwrite`
    /// is set and the key was already bound.
    pub fn register(&self, descriptor: BindingDescriptor, overwrite: bool) -> Result<Option<Arc<BindingDescriptor>>> {
        let descriptor = Arc::new(descriptor);
        let key = descriptor.key().clone();
        let mut state = self.state.write();

        if !overwrite && state.lookup(&key).is_some() {
            return Err(MelderError::DuplicateBinding { service: key });
        }

        let previous = state.graph.insert_node(key.clone(), descriptor.dependencies().to_vec());
        if let Some(cycle) = state.graph.find_cycle_from(&key) {
            match previous {
                Some(edges) => {
                    state.graph.insert_node(key.clone(), edges);
                }
                None => {
                    state.graph.remove_node(&key);
                }
            }
            tracing::warn!("Rejected binding for {}: dependency cycle", key);
            return Err(MelderError::CircularDependency {
                service: key,
                cycle: cycle.into(),
            });
        }

        tracing::debug!(
            "Registered {} -> {} ({})",
            key,
            descriptor.implementation(),
            descriptor.lifetime()
        );
        Ok(state.store(descriptor))
    }

    /// The single unnamed binding of `interface`.
    pub fn find(&self, interface: ServiceId) -> Result<Arc<BindingDescriptor>> {
        let state = self.state.read();
        let service = ServiceKey::new(interface, None);
        let unnamed = state
            .bindings
            .get(&interface)
            .map(|bindings| bindings.unnamed.as_slice())
            .unwrap_or(&[]);

        match unnamed {
            [] => Err(MelderError::UnregisteredService {
                path: vec![service.clone()].into(),
                service,
            }),
            [descriptor] => Ok(Arc::clone(descriptor)),
            many => Err(MelderError::AmbiguousBinding {
                service,
                count: many.len(),
            }),
        }
    }

    pub fn find_named(&self, interface: ServiceId, name: &str) -> Result<Arc<BindingDescriptor>> {
        let state = self.state.read();
        state
            .bindings
            .get(&interface)
            .and_then(|bindings| bindings.named.get(name))
            .cloned()
            .ok_or_else(|| {
                let service = ServiceKey::new(interface, Some(Arc::from(name)));
                MelderError::UnregisteredService {
                    path: vec![service.clone()].into(),
                    service,
                }
            })
    }

    pub fn find_key(&self, key: &ServiceKey) -> Result<Arc<BindingDescriptor>> {
        match key.name() {
            Some(name) => self.find_named(key.id(), name),
            None => self.find(key.id()),
        }
    }

    /// Every named binding of `interface`, ordered by name.
    pub fn named_bindings(&self, interface: ServiceId) -> Vec<(Arc<str>, Arc<BindingDescriptor>)> {
        let state = self.state.read();
        state
            .bindings
            .get(&interface)
            .map(|bindings| {
                bindings
                    .named
                    .iter()
                    .map(|(name, descriptor)| (Arc::clone(name), Arc::clone(descriptor)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.state.read().lookup(key).is_some()
    }

    pub fn keys(&self) -> Vec<ServiceKey> {
        let state = self.state.read();
        let mut keys: Vec<_> = state
            .bindings
            .values()
            .flat_map(|bindings| bindings.unnamed.iter().chain(bindings.named.values()))
            .map(|descriptor| descriptor.key().clone())
            .collect();
        keys.sort_by_key(|key| key.to_string());
        keys
    }

    pub fn len(&self) -> usize {
        self.state.read().bindings.values().map(InterfaceBindings::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn detect_cycles(&self) -> Option<Vec<ServiceKey>> {
        self.state.read().graph.find_any_cycle()
    }

    pub fn missing_dependencies(&self) -> Vec<(ServiceKey, ServiceKey)> {
        self.state.read().graph.missing_dependencies()
    }

    pub fn reaches_any(&self, start: &ServiceKey, targets: &HashSet<ServiceKey>) -> bool {
        self.state.read().graph.reaches_any(start, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::{Dependency, Lifetime};

    trait Store: Send + Sync {}
    struct Memory;
    impl Store for Memory {}

    fn store_binding(dependencies: Vec<Dependency>) -> BindingDescriptor {
        BindingDescriptor::for_factory::<dyn Store, _>(Lifetime::Many, dependencies, |_| {
            Ok(Arc::new(Memory) as Arc<dyn Store>)
        })
    }

    #[test]
    fn test_register_and_find() {
        let registry = ServiceRegistry::new();
        registry.register(store_binding(Vec::new()), false).unwrap();
        registry
            .register(store_binding(Vec::new()).named("disk"), false)
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.find(ServiceId::of::<dyn Store>()).is_ok());
        assert!(registry.find_named(ServiceId::of::<dyn Store>(), "disk").is_ok());
        assert!(registry.find_named(ServiceId::of::<dyn Store>(), "cloud").is_err());
        assert_eq!(registry.named_bindings(ServiceId::of::<dyn Store>()).len(), 1);
    }

    #[test]
    fn test_unregistered_interface() {
        let registry = ServiceRegistry::new();
        let err = registry.find(ServiceId::of::<dyn Store>()).unwrap_err();
        assert!(matches!(err, MelderError::UnregisteredService { .. }));
    }

    #[test]
    fn test_duplicate_rejected_unless_overwrite() {
        let registry = ServiceRegistry::new();
        registry.register(store_binding(Vec::new()), false).unwrap();

        let err = registry.register(store_binding(Vec::new()), false).unwrap_err();
        assert!(matches!(err, MelderError::DuplicateBinding { .. }));

        let replaced = registry.register(store_binding(Vec::new()), true).unwrap();
        assert!(replaced.is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_cycle_rejected_and_rolled_back() {
        let registry = ServiceRegistry::new();
        registry
            .register(
                BindingDescriptor::for_factory::<u8, _>(Lifetime::Many, vec![Dependency::on::<u16>()], |_| {
                    Ok(Arc::new(1))
                }),
                false,
            )
            .unwrap();

        let err = registry
            .register(
                BindingDescriptor::for_factory::<u16, _>(Lifetime::Many, vec![Dependency::on::<u8>()], |_| {
                    Ok(Arc::new(2))
                }),
                false,
            )
            .unwrap_err();

        match err {
            MelderError::CircularDependency { service, cycle } => {
                assert_eq!(service, ServiceKey::of::<u16>());
                assert_eq!(
                    cycle.keys(),
                    &[ServiceKey::of::<u16>(), ServiceKey::of::<u8>(), ServiceKey::of::<u16>()]
                );
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(!registry.contains(&ServiceKey::of::<u16>()));
        assert!(registry.detect_cycles().is_none());
        assert_eq!(
            registry.missing_dependencies(),
            vec![(ServiceKey::of::<u8>(), ServiceKey::of::<u16>())]
        );

        // An acyclic binding for the same key is still accepted.
        registry
            .register(
                BindingDescriptor::for_factory::<u16, _>(Lifetime::Many, Vec::new(), |_| Ok(Arc::new(2))),
                false,
            )
            .unwrap();
        assert!(registry.missing_dependencies().is_empty());
    }

    #[test]
    fn test_overwrite_cycle_restores_previous_edges() {
        let registry = ServiceRegistry::new();
        registry
            .register(
                BindingDescriptor::for_factory::<u8, _>(Lifetime::Many, vec![Dependency::on::<u16>()], |_| {
                    Ok(Arc::new(1))
                }),
                false,
            )
            .unwrap();
        registry
            .register(
                BindingDescriptor::for_factory::<u16, _>(Lifetime::Many, Vec::new(), |_| Ok(Arc::new(2))),
                false,
            )
            .unwrap();

        let result = registry.register(
            BindingDescriptor::for_factory::<u16, _>(Lifetime::Many, vec![Dependency::on::<u8>()], |_| {
                Ok(Arc::new(2))
            }),
            true,
        );
        assert!(result.is_err());
        assert!(registry.find(ServiceId::of::<u16>()).unwrap().dependencies().is_empty());
        assert!(registry.detect_cycles().is_none());
    }
}

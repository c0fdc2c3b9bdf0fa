use crate::di::{BindingDescriptor, Instance, ServiceKey};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Clone)]
pub(crate) enum Override {
    Instance(Instance),
    Binding(Arc<BindingDescriptor>),
}

/// Per-call replacements for services anywhere in a resolution.
///
/// An override applies to the requested service and to every dependency
/// resolved on its behalf. Services whose dependency graph reaches an
/// overridden key are built fresh for that call and are not cached.
///
/// # Example
/// ```
/// use melder::{Container, Overrides};
/// use std::sync::Arc;
///
/// let container = Container::new();
/// container.bind_instance(Arc::new(8080u16)).unwrap();
///
/// let port = container
///     .meld_with::<u16>(&Overrides::new().with(Arc::new(9090u16)))
///     .unwrap();
/// assert_eq!(*port, 9090);
/// ```
#[derive(Clone, Default)]
pub struct Overrides {
    entries: HashMap<ServiceKey, Override>,
    keys: HashSet<ServiceKey>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `instance` wherever the unnamed `I` is requested.
    pub fn with<I: ?Sized + Send + Sync + 'static>(mut self, instance: Arc<I>) -> Self {
        self.insert(ServiceKey::of::<I>(), Override::Instance(Instance::new(instance)));
        self
    }

    /// Use `instance` wherever `I` named `name` is requested.
    pub fn with_named<I: ?Sized + Send + Sync + 'static>(mut self, name: impl Into<Arc<str>>, instance: Arc<I>) -> Self {
        self.insert(ServiceKey::named::<I>(name), Override::Instance(Instance::new(instance)));
        self
    }

    /// Build the descriptor's key with an alternate binding for this call.
    pub fn with_binding(mut self, descriptor: BindingDescriptor) -> Self {
        self.insert(descriptor.key().clone(), Override::Binding(Arc::new(descriptor)));
        self
    }

    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn get(&self, key: &ServiceKey) -> Option<&Override> {
        self.entries.get(key)
    }

    pub(crate) fn keys(&self) -> &HashSet<ServiceKey> {
        &self.keys
    }

    fn insert(&mut self, key: ServiceKey, value: Override) {
        self.keys.insert(key.clone());
        self.entries.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::Lifetime;

    #[test]
    fn test_later_override_wins() {
        let overrides = Overrides::new()
            .with(Arc::new(1u32))
            .with(Arc::new(2u32))
            .with_named("port", Arc::new(3u32));

        assert_eq!(overrides.len(), 2);
        match overrides.get(&ServiceKey::of::<u32>()) {
            Some(Override::Instance(instance)) => assert_eq!(*instance.downcast::<u32>().unwrap(), 2),
            _ => panic!("expected an instance override"),
        }
        assert!(overrides.contains(&ServiceKey::named::<u32>("port")));
    }

    #[test]
    fn test_binding_override_uses_descriptor_key() {
        let overrides = Overrides::new().with_binding(
            BindingDescriptor::for_factory::<String, _>(Lifetime::Unique, Vec::new(), |_| {
                Ok(Arc::new("alt".to_string()))
            })
            .named("greeting"),
        );

        assert!(matches!(
            overrides.get(&ServiceKey::named::<String>("greeting")),
            Some(Override::Binding(_))
        ));
        assert!(overrides.keys().contains(&ServiceKey::named::<String>("greeting")));
    }
}

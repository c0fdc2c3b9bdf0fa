//! Resolution engine.
//!
//! A [`Resolver`] serves one top-level `meld` call: it walks the dependency
//! graph depth-first, applies the lifetime rules and the per-call overrides,
//! runs the hooks and records disposers with the owning scope.

use crate::di::container::ContainerInner;
use crate::di::dependencies::Resolved;
use crate::di::instance::Creation;
use crate::di::overrides::Override;
use crate::di::state::ScopeCore;
use crate::di::{
    BindingDescriptor, Dependencies, DependencyKind, HookStage, Instance, InstanceMetadata, Lifetime, Overrides,
    ServiceId, ServiceKey,
};
use crate::error::{BoxError, MelderError, Result};
use crate::lifecycle::DisposalList;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use uuid::Uuid;

/// Per-key construction cell. Concurrent callers of the same key block on the
/// cell while the first one builds the instance.
pub(crate) type InstanceCache = DashMap<ServiceKey, Arc<OnceCell<Creation>>>;

enum CellInit {
    /// The key was rebound after it was looked up.
    Rebound(Arc<BindingDescriptor>),
    Failed(MelderError),
}

impl From<MelderError> for CellInit {
    fn from(error: MelderError) -> Self {
        CellInit::Failed(error)
    }
}

pub(crate) struct Resolver<'a> {
    container: &'a ContainerInner,
    scope: &'a ScopeCore,
    overrides: &'a Overrides,
    path: Vec<ServiceKey>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(container: &'a ContainerInner, scope: &'a ScopeCore, overrides: &'a Overrides) -> Self {
        Self {
            container,
            scope,
            overrides,
            path: Vec::new(),
        }
    }

    pub(crate) fn resolve(&mut self, key: &ServiceKey) -> Result<Instance> {
        if let Some(value) = self.overrides.get(key) {
            return match value {
                Override::Instance(instance) => Ok(instance.clone()),
                Override::Binding(descriptor) => {
                    let descriptor = Arc::clone(descriptor);
                    self.enter(key, |resolver| resolver.build_uncached(&descriptor))
                }
            };
        }

        let descriptor = match self.container.registry.find_key(key) {
            Ok(descriptor) => descriptor,
            Err(MelderError::UnregisteredService { service, .. }) => {
                let mut path = self.path.clone();
                path.push(key.clone());
                return Err(MelderError::UnregisteredService {
                    service,
                    path: path.into(),
                });
            }
            Err(e) => return Err(e),
        };

        self.enter(key, |resolver| resolver.apply_lifetime(&descriptor))
    }

    fn enter<T>(&mut self, key: &ServiceKey, step: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.path.contains(key) || self.path.len() >= self.container.config.max_resolution_depth {
            let mut cycle = self.path.clone();
            cycle.push(key.clone());
            tracing::error!("Circular dependency while resolving {}: {:?}", key, cycle);
            return Err(MelderError::CircularDependency {
                service: key.clone(),
                cycle: cycle.into(),
            });
        }

        self.path.push(key.clone());
        let result = step(self);
        self.path.pop();
        result
    }

    fn apply_lifetime(&mut self, descriptor: &Arc<BindingDescriptor>) -> Result<Instance> {
        let container = self.container;
        match descriptor.lifetime() {
            Lifetime::Many => self.build_uncached(descriptor),
            _ if self.bypasses_cache(descriptor.key()) => {
                tracing::debug!("Building {} uncached: overrides reach its dependencies", descriptor.key());
                self.build_uncached(descriptor)
            }
            Lifetime::Unique => {
                // Unique services only ever see root-scope instances, and share
                // the root disposal list so dependents go before dependencies.
                let caller = std::mem::replace(&mut self.scope, &container.root);
                let result = self.cached(descriptor, &container.singletons, &container.root.disposables);
                self.scope = caller;
                result
            }
            Lifetime::UniquePerScope => {
                let scope = self.scope;
                self.cached(descriptor, &scope.instances, &scope.disposables)
            }
        }
    }

    fn bypasses_cache(&self, key: &ServiceKey) -> bool {
        !self.overrides.is_empty() && self.container.registry.reaches_any(key, self.overrides.keys())
    }

    fn build_uncached(&mut self, descriptor: &BindingDescriptor) -> Result<Instance> {
        let scope = self.scope;
        let instance = self.build(descriptor, &scope.disposables)?;
        if let Some(debug) = &self.container.debug {
            debug.record(&instance, self.metadata(descriptor.key(), Uuid::new_v4(), Utc::now()));
        }
        Ok(instance)
    }

    fn cached(
        &mut self,
        descriptor: &Arc<BindingDescriptor>,
        cache: &'a InstanceCache,
        disposals: &'a DisposalList,
    ) -> Result<Instance> {
        let key = descriptor.key();
        let existing = cache.get(key).map(|cell| Arc::clone(cell.value()));
        let cell = match existing {
            Some(cell) => cell,
            None => Arc::clone(cache.entry(key.clone()).or_default().value()),
        };

        if let Some(creation) = cell.get() {
            return Ok(creation.instance.clone());
        }

        let init = cell.get_or_try_init(|| -> std::result::Result<Creation, CellInit> {
            let current = self.container.registry.find_key(key)?;
            if !Arc::ptr_eq(&current, descriptor) {
                return Err(CellInit::Rebound(current));
            }

            let instance = self.build(descriptor, disposals)?;
            let creation = Creation::new(instance, descriptor.lifetime());
            if let Some(debug) = &self.container.debug {
                debug.record(
                    &creation.instance,
                    self.metadata(key, creation.object_id, creation.created_at),
                );
            }
            Ok(creation)
        });

        match init {
            Ok(creation) => Ok(creation.instance.clone()),
            Err(CellInit::Failed(error)) => Err(error),
            Err(CellInit::Rebound(current)) => {
                tracing::debug!("{} was rebound during resolution, using the new binding", key);
                self.apply_lifetime(&current)
            }
        }
    }

    fn build(&mut self, descriptor: &BindingDescriptor, disposals: &DisposalList) -> Result<Instance> {
        let key = descriptor.key();
        tracing::trace!("Building {} ({})", key, descriptor.implementation());

        let mut entries = Vec::with_capacity(descriptor.dependencies().len());
        for dependency in descriptor.dependencies() {
            let resolved = match dependency.kind() {
                DependencyKind::Required => Resolved::One(self.resolve(dependency.key())?),
                DependencyKind::Optional => {
                    if self.overrides.contains(dependency.key()) || self.container.registry.contains(dependency.key()) {
                        Resolved::One(self.resolve(dependency.key())?)
                    } else {
                        Resolved::Missing
                    }
                }
                DependencyKind::AllNamed => Resolved::All(self.resolve_all_named(dependency.key().id())?),
            };
            entries.push((dependency.clone(), resolved));
        }
        let mut dependencies = Dependencies::new(key.clone(), entries);

        let container = self.container;
        let hooks = &container.hooks;
        let hooked = !hooks.is_empty();
        if hooked {
            for hook in hooks.pre(key) {
                hook(&mut dependencies).map_err(|source| self.hook_error(key, HookStage::Prehook, source))?;
            }
        }

        let constructed = descriptor.construct(&mut dependencies).map_err(|source| {
            tracing::error!("Constructor for {} failed: {}", key, source);
            MelderError::Constructor {
                service: key.clone(),
                path: self.path.clone().into(),
                source,
            }
        })?;

        if let Some(disposer) = constructed.disposer {
            if container.config.disposal {
                if descriptor.lifetime() == Lifetime::Many
                    && std::ptr::eq(disposals, &container.root.disposables)
                    && !container.warned_root_many.swap(true, Ordering::Relaxed)
                {
                    tracing::warn!(
                        "Disposable Many service {} resolved at container level; it is kept until shutdown",
                        key
                    );
                }
                disposals.push(key.clone(), disposer);
            }
        }

        let mut instance = constructed.instance;
        if hooked {
            for hook in hooks.activation(key) {
                instance = hook(instance).map_err(|source| self.hook_error(key, HookStage::Activation, source))?;
            }
            for hook in hooks.post(key) {
                hook(&instance).map_err(|source| self.hook_error(key, HookStage::Posthook, source))?;
            }
        }
        Ok(instance)
    }

    fn resolve_all_named(&mut self, interface: ServiceId) -> Result<BTreeMap<Arc<str>, Instance>> {
        let mut names: BTreeSet<Arc<str>> = self
            .container
            .registry
            .named_bindings(interface)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        names.extend(
            self.overrides
                .keys()
                .iter()
                .filter(|key| key.id() == interface)
                .filter_map(|key| key.name_arc().cloned()),
        );

        let mut all = BTreeMap::new();
        for name in names {
            let key = ServiceKey::new(interface, Some(Arc::clone(&name)));
            all.insert(name, self.resolve(&key)?);
        }
        Ok(all)
    }

    fn hook_error(&self, key: &ServiceKey, stage: HookStage, source: BoxError) -> MelderError {
        tracing::error!("{} hook for {} failed: {}", stage, key, source);
        MelderError::ActivationHook {
            service: key.clone(),
            stage,
            path: self.path.clone().into(),
            source,
        }
    }

    fn metadata(&self, key: &ServiceKey, object_id: Uuid, created_at: DateTime<Utc>) -> InstanceMetadata {
        InstanceMetadata {
            service: key.clone(),
            scope_id: self.scope.id(),
            scope_created_at: self.scope.created_at(),
            object_id,
            object_created_at: created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MelderConfig;

    fn port(value: u16) -> BindingDescriptor {
        BindingDescriptor::for_factory::<u16, _>(Lifetime::Unique, Vec::new(), move |_| Ok(Arc::new(value)))
    }

    #[test]
    fn test_rebound_descriptor_is_not_cached() {
        let container = ContainerInner::new(MelderConfig::default());
        let key = ServiceKey::of::<u16>();
        container.registry.register(port(1), false).unwrap();
        let stale = container.registry.find_key(&key).unwrap();
        container.registry.register(port(2), true).unwrap();

        let overrides = Overrides::new();
        let mut resolver = Resolver::new(&container, &container.root, &overrides);
        let instance = resolver.apply_lifetime(&stale).unwrap();
        assert_eq!(*instance.downcast::<u16>().unwrap(), 2);

        let cached = container.root.resolve(&container, &key, &overrides).unwrap();
        assert!(cached.ptr_eq(&instance));
    }
}

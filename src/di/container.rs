use crate::config::MelderConfig;
use crate::di::debug::DebugTable;
use crate::di::engine::InstanceCache;
use crate::di::hooks::HookRegistry;
use crate::di::state::{self, ScopeCore, StateInner};
use crate::di::{
    BindingDescriptor, ContainerBuilder, Dependencies, Dependency, Hooks, Injectable, InstanceMetadata, Lifetime,
    LiveService, Overrides, ServiceKey, ServiceRegistry, State,
};
use crate::error::{BoxError, DisposalFailure, MelderError, Result};
use crate::module::Module;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

pub(crate) struct ContainerInner {
    pub(crate) config: MelderConfig,
    pub(crate) registry: ServiceRegistry,
    pub(crate) hooks: HookRegistry,
    pub(crate) singletons: InstanceCache,
    /// Holds the root-scope instances and every `Unique` disposer.
    pub(crate) root: ScopeCore,
    pub(crate) debug: Option<DebugTable>,
    pub(crate) warned_root_many: AtomicBool,
    states: Mutex<Vec<Weak<StateInner>>>,
    shut_down: AtomicBool,
}

impl ContainerInner {
    pub(crate) fn new(config: MelderConfig) -> Self {
        let debug = config.debugging.then(DebugTable::default);
        Self {
            config,
            registry: ServiceRegistry::new(),
            hooks: HookRegistry::default(),
            singletons: InstanceCache::default(),
            root: ScopeCore::new(false),
            debug,
            warned_root_many: AtomicBool::new(false),
            states: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    pub(crate) fn track_state(&self, state: &Arc<StateInner>) {
        let mut states = self.states.lock();
        if self.shut_down.load(Ordering::Acquire) {
            return;
        }
        states.retain(|state| state.strong_count() > 0);
        states.push(Arc::downgrade(state));
    }

    fn shutdown(&self) -> Vec<DisposalFailure> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Vec::new();
        }
        tracing::info!("Shutting down container...");

        let states = std::mem::take(&mut *self.states.lock());
        let mut failures = Vec::new();
        for state in states.into_iter().rev() {
            if let Some(state) = state.upgrade() {
                failures.extend(state.core.seal(self));
            }
        }

        failures.extend(self.root.seal(self));
        self.singletons.clear();

        if failures.is_empty() {
            tracing::info!("Container shutdown complete");
        } else {
            tracing::warn!("Container shutdown completed with {} disposal failure(s)", failures.len());
        }
        failures
    }
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        for failure in self.shutdown() {
            tracing::warn!("Disposal failed while dropping container: {}", failure);
        }
    }
}

/// Thread-safe dependency injection container.
///
/// Owns the service registry, the `Unique` instance cache and an implicit
/// root scope used by the container-level `meld*` calls. `Container` is a
/// cheap handle; clones share the same registry and caches. The container is
/// shut down when the last handle and the last [`State`] are dropped.
///
/// # Example
/// ```
/// use melder::{Container, Lifetime};
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync {
///     fn greet(&self) -> String;
/// }
///
/// struct English;
///
/// impl Greeter for English {
///     fn greet(&self) -> String {
///         "hello".to_string()
///     }
/// }
///
/// let container = Container::new();
/// container
///     .bind_factory::<dyn Greeter, _>(Lifetime::Unique, Vec::new(), |_| {
///         Ok(Arc::new(English) as Arc<dyn Greeter>)
///     })
///     .unwrap();
///
/// let greeter = container.meld::<dyn Greeter>().unwrap();
/// assert_eq!(greeter.greet(), "hello");
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    pub fn new() -> Self {
        Self::with_config(MelderConfig::default())
    }

    pub fn with_config(config: MelderConfig) -> Self {
        tracing::debug!("Creating container: {:?}", config);
        Self {
            inner: Arc::new(ContainerInner::new(config)),
        }
    }

    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    pub fn config(&self) -> &MelderConfig {
        &self.inner.config
    }

    /// Register a descriptor. Fails if its key is already bound or if it
    /// would close a dependency cycle.
    pub fn register(&self, descriptor: BindingDescriptor) -> Result<()> {
        self.inner.registry.register(descriptor, false).map(|_| ())
    }

    /// Register a descriptor, replacing any existing binding for its key.
    ///
    /// The container-level caches for the key are evicted. States that
    /// already cached an instance keep it until they are sealed.
    pub fn register_overwrite(&self, descriptor: BindingDescriptor) -> Result<()> {
        let key = descriptor.key().clone();
        if self.inner.registry.register(descriptor, true)?.is_some() {
            tracing::debug!("Rebound {}", key);
            self.inner.singletons.remove(&key);
            self.inner.root.instances.remove(&key);
        }
        Ok(())
    }

    /// Bind `Impl` to the interface `I`.
    ///
    /// ```
    /// use melder::{BoxError, Container, Dependencies, Dependency, Injectable, Lifetime};
    /// use std::sync::Arc;
    ///
    /// trait Repository: Send + Sync {}
    ///
    /// struct InMemory;
    /// impl Repository for InMemory {}
    ///
    /// impl Injectable for InMemory {
    ///     fn dependencies() -> Vec<Dependency> {
    ///         Vec::new()
    ///     }
    ///
    ///     fn inject(_: &mut Dependencies) -> Result<Self, BoxError> {
    ///         Ok(InMemory)
    ///     }
    /// }
    ///
    /// let container = Container::new();
    /// container
    ///     .bind::<dyn Repository, InMemory, _>(Lifetime::Unique, |it| it as Arc<dyn Repository>)
    ///     .unwrap();
    /// assert!(container.contains::<dyn Repository>());
    /// ```
    pub fn bind<I, Impl, F>(&self, lifetime: Lifetime, caster: F) -> Result<()>
    where
        I: ?Sized + Send + Sync + 'static,
        Impl: Injectable,
        F: Fn(Arc<Impl>) -> Arc<I> + Send + Sync + 'static,
    {
        self.register(BindingDescriptor::for_type::<I, Impl, F>(lifetime, caster))
    }

    pub fn bind_named<I, Impl, F>(&self, name: impl Into<Arc<str>>, lifetime: Lifetime, caster: F) -> Result<()>
    where
        I: ?Sized + Send + Sync + 'static,
        Impl: Injectable,
        F: Fn(Arc<Impl>) -> Arc<I> + Send + Sync + 'static,
    {
        self.register(BindingDescriptor::for_type::<I, Impl, F>(lifetime, caster).named(name))
    }

    /// Bind a concrete type as its own interface.
    pub fn bind_self<T: Injectable>(&self, lifetime: Lifetime) -> Result<()> {
        self.register(BindingDescriptor::for_type::<T, T, _>(lifetime, |it| it))
    }

    pub fn bind_self_named<T: Injectable>(&self, name: impl Into<Arc<str>>, lifetime: Lifetime) -> Result<()> {
        self.register(BindingDescriptor::for_type::<T, T, _>(lifetime, |it| it).named(name))
    }

    pub fn bind_instance<I: ?Sized + Send + Sync + 'static>(&self, instance: Arc<I>) -> Result<()> {
        self.register(BindingDescriptor::for_instance(instance))
    }

    pub fn bind_instance_named<I: ?Sized + Send + Sync + 'static>(
        &self,
        name: impl Into<Arc<str>>,
        instance: Arc<I>,
    ) -> Result<()> {
        self.register(BindingDescriptor::for_instance(instance).named(name))
    }

    pub fn bind_factory<I, F>(&self, lifetime: Lifetime, dependencies: Vec<Dependency>, factory: F) -> Result<()>
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn(&mut Dependencies) -> std::result::Result<Arc<I>, BoxError> + Send + Sync + 'static,
    {
        self.register(BindingDescriptor::for_factory(lifetime, dependencies, factory))
    }

    pub fn bind_factory_named<I, F>(
        &self,
        name: impl Into<Arc<str>>,
        lifetime: Lifetime,
        dependencies: Vec<Dependency>,
        factory: F,
    ) -> Result<()>
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn(&mut Dependencies) -> std::result::Result<Arc<I>, BoxError> + Send + Sync + 'static,
    {
        self.register(BindingDescriptor::for_factory(lifetime, dependencies, factory).named(name))
    }

    /// Like [`bind`](Self::bind), but replaces an existing binding.
    pub fn rebind<I, Impl, F>(&self, lifetime: Lifetime, caster: F) -> Result<()>
    where
        I: ?Sized + Send + Sync + 'static,
        Impl: Injectable,
        F: Fn(Arc<Impl>) -> Arc<I> + Send + Sync + 'static,
    {
        self.register_overwrite(BindingDescriptor::for_type::<I, Impl, F>(lifetime, caster))
    }

    pub fn rebind_named<I, Impl, F>(&self, name: impl Into<Arc<str>>, lifetime: Lifetime, caster: F) -> Result<()>
    where
        I: ?Sized + Send + Sync + 'static,
        Impl: Injectable,
        F: Fn(Arc<Impl>) -> Arc<I> + Send + Sync + 'static,
    {
        self.register_overwrite(BindingDescriptor::for_type::<I, Impl, F>(lifetime, caster).named(name))
    }

    pub fn rebind_instance<I: ?Sized + Send + Sync + 'static>(&self, instance: Arc<I>) -> Result<()> {
        self.register_overwrite(BindingDescriptor::for_instance(instance))
    }

    pub fn rebind_factory<I, F>(&self, lifetime: Lifetime, dependencies: Vec<Dependency>, factory: F) -> Result<()>
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn(&mut Dependencies) -> std::result::Result<Arc<I>, BoxError> + Send + Sync + 'static,
    {
        self.register_overwrite(BindingDescriptor::for_factory(lifetime, dependencies, factory))
    }

    /// Attach construction hooks to `I`.
    pub fn hooks<I: ?Sized + Send + Sync + 'static>(&self) -> Hooks<'_, I> {
        Hooks::new(&self.inner.hooks)
    }

    /// Apply the bindings of a [`Module`].
    pub fn install<M: Module>(&self) -> Result<()> {
        tracing::debug!("Installing module: {}", std::any::type_name::<M>());
        M::register(self)
    }

    /// Open a new state. After [`shutdown`](Self::shutdown) the returned
    /// state is already sealed.
    pub fn create_state(&self) -> State {
        let mut states = self.inner.states.lock();
        let sealed = self.inner.shut_down.load(Ordering::Acquire);
        let state = Arc::new(StateInner {
            core: ScopeCore::new(sealed),
            container: Arc::clone(&self.inner),
        });

        if sealed {
            tracing::warn!("Created state {} on a shut down container", state.core.id());
        } else {
            states.retain(|state| state.strong_count() > 0);
            states.push(Arc::downgrade(&state));
            tracing::debug!("Created state {}", state.core.id());
        }
        State::from_inner(state)
    }

    /// Resolve `I` through the root scope.
    ///
    /// The root scope lives as long as the container, so disposable `Many`
    /// instances resolved here stay registered for disposal until
    /// [`Container::shutdown`]. Resolve them through a [`State`] to release
    /// them earlier.
    pub fn meld<I: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<I>> {
        self.meld_key(ServiceKey::of::<I>(), &Overrides::default())
    }

    pub fn meld_named<I: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Arc<I>> {
        self.meld_key(ServiceKey::named::<I>(name), &Overrides::default())
    }

    pub fn meld_with<I: ?Sized + Send + Sync + 'static>(&self, overrides: &Overrides) -> Result<Arc<I>> {
        self.meld_key(ServiceKey::of::<I>(), overrides)
    }

    pub fn meld_named_with<I: ?Sized + Send + Sync + 'static>(
        &self,
        name: &str,
        overrides: &Overrides,
    ) -> Result<Arc<I>> {
        self.meld_key(ServiceKey::named::<I>(name), overrides)
    }

    fn meld_key<I: ?Sized + Send + Sync + 'static>(&self, key: ServiceKey, overrides: &Overrides) -> Result<Arc<I>> {
        self.inner.root.meld(&self.inner, key, overrides)
    }

    pub fn contains<I: ?Sized + 'static>(&self) -> bool {
        self.inner.registry.contains(&ServiceKey::of::<I>())
    }

    pub fn contains_named<I: ?Sized + 'static>(&self, name: &str) -> bool {
        self.inner.registry.contains(&ServiceKey::named::<I>(name))
    }

    /// Every bound key, sorted by display name.
    pub fn keys(&self) -> Vec<ServiceKey> {
        self.inner.registry.keys()
    }

    pub fn len(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.registry.is_empty()
    }

    /// Required dependencies with no binding, as `(dependent, dependency)`.
    pub fn missing_dependencies(&self) -> Vec<(ServiceKey, ServiceKey)> {
        self.inner.registry.missing_dependencies()
    }

    /// Check the whole graph: no cycles and every required dependency bound.
    pub fn validate(&self) -> Result<()> {
        if let Some(cycle) = self.inner.registry.detect_cycles() {
            let service = cycle.first().cloned().unwrap_or_else(|| ServiceKey::of::<()>());
            return Err(MelderError::CircularDependency {
                service,
                cycle: cycle.into(),
            });
        }

        if let Some((dependent, dependency)) = self.missing_dependencies().into_iter().next() {
            return Err(MelderError::UnregisteredService {
                service: dependency.clone(),
                path: vec![dependent, dependency].into(),
            });
        }
        Ok(())
    }

    /// `Unique` instances built so far, oldest first.
    pub fn inspect_singletons(&self) -> Vec<LiveService> {
        state::live_services(&self.inner.singletons)
    }

    /// Creation metadata for an instance resolved from this container.
    /// Always `None` unless debugging is enabled.
    pub fn debug_metadata<T: ?Sized>(&self, instance: &Arc<T>) -> Option<InstanceMetadata> {
        let address = Arc::as_ptr(instance) as *const () as usize;
        self.inner.debug.as_ref()?.lookup(address)
    }

    /// Seal every live state, then the root scope, which disposes the
    /// root-scope and `Unique` instances in reverse creation order. Later
    /// calls do nothing.
    pub fn shutdown(&self) -> Result<()> {
        let failures = self.inner.shutdown();
        state::aggregate(self.inner.root.id(), failures)
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("bindings", &self.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

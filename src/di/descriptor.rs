use crate::di::{Dependencies, Injectable, Instance, ServiceId, ServiceKey};
use crate::error::BoxError;
use crate::lifecycle::Dispose;
use std::fmt;
use std::sync::Arc;

/// Rule governing instance reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Lifetime {
    /// One instance for the whole container.
    Unique,
    /// One instance per state (scope).
    UniquePerScope,
    /// A fresh instance on every resolution.
    Many,
}

/// How a dependency is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyKind {
    /// Must be bound, otherwise resolution fails.
    Required,
    /// Resolves to `None` when nothing is bound.
    Optional,
    /// Every named binding of the interface, collected into a [`NamedMap`](crate::NamedMap).
    AllNamed,
}

/// One constructor requirement: which service, and how to satisfy it.
///
/// A dependency created with [`Dependency::named`] carries the named-injection
/// marker: it resolves the binding registered under that name instead of the
/// unnamed binding of the interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    key: ServiceKey,
    kind: DependencyKind,
}

impl Dependency {
    pub fn on<I: ?Sized + 'static>() -> Self {
        Self {
            key: ServiceKey::of::<I>(),
            kind: DependencyKind::Required,
        }
    }

    pub fn named<I: ?Sized + 'static>(name: impl Into<Arc<str>>) -> Self {
        Self {
            key: ServiceKey::named::<I>(name),
            kind: DependencyKind::Required,
        }
    }

    pub fn optional<I: ?Sized + 'static>() -> Self {
        Self {
            key: ServiceKey::of::<I>(),
            kind: DependencyKind::Optional,
        }
    }

    pub fn optional_named<I: ?Sized + 'static>(name: impl Into<Arc<str>>) -> Self {
        Self {
            key: ServiceKey::named::<I>(name),
            kind: DependencyKind::Optional,
        }
    }

    pub fn all_named<I: ?Sized + 'static>() -> Self {
        Self {
            key: ServiceKey::of::<I>(),
            kind: DependencyKind::AllNamed,
        }
    }

    pub fn key(&self) -> &ServiceKey {
        &self.key
    }

    pub fn kind(&self) -> DependencyKind {
        self.kind
    }
}

/// Where a binding's instances come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum BindingKind {
    /// An [`Injectable`] implementation cast to the interface.
    Type,
    /// A pre-built instance.
    Instance,
    /// A closure with an explicit dependency list.
    Factory,
}

pub(crate) struct Constructed {
    pub(crate) instance: Instance,
    pub(crate) disposer: Option<Arc<dyn Dispose>>,
}

type Factory = Arc<dyn Fn(&mut Dependencies) -> Result<Constructed, BoxError> + Send + Sync>;

/// Immutable record of one registered service.
///
/// # Example
/// ```
/// use melder::{BindingDescriptor, Lifetime};
/// use std::sync::Arc;
///
/// trait Clock: Send + Sync {}
/// struct SystemClock;
/// impl Clock for SystemClock {}
///
/// let descriptor = BindingDescriptor::for_factory::<dyn Clock, _>(
///     Lifetime::Unique,
///     Vec::new(),
///     |_| Ok(Arc::new(SystemClock) as Arc<dyn Clock>),
/// )
/// .named("system");
///
/// assert_eq!(descriptor.key().name(), Some("system"));
/// ```
#[derive(Clone)]
pub struct BindingDescriptor {
    key: ServiceKey,
    implementation: ServiceId,
    lifetime: Lifetime,
    kind: BindingKind,
    dependencies: Vec<Dependency>,
    factory: Factory,
}

impl BindingDescriptor {
    /// Bind `Impl` to the interface `I`. `caster` turns the constructed
    /// implementation into the interface, usually `|it| it as Arc<dyn Trait>`.
    pub fn for_type<I, Impl, F>(lifetime: Lifetime, caster: F) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        Impl: Injectable,
        F: Fn(Arc<Impl>) -> Arc<I> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |dependencies: &mut Dependencies| {
            let concrete = Arc::new(Impl::inject(dependencies)?);
            let disposer = Impl::disposer(&concrete);
            Ok(Constructed {
                instance: Instance::new(caster(concrete)),
                disposer,
            })
        });

        Self {
            key: ServiceKey::of::<I>(),
            implementation: ServiceId::of::<Impl>(),
            lifetime,
            kind: BindingKind::Type,
            dependencies: Impl::dependencies(),
            factory,
        }
    }

    /// Bind a pre-built instance. Instance bindings are always [`Lifetime::Unique`]
    /// and are never disposed by the container.
    pub fn for_instance<I>(instance: Arc<I>) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
    {
        let instance = Instance::new(instance);
        let factory: Factory = Arc::new(move |_: &mut Dependencies| {
            Ok(Constructed {
                instance: instance.clone(),
                disposer: None,
            })
        });

        Self {
            key: ServiceKey::of::<I>(),
            implementation: ServiceId::of::<I>(),
            lifetime: Lifetime::Unique,
            kind: BindingKind::Instance,
            dependencies: Vec::new(),
            factory,
        }
    }

    /// Bind a closure. `dependencies` are resolved in order and handed to the
    /// closure, which takes them back out with [`Dependencies::take`].
    pub fn for_factory<I, F>(lifetime: Lifetime, dependencies: Vec<Dependency>, factory: F) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn(&mut Dependencies) -> Result<Arc<I>, BoxError> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |dependencies: &mut Dependencies| {
            Ok(Constructed {
                instance: Instance::new(factory(dependencies)?),
                disposer: None,
            })
        });

        Self {
            key: ServiceKey::of::<I>(),
            implementation: ServiceId::of::<I>(),
            lifetime,
            kind: BindingKind::Factory,
            dependencies,
            factory,
        }
    }

    /// Register the binding under `name` instead of as the interface's
    /// unnamed binding.
    pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
        self.key = ServiceKey::new(self.key.id(), Some(name.into()));
        self
    }

    pub fn key(&self) -> &ServiceKey {
        &self.key
    }

    pub fn interface(&self) -> ServiceId {
        self.key.id()
    }

    pub fn implementation(&self) -> ServiceId {
        self.implementation
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    pub fn kind(&self) -> BindingKind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.key.name()
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub(crate) fn construct(&self, dependencies: &mut Dependencies) -> Result<Constructed, BoxError> {
        (self.factory)(dependencies)
    }
}

impl fmt::Debug for BindingDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingDescriptor")
            .field("key", &self.key)
            .field("implementation", &self.implementation)
            .field("lifetime", &self.lifetime)
            .field("kind", &self.kind)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

use crate::di::{Dependencies, Instance, ServiceKey};
use crate::error::{BoxError, MelderError};
use dashmap::DashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Point in the construction pipeline a hook runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum HookStage {
    /// Before the constructor, with mutable access to its dependencies.
    Prehook,
    /// After the constructor. May replace the instance.
    Activation,
    /// After activation. Observes the final instance.
    Posthook,
}

pub(crate) type PreHook = Arc<dyn Fn(&mut Dependencies) -> Result<(), BoxError> + Send + Sync>;
pub(crate) type ActivationHook = Arc<dyn Fn(Instance) -> Result<Instance, BoxError> + Send + Sync>;
pub(crate) type PostHook = Arc<dyn Fn(&Instance) -> Result<(), BoxError> + Send + Sync>;

/// Hooks keyed by the service they intercept, run in registration order.
#[derive(Default)]
pub(crate) struct HookRegistry {
    pre: DashMap<ServiceKey, Vec<PreHook>>,
    activation: DashMap<ServiceKey, Vec<ActivationHook>>,
    post: DashMap<ServiceKey, Vec<PostHook>>,
    count: AtomicUsize,
}

impl HookRegistry {
    pub(crate) fn add_pre(&self, key: ServiceKey, hook: PreHook) {
        self.pre.entry(key).or_default().push(hook);
        self.count.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn add_activation(&self, key: ServiceKey, hook: ActivationHook) {
        self.activation.entry(key).or_default().push(hook);
        self.count.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn add_post(&self, key: ServiceKey, hook: PostHook) {
        self.post.entry(key).or_default().push(hook);
        self.count.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.count.load(Ordering::Acquire) == 0
    }

    pub(crate) fn pre(&self, key: &ServiceKey) -> Vec<PreHook> {
        self.pre.get(key).map(|hooks| hooks.clone()).unwrap_or_default()
    }

    pub(crate) fn activation(&self, key: &ServiceKey) -> Vec<ActivationHook> {
        self.activation.get(key).map(|hooks| hooks.clone()).unwrap_or_default()
    }

    pub(crate) fn post(&self, key: &ServiceKey) -> Vec<PostHook> {
        self.post.get(key).map(|hooks| hooks.clone()).unwrap_or_default()
    }
}

/// Typed handle for attaching hooks to one service.
///
/// Obtained from [`Container::hooks`](crate::Container::hooks).
///
/// # Example
/// ```
/// use melder::{Container, Lifetime};
/// use std::sync::Arc;
///
/// let container = Container::new();
/// container
///     .bind_factory::<String, _>(Lifetime::Many, Vec::new(), |_| Ok(Arc::new("raw".to_string())))
///     .unwrap();
/// container
///     .hooks::<String>()
///     .on_activation(|value| Ok(Arc::new(value.to_uppercase())));
///
/// assert_eq!(*container.meld::<String>().unwrap(), "RAW");
/// ```
pub struct Hooks<'a, I: ?Sized> {
    registry: &'a HookRegistry,
    key: ServiceKey,
    _marker: PhantomData<fn(&I)>,
}

impl<'a, I: ?Sized + Send + Sync + 'static> Hooks<'a, I> {
    pub(crate) fn new(registry: &'a HookRegistry) -> Self {
        Self {
            registry,
            key: ServiceKey::of::<I>(),
            _marker: PhantomData,
        }
    }

    /// Target the binding registered under `name` instead.
    pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
        self.key = ServiceKey::new(self.key.id(), Some(name.into()));
        self
    }

    /// Run before the constructor. The hook may inspect or replace the
    /// resolved dependencies.
    pub fn before<F>(self, hook: F) -> Self
    where
        F: Fn(&mut Dependencies) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.registry.add_pre(self.key.clone(), Arc::new(hook));
        self
    }

    /// Run after the constructor. The returned instance replaces the
    /// constructed one.
    pub fn on_activation<F>(self, hook: F) -> Self
    where
        F: Fn(Arc<I>) -> Result<Arc<I>, BoxError> + Send + Sync + 'static,
    {
        let key = self.key.clone();
        self.registry.add_activation(
            self.key.clone(),
            Arc::new(move |instance: Instance| {
                let typed = downcast::<I>(&key, &instance)?;
                Ok(Instance::new(hook(typed)?))
            }),
        );
        self
    }

    /// Run last, with the final instance.
    pub fn after<F>(self, hook: F) -> Self
    where
        F: Fn(&Arc<I>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let key = self.key.clone();
        self.registry.add_post(
            self.key.clone(),
            Arc::new(move |instance: &Instance| {
                let typed = downcast::<I>(&key, instance)?;
                hook(&typed)
            }),
        );
        self
    }
}

fn downcast<I: ?Sized + Send + Sync + 'static>(key: &ServiceKey, instance: &Instance) -> Result<Arc<I>, BoxError> {
    instance.downcast::<I>().ok_or_else(|| {
        Box::new(MelderError::DowncastFailed {
            service: key.clone(),
            expected: std::any::type_name::<I>(),
        }) as BoxError
    })
}

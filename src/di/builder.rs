use crate::config::MelderConfig;
use crate::di::{BindingDescriptor, Container, Dependencies, Dependency, Injectable, Lifetime};
use crate::error::{BoxError, Result};
use crate::module::Module;
use std::sync::Arc;

type Step = Box<dyn FnOnce(&Container) -> Result<()>>;

/// Builder for constructing a dependency injection container
///
/// Collects configuration and bindings, then applies them in order when the
/// container is built. The first failing registration aborts the build.
///
/// # Example
/// ```
/// use melder::{ContainerBuilder, Lifetime};
/// use std::sync::Arc;
///
/// let container = ContainerBuilder::new()
///     .debugging(true)
///     .bind_instance(Arc::new(8080u16))
///     .bind_factory::<String, _>(Lifetime::Many, vec![melder::Dependency::on::<u16>()], |deps| {
///         Ok(Arc::new(format!("listening on {}", deps.take::<u16>()?)))
///     })
///     .build()
///     .unwrap();
///
/// assert_eq!(*container.meld::<String>().unwrap(), "listening on 8080");
/// ```
pub struct ContainerBuilder {
    config: MelderConfig,
    steps: Vec<Step>,
}

impl ContainerBuilder {
    /// Create a new container builder with the default configuration
    pub fn new() -> Self {
        Self {
            config: MelderConfig::default(),
            steps: Vec::new(),
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: MelderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn debugging(mut self, enabled: bool) -> Self {
        self.config.debugging = enabled;
        self
    }

    pub fn disposal(mut self, enabled: bool) -> Self {
        self.config.disposal = enabled;
        self
    }

    pub fn max_resolution_depth(mut self, depth: usize) -> Self {
        self.config.max_resolution_depth = depth;
        self
    }

    /// Register a prepared descriptor
    pub fn register(mut self, descriptor: BindingDescriptor) -> Self {
        self.steps.push(Box::new(move |container: &Container| container.register(descriptor)));
        self
    }

    /// Bind a trait to a concrete implementation
    ///
    /// This enables resolving `Arc<dyn Trait>` to a new `Impl` built by the
    /// container.
    pub fn bind<I, Impl, F>(self, lifetime: Lifetime, caster: F) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        Impl: Injectable,
        F: Fn(Arc<Impl>) -> Arc<I> + Send + Sync + 'static,
    {
        self.register(BindingDescriptor::for_type::<I, Impl, F>(lifetime, caster))
    }

    pub fn bind_named<I, Impl, F>(self, name: impl Into<Arc<str>>, lifetime: Lifetime, caster: F) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        Impl: Injectable,
        F: Fn(Arc<Impl>) -> Arc<I> + Send + Sync + 'static,
    {
        self.register(BindingDescriptor::for_type::<I, Impl, F>(lifetime, caster).named(name))
    }

    pub fn bind_self<T: Injectable>(self, lifetime: Lifetime) -> Self {
        self.register(BindingDescriptor::for_type::<T, T, _>(lifetime, |it| it))
    }

    /// Register a service instance
    pub fn bind_instance<I: ?Sized + Send + Sync + 'static>(self, instance: Arc<I>) -> Self {
        self.register(BindingDescriptor::for_instance(instance))
    }

    pub fn bind_factory<I, F>(self, lifetime: Lifetime, dependencies: Vec<Dependency>, factory: F) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        F: Fn(&mut Dependencies) -> std::result::Result<Arc<I>, BoxError> + Send + Sync + 'static,
    {
        self.register(BindingDescriptor::for_factory(lifetime, dependencies, factory))
    }

    /// Install a module's bindings
    pub fn module<M: Module + 'static>(mut self) -> Self {
        self.steps.push(Box::new(|container: &Container| container.install::<M>()));
        self
    }

    /// Build the container
    ///
    /// # Errors
    /// Returns the first registration error, or `InvalidConfig` when the
    /// configuration is unusable.
    pub fn build(self) -> Result<Container> {
        self.config.validate()?;
        let container = Container::with_config(self.config);
        for step in self.steps {
            step(&container)?;
        }
        Ok(container)
    }
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MelderError;

    struct Plugins;

    impl Module for Plugins {
        fn register(container: &Container) -> Result<()> {
            container.bind_instance_named("alpha", Arc::new(1u8))?;
            container.bind_instance_named("beta", Arc::new(2u8))
        }
    }

    #[test]
    fn test_build_applies_steps_in_order() {
        let container = ContainerBuilder::new()
            .module::<Plugins>()
            .bind_instance(Arc::new(0u8))
            .build()
            .unwrap();

        assert_eq!(container.len(), 3);
        assert_eq!(*container.meld_named::<u8>("beta").unwrap(), 2);
    }

    #[test]
    fn test_build_stops_at_first_error() {
        let result = ContainerBuilder::new()
            .bind_instance(Arc::new(1u8))
            .bind_instance(Arc::new(2u8))
            .build();

        assert!(matches!(result, Err(MelderError::DuplicateBinding { .. })));
    }

    #[test]
    fn test_build_rejects_zero_depth() {
        let result = ContainerBuilder::new().max_resolution_depth(0).build();
        assert!(matches!(result, Err(MelderError::InvalidConfig { .. })));
    }

    #[test]
    fn test_builder_configuration_reaches_container() {
        let container = ContainerBuilder::new().debugging(true).disposal(false).build().unwrap();
        assert!(container.config().debugging);
        assert!(!container.config().disposal);
    }
}

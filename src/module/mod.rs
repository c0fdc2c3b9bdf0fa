use crate::di::Container;
use crate::error::Result;

/// A group of bindings applied together
///
/// # Example
/// ```
/// use melder::{Container, Module, Result};
/// use std::sync::Arc;
///
/// pub struct SettingsModule;
///
/// impl Module for SettingsModule {
///     fn register(container: &Container) -> Result<()> {
///         container.bind_instance_named("host", Arc::new("localhost".to_string()))?;
///         container.bind_instance(Arc::new(8080u16))
///     }
/// }
///
/// let container = Container::new();
/// container.install::<SettingsModule>().unwrap();
/// assert_eq!(container.len(), 2);
/// ```
pub trait Module {
    /// Register all bindings of this module
    fn register(container: &Container) -> Result<()>;
}

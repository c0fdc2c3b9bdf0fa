use crate::di::{Dependencies, Dependency};
use crate::error::BoxError;
use crate::lifecycle::Dispose;
use std::sync::Arc;

/// Trait for types the container can construct
///
/// This trait is typically implemented automatically via the `#[derive(Injectable)]` macro.
///
/// # Example
/// ```
/// use melder::{BoxError, Dependencies, Dependency, Injectable};
/// use std::sync::Arc;
///
/// // 1. Define a trait
/// trait UserRepository: Send + Sync {}
///
/// // 2. Declare what the service needs and how to build it from the
/// //    resolved dependencies
/// pub struct UserService {
///     repository: Arc<dyn UserRepository>,
/// }
///
/// impl Injectable for UserService {
///     fn dependencies() -> Vec<Dependency> {
///         vec![Dependency::on::<dyn UserRepository>()]
///     }
///
///     fn inject(dependencies: &mut Dependencies) -> Result<Self, BoxError> {
///         Ok(Self {
///             repository: dependencies.take()?,
///         })
///     }
/// }
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
    /// The services `inject` consumes, in the order it consumes them.
    fn dependencies() -> Vec<Dependency>;

    /// Build an instance from its resolved dependencies
    ///
    /// # Errors
    /// Any error returned here is reported as a constructor failure for the
    /// service being resolved.
    fn inject(dependencies: &mut Dependencies) -> Result<Self, BoxError>;

    /// The disposer to register for a freshly built instance. Types that
    /// implement [`Dispose`] return `Some(instance.clone())`.
    fn disposer(instance: &Arc<Self>) -> Option<Arc<dyn Dispose>> {
        let _ = instance;
        None
    }
}

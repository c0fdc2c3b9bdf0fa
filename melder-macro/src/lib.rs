use proc_macro::TokenStream;

mod injectable;

/// Derive macro for making a struct constructible by the container
///
/// Every field becomes a dependency, in declaration order:
///
/// - `Arc<T>`: required dependency on `T`
/// - `Option<Arc<T>>`: optional dependency, `None` when `T` is not bound
/// - `NamedMap<T>`: every named binding of `T`
///
/// Field attributes:
///
/// - `#[inject(name = "...")]` resolves the binding registered under that name
/// - `#[inject(all)]` collects every named binding into a field whose type is
///   an alias of `NamedMap<T>`
/// - `#[inject(default)]` fills the field with `Default::default()` instead
///
/// Struct attribute `#[injectable(dispose)]` registers the instance for
/// disposal; the struct must implement `Dispose`.
///
/// # Example
/// ```ignore
/// use melder::{Injectable, NamedMap};
/// use std::sync::Arc;
///
/// #[derive(Injectable)]
/// pub struct UserService {
///     repository: Arc<dyn UserRepository>,
///     #[inject(name = "audit")]
///     audit_log: Option<Arc<dyn Log>>,
///     notifiers: NamedMap<dyn Notifier>,
/// }
/// ```
#[proc_macro_derive(Injectable, attributes(inject, injectable))]
pub fn derive_injectable(input: TokenStream) -> TokenStream {
    injectable::derive_injectable(input)
}

//! # Melder
//!
//! A thread-safe dependency injection container with scoped lifetimes.
//!
//! ## Features
//!
//! - **Lifetimes**: `Unique` (one per container), `UniquePerScope` (one per
//!   state) and `Many` (fresh on every resolution)
//! - **Validated Graph**: Registrations that would close a dependency cycle are
//!   rejected before they become visible
//! - **Trait Object Support**: Bind `Arc<dyn Trait>` to an implementation with a caster
//! - **Named Bindings**: Several implementations of one interface, injected by
//!   name or all at once as a [`NamedMap`]
//! - **Scopes**: [`State`]s cache per-scope services and dispose them in
//!   reverse creation order when sealed
//! - **Overrides and Hooks**: Replace services for a single call, intercept
//!   construction before, during and after
//!
//! ## Quick Start
//!
//! ```rust
//! use melder::{Container, Dispose, Injectable, Lifetime, BoxError};
//! use std::sync::Arc;
//!
//! // 1. Define your interfaces
//! pub trait Repository: Send + Sync {
//!     fn find(&self, id: u32) -> Option<String>;
//! }
//!
//! // 2. Implement them
//! #[derive(Injectable)]
//! pub struct InMemoryRepository;
//!
//! impl Repository for InMemoryRepository {
//!     fn find(&self, id: u32) -> Option<String> {
//!         (id == 1).then(|| "ada".to_string())
//!     }
//! }
//!
//! // 3. Dependencies are declared by field type
//! #[derive(Injectable)]
//! #[injectable(dispose)]
//! pub struct UserService {
//!     repository: Arc<dyn Repository>,
//! }
//!
//! impl Dispose for UserService {
//!     fn dispose(&self) -> Result<(), BoxError> {
//!         Ok(())
//!     }
//! }
//!
//! // 4. Bind and resolve
//! let container = Container::new();
//! container
//!     .bind::<dyn Repository, InMemoryRepository, _>(Lifetime::Unique, |it| it as Arc<dyn Repository>)
//!     .unwrap();
//! container.bind_self::<UserService>(Lifetime::UniquePerScope).unwrap();
//!
//! let request = container.create_state();
//! let users = request.meld::<UserService>().unwrap();
//! assert_eq!(users.repository.find(1).as_deref(), Some("ada"));
//!
//! // Disposes UserService
//! request.seal().unwrap();
//! ```

extern crate self as melder;

pub mod config;
pub mod di;
pub mod error;
pub mod lifecycle;
pub mod module;

// Re-export core types
pub use config::{ConfigSource, MelderConfig};
pub use di::{
    BindingDescriptor, BindingKind, Container, ContainerBuilder, Dependencies, Dependency, DependencyKind,
    HookStage, Hooks, Injectable, Instance, InstanceMetadata, Lifetime, LiveService, NamedCollection, NamedMap,
    Overrides, ResolutionPath, ServiceId, ServiceKey, State,
};
pub use error::{BoxError, DisposalFailure, MelderError, Result};
pub use lifecycle::Dispose;
pub use module::Module;

// Re-export macros
pub use melder_macro::Injectable;

/// Prelude module for convenient imports
///
/// ```
/// use melder::prelude::*;
/// ```
pub mod prelude {
    pub use crate::di::{Container, ContainerBuilder, Dependencies, Dependency, Injectable, Lifetime, NamedMap, Overrides, State};
    pub use crate::error::{BoxError, MelderError, Result};
    pub use crate::lifecycle::Dispose;
    pub use crate::module::Module;
    pub use melder_macro::Injectable;
    pub use std::sync::Arc;
}

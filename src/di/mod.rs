//! Dependency injection core: keys, descriptors, the registry and its
//! dependency graph, the resolution engine and scopes.

mod builder;
mod container;
mod debug;
mod dependencies;
mod descriptor;
mod engine;
#[cfg(test)]
mod fixtures;
mod graph;
mod hooks;
mod injectable;
mod instance;
mod key;
mod overrides;
mod registry;
mod state;

pub use builder::ContainerBuilder;
pub use container::Container;
pub use debug::InstanceMetadata;
pub use dependencies::{Dependencies, NamedCollection, NamedMap};
pub use descriptor::{BindingDescriptor, BindingKind, Dependency, DependencyKind, Lifetime};
pub use graph::DependencyGraph;
pub use hooks::{HookStage, Hooks};
pub use injectable::Injectable;
pub use instance::Instance;
pub use key::{ResolutionPath, ServiceId, ServiceKey};
pub use overrides::Overrides;
pub use registry::ServiceRegistry;
pub use state::{LiveService, State};

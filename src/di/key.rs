use std::any::TypeId;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Stable identity of an abstraction: the `TypeId` plus its name for diagnostics.
///
/// Two ids are equal when their `TypeId`s are equal; the name never takes part
/// in comparisons.
#[derive(Clone, Copy)]
pub struct ServiceId {
    type_id: TypeId,
    type_name: &'static str,
}

impl ServiceId {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl PartialEq for ServiceId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ServiceId {}

impl Hash for ServiceId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl PartialOrd for ServiceId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ServiceId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.type_id.cmp(&other.type_id)
    }
}

impl fmt::Debug for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// A service identifier optionally paired with a binding name.
///
/// Keys compare structurally: `ServiceKey::of::<dyn Parser>()` and
/// `ServiceKey::named::<dyn Parser>("json")` address different bindings.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceKey {
    id: ServiceId,
    name: Option<Arc<str>>,
}

impl ServiceKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: ServiceId::of::<T>(),
            name: None,
        }
    }

    pub fn named<T: ?Sized + 'static>(name: impl Into<Arc<str>>) -> Self {
        Self {
            id: ServiceId::of::<T>(),
            name: Some(name.into()),
        }
    }

    pub fn new(id: ServiceId, name: Option<Arc<str>>) -> Self {
        Self { id, name }
    }

    pub fn id(&self) -> ServiceId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn name_arc(&self) -> Option<&Arc<str>> {
        self.name.as_ref()
    }

    /// The same key without its name.
    pub fn unnamed(&self) -> Self {
        Self {
            id: self.id,
            name: None,
        }
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}[\"{}\"]", self.id, name),
            None => write!(f, "{}", self.id),
        }
    }
}

/// The chain of services being resolved when something went wrong,
/// outermost request first.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ResolutionPath(Vec<ServiceKey>);

impl ResolutionPath {
    pub fn new(keys: Vec<ServiceKey>) -> Self {
        Self(keys)
    }

    pub fn keys(&self) -> &[ServiceKey] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, key: &ServiceKey) -> bool {
        self.0.contains(key)
    }
}

impl From<Vec<ServiceKey>> for ResolutionPath {
    fn from(keys: Vec<ServiceKey>) -> Self {
        Self(keys)
    }
}

impl fmt::Debug for ResolutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for ResolutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        for (index, key) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{}", key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Parser {}

    #[test]
    fn test_key_equality_is_structural() {
        assert_eq!(ServiceKey::of::<dyn Parser>(), ServiceKey::of::<dyn Parser>());
        assert_eq!(
            ServiceKey::named::<dyn Parser>("json"),
            ServiceKey::named::<dyn Parser>("json")
        );
        assert_ne!(ServiceKey::of::<dyn Parser>(), ServiceKey::named::<dyn Parser>("json"));
        assert_ne!(
            ServiceKey::named::<dyn Parser>("json"),
            ServiceKey::named::<dyn Parser>("xml")
        );
        assert_ne!(ServiceKey::of::<dyn Parser>(), ServiceKey::of::<String>());
    }

    #[test]
    fn test_path_display() {
        let path = ResolutionPath::new(vec![
            ServiceKey::of::<String>(),
            ServiceKey::named::<u32>("port"),
        ]);
        assert_eq!(path.to_string(), "alloc::string::String -> u32[\"port\"]");
        assert_eq!(ResolutionPath::default().to_string(), "<root>");
    }
}

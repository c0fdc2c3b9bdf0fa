use crate::di::{Dependency, DependencyKind, Instance, ServiceKey};
use crate::error::{MelderError, Result};
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;
use std::ops::Index;
use std::sync::Arc;

pub(crate) enum Resolved {
    One(Instance),
    Missing,
    All(BTreeMap<Arc<str>, Instance>),
}

/// The resolved dependencies handed to a constructor.
///
/// Entries appear in the order the binding declared them. Constructors
/// consume them front to back with [`take`](Self::take),
/// [`take_optional`](Self::take_optional) and [`take_all`](Self::take_all).
/// Pre-construction hooks can inspect or swap an entry by index before the
/// constructor runs.
pub struct Dependencies {
    owner: ServiceKey,
    entries: Vec<(Dependency, Resolved)>,
    cursor: usize,
}

impl Dependencies {
    pub(crate) fn new(owner: ServiceKey, entries: Vec<(Dependency, Resolved)>) -> Self {
        Self {
            owner,
            entries,
            cursor: 0,
        }
    }

    /// The service these dependencies are being resolved for.
    pub fn owner(&self) -> &ServiceKey {
        &self.owner
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dependency(&self, index: usize) -> Option<&Dependency> {
        self.entries.get(index).map(|(dependency, _)| dependency)
    }

    /// Look at a single resolved entry without consuming it.
    ///
    /// Returns `Ok(None)` for an optional dependency that was not bound.
    pub fn get<I: ?Sized + Send + Sync + 'static>(&self, index: usize) -> Result<Option<Arc<I>>> {
        let (dependency, resolved) = self.entry(index, std::any::type_name::<I>())?;
        match resolved {
            Resolved::One(instance) => downcast(dependency, instance).map(Some),
            Resolved::Missing => Ok(None),
            Resolved::All(_) => Err(mismatch(dependency, std::any::type_name::<I>())),
        }
    }

    /// Replace a single resolved entry. The replacement must have the
    /// dependency's interface type.
    pub fn replace<I: ?Sized + Send + Sync + 'static>(&mut self, index: usize, value: Arc<I>) -> Result<()> {
        let expected = std::any::type_name::<I>();
        let (dependency, resolved) = self
            .entries
            .get_mut(index)
            .ok_or_else(|| MelderError::DowncastFailed {
                service: ServiceKey::of::<I>(),
                expected,
            })?;

        let instance = Instance::new(value);
        if dependency.kind() == DependencyKind::AllNamed || instance.service() != dependency.key().id() {
            return Err(mismatch(dependency, expected));
        }
        *resolved = Resolved::One(instance);
        Ok(())
    }

    /// Take the next entry as a required instance.
    pub fn take<I: ?Sized + Send + Sync + 'static>(&mut self) -> Result<Arc<I>> {
        match self.take_optional::<I>()? {
            Some(instance) => Ok(instance),
            None => {
                let (dependency, _) = &self.entries[self.cursor - 1];
                Err(MelderError::UnregisteredService {
                    service: dependency.key().clone(),
                    path: vec![self.owner.clone(), dependency.key().clone()].into(),
                })
            }
        }
    }

    /// Take the next entry as an optional instance.
    pub fn take_optional<I: ?Sized + Send + Sync + 'static>(&mut self) -> Result<Option<Arc<I>>> {
        let value = self.get::<I>(self.cursor)?;
        self.cursor += 1;
        Ok(value)
    }

    /// Take the next entry as the collection of all named bindings.
    pub fn take_all<I: ?Sized + Send + Sync + 'static>(&mut self) -> Result<NamedMap<I>> {
        let expected = std::any::type_name::<I>();
        let (dependency, resolved) = self.entry(self.cursor, expected)?;
        let Resolved::All(instances) = resolved else {
            return Err(mismatch(dependency, expected));
        };

        let mut map = BTreeMap::new();
        for (name, instance) in instances {
            map.insert(Arc::clone(name), downcast(dependency, instance)?);
        }
        self.cursor += 1;
        Ok(NamedMap { entries: map })
    }

    fn entry(&self, index: usize, expected: &'static str) -> Result<&(Dependency, Resolved)> {
        self.entries.get(index).ok_or_else(|| MelderError::DowncastFailed {
            service: self.owner.clone(),
            expected,
        })
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependencies")
            .field("owner", &self.owner)
            .field(
                "dependencies",
                &self.entries.iter().map(|(dependency, _)| dependency).collect::<Vec<_>>(),
            )
            .field("cursor", &self.cursor)
            .finish()
    }
}

fn downcast<I: ?Sized + Send + Sync + 'static>(dependency: &Dependency, instance: &Instance) -> Result<Arc<I>> {
    instance
        .downcast::<I>()
        .ok_or_else(|| mismatch(dependency, std::any::type_name::<I>()))
}

fn mismatch(dependency: &Dependency, expected: &'static str) -> MelderError {
    MelderError::DowncastFailed {
        service: dependency.key().clone(),
        expected,
    }
}

/// Every named binding of one interface, keyed by name.
pub struct NamedMap<I: ?Sized> {
    entries: BTreeMap<Arc<str>, Arc<I>>,
}

impl<I: ?Sized> NamedMap<I> {
    pub fn get(&self, name: &str) -> Option<&Arc<I>> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|name| name.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<I>)> {
        self.entries.iter().map(|(name, value)| (name.as_ref(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Names the interface collected by a [`NamedMap`], so a field declared
/// through a type alias can still be injected with `#[inject(all)]`.
pub trait NamedCollection {
    type Interface: ?Sized + Send + Sync + 'static;
}

impl<I: ?Sized + Send + Sync + 'static> NamedCollection for NamedMap<I> {
    type Interface = I;
}

impl<I: ?Sized> Default for NamedMap<I> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<I: ?Sized> Clone for NamedMap<I> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<I: ?Sized> fmt::Debug for NamedMap<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.keys()).finish()
    }
}

impl<I: ?Sized> Index<&str> for NamedMap<I> {
    type Output = Arc<I>;

    fn index(&self, name: &str) -> &Self::Output {
        &self.entries[name]
    }
}

impl<I: ?Sized> IntoIterator for NamedMap<I> {
    type Item = (Arc<str>, Arc<I>);
    type IntoIter = btree_map::IntoIter<Arc<str>, Arc<I>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

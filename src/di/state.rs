use crate::di::container::ContainerInner;
use crate::di::engine::{InstanceCache, Resolver};
use crate::di::{Instance, Lifetime, Overrides, ServiceKey};
use crate::error::{DisposalFailure, MelderError, Result};
use crate::lifecycle::DisposalList;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// A cached instance that is still held by its scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveService {
    pub service: ServiceKey,
    pub lifetime: Lifetime,
    pub object_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Instance cache, disposal list and seal gate shared by the root scope and
/// every [`State`].
pub(crate) struct ScopeCore {
    id: Uuid,
    created_at: DateTime<Utc>,
    pub(crate) instances: InstanceCache,
    pub(crate) disposables: DisposalList,
    /// `true` once sealed. Resolutions hold the read side for their whole
    /// duration so sealing waits for them.
    gate: RwLock<bool>,
    children: Mutex<Vec<Weak<StateInner>>>,
}

impl ScopeCore {
    pub(crate) fn new(sealed: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            instances: InstanceCache::default(),
            disposables: DisposalList::new(),
            gate: RwLock::new(sealed),
            children: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn is_sealed(&self) -> bool {
        *self.gate.read()
    }

    pub(crate) fn resolve(&self, container: &ContainerInner, key: &ServiceKey, overrides: &Overrides) -> Result<Instance> {
        let sealed = self.gate.read_recursive();
        if *sealed {
            return Err(MelderError::ScopeSealed {
                scope: self.id,
                service: Some(key.clone()),
            });
        }
        tracing::trace!("Resolving {} in scope {}", key, self.id);
        Resolver::new(container, self, overrides).resolve(key)
    }

    pub(crate) fn meld<I: ?Sized + Send + Sync + 'static>(
        &self,
        container: &ContainerInner,
        key: ServiceKey,
        overrides: &Overrides,
    ) -> Result<Arc<I>> {
        self.resolve(container, &key, overrides)?
            .downcast::<I>()
            .ok_or_else(|| MelderError::DowncastFailed {
                service: key,
                expected: std::any::type_name::<I>(),
            })
    }

    /// Create a child state whose lifetime is bounded by this scope. The
    /// child is born sealed when this scope already is.
    pub(crate) fn spawn_child(&self, container: Arc<ContainerInner>) -> Arc<StateInner> {
        let sealed = self.gate.read_recursive();
        let child = Arc::new(StateInner {
            core: ScopeCore::new(*sealed),
            container,
        });
        if !*sealed {
            let mut children = self.children.lock();
            children.retain(|child| child.strong_count() > 0);
            children.push(Arc::downgrade(&child));
        }
        child
    }

    /// Seal this scope: lesser states first, then owned disposables in
    /// reverse creation order. A second call does nothing.
    pub(crate) fn seal(&self, container: &ContainerInner) -> Vec<DisposalFailure> {
        {
            let mut sealed = self.gate.write();
            if *sealed {
                return Vec::new();
            }
            *sealed = true;
        }
        tracing::debug!("Sealing scope {}", self.id);

        let mut failures = Vec::new();
        let children = std::mem::take(&mut *self.children.lock());
        for child in children.into_iter().rev() {
            if let Some(child) = child.upgrade() {
                failures.extend(child.core.seal(container));
            }
        }

        failures.extend(self.disposables.dispose_all());
        self.instances.clear();
        if let Some(debug) = &container.debug {
            debug.forget_scope(self.id);
        }
        failures
    }

    pub(crate) fn live_services(&self) -> Vec<LiveService> {
        live_services(&self.instances)
    }
}

pub(crate) fn live_services(cache: &InstanceCache) -> Vec<LiveService> {
    let mut live: Vec<_> = cache
        .iter()
        .filter_map(|entry| {
            entry.value().get().map(|creation| LiveService {
                service: entry.key().clone(),
                lifetime: creation.lifetime,
                object_id: creation.object_id,
                created_at: creation.created_at,
            })
        })
        .collect();
    live.sort_by_key(|service| service.created_at);
    live
}

pub(crate) fn aggregate(scope: Uuid, failures: Vec<DisposalFailure>) -> Result<()> {
    if failures.is_empty() {
        Ok(())
    } else {
        Err(MelderError::DisposalAggregate { scope, failures })
    }
}

pub(crate) struct StateInner {
    pub(crate) core: ScopeCore,
    pub(crate) container: Arc<ContainerInner>,
}

impl Drop for StateInner {
    fn drop(&mut self) {
        let failures = self.core.seal(&self.container);
        for failure in failures {
            tracing::warn!("Disposal failed while dropping state {}: {}", self.core.id(), failure);
        }
    }
}

/// A resolution scope.
///
/// `UniquePerScope` services are cached per state. Disposable instances
/// created through a state are released when it is sealed, either explicitly
/// with [`seal`](State::seal) or when the last handle is dropped.
///
/// `State` is a cheap handle; clones refer to the same scope.
///
/// # Example
/// ```
/// use melder::{Container, Lifetime};
/// use std::sync::Arc;
///
/// let container = Container::new();
/// container
///     .bind_factory::<Vec<u8>, _>(Lifetime::UniquePerScope, Vec::new(), |_| Ok(Arc::new(Vec::new())))
///     .unwrap();
///
/// let request = container.create_state();
/// let a = request.meld::<Vec<u8>>().unwrap();
/// let b = request.meld::<Vec<u8>>().unwrap();
/// assert!(Arc::ptr_eq(&a, &b));
///
/// request.seal().unwrap();
/// assert!(request.meld::<Vec<u8>>().is_err());
/// ```
#[derive(Clone)]
pub struct State {
    inner: Arc<StateInner>,
}

impl State {
    pub(crate) fn from_inner(inner: Arc<StateInner>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> Uuid {
        self.inner.core.id()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.core.created_at()
    }

    pub fn is_sealed(&self) -> bool {
        self.inner.core.is_sealed()
    }

    pub fn meld<I: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<I>> {
        self.meld_key(ServiceKey::of::<I>(), &Overrides::default())
    }

    pub fn meld_named<I: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Arc<I>> {
        self.meld_key(ServiceKey::named::<I>(name), &Overrides::default())
    }

    pub fn meld_with<I: ?Sized + Send + Sync + 'static>(&self, overrides: &Overrides) -> Result<Arc<I>> {
        self.meld_key(ServiceKey::of::<I>(), overrides)
    }

    pub fn meld_named_with<I: ?Sized + Send + Sync + 'static>(
        &self,
        name: &str,
        overrides: &Overrides,
    ) -> Result<Arc<I>> {
        self.meld_key(ServiceKey::named::<I>(name), overrides)
    }

    fn meld_key<I: ?Sized + Send + Sync + 'static>(&self, key: ServiceKey, overrides: &Overrides) -> Result<Arc<I>> {
        self.inner.core.meld(&self.inner.container, key, overrides)
    }

    /// Create a lesser state. It is sealed together with this one at the
    /// latest.
    pub fn create_lesser_state(&self) -> State {
        let child = self.inner.core.spawn_child(Arc::clone(&self.inner.container));
        self.inner.container.track_state(&child);
        tracing::debug!("Created lesser state {} under {}", child.core.id(), self.id());
        State::from_inner(child)
    }

    /// Dispose everything this state owns, lesser states first. Sealing an
    /// already sealed state is a no-op.
    ///
    /// Every disposer runs even when some fail; the failures are reported
    /// together as [`MelderError::DisposalAggregate`].
    pub fn seal(&self) -> Result<()> {
        let failures = self.inner.core.seal(&self.inner.container);
        aggregate(self.id(), failures)
    }

    /// Instances currently cached by this state, oldest first.
    pub fn inspect_live_services(&self) -> Vec<LiveService> {
        self.inner.core.live_services()
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("id", &self.id())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::di::fixtures::{Connection, Counted, Counter, Flaky, Journal, Repository, Slow};
    use crate::di::Container;
    use std::sync::Barrier;
    use std::thread;

    fn container() -> (Container, Arc<Journal>) {
        let container = Container::new();
        let journal = Arc::new(Journal::default());
        container.bind_instance(Arc::clone(&journal)).unwrap();
        (container, journal)
    }

    #[test]
    fn test_seal_disposes_in_reverse_order() {
        let (container, journal) = container();
        container.bind_self::<Connection>(Lifetime::UniquePerScope).unwrap();
        container.bind_self::<Repository>(Lifetime::UniquePerScope).unwrap();

        let state = container.create_state();
        let repository = state.meld::<Repository>().unwrap();
        assert!(Arc::ptr_eq(&repository.connection, &state.meld::<Connection>().unwrap()));
        assert!(journal.entries().is_empty());

        state.seal().unwrap();

        assert_eq!(journal.entries(), vec!["repository", "connection"]);
        assert!(state.is_sealed());
    }

    #[test]
    fn test_sealed_state_rejects_meld() {
        let (container, _journal) = container();
        container.bind_self::<Connection>(Lifetime::UniquePerScope).unwrap();

        let state = container.create_state();
        state.meld::<Connection>().unwrap();
        state.seal().unwrap();

        match state.meld::<Connection>().unwrap_err() {
            MelderError::ScopeSealed { scope, service } => {
                assert_eq!(scope, state.id());
                assert_eq!(service, Some(ServiceKey::of::<Connection>()));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(state.inspect_live_services().is_empty());
    }

    #[test]
    fn test_seal_is_idempotent() {
        let (container, journal) = container();
        container.bind_self::<Connection>(Lifetime::Many).unwrap();

        let state = container.create_state();
        state.meld::<Connection>().unwrap();
        state.seal().unwrap();
        state.seal().unwrap();

        assert_eq!(journal.entries(), vec!["connection"]);
    }

    #[test]
    fn test_disposal_failures_are_aggregated() {
        let (container, journal) = container();
        container.bind_self::<Connection>(Lifetime::Many).unwrap();
        container.bind_self::<Flaky>(Lifetime::Many).unwrap();

        let state = container.create_state();
        state.meld::<Connection>().unwrap();
        state.meld::<Flaky>().unwrap();
        state.meld::<Connection>().unwrap();

        match state.seal().unwrap_err() {
            MelderError::DisposalAggregate { scope, failures } => {
                assert_eq!(scope, state.id());
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].service, ServiceKey::of::<Flaky>());
                assert_eq!(failures[0].error.to_string(), "socket already closed");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(journal.entries(), vec!["connection", "flaky", "connection"]);
        assert!(state.seal().is_ok());
    }

    #[test]
    fn test_lesser_states_are_sealed_first() {
        let (container, journal) = container();
        container.bind_self::<Connection>(Lifetime::UniquePerScope).unwrap();
        container.bind_self::<Repository>(Lifetime::Many).unwrap();

        let parent = container.create_state();
        let child = parent.create_lesser_state();
        parent.meld::<Repository>().unwrap();
        child.meld::<Connection>().unwrap();

        assert!(!Arc::ptr_eq(
            &parent.meld::<Connection>().unwrap(),
            &child.meld::<Connection>().unwrap()
        ));

        parent.seal().unwrap();

        assert!(child.is_sealed());
        assert_eq!(journal.entries(), vec!["connection", "repository", "connection"]);
        assert!(parent.create_lesser_state().is_sealed());
    }

    #[test]
    fn test_dropping_last_handle_seals() {
        let (container, journal) = container();
        container.bind_self::<Connection>(Lifetime::UniquePerScope).unwrap();

        let state = container.create_state();
        let handle = state.clone();
        state.meld::<Connection>().unwrap();

        drop(state);
        assert!(journal.entries().is_empty());
        assert!(!handle.is_sealed());

        drop(handle);
        assert_eq!(journal.entries(), vec!["connection"]);
    }

    #[test]
    fn test_inspect_live_services() {
        let (container, _journal) = container();
        let counter = Arc::new(Counter::default());
        container.bind_instance(counter).unwrap();
        container.bind_self::<Counted>(Lifetime::UniquePerScope).unwrap();
        container.bind_self::<Connection>(Lifetime::Many).unwrap();

        let state = container.create_state();
        state.meld::<Counted>().unwrap();
        state.meld::<Connection>().unwrap();

        let live = state.inspect_live_services();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].service, ServiceKey::of::<Counted>());
        assert_eq!(live[0].lifetime, Lifetime::UniquePerScope);
        assert!(live[0].created_at >= state.created_at());
    }

    #[test]
    fn test_concurrent_meld_in_one_state() {
        let container = Container::new();
        let counter = Arc::new(Counter::default());
        container.bind_instance(Arc::clone(&counter)).unwrap();
        container.bind_self::<Slow>(Lifetime::UniquePerScope).unwrap();

        let state = container.create_state();
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    state.meld::<Slow>().unwrap()
                })
            })
            .collect();

        let instances: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
        assert_eq!(counter.get(), 1);

        // A second state builds its own instance
        container.create_state().meld::<Slow>().unwrap();
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn test_seal_waits_for_concurrent_resolutions() {
        let container = Container::new();
        let counter = Arc::new(Counter::default());
        container.bind_instance(Arc::clone(&counter)).unwrap();
        container.bind_self::<Slow>(Lifetime::Many).unwrap();

        let state = container.create_state();
        let barrier = Arc::new(Barrier::new(5));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let state = state.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    state.meld::<Slow>()
                })
            })
            .collect();

        barrier.wait();
        state.seal().unwrap();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let built = results.iter().filter(|r| r.is_ok()).count();
        assert!(results
            .iter()
            .all(|r| r.is_ok() || matches!(r, Err(MelderError::ScopeSealed { .. }))));
        assert_eq!(counter.get(), built);
    }
}

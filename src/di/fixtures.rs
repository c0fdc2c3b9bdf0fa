//! Services shared by the container and state tests.

use crate::di::{Dependencies, Dependency, Injectable};
use crate::error::BoxError;
use crate::lifecycle::Dispose;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Records disposals in the order they happen.
#[derive(Debug, Default)]
pub(crate) struct Journal(Mutex<Vec<String>>);

impl Journal {
    pub(crate) fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counter(AtomicUsize);

impl Counter {
    pub(crate) fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub(crate) trait Clock: fmt::Debug + Send + Sync {
    fn now(&self) -> u64;
}

#[derive(Debug)]
pub(crate) struct FixedClock(pub(crate) u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}

pub(crate) fn clock(now: u64) -> Arc<dyn Clock> {
    Arc::new(FixedClock(now))
}

#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) clock: Arc<dyn Clock>,
}

impl Injectable for Session {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<dyn Clock>()]
    }

    fn inject(dependencies: &mut Dependencies) -> Result<Self, BoxError> {
        Ok(Self {
            clock: dependencies.take()?,
        })
    }
}

/// Counts its constructions.
#[derive(Debug)]
pub(crate) struct Counted {
    pub(crate) serial: usize,
}

impl Injectable for Counted {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Counter>()]
    }

    fn inject(dependencies: &mut Dependencies) -> Result<Self, BoxError> {
        let counter = dependencies.take::<Counter>()?;
        Ok(Self { serial: counter.bump() })
    }
}

/// Takes a while to build, to widen race windows.
#[derive(Debug)]
pub(crate) struct Slow;

impl Injectable for Slow {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Counter>()]
    }

    fn inject(dependencies: &mut Dependencies) -> Result<Self, BoxError> {
        let counter = dependencies.take::<Counter>()?;
        thread::sleep(Duration::from_millis(25));
        counter.bump();
        Ok(Self)
    }
}

#[derive(Debug)]
pub(crate) struct Connection {
    journal: Arc<Journal>,
}

impl Injectable for Connection {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Journal>()]
    }

    fn inject(dependencies: &mut Dependencies) -> Result<Self, BoxError> {
        Ok(Self {
            journal: dependencies.take()?,
        })
    }

    fn disposer(instance: &Arc<Self>) -> Option<Arc<dyn Dispose>> {
        Some(instance.clone())
    }
}

impl Dispose for Connection {
    fn dispose(&self) -> Result<(), BoxError> {
        self.journal.push("connection");
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct Repository {
    pub(crate) connection: Arc<Connection>,
    journal: Arc<Journal>,
}

impl Injectable for Repository {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Connection>(), Dependency::on::<Journal>()]
    }

    fn inject(dependencies: &mut Dependencies) -> Result<Self, BoxError> {
        Ok(Self {
            connection: dependencies.take()?,
            journal: dependencies.take()?,
        })
    }

    fn disposer(instance: &Arc<Self>) -> Option<Arc<dyn Dispose>> {
        Some(instance.clone())
    }
}

impl Dispose for Repository {
    fn dispose(&self) -> Result<(), BoxError> {
        self.journal.push("repository");
        Ok(())
    }
}

/// Fails to dispose.
#[derive(Debug)]
pub(crate) struct Flaky {
    journal: Arc<Journal>,
}

impl Injectable for Flaky {
    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::on::<Journal>()]
    }

    fn inject(dependencies: &mut Dependencies) -> Result<Self, BoxError> {
        Ok(Self {
            journal: dependencies.take()?,
        })
    }

    fn disposer(instance: &Arc<Self>) -> Option<Arc<dyn Dispose>> {
        Some(instance.clone())
    }
}

impl Dispose for Flaky {
    fn dispose(&self) -> Result<(), BoxError> {
        self.journal.push("flaky");
        Err("socket already closed".into())
    }
}

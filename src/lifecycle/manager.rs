//! Disposal list
//!
//! Records disposable instances in creation order and releases them in
//! reverse.

use super::Dispose;
use crate::di::ServiceKey;
use crate::error::DisposalFailure;
use parking_lot::Mutex;
use std::sync::Arc;

/// A disposable instance together with the service it was created for
struct DisposalEntry {
    service: ServiceKey,
    disposer: Arc<dyn Dispose>,
}

/// Ordered list of instances to release when their owner is sealed
///
/// # Example
///
/// ```rust,ignore
/// let list = DisposalList::new();
/// list.push(ServiceKey::of::<Database>(), database);
/// list.push(ServiceKey::of::<Cache>(), cache);
///
/// // Cache is disposed first, then Database
/// let failures = list.dispose_all();
/// assert!(failures.is_empty());
/// ```
#[derive(Default)]
pub struct DisposalList {
    entries: Mutex<Vec<DisposalEntry>>,
}

impl DisposalList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a disposer. Entries are released last-in, first-out.
    pub fn push(&self, service: ServiceKey, disposer: Arc<dyn Dispose>) {
        tracing::debug!("Tracking disposable: {}", service);
        self.entries.lock().push(DisposalEntry { service, disposer });
    }

    /// Dispose every registered entry in **reverse order**
    ///
    /// The list is drained first, so the disposers run without holding the
    /// lock and a second call does nothing. Failures are collected and the
    /// remaining entries are still disposed.
    pub fn dispose_all(&self) -> Vec<DisposalFailure> {
        let entries = std::mem::take(&mut *self.entries.lock());
        if entries.is_empty() {
            return Vec::new();
        }

        tracing::debug!("Disposing {} instance(s)...", entries.len());

        let mut failures = Vec::new();
        for entry in entries.into_iter().rev() {
            tracing::debug!("Destroying: {}", entry.service);
            if let Err(error) = entry.disposer.dispose() {
                // Log error but continue with other entries
                tracing::warn!("Dispose failed for {}: {}", entry.service, error);
                failures.push(DisposalFailure {
                    service: entry.service,
                    error,
                });
                continue;
            }
            tracing::debug!("Destroyed: {}", entry.service);
        }
        failures
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

use crate::di::instance::Liveness;
use crate::di::{Instance, ServiceKey};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

/// Where and when an instance was created. Recorded only when the container
/// runs with debugging enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceMetadata {
    pub service: ServiceKey,
    pub scope_id: Uuid,
    pub scope_created_at: DateTime<Utc>,
    pub object_id: Uuid,
    pub object_created_at: DateTime<Utc>,
}

struct Entry {
    alive: Liveness,
    metadata: InstanceMetadata,
}

/// Side table from instance address to creation metadata.
///
/// Entries do not keep their instance alive. An entry whose instance was
/// dropped is never returned, so a reused address cannot pick up stale
/// metadata.
#[derive(Default)]
pub(crate) struct DebugTable {
    entries: DashMap<usize, Entry>,
}

impl DebugTable {
    pub(crate) fn record(&self, instance: &Instance, metadata: InstanceMetadata) {
        tracing::trace!(
            "Created {} ({}) in scope {}",
            metadata.service,
            metadata.object_id,
            metadata.scope_id
        );
        let entry = Entry {
            alive: instance.liveness(),
            metadata,
        };
        self.entries.insert(instance.address(), entry);
    }

    pub(crate) fn lookup(&self, address: usize) -> Option<InstanceMetadata> {
        let (alive, metadata) = {
            let entry = self.entries.get(&address)?;
            ((entry.alive)(), entry.metadata.clone())
        };
        if alive {
            return Some(metadata);
        }
        self.entries.remove_if(&address, |_, entry| !(entry.alive)());
        None
    }

    /// Drop every entry created in `scope_id`, and every entry whose instance
    /// is gone.
    pub(crate) fn forget_scope(&self, scope_id: Uuid) {
        self.entries
            .retain(|_, entry| entry.metadata.scope_id != scope_id && (entry.alive)());
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn metadata(scope_id: Uuid) -> InstanceMetadata {
        let now = Utc::now();
        InstanceMetadata {
            service: ServiceKey::of::<String>(),
            scope_id,
            scope_created_at: now,
            object_id: Uuid::new_v4(),
            object_created_at: now,
        }
    }

    #[test]
    fn test_record_and_forget() {
        let table = DebugTable::default();
        let scope = Uuid::new_v4();
        let other = Uuid::new_v4();
        let a = Instance::new(Arc::new("a".to_string()));
        let b = Instance::new(Arc::new("b".to_string()));

        table.record(&a, metadata(scope));
        table.record(&b, metadata(other));
        assert_eq!(table.lookup(a.address()).unwrap().scope_id, scope);

        table.forget_scope(scope);
        assert!(table.lookup(a.address()).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_dropped_instance_has_no_metadata() {
        let table = DebugTable::default();
        let value = Arc::new(7u64);
        let instance = Instance::new(Arc::clone(&value));
        let address = instance.address();

        table.record(&instance, metadata(Uuid::new_v4()));
        drop(instance);
        assert!(table.lookup(address).is_some());

        drop(value);
        assert!(table.lookup(address).is_none());
        assert_eq!(table.len(), 0);
    }
}

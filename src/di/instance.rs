use crate::di::{Lifetime, ServiceId};
use chrono::{DateTime, Utc};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Reports whether the object behind an [`Instance`] still has strong
/// references, without keeping it alive.
pub(crate) type Liveness = Box<dyn Fn() -> bool + Send + Sync>;

fn watch<I: ?Sized + Send + Sync + 'static>(value: &(dyn Any + Send + Sync + 'static)) -> Option<Liveness> {
    let weak = Arc::downgrade(value.downcast_ref::<Arc<I>>()?);
    Some(Box::new(move || weak.strong_count() > 0))
}

/// A type-erased service instance.
///
/// The erased value is always an `Arc<I>` for the interface `I` it was built
/// for, so trait objects survive the round trip through `dyn Any`.
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    service: ServiceId,
    address: usize,
    watch: fn(&(dyn Any + Send + Sync + 'static)) -> Option<Liveness>,
}

impl Instance {
    pub fn new<I: ?Sized + Send + Sync + 'static>(instance: Arc<I>) -> Self {
        let address = Arc::as_ptr(&instance) as *const () as usize;
        Self {
            value: Arc::new(instance),
            service: ServiceId::of::<I>(),
            address,
            watch: watch::<I>,
        }
    }

    /// Recover the typed `Arc<I>`. Returns `None` if the instance was built
    /// for a different interface.
    pub fn downcast<I: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<I>> {
        self.value.downcast_ref::<Arc<I>>().cloned()
    }

    /// The interface this instance was built for.
    pub fn service(&self) -> ServiceId {
        self.service
    }

    /// Whether both handles point at the same underlying object.
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        self.address == other.address
    }

    pub(crate) fn address(&self) -> usize {
        self.address
    }

    pub(crate) fn liveness(&self) -> Liveness {
        (self.watch)(self.value.as_ref()).unwrap_or_else(|| Box::new(|| false))
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("service", &self.service)
            .field("address", &format_args!("{:#x}", self.address))
            .finish()
    }
}

/// A cached instance with the bookkeeping needed to inspect it later.
#[derive(Clone, Debug)]
pub(crate) struct Creation {
    pub(crate) instance: Instance,
    pub(crate) lifetime: Lifetime,
    pub(crate) object_id: Uuid,
    pub(crate) created_at: DateTime<Utc>,
}

impl Creation {
    pub(crate) fn new(instance: Instance, lifetime: Lifetime) -> Self {
        Self {
            instance,
            lifetime,
            object_id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[test]
    fn test_downcast_trait_object() {
        let greeter: Arc<dyn Greeter> = Arc::new(English);
        let instance = Instance::new(Arc::clone(&greeter));

        let recovered = instance.downcast::<dyn Greeter>().unwrap();
        assert_eq!(recovered.greet(), "hello");
        assert!(Arc::ptr_eq(&recovered, &greeter));
        assert!(instance.downcast::<English>().is_none());
        assert_eq!(instance.service(), ServiceId::of::<dyn Greeter>());
    }

    #[test]
    fn test_ptr_eq_tracks_the_object() {
        let value = Arc::new(5u32);
        let a = Instance::new(Arc::clone(&value));
        let b = Instance::new(Arc::clone(&value));
        let c = Instance::new(Arc::new(5u32));

        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
    }

    #[test]
    fn test_liveness_does_not_keep_the_object() {
        let value: Arc<dyn Greeter> = Arc::new(English);
        let instance = Instance::new(Arc::clone(&value));
        let alive = instance.liveness();
        assert!(alive());

        drop(instance);
        assert!(alive());
        drop(value);
        assert!(!alive());
    }
}

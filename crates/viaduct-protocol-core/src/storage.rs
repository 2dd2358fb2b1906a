use crate::user::{ConnectionInfo, Outbox};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use tracing::debug;

/// Per-connection state consulted by rewrite rules.
///
/// One instance per kind per connection, built lazily on first access.
pub trait StoredObject: Any + Send {
    fn create(info: &ConnectionInfo) -> Self
    where
        Self: Sized;

    /// Called once when the connection leaves the pipeline. Objects that put
    /// something on the client's screen release it here.
    fn dispose(&mut self, _outbox: &mut Outbox) {}
}

trait ErasedStored: Send {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn dispose(&mut self, outbox: &mut Outbox);
}

impl<T: StoredObject> ErasedStored for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn dispose(&mut self, outbox: &mut Outbox) {
        StoredObject::dispose(self, outbox)
    }
}

/// Type-keyed map of the stored objects of one connection.
#[derive(Default)]
pub struct ConnectionStore {
    objects: HashMap<TypeId, Box<dyn ErasedStored>>,
    disposed: bool,
}

impl ConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: StoredObject>(&self) -> Option<&T> {
        self.objects
            .get(&TypeId::of::<T>())
            .and_then(|object| object.as_any().downcast_ref::<T>())
    }

    pub fn get_mut<T: StoredObject>(&mut self) -> Option<&mut T> {
        self.objects
            .get_mut(&TypeId::of::<T>())
            .and_then(|object| object.as_any_mut().downcast_mut::<T>())
    }

    pub fn contains<T: StoredObject>(&self) -> bool {
        self.objects.contains_key(&TypeId::of::<T>())
    }

    pub fn get_or_create<T: StoredObject>(&mut self, info: &ConnectionInfo) -> &mut T {
        let object = self.objects.entry(TypeId::of::<T>()).or_insert_with(|| {
            debug!(
                "Creating {} for connection {}",
                std::any::type_name::<T>(),
                info.id
            );
            Box::new(T::create(info))
        });
        match object.as_any_mut().downcast_mut::<T>() {
            Some(object) => object,
            None => unreachable!("store entries are keyed by their own TypeId"),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Drop every stored object, letting each release what it holds.
    /// Only the first call has any effect.
    pub fn dispose(&mut self, outbox: &mut Outbox) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        for (_, mut object) in self.objects.drain() {
            object.dispose(outbox);
        }
    }
}

//! # Identity Cache
//!
//! One live local instance per remote entity, per session.
//!
//! ## Invariants
//!
//! - For a given `(typeName, recordId)` at most one instance is stored.
//!   `add` never replaces an existing entry; it returns the one already there.
//! - Entries are never evicted implicitly. The cache lives as long as the
//!   session that owns it.
//! - Lookups clone the `Arc` out and release the shard lock before returning.

use std::sync::Arc;

use dashmap::DashMap;

use zonewire::ObjectRef;
use zonewire::RecordId;

use crate::object::DistributedObject;
use crate::object::ObjectHandle;

#[derive(Default)]
pub struct IdentityCache {
    types: DashMap<String, DashMap<RecordId, ObjectHandle>>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, type_name: &str, record_id: &RecordId) -> Option<ObjectHandle> {
        let records = self.types.get(type_name)?;
        records.get(record_id).map(|entry| entry.value().clone())
    }

    pub fn get_ref(&self, object: &ObjectRef) -> Option<ObjectHandle> {
        self.get(&object.type_name, &object.record_id)
    }

    /// Looks an instance up and downcasts it to its concrete type.
    pub fn get_as<T: DistributedObject>(&self, object: &ObjectRef) -> Option<Arc<T>> {
        self.get_ref(object)?.as_any().downcast::<T>().ok()
    }

    /// Stores `instance` unless an instance with the same identity already
    /// exists. Returns whichever instance is now canonical.
    pub fn add(&self, instance: ObjectHandle) -> ObjectHandle {
        let records = self.types.entry(instance.type_name().to_string()).or_default();
        let canonical = records
            .entry(instance.record_id())
            .or_insert(instance)
            .value()
            .clone();
        canonical
    }

    /// Removes the entry for `instance`'s identity, but only if the stored
    /// entry is `instance` itself. A stale duplicate cannot evict the
    /// canonical instance. Returns true if something was removed.
    pub fn remove(&self, instance: &ObjectHandle) -> bool {
        let Some(records) = self.types.get(instance.type_name()) else {
            return false;
        };
        records
            .remove_if(&instance.record_id(), |_, stored| same(stored, instance))
            .is_some()
    }

    /// True if the stored instance for `instance`'s identity is `instance`.
    pub fn contains(&self, instance: &ObjectHandle) -> bool {
        self.get(instance.type_name(), &instance.record_id())
            .is_some_and(|stored| same(&stored, instance))
    }

    pub fn len(&self) -> usize {
        self.types.iter().map(|records| records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every cached instance of one type, in no particular order.
    pub fn of_type(&self, type_name: &str) -> Vec<ObjectHandle> {
        self.types
            .get(type_name)
            .map(|records| records.iter().map(|e| e.value().clone()).collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        self.types.clear();
    }
}

fn same(a: &ObjectHandle, b: &ObjectHandle) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

//! # Attribute Store
//!
//! The key/value contract the engine persists through. Every entity
//! (caster or target) owns a flat bag of attributes addressed by
//! `(namespace, key)`; values are opaque bytes.
//!
//! The engine only ever touches its own namespace, so other systems
//! sharing the backend cannot collide with mark keys.

use crate::error::StoreError;
use crate::primitives::EntityId;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Namespace owned by the mark engine.
pub const NAMESPACE: &str = "quarry";

/// Per-entity attribute storage.
///
/// Implementations must make each single call atomic. Read-modify-write
/// sequences are serialized above this layer.
pub trait AttributeStore: Send + Sync {
    /// Read an attribute. `Ok(None)` when absent.
    fn get_attribute(
        &self,
        entity: &EntityId,
        namespace: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, StoreError>;

    /// Write an attribute, replacing any previous value.
    fn set_attribute(
        &self,
        entity: &EntityId,
        namespace: &str,
        key: &str,
        value: &[u8],
    ) -> Result<(), StoreError>;

    /// Remove an attribute. Removing an absent attribute succeeds.
    fn delete_attribute(
        &self,
        entity: &EntityId,
        namespace: &str,
        key: &str,
    ) -> Result<(), StoreError>;
}

impl<T: AttributeStore + ?Sized> AttributeStore for std::sync::Arc<T> {
    fn get_attribute(
        &self,
        entity: &EntityId,
        namespace: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get_attribute(entity, namespace, key)
    }

    fn set_attribute(
        &self,
        entity: &EntityId,
        namespace: &str,
        key: &str,
        value: &[u8],
    ) -> Result<(), StoreError> {
        (**self).set_attribute(entity, namespace, key, value)
    }

    fn delete_attribute(
        &self,
        entity: &EntityId,
        namespace: &str,
        key: &str,
    ) -> Result<(), StoreError> {
        (**self).delete_attribute(entity, namespace, key)
    }
}

type AttributeKey = (EntityId, String, String);

/// In-memory attribute store.
///
/// Uses `BTreeMap` for deterministic iteration.
#[derive(Debug, Default)]
pub struct MemoryAttributes {
    entries: Mutex<BTreeMap<AttributeKey, Vec<u8>>>,
}

impl MemoryAttributes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored attributes across all entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key(entity: &EntityId, namespace: &str, key: &str) -> AttributeKey {
        (entity.clone(), namespace.to_string(), key.to_string())
    }
}

impl AttributeStore for MemoryAttributes {
    fn get_attribute(
        &self,
        entity: &EntityId,
        namespace: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(&Self::key(entity, namespace, key)).cloned())
    }

    fn set_attribute(
        &self,
        entity: &EntityId,
        namespace: &str,
        key: &str,
        value: &[u8],
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(Self::key(entity, namespace, key), value.to_vec());
        Ok(())
    }

    fn delete_attribute(
        &self,
        entity: &EntityId,
        namespace: &str,
        key: &str,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&Self::key(entity, namespace, key));
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete() {
        let store = MemoryAttributes::new();
        let entity = EntityId::new("goblin");

        assert_eq!(store.get_attribute(&entity, NAMESPACE, "marks").unwrap(), None);

        store
            .set_attribute(&entity, NAMESPACE, "marks", &[1, 2, 3])
            .unwrap();
        assert_eq!(
            store.get_attribute(&entity, NAMESPACE, "marks").unwrap(),
            Some(vec![1, 2, 3])
        );

        store.delete_attribute(&entity, NAMESPACE, "marks").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn namespaces_do_not_collide() {
        let store = MemoryAttributes::new();
        let entity = EntityId::new("goblin");

        store.set_attribute(&entity, NAMESPACE, "marks", &[1]).unwrap();
        store.set_attribute(&entity, "other", "marks", &[2]).unwrap();

        assert_eq!(
            store.get_attribute(&entity, NAMESPACE, "marks").unwrap(),
            Some(vec![1])
        );
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn deleting_absent_attribute_succeeds() {
        let store = MemoryAttributes::new();
        assert!(
            store
                .delete_attribute(&EntityId::new("x"), NAMESPACE, "uses")
                .is_ok()
        );
    }
}

//! redb-backed [`AttributeStore`].
//!
//! All attributes live in one table keyed by
//! `entity \x1f namespace \x1f key`.

use crate::attributes::AttributeStore;
use crate::error::StoreError;
use crate::primitives::EntityId;
use redb::{Database, ReadableDatabase, TableDefinition, TableError};
use std::path::Path;

const ATTRIBUTES: TableDefinition<&str, &[u8]> = TableDefinition::new("attributes");

const SEPARATOR: char = '\u{1f}';

fn backend(err: impl Into<redb::Error>) -> StoreError {
    StoreError::from(err.into())
}

fn composite_key(entity: &EntityId, namespace: &str, key: &str) -> String {
    format!("{}{SEPARATOR}{namespace}{SEPARATOR}{key}", entity.as_str())
}

/// Attribute store persisted in a redb database file.
pub struct RedbAttributes {
    db: Database,
}

impl std::fmt::Debug for RedbAttributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbAttributes").finish()
    }
}

impl RedbAttributes {
    /// Create (or open) the database at `path` and make sure the
    /// attribute table exists.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(backend)?;
        let txn = db.begin_write().map_err(backend)?;
        {
            txn.open_table(ATTRIBUTES).map_err(backend)?;
        }
        txn.commit().map_err(backend)?;
        Ok(Self { db })
    }

    /// Open an existing database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = Database::open(path).map_err(backend)?;
        Ok(Self { db })
    }
}

impl AttributeStore for RedbAttributes {
    fn get_attribute(
        &self,
        entity: &EntityId,
        namespace: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let txn = self.db.begin_read().map_err(backend)?;
        let table = match txn.open_table(ATTRIBUTES) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(backend(err)),
        };
        let composite = composite_key(entity, namespace, key);
        let value = table
            .get(composite.as_str())
            .map_err(backend)?
            .map(|guard| guard.value().to_vec());
        Ok(value)
    }

    fn set_attribute(
        &self,
        entity: &EntityId,
        namespace: &str,
        key: &str,
        value: &[u8],
    ) -> Result<(), StoreError> {
        let composite = composite_key(entity, namespace, key);
        let txn = self.db.begin_write().map_err(backend)?;
        {
            let mut table = txn.open_table(ATTRIBUTES).map_err(backend)?;
            table.insert(composite.as_str(), value).map_err(backend)?;
        }
        txn.commit().map_err(backend)?;
        Ok(())
    }

    fn delete_attribute(
        &self,
        entity: &EntityId,
        namespace: &str,
        key: &str,
    ) -> Result<(), StoreError> {
        let composite = composite_key(entity, namespace, key);
        let txn = self.db.begin_write().map_err(backend)?;
        {
            let mut table = txn.open_table(ATTRIBUTES).map_err(backend)?;
            table.remove(composite.as_str()).map_err(backend)?;
        }
        txn.commit().map_err(backend)?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::NAMESPACE;

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attrs.redb");
        let entity = EntityId::new("Actor.wolf");

        {
            let store = RedbAttributes::create(&path).unwrap();
            store
                .set_attribute(&entity, NAMESPACE, "marks", b"payload")
                .unwrap();
        }

        let reopened = RedbAttributes::open(&path).unwrap();
        assert_eq!(
            reopened.get_attribute(&entity, NAMESPACE, "marks").unwrap(),
            Some(b"payload".to_vec())
        );
    }

    #[test]
    fn delete_removes_value() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbAttributes::create(dir.path().join("attrs.redb")).unwrap();
        let entity = EntityId::new("Actor.wolf");

        store.set_attribute(&entity, NAMESPACE, "uses", &[1]).unwrap();
        store.delete_attribute(&entity, NAMESPACE, "uses").unwrap();

        assert_eq!(store.get_attribute(&entity, NAMESPACE, "uses").unwrap(), None);
    }

    #[test]
    fn keys_are_scoped_per_entity() {
        let dir = tempfile::tempdir().unwrap();
        let store = RedbAttributes::create(dir.path().join("attrs.redb")).unwrap();

        store
            .set_attribute(&EntityId::new("a"), NAMESPACE, "uses", &[1])
            .unwrap();

        assert_eq!(
            store
                .get_attribute(&EntityId::new("b"), NAMESPACE, "uses")
                .unwrap(),
            None
        );
    }
}

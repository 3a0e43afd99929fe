//! Sled-backed store engine.

use super::row::Row;
use super::txn::StoreTxn;
use crate::error::Error;
use crate::schema::EntityDef;

/// Row identifier within an entity.
pub type RowId = u64;

/// Current time in microseconds since the Unix epoch.
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// The durable store: entity descriptors, rows, and the application ledger
/// in one sled tree.
pub struct Store {
    tree: sled::Tree,
}

impl Store {
    /// Tree name for the store.
    pub const TREE_NAME: &'static str = "comuniza:store";

    /// Key prefix for entity descriptors.
    pub(crate) const SCHEMA_PREFIX: &'static [u8] = b"schema:";
    /// Key prefix for rows.
    pub(crate) const ROW_PREFIX: &'static [u8] = b"row:";

    /// Open or create the store within a sled database.
    pub fn open(db: &sled::Db) -> Result<Self, Error> {
        let tree = db.open_tree(Self::TREE_NAME)?;
        Ok(Self { tree })
    }

    /// Begin a transactional overlay for one migration node.
    pub fn begin(&self) -> StoreTxn<'_> {
        StoreTxn::new(self)
    }

    /// Load an entity descriptor.
    pub fn entity(&self, name: &str) -> Result<Option<EntityDef>, Error> {
        match self.tree.get(Self::schema_key(name))? {
            Some(bytes) => Ok(Some(decode_entity(&bytes)?)),
            None => Ok(None),
        }
    }

    /// List all entity descriptors, sorted by name.
    pub fn entities(&self) -> Result<Vec<EntityDef>, Error> {
        let mut out = Vec::new();
        for item in self.tree.scan_prefix(Self::SCHEMA_PREFIX) {
            let (_, bytes) = item?;
            out.push(decode_entity(&bytes)?);
        }
        Ok(out)
    }

    /// Load a single row.
    pub fn row(&self, entity: &str, id: RowId) -> Result<Option<Row>, Error> {
        match self.tree.get(Self::row_key(entity, id))? {
            Some(bytes) => Ok(Some(Row::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Scan all rows of an entity in id order.
    pub fn scan_rows(&self, entity: &str) -> Result<Vec<(RowId, Row)>, Error> {
        let prefix = Self::row_prefix(entity);
        let mut out = Vec::new();
        for item in self.tree.scan_prefix(&prefix) {
            let (key, bytes) = item?;
            let id = decode_row_id(&key, prefix.len())?;
            out.push((id, Row::from_bytes(&bytes)?));
        }
        Ok(out)
    }

    /// Write a row directly, outside any migration.
    ///
    /// This is the seeding path used by the application and by tests; the
    /// executor writes rows through [`StoreTxn`] instead.
    pub fn put_row(&self, entity: &str, id: RowId, row: &Row) -> Result<(), Error> {
        self.tree.insert(Self::row_key(entity, id), row.to_bytes()?)?;
        Ok(())
    }

    /// Count the rows of an entity.
    pub fn row_count(&self, entity: &str) -> Result<usize, Error> {
        Ok(self.tree.scan_prefix(Self::row_prefix(entity)).count())
    }

    /// Flush changes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.tree.flush()?;
        Ok(())
    }

    pub(crate) fn tree(&self) -> &sled::Tree {
        &self.tree
    }

    pub(crate) fn schema_key(entity: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(Self::SCHEMA_PREFIX.len() + entity.len());
        key.extend_from_slice(Self::SCHEMA_PREFIX);
        key.extend_from_slice(entity.as_bytes());
        key
    }

    pub(crate) fn row_prefix(entity: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(Self::ROW_PREFIX.len() + entity.len() + 1);
        key.extend_from_slice(Self::ROW_PREFIX);
        key.extend_from_slice(entity.as_bytes());
        key.push(b':');
        key
    }

    pub(crate) fn row_key(entity: &str, id: RowId) -> Vec<u8> {
        let mut key = Self::row_prefix(entity);
        // Big-endian ids keep sled iteration in numeric order.
        key.extend_from_slice(&id.to_be_bytes());
        key
    }
}

pub(crate) fn encode_entity(entity: &EntityDef) -> Result<Vec<u8>, Error> {
    rkyv::to_bytes::<rkyv::rancor::Error>(entity)
        .map(|v| v.to_vec())
        .map_err(|e| Error::Serialization(e.to_string()))
}

pub(crate) fn decode_entity(bytes: &[u8]) -> Result<EntityDef, Error> {
    // sled may hand back unaligned buffers; rkyv requires alignment.
    let mut aligned = rkyv::util::AlignedVec::<16>::new();
    aligned.extend_from_slice(bytes);
    rkyv::from_bytes::<EntityDef, rkyv::rancor::Error>(&aligned)
        .map_err(|e| Error::Deserialization(e.to_string()))
}

fn decode_row_id(key: &[u8], prefix_len: usize) -> Result<RowId, Error> {
    let tail: [u8; 8] = key
        .get(prefix_len..)
        .and_then(|t| t.try_into().ok())
        .ok_or_else(|| Error::Deserialization("malformed row key".to_string()))?;
    Ok(RowId::from_be_bytes(tail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, FieldType};

    fn open_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let store = Store::open(&db).unwrap();
        (dir, store)
    }

    #[test]
    fn test_row_round_trip() {
        let (_dir, store) = open_store();

        let row = Row::new().with("name", "tent");
        store.put_row("item", 1, &row).unwrap();

        assert_eq!(store.row("item", 1).unwrap(), Some(row));
        assert!(store.row("item", 2).unwrap().is_none());
    }

    #[test]
    fn test_scan_rows_in_id_order() {
        let (_dir, store) = open_store();

        for id in [30u64, 2, 300, 1] {
            store
                .put_row("item", id, &Row::new().with("owner_id", id as i64))
                .unwrap();
        }

        let ids: Vec<RowId> = store
            .scan_rows("item")
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![1, 2, 30, 300]);
    }

    #[test]
    fn test_row_prefix_isolation() {
        let (_dir, store) = open_store();

        store.put_row("item", 1, &Row::new()).unwrap();
        store.put_row("item_photo", 1, &Row::new()).unwrap();

        assert_eq!(store.row_count("item").unwrap(), 1);
        assert_eq!(store.row_count("item_photo").unwrap(), 1);
    }

    #[test]
    fn test_entity_round_trip() {
        let (_dir, store) = open_store();

        let entity = EntityDef::new("item").with_field(FieldDef::new("name", FieldType::Text));
        store
            .tree()
            .insert(Store::schema_key("item"), encode_entity(&entity).unwrap())
            .unwrap();

        assert_eq!(store.entity("item").unwrap(), Some(entity));
        assert!(store.entity("group").unwrap().is_none());
        assert_eq!(store.entities().unwrap().len(), 1);
    }
}

//! Per-node transactional overlay.
//!
//! Operations within one migration node run against a `StoreTxn`: reads fall
//! through to the store, writes are buffered. Commit applies every buffered
//! write in a single sled transaction, so a node is observed fully applied
//! or not at all, and a crash mid-node never leaves partial state behind.

use super::engine::{encode_entity, RowId, Store};
use super::row::Row;
use crate::error::Error;
use crate::schema::EntityDef;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::collections::HashMap;

/// Buffered writes over the store for one migration node.
pub struct StoreTxn<'a> {
    store: &'a Store,
    /// Entity descriptors created or modified in this transaction.
    schemas: HashMap<String, EntityDef>,
    /// Rows modified in this transaction.
    rows: HashMap<(String, RowId), Row>,
    /// Raw ledger writes: key to value, `None` meaning delete.
    raw: Vec<(Vec<u8>, Option<Vec<u8>>)>,
    /// Keys that must still be absent when the transaction commits.
    guards: Vec<Vec<u8>>,
}

impl<'a> StoreTxn<'a> {
    pub(crate) fn new(store: &'a Store) -> Self {
        Self {
            store,
            schemas: HashMap::new(),
            rows: HashMap::new(),
            raw: Vec::new(),
            guards: Vec::new(),
        }
    }

    /// Load an entity descriptor as this transaction sees it.
    pub fn entity(&self, name: &str) -> Result<Option<EntityDef>, Error> {
        if let Some(entity) = self.schemas.get(name) {
            return Ok(Some(entity.clone()));
        }
        self.store.entity(name)
    }

    /// Stage an entity descriptor write.
    pub fn put_entity(&mut self, entity: EntityDef) {
        self.schemas.insert(entity.name.clone(), entity);
    }

    /// Load a row as this transaction sees it.
    pub fn row(&self, entity: &str, id: RowId) -> Result<Option<Row>, Error> {
        if let Some(row) = self.rows.get(&(entity.to_string(), id)) {
            return Ok(Some(row.clone()));
        }
        self.store.row(entity, id)
    }

    /// Scan all rows of an entity in id order, overlay included.
    pub fn scan(&self, entity: &str) -> Result<Vec<(RowId, Row)>, Error> {
        let mut rows = self.store.scan_rows(entity)?;
        for (id, row) in rows.iter_mut() {
            if let Some(staged) = self.rows.get(&(entity.to_string(), *id)) {
                *row = staged.clone();
            }
        }
        Ok(rows)
    }

    /// Stage a row write.
    pub fn update_row(&mut self, entity: &str, id: RowId, row: Row) {
        self.rows.insert((entity.to_string(), id), row);
    }

    /// Stage a raw key write (ledger records).
    pub(crate) fn put_raw(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.raw.push((key, Some(value)));
    }

    /// Stage a raw key delete (ledger records).
    pub(crate) fn delete_raw(&mut self, key: Vec<u8>) {
        self.raw.push((key, None));
    }

    /// Require a key to be absent at commit time.
    ///
    /// Commit fails with [`Error::Conflict`] if the key appeared in the
    /// meantime. This is the guard that makes the durable check-then-apply
    /// sequence safe against a racing executor.
    pub(crate) fn expect_absent(&mut self, key: Vec<u8>) {
        self.guards.push(key);
    }

    /// Commit every buffered write atomically.
    pub fn commit(self) -> Result<(), Error> {
        let mut writes: Vec<(Vec<u8>, Option<Vec<u8>>)> = Vec::new();

        for (name, entity) in &self.schemas {
            writes.push((Store::schema_key(name), Some(encode_entity(entity)?)));
        }
        for ((entity, id), row) in &self.rows {
            writes.push((Store::row_key(entity, *id), Some(row.to_bytes()?)));
        }
        writes.extend(self.raw.iter().cloned());

        let guards = &self.guards;
        let result = self.store.tree().transaction(|tx| {
            for guard in guards {
                if tx.get(guard)?.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        String::from_utf8_lossy(guard).into_owned(),
                    ));
                }
            }
            for (key, value) in &writes {
                match value {
                    Some(bytes) => {
                        tx.insert(key.as_slice(), bytes.as_slice())?;
                    }
                    None => {
                        tx.remove(key.as_slice())?;
                    }
                }
            }
            Ok(())
        });

        match result {
            Ok(()) => {
                self.store.flush()?;
                Ok(())
            }
            Err(TransactionError::Abort(key)) => Err(Error::Conflict(key)),
            Err(TransactionError::Storage(e)) => Err(Error::Storage(e)),
        }
    }
}

//! The application ledger.
//!
//! An append-only set of `(namespace, name, applied_at)` rows, one per
//! applied node, unique on `(namespace, name)`. Records are never mutated:
//! apply appends, rollback deletes. The record write shares the node's
//! transactional unit, so partial application is never observed on restart.

use super::node::NodeId;
use crate::error::Error;
use crate::store::{current_timestamp, Store};
use rkyv::{Archive, Deserialize, Serialize};

/// Durable proof that a node was applied.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct ApplicationRecord {
    /// Node namespace.
    pub namespace: String,
    /// Node name.
    pub name: String,
    /// When the node was applied (microseconds since epoch).
    pub applied_at: u64,
}

impl ApplicationRecord {
    /// Create a record for a node, stamped now.
    pub fn new(id: &NodeId) -> Self {
        Self {
            namespace: id.namespace.clone(),
            name: id.name.clone(),
            applied_at: current_timestamp(),
        }
    }

    /// The node this record proves applied.
    pub fn node_id(&self) -> NodeId {
        NodeId::new(self.namespace.clone(), self.name.clone())
    }

    /// Serialize the record to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a record from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        // sled may hand back unaligned buffers; rkyv requires alignment.
        let mut aligned = rkyv::util::AlignedVec::<16>::new();
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// Read path over the ledger rows in the store tree.
///
/// Writes and deletes go through the executor's [`StoreTxn`] so they commit
/// in the same unit as the schema changes they prove.
///
/// [`StoreTxn`]: crate::store::StoreTxn
pub struct Ledger {
    tree: sled::Tree,
}

impl Ledger {
    /// Key prefix for application records.
    pub const PREFIX: &'static [u8] = b"applied:";

    /// Open the ledger over a store.
    pub fn new(store: &Store) -> Self {
        Self {
            tree: store.tree().clone(),
        }
    }

    /// Ledger key for a node.
    pub fn record_key(id: &NodeId) -> Vec<u8> {
        let mut key =
            Vec::with_capacity(Self::PREFIX.len() + id.namespace.len() + id.name.len() + 1);
        key.extend_from_slice(Self::PREFIX);
        key.extend_from_slice(id.namespace.as_bytes());
        key.push(b':');
        key.extend_from_slice(id.name.as_bytes());
        key
    }

    /// Check whether a node has been applied.
    pub fn is_applied(&self, id: &NodeId) -> Result<bool, Error> {
        Ok(self.tree.contains_key(Self::record_key(id))?)
    }

    /// Load the record for a node, if applied.
    pub fn get(&self, id: &NodeId) -> Result<Option<ApplicationRecord>, Error> {
        match self.tree.get(Self::record_key(id))? {
            Some(bytes) => Ok(Some(ApplicationRecord::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// List all application records, in key order.
    pub fn records(&self) -> Result<Vec<ApplicationRecord>, Error> {
        let mut out = Vec::new();
        for item in self.tree.scan_prefix(Self::PREFIX) {
            let (_, bytes) = item?;
            out.push(ApplicationRecord::from_bytes(&bytes)?);
        }
        Ok(out)
    }
}

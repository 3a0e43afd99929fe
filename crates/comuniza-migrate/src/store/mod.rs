//! Durable structured store backing the migration engine.
//!
//! A single sled tree holds entity descriptors, rows, and the application
//! ledger under distinct key prefixes. All mutation flows through
//! [`StoreTxn`], which buffers a node's writes and commits them atomically.

mod engine;
mod row;
mod txn;

pub use engine::{current_timestamp, RowId, Store};
pub use row::Row;
pub use txn::StoreTxn;

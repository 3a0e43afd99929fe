//! Comuniza Migrate - Schema evolution for the Comuniza sharing platform.
//!
//! This crate sequences and applies schema migrations over the platform's
//! embedded store: a dependency graph of migration nodes is resolved into a
//! deterministic order, and each node's operations run inside one
//! transactional unit together with the durable record of its application.

pub mod error;
pub mod migration;
pub mod schema;
pub mod store;

pub use error::Error;
pub use migration::{
    platform_history, ApplicationRecord, ApplyReport, DataTransform, Ledger, MigrationError,
    MigrationNode, Migrator, MigratorConfig, NodeId, NodeStatus, Operation, OperationError,
    TokenSpec, ValueMap,
};
pub use schema::{EntityDef, FieldDef, FieldType, Value};
pub use store::{Row, RowId, Store, StoreTxn};

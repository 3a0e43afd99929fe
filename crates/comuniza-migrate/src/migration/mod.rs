//! Dependency-ordered schema migration.
//!
//! Schema history is a directed acyclic graph of [`MigrationNode`]s, each a
//! short ordered list of [`Operation`]s plus optional [`DataTransform`]
//! callbacks. The [`Migrator`] resolves the graph into a deterministic
//! total order, applies each unapplied node in its own transactional unit
//! (the [`ApplicationRecord`] commits in the same unit), and can roll a node
//! back together with everything that transitively depends on it.

pub mod error;
pub mod executor;
pub mod graph;
pub mod history;
pub mod ledger;
pub mod node;
pub mod op;
pub mod transforms;

pub use error::{MigrationError, OperationError};
pub use executor::{ApplyReport, Migrator, MigratorConfig, NodeStatus};
pub use graph::resolve_order;
pub use history::platform_history;
pub use ledger::{ApplicationRecord, Ledger};
pub use node::{MigrationNode, NodeId};
pub use op::{Operation, ValueMap};
pub use transforms::{backfill_with_default, regenerate_tokens, DataTransform, TokenSpec};

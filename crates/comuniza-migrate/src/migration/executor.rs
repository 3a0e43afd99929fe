//! Migration executor.
//!
//! Applies nodes in resolved order, one transactional unit per node, and
//! unwinds them on rollback. Designed for single-writer execution: one
//! executor process per target environment. The ledger key is guarded
//! inside the commit transaction, so a racing executor observes the node as
//! already applied instead of double-running its data transforms.

use super::error::MigrationError;
use super::graph::{dependents_of, resolve_order};
use super::ledger::{ApplicationRecord, Ledger};
use super::node::{MigrationNode, NodeId};
use crate::error::Error;
use crate::store::Store;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Executor configuration.
#[derive(Debug, Clone, Default)]
pub struct MigratorConfig {
    /// Resolve and log the plan without applying anything.
    pub dry_run: bool,
}

/// Lifecycle of a single node as the executor sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Not yet applied.
    Pending,
    /// Operations are being applied.
    Applying,
    /// Applied and recorded.
    Applied,
    /// Application failed; the node remains unapplied.
    Failed,
    /// Reverse operations are being replayed.
    RollingBack,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Pending => write!(f, "pending"),
            NodeStatus::Applying => write!(f, "applying"),
            NodeStatus::Applied => write!(f, "applied"),
            NodeStatus::Failed => write!(f, "failed"),
            NodeStatus::RollingBack => write!(f, "rolling_back"),
        }
    }
}

/// Outcome of an `apply_all` run.
#[derive(Debug, Default)]
pub struct ApplyReport {
    /// Nodes applied by this run, in application order.
    pub applied: Vec<NodeId>,
    /// Nodes skipped because they were already recorded.
    pub skipped: Vec<NodeId>,
}

/// Applies and rolls back migration nodes against a store.
pub struct Migrator {
    store: Store,
    ledger: Ledger,
    config: MigratorConfig,
}

impl Migrator {
    /// Create a migrator over a store.
    pub fn new(store: Store, config: MigratorConfig) -> Self {
        let ledger = Ledger::new(&store);
        Self {
            store,
            ledger,
            config,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Apply every unapplied node of the set, in dependency order.
    ///
    /// Resolver errors abort the run before any side effect. A failing node
    /// aborts the remaining unapplied nodes; nodes applied earlier in the
    /// run stay committed and recorded.
    pub fn apply_all(&self, nodes: &[MigrationNode]) -> Result<ApplyReport, MigrationError> {
        let order = resolve_order(nodes)?;
        let by_id: HashMap<&NodeId, &MigrationNode> =
            nodes.iter().map(|n| (&n.id, n)).collect();

        let mut report = ApplyReport::default();
        for id in &order {
            let Some(node) = by_id.get(id) else { continue };

            if self.ledger.is_applied(id)? {
                debug!(node = %id, "already applied, skipping");
                report.skipped.push(id.clone());
                continue;
            }

            match self.apply_node(node) {
                Ok(_) => report.applied.push(id.clone()),
                Err(MigrationError::Storage(Error::Conflict(_))) => {
                    // A racing executor recorded the node between our check
                    // and our commit; its transforms already ran exactly once.
                    warn!(node = %id, "concurrently applied by another executor, skipping");
                    report.skipped.push(id.clone());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// Apply a single node, skipping it when already recorded.
    ///
    /// The caller is responsible for ordering: the node's dependencies must
    /// already be applied. [`apply_all`](Self::apply_all) is the ordered
    /// entry point.
    pub fn apply(&self, node: &MigrationNode) -> Result<ApplicationRecord, MigrationError> {
        if let Some(record) = self.ledger.get(&node.id)? {
            debug!(node = %node.id, "already applied, skipping");
            return Ok(record);
        }
        self.apply_node(node)
    }

    /// Roll back a node: unapply it and every applied node that
    /// transitively depends on it, in reverse topological order.
    ///
    /// Returns the unapplied nodes in unwind order.
    pub fn rollback(
        &self,
        nodes: &[MigrationNode],
        target: &NodeId,
    ) -> Result<Vec<NodeId>, MigrationError> {
        let order = resolve_order(nodes)?;
        if !order.contains(target) {
            return Err(MigrationError::UnknownNode {
                node: target.clone(),
            });
        }

        let affected = dependents_of(nodes, target);
        let by_id: HashMap<&NodeId, &MigrationNode> =
            nodes.iter().map(|n| (&n.id, n)).collect();

        let mut unapplied = Vec::new();
        for id in order.iter().rev() {
            if !affected.contains(id) || !self.ledger.is_applied(id)? {
                continue;
            }
            let Some(node) = by_id.get(id) else { continue };
            self.unapply_node(node)?;
            unapplied.push(id.clone());
        }
        Ok(unapplied)
    }

    /// Check whether a node has been applied.
    pub fn is_applied(&self, id: &NodeId) -> Result<bool, MigrationError> {
        Ok(self.ledger.is_applied(id)?)
    }

    /// Durable status of a node.
    pub fn status(&self, id: &NodeId) -> Result<NodeStatus, MigrationError> {
        if self.ledger.is_applied(id)? {
            Ok(NodeStatus::Applied)
        } else {
            Ok(NodeStatus::Pending)
        }
    }

    /// List all application records.
    pub fn records(&self) -> Result<Vec<ApplicationRecord>, MigrationError> {
        Ok(self.ledger.records()?)
    }

    fn apply_node(&self, node: &MigrationNode) -> Result<ApplicationRecord, MigrationError> {
        info!(
            node = %node.id,
            operations = node.operations.len(),
            status = %NodeStatus::Applying,
            "applying migration node"
        );

        if self.config.dry_run {
            for op in &node.operations {
                info!(node = %node.id, op = %op.description(), "dry run");
            }
            return Ok(ApplicationRecord::new(&node.id));
        }

        let mut txn = self.store.begin();
        for op in &node.operations {
            debug!(node = %node.id, op = %op.description(), "applying operation");
            if let Err(source) = op.apply(&mut txn) {
                warn!(
                    node = %node.id,
                    status = %NodeStatus::Failed,
                    error = %source,
                    "migration node failed, transaction discarded"
                );
                return Err(MigrationError::Apply {
                    node: node.id.clone(),
                    source,
                });
            }
        }

        // The record commits in the same unit as the schema changes, and the
        // key is guarded against a concurrent writer.
        let key = Ledger::record_key(&node.id);
        let record = ApplicationRecord::new(&node.id);
        txn.expect_absent(key.clone());
        txn.put_raw(key, record.to_bytes()?);
        txn.commit()?;

        info!(node = %node.id, status = %NodeStatus::Applied, "migration node applied");
        Ok(record)
    }

    fn unapply_node(&self, node: &MigrationNode) -> Result<(), MigrationError> {
        info!(
            node = %node.id,
            status = %NodeStatus::RollingBack,
            "rolling back migration node"
        );

        if self.config.dry_run {
            for op in node.operations.iter().rev() {
                info!(node = %node.id, op = %op.description(), "dry run (reverse)");
            }
            return Ok(());
        }

        let mut txn = self.store.begin();
        for op in node.operations.iter().rev() {
            debug!(node = %node.id, op = %op.description(), "reversing operation");
            op.reverse(&mut txn).map_err(|source| MigrationError::Rollback {
                node: node.id.clone(),
                source,
            })?;
        }

        txn.delete_raw(Ledger::record_key(&node.id));
        txn.commit()?;

        info!(node = %node.id, status = %NodeStatus::Pending, "migration node rolled back");
        Ok(())
    }
}

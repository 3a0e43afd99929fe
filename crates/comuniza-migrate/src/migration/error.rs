//! Migration-specific error types.

use super::node::NodeId;
use crate::schema::Value;
use thiserror::Error;

/// Errors from applying or reversing a single operation.
#[derive(Debug, Error)]
pub enum OperationError {
    /// The target entity does not exist.
    #[error("entity '{entity}' does not exist")]
    UnknownEntity {
        /// Entity name.
        entity: String,
    },

    /// The target field does not exist on the entity.
    #[error("field '{entity}.{field}' does not exist")]
    UnknownField {
        /// Entity name.
        entity: String,
        /// Field name.
        field: String,
    },

    /// The field already exists on the entity.
    #[error("field '{entity}.{field}' already exists")]
    DuplicateField {
        /// Entity name.
        entity: String,
        /// Field name.
        field: String,
    },

    /// A value had no mapping during a retype and no fallback was declared.
    #[error("no mapping for value {value} in '{entity}.{field}'")]
    UnmappedValue {
        /// Entity name.
        entity: String,
        /// Field name.
        field: String,
        /// The unmapped value.
        value: Value,
    },

    /// A bounded-retry token transform ran out of attempts.
    ///
    /// Fatal: surfaced to the operator rather than skipped, since skipping
    /// would leave rows without their unique token.
    #[error("token generation for '{entity}.{field}' exhausted {attempts} attempts")]
    CollisionExhausted {
        /// Entity name.
        entity: String,
        /// Field name.
        field: String,
        /// Retry budget that was exhausted.
        attempts: usize,
    },

    /// A data transform declared no reverse.
    #[error("transform '{transform}' is irreversible")]
    Irreversible {
        /// Transform name.
        transform: String,
    },

    /// A data transform failed.
    #[error("transform '{transform}' failed: {message}")]
    TransformFailed {
        /// Transform name.
        transform: String,
        /// Failure description.
        message: String,
    },

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] crate::error::Error),
}

/// Migration-level errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The dependency graph contains a cycle.
    ///
    /// Resolver-time and fatal: no node is applied.
    #[error("dependency cycle among nodes: {}", format_nodes(.nodes))]
    CycleDetected {
        /// Nodes that could not be ordered.
        nodes: Vec<NodeId>,
    },

    /// A node names a dependency not present in the known node set.
    ///
    /// Resolver-time and fatal: no node is applied.
    #[error("node {node} depends on unknown node {dependency}")]
    UnresolvedDependency {
        /// The node with the bad dependency.
        node: NodeId,
        /// The missing dependency.
        dependency: NodeId,
    },

    /// Applying a node failed. Nodes applied before it remain committed.
    #[error("applying {node} failed: {source}")]
    Apply {
        /// The node that failed.
        node: NodeId,
        /// Underlying cause.
        #[source]
        source: OperationError,
    },

    /// Rolling back a node failed.
    #[error("rolling back {node} failed: {source}")]
    Rollback {
        /// The node that failed.
        node: NodeId,
        /// Underlying cause.
        #[source]
        source: OperationError,
    },

    /// The requested node is not in the provided node set.
    #[error("unknown node {node}")]
    UnknownNode {
        /// The missing node.
        node: NodeId,
    },

    /// Storage error outside any single operation.
    #[error("storage error: {0}")]
    Storage(#[from] crate::error::Error),
}

fn format_nodes(nodes: &[NodeId]) -> String {
    let names: Vec<String> = nodes.iter().map(|n| n.to_string()).collect();
    names.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display_lists_nodes() {
        let err = MigrationError::CycleDetected {
            nodes: vec![NodeId::new("a", "0001"), NodeId::new("b", "0001")],
        };
        let text = err.to_string();
        assert!(text.contains("a.0001"));
        assert!(text.contains("b.0001"));
    }

    #[test]
    fn test_apply_error_chains_cause() {
        let err = MigrationError::Apply {
            node: NodeId::new("items", "0002_share_token"),
            source: OperationError::CollisionExhausted {
                entity: "item".into(),
                field: "share_token".into(),
                attempts: 32,
            },
        };
        let text = err.to_string();
        assert!(text.contains("items.0002_share_token"));
        assert!(text.contains("32 attempts"));
    }
}

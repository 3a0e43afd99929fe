//! Migration nodes and identifiers.

use super::op::Operation;

/// Identifier of a migration node: `(namespace, name)`.
///
/// Namespaces group related schema history (one per product area); names are
/// conventionally zero-padded ordinals plus a slug, e.g. `0002_share_token`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    /// Schema namespace ("app") the node belongs to.
    pub namespace: String,
    /// Node name, unique within the namespace.
    pub name: String,
}

impl NodeId {
    /// Create a node identifier.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

/// One migration unit: an identifier, its dependencies, and an ordered
/// operation list.
///
/// Nodes are authored once and treated as immutable after they have been
/// applied in any shared environment (by convention, not enforced).
#[derive(Debug, Clone)]
pub struct MigrationNode {
    /// Node identifier.
    pub id: NodeId,
    /// Nodes that must be applied before this one.
    pub dependencies: Vec<NodeId>,
    /// Operations applied in order within one transactional unit.
    pub operations: Vec<Operation>,
}

impl MigrationNode {
    /// Create a node with no dependencies and no operations.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(namespace, name),
            dependencies: Vec::new(),
            operations: Vec::new(),
        }
    }

    /// Declare a dependency (builder style).
    pub fn depends_on(mut self, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        self.dependencies.push(NodeId::new(namespace, name));
        self
    }

    /// Append an operation (builder style).
    pub fn operation(mut self, op: Operation) -> Self {
        self.operations.push(op);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        let id = NodeId::new("items", "0001_initial");
        assert_eq!(id.to_string(), "items.0001_initial");
    }

    #[test]
    fn test_node_id_ordering_is_lexicographic() {
        let a = NodeId::new("groups", "0002_x");
        let b = NodeId::new("items", "0001_y");
        assert!(a < b);

        let c = NodeId::new("items", "0001_initial");
        let d = NodeId::new("items", "0002_share_token");
        assert!(c < d);
    }

    #[test]
    fn test_builder() {
        let node = MigrationNode::new("sharing", "0001_initial")
            .depends_on("items", "0001_initial")
            .depends_on("groups", "0001_initial");

        assert_eq!(node.id, NodeId::new("sharing", "0001_initial"));
        assert_eq!(node.dependencies.len(), 2);
        assert!(node.operations.is_empty());
    }
}

//! Dependency resolution over the migration graph.
//!
//! Pure computation over declared node metadata: no side effects. The
//! resolver fails before any node is applied, so a bad graph never leaves
//! partial state behind.

use super::error::MigrationError;
use super::node::{MigrationNode, NodeId};
use std::collections::{BTreeMap, BTreeSet};

/// Produce a deterministic application order for a set of nodes.
///
/// The order is a topological sort of the dependency graph. Ties among nodes
/// whose dependencies are all satisfied break lexicographically by
/// `(namespace, name)`, so repeated runs over the same input produce the
/// identical order.
pub fn resolve_order(nodes: &[MigrationNode]) -> Result<Vec<NodeId>, MigrationError> {
    let known: BTreeSet<&NodeId> = nodes.iter().map(|n| &n.id).collect();

    // Dependencies must all resolve before any ordering is attempted.
    // Iterating the map keeps the reported violation deterministic.
    let mut deps: BTreeMap<&NodeId, Vec<&NodeId>> = BTreeMap::new();
    for node in nodes {
        deps.insert(&node.id, node.dependencies.iter().collect());
    }
    for (id, dependencies) in &deps {
        for dep in dependencies {
            if !known.contains(dep) {
                return Err(MigrationError::UnresolvedDependency {
                    node: (*id).clone(),
                    dependency: (*dep).clone(),
                });
            }
        }
    }

    // Kahn's algorithm with an ordered ready set.
    let mut remaining: BTreeMap<&NodeId, usize> = deps
        .iter()
        .map(|(id, dependencies)| (*id, dependencies.len()))
        .collect();
    let mut dependents: BTreeMap<&NodeId, Vec<&NodeId>> = BTreeMap::new();
    for (id, dependencies) in &deps {
        for dep in dependencies {
            dependents.entry(*dep).or_default().push(*id);
        }
    }

    let mut ready: BTreeSet<&NodeId> = remaining
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(id) = ready.iter().next().copied() {
        ready.remove(id);
        order.push(id.clone());

        if let Some(down) = dependents.get(id) {
            for dependent in down {
                if let Some(count) = remaining.get_mut(*dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }
        remaining.remove(id);
    }

    if order.len() < nodes.len() {
        // Whatever could not be ordered participates in (or depends on) a
        // cycle. Ordered nodes were removed from `remaining` as they were
        // popped, so the sorted remainder is exactly the cyclic set.
        let cyclic: Vec<NodeId> = remaining.keys().map(|id| (*id).clone()).collect();
        return Err(MigrationError::CycleDetected { nodes: cyclic });
    }

    Ok(order)
}

/// The target node plus every node that transitively depends on it.
///
/// Rollback unwinds exactly this set, in reverse topological order.
pub(crate) fn dependents_of(nodes: &[MigrationNode], target: &NodeId) -> BTreeSet<NodeId> {
    let mut out: BTreeSet<NodeId> = BTreeSet::new();
    out.insert(target.clone());

    // Fixed point over the (small) node set; the graph is acyclic by the
    // time this is called.
    loop {
        let before = out.len();
        for node in nodes {
            if node.dependencies.iter().any(|dep| out.contains(dep)) {
                out.insert(node.id.clone());
            }
        }
        if out.len() == before {
            return out;
        }
    }
}

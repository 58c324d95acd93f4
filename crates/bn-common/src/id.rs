//! Node identity types and data sentinels.
//!
//! A node is identified by its position in the graph that owns it. Positions
//! are stable: nodes are never removed from a graph once added, so the same
//! `NodeId` refers to the same variable in every model derived from that graph.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel stored in discrete data cells whose value was not observed.
pub const MISSING_VALUE: i32 = -99;

/// Node index wrapper with display formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<usize> for NodeId {
    fn from(index: usize) -> Self {
        NodeId(index)
    }
}

/// Canonical (node, parent set) pair used to key per-family caches.
///
/// Parents are stored sorted and deduplicated, so two keys built from the
/// same set in different orders compare and hash equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FamilyKey {
    node: NodeId,
    parents: Vec<NodeId>,
}

impl FamilyKey {
    pub fn new(node: NodeId, parents: impl IntoIterator<Item = NodeId>) -> Self {
        let mut parents: Vec<NodeId> = parents.into_iter().collect();
        parents.sort_unstable();
        parents.dedup();
        FamilyKey { node, parents }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    /// Number of variables in the factor: the node plus its parents.
    pub fn factor_size(&self) -> usize {
        self.parents.len() + 1
    }
}

impl fmt::Display for FamilyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {{", self.node)?;
        for (i, p) in self.parents.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, "}}")
    }
}

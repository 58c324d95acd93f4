//! Minimal directed acyclic graph.
//!
//! Nodes are addressed by [`NodeId`] (their insertion position) and are never
//! removed, so ids stay valid across copies that only cut edges. Parent lists
//! are kept sorted by id; CPT rows are encoded in that order.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use bn_common::{Error, NodeId, Result};

use crate::variable::{check_categories, CategoricalVariable};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct GraphNode {
    name: String,
    /// Present when the node was added as a typed categorical variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    categories: Option<Vec<String>>,
}

/// A DAG over named nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dag {
    nodes: Vec<GraphNode>,
    parents: Vec<Vec<NodeId>>,
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a DAG from names and `(parent, child)` name pairs.
    pub fn from_edges(names: &[&str], edges: &[(&str, &str)]) -> Result<Self> {
        let mut dag = Dag::new();
        for name in names {
            dag.add_node(*name)?;
        }
        for (from, to) in edges {
            let from = dag.require(from)?;
            let to = dag.require(to)?;
            dag.add_edge(from, to)?;
        }
        Ok(dag)
    }

    /// Add an untyped node. Names must be unique.
    pub fn add_node(&mut self, name: impl Into<String>) -> Result<NodeId> {
        self.push_node(name.into(), None)
    }

    /// Add a node that already carries its category list.
    pub fn add_categorical_node(&mut self, variable: &CategoricalVariable) -> Result<NodeId> {
        self.push_node(
            variable.name().to_string(),
            Some(variable.categories().to_vec()),
        )
    }

    fn push_node(&mut self, name: String, categories: Option<Vec<String>>) -> Result<NodeId> {
        if self.node_by_name(&name).is_some() {
            return Err(Error::Config(format!("duplicate node name {name}")));
        }
        if let Some(ref cats) = categories {
            check_categories(&name, cats)?;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(GraphNode { name, categories });
        self.parents.push(Vec::new());
        Ok(id)
    }

    /// Add `from → to`. Adding an existing edge is a no-op.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        self.check(from)?;
        self.check(to)?;
        if from == to {
            return Err(Error::Config(format!(
                "self loop on {}",
                self.name(from)
            )));
        }
        if self.has_edge(from, to) {
            return Ok(());
        }
        if self.is_ancestor_of(to, from) {
            return Err(Error::Config(format!(
                "edge {} -> {} would create a cycle",
                self.name(from),
                self.name(to)
            )));
        }
        let parents = &mut self.parents[to.0];
        let pos = parents.partition_point(|p| *p < from);
        parents.insert(pos, from);
        Ok(())
    }

    /// Remove `from → to`; returns whether the edge existed.
    pub fn remove_edge(&mut self, from: NodeId, to: NodeId) -> bool {
        let Some(parents) = self.parents.get_mut(to.0) else {
            return false;
        };
        match parents.binary_search(&from) {
            Ok(pos) => {
                parents.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// Cut every edge into `node`; returns the former parents.
    pub fn remove_incoming_edges(&mut self, node: NodeId) -> Vec<NodeId> {
        self.parents
            .get_mut(node.0)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    pub fn has_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.parents
            .get(to.0)
            .is_some_and(|ps| ps.binary_search(&from).is_ok())
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Node ids in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    /// # Panics
    ///
    /// Panics if `node` is not in this graph.
    pub fn name(&self, node: NodeId) -> &str {
        &self.nodes[node.0].name
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name).map(NodeId)
    }

    /// Like [`Dag::node_by_name`] but an unknown name is an error.
    pub fn require(&self, name: &str) -> Result<NodeId> {
        self.node_by_name(name)
            .ok_or_else(|| Error::UnknownNode(name.to_string()))
    }

    /// Categories declared when the node was added, if it is typed.
    pub fn declared_categories(&self, node: NodeId) -> Option<&[String]> {
        self.nodes
            .get(node.0)
            .and_then(|n| n.categories.as_deref())
    }

    /// Parents sorted by id.
    ///
    /// # Panics
    ///
    /// Panics if `node` is not in this graph.
    pub fn parents(&self, node: NodeId) -> &[NodeId] {
        &self.parents[node.0]
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes()
            .filter(|c| self.parents[c.0].binary_search(&node).is_ok())
            .collect()
    }

    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        self.nodes()
            .flat_map(|to| self.parents[to.0].iter().map(move |from| (*from, to)))
            .collect()
    }

    /// True if a directed path `ancestor → … → node` exists (or they are equal).
    pub fn is_ancestor_of(&self, ancestor: NodeId, node: NodeId) -> bool {
        if ancestor == node {
            return true;
        }
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            for p in &self.parents[n.0] {
                if *p == ancestor {
                    return true;
                }
                if !seen[p.0] {
                    seen[p.0] = true;
                    stack.push(*p);
                }
            }
        }
        false
    }

    /// Topological order; ties broken by smallest id.
    pub fn topological_order(&self) -> Vec<NodeId> {
        let n = self.nodes.len();
        let mut in_degree: Vec<usize> = self.parents.iter().map(Vec::len).collect();
        let mut children = vec![Vec::new(); n];
        for to in self.nodes() {
            for from in &self.parents[to.0] {
                children[from.0].push(to);
            }
        }
        let mut ready: VecDeque<NodeId> = self.nodes().filter(|v| in_degree[v.0] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(v) = ready.pop_front() {
            order.push(v);
            for c in &children[v.0] {
                in_degree[c.0] -= 1;
                if in_degree[c.0] == 0 {
                    let pos = ready.partition_point(|r| r < c);
                    ready.insert(pos, *c);
                }
            }
        }
        order
    }

    fn check(&self, node: NodeId) -> Result<()> {
        if node.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(Error::UnknownNode(node.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> Dag {
        Dag::from_edges(
            &["A", "B", "C", "D"],
            &[("A", "B"), ("A", "C"), ("B", "D"), ("C", "D")],
        )
        .unwrap()
    }

    #[test]
    fn parents_are_sorted() {
        let mut dag = Dag::new();
        let a = dag.add_node("A").unwrap();
        let b = dag.add_node("B").unwrap();
        let c = dag.add_node("C").unwrap();
        dag.add_edge(b, c).unwrap();
        dag.add_edge(a, c).unwrap();
        assert_eq!(dag.parents(c), &[a, b]);
    }

    #[test]
    fn rejects_cycles_and_self_loops() {
        let mut dag = diamond();
        let a = dag.require("A").unwrap();
        let d = dag.require("D").unwrap();
        assert!(matches!(dag.add_edge(d, a), Err(Error::Config(_))));
        assert!(matches!(dag.add_edge(a, a), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut dag = Dag::new();
        dag.add_node("A").unwrap();
        assert!(dag.add_node("A").is_err());
    }

    #[test]
    fn duplicate_edge_is_noop() {
        let mut dag = diamond();
        let a = dag.require("A").unwrap();
        let b = dag.require("B").unwrap();
        dag.add_edge(a, b).unwrap();
        assert_eq!(dag.parents(b), &[a]);
    }

    #[test]
    fn topological_order_respects_edges() {
        let dag = Dag::from_edges(&["C", "B", "A"], &[("A", "B"), ("B", "C")]).unwrap();
        let order: Vec<&str> = dag.topological_order().into_iter().map(|n| dag.name(n)).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
    }

    #[test]
    fn remove_incoming_edges_returns_parents() {
        let mut dag = diamond();
        let d = dag.require("D").unwrap();
        let removed = dag.remove_incoming_edges(d);
        assert_eq!(removed.len(), 2);
        assert!(dag.parents(d).is_empty());
        assert_eq!(dag.num_nodes(), 4);
    }

    #[test]
    fn remove_edge_reports_presence() {
        let mut dag = diamond();
        let a = dag.require("A").unwrap();
        let b = dag.require("B").unwrap();
        assert!(dag.remove_edge(a, b));
        assert!(!dag.remove_edge(a, b));
    }

    #[test]
    fn ancestry_and_children() {
        let dag = diamond();
        let a = dag.require("A").unwrap();
        let b = dag.require("B").unwrap();
        let c = dag.require("C").unwrap();
        let d = dag.require("D").unwrap();
        assert!(dag.is_ancestor_of(a, d));
        assert!(!dag.is_ancestor_of(b, c));
        assert_eq!(dag.children(a), vec![b, c]);
        assert_eq!(dag.edges().len(), 4);
    }

    #[test]
    fn typed_nodes_keep_categories() {
        let mut dag = Dag::new();
        let v = CategoricalVariable::new("X", vec!["lo".into(), "hi".into()]).unwrap();
        let x = dag.add_categorical_node(&v).unwrap();
        let y = dag.add_node("Y").unwrap();
        assert_eq!(dag.declared_categories(x).unwrap().len(), 2);
        assert!(dag.declared_categories(y).is_none());
    }

    #[test]
    fn unknown_name_is_error() {
        let dag = diamond();
        assert!(matches!(dag.require("Z"), Err(Error::UnknownNode(_))));
    }

    #[test]
    fn serde_roundtrip() {
        let dag = diamond();
        let json = serde_json::to_string(&dag).unwrap();
        let back: Dag = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dag);
    }
}

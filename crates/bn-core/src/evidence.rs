//! Evidence: per-variable allowed categories plus manipulation flags.
//!
//! Each variable carries a mask over its categories. A full mask is a
//! wildcard (nothing asserted); a single allowed category is an observation;
//! anything in between is a disjunction. Evidence records only the shape of
//! the model it was built for (names and category counts), so it stays a
//! plain value that can be cloned and serialized.

use serde::{Deserialize, Serialize};

use bn_common::{Error, NodeId, Result};

use crate::im::BayesIm;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct VariableAssertion {
    name: String,
    allowed: Vec<bool>,
    manipulated: bool,
}

impl VariableAssertion {
    fn is_wildcard(&self) -> bool {
        self.allowed.iter().all(|a| *a)
    }
}

/// Assertions about every variable of an instantiated model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    variables: Vec<VariableAssertion>,
}

impl Evidence {
    /// Every variable wildcard, none manipulated.
    pub fn tautology(im: &BayesIm) -> Self {
        let variables = im
            .nodes()
            .map(|node| VariableAssertion {
                name: im.pm().name(node).to_string(),
                allowed: vec![true; im.num_cols(node)],
                manipulated: false,
            })
            .collect();
        Self { variables }
    }

    /// Same variable count and, position by position, the same category
    /// counts. Names are not compared.
    pub fn is_compatible_with(&self, im: &BayesIm) -> bool {
        self.variables.len() == im.num_nodes()
            && self
                .variables
                .iter()
                .zip(im.nodes())
                .all(|(v, node)| v.allowed.len() == im.num_cols(node))
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn name(&self, node: NodeId) -> Option<&str> {
        self.variables.get(node.index()).map(|v| v.name.as_str())
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.variables
            .iter()
            .position(|v| v.name == name)
            .map(NodeId)
    }

    /// Observe `node = category`.
    pub fn set_category(&mut self, node: NodeId, category: usize) -> Result<()> {
        let v = self.checked_mut(node, Some(category))?;
        v.allowed.fill(false);
        v.allowed[category] = true;
        Ok(())
    }

    /// Back to a wildcard.
    pub fn clear_variable(&mut self, node: NodeId) -> Result<()> {
        self.checked_mut(node, None)?.allowed.fill(true);
        Ok(())
    }

    /// Widen the disjunction for `node` by one category.
    pub fn add_category(&mut self, node: NodeId, category: usize) -> Result<()> {
        self.checked_mut(node, Some(category))?.allowed[category] = true;
        Ok(())
    }

    /// Narrow the disjunction for `node`. Removing the last allowed category
    /// is rejected.
    pub fn remove_category(&mut self, node: NodeId, category: usize) -> Result<()> {
        let v = self.checked_mut(node, Some(category))?;
        let remaining = v
            .allowed
            .iter()
            .enumerate()
            .filter(|(c, a)| **a && *c != category)
            .count();
        if remaining == 0 {
            return Err(Error::Config(format!(
                "removing category {category} would leave {} with no allowed value",
                v.name
            )));
        }
        v.allowed[category] = false;
        Ok(())
    }

    pub fn set_manipulated(&mut self, node: NodeId, manipulated: bool) -> Result<()> {
        self.checked_mut(node, None)?.manipulated = manipulated;
        Ok(())
    }

    /// The single allowed category, if exactly one is allowed.
    pub fn category(&self, node: NodeId) -> Option<usize> {
        let v = self.variables.get(node.index())?;
        let mut allowed = v.allowed.iter().enumerate().filter(|(_, a)| **a);
        match (allowed.next(), allowed.next()) {
            (Some((c, _)), None) => Some(c),
            _ => None,
        }
    }

    pub fn is_allowed(&self, node: NodeId, category: usize) -> bool {
        self.variables
            .get(node.index())
            .and_then(|v| v.allowed.get(category).copied())
            .unwrap_or(false)
    }

    pub fn is_wildcard(&self, node: NodeId) -> bool {
        self.variables
            .get(node.index())
            .is_some_and(VariableAssertion::is_wildcard)
    }

    pub fn is_manipulated(&self, node: NodeId) -> bool {
        self.variables
            .get(node.index())
            .is_some_and(|v| v.manipulated)
    }

    /// Allowed-category mask for `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node` is out of range.
    pub fn allowed_categories(&self, node: NodeId) -> &[bool] {
        &self.variables[node.index()].allowed
    }

    pub fn manipulated_nodes(&self) -> Vec<NodeId> {
        self.nodes().filter(|n| self.is_manipulated(*n)).collect()
    }

    /// Nodes whose mask is not a wildcard.
    pub fn asserted_nodes(&self) -> Vec<NodeId> {
        self.nodes().filter(|n| !self.is_wildcard(*n)).collect()
    }

    pub fn num_asserted(&self) -> usize {
        self.variables.iter().filter(|v| !v.is_wildcard()).count()
    }

    fn nodes(&self) -> impl Iterator<Item = NodeId> {
        (0..self.variables.len()).map(NodeId)
    }

    fn checked_mut(&mut self, node: NodeId, category: Option<usize>) -> Result<&mut VariableAssertion> {
        let v = self
            .variables
            .get_mut(node.index())
            .ok_or_else(|| Error::Config(format!("evidence has no variable {node}")))?;
        if let Some(c) = category {
            if c >= v.allowed.len() {
                return Err(Error::Config(format!(
                    "category {c} out of range for {} ({} categories)",
                    v.name,
                    v.allowed.len()
                )));
            }
        }
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Dag;
    use crate::pm::BayesPm;

    fn im(cats: usize) -> BayesIm {
        let dag = Dag::from_edges(&["A", "B"], &[("A", "B")]).unwrap();
        BayesIm::manual(BayesPm::with_fixed_categories(dag, cats).unwrap()).unwrap()
    }

    #[test]
    fn tautology_is_all_wildcards() {
        let e = Evidence::tautology(&im(3));
        assert_eq!(e.num_asserted(), 0);
        assert!(e.is_wildcard(NodeId(0)));
        assert_eq!(e.category(NodeId(0)), None);
        assert!(e.manipulated_nodes().is_empty());
    }

    #[test]
    fn compatibility_is_by_shape() {
        let e = Evidence::tautology(&im(3));
        assert!(e.is_compatible_with(&im(3)));
        assert!(!e.is_compatible_with(&im(2)));
        let bigger = Dag::from_edges(&["A", "B", "C"], &[]).unwrap();
        let bigger = BayesIm::manual(BayesPm::with_fixed_categories(bigger, 3).unwrap()).unwrap();
        assert!(!e.is_compatible_with(&bigger));
    }

    #[test]
    fn observation_and_disjunction() {
        let mut e = Evidence::tautology(&im(3));
        let a = NodeId(0);
        e.set_category(a, 1).unwrap();
        assert_eq!(e.category(a), Some(1));
        assert!(!e.is_allowed(a, 0));
        e.add_category(a, 2).unwrap();
        assert_eq!(e.category(a), None);
        assert!(!e.is_wildcard(a));
        assert_eq!(e.asserted_nodes(), vec![a]);
        e.clear_variable(a).unwrap();
        assert!(e.is_wildcard(a));
    }

    #[test]
    fn cannot_remove_last_category() {
        let mut e = Evidence::tautology(&im(2));
        let b = NodeId(1);
        e.set_category(b, 0).unwrap();
        assert!(e.remove_category(b, 0).is_err());
        assert_eq!(e.category(b), Some(0));
        e.clear_variable(b).unwrap();
        e.remove_category(b, 0).unwrap();
        assert_eq!(e.category(b), Some(1));
    }

    #[test]
    fn out_of_range_is_rejected_without_change() {
        let mut e = Evidence::tautology(&im(2));
        let before = e.clone();
        assert!(e.set_category(NodeId(0), 2).is_err());
        assert!(e.set_manipulated(NodeId(5), true).is_err());
        assert_eq!(e, before);
    }

    #[test]
    fn manipulation_flag() {
        let mut e = Evidence::tautology(&im(2));
        e.set_manipulated(NodeId(1), true).unwrap();
        assert!(e.is_manipulated(NodeId(1)));
        assert_eq!(e.manipulated_nodes(), vec![NodeId(1)]);
        assert_eq!(e.node_by_name("B"), Some(NodeId(1)));
    }

    #[test]
    fn copies_are_independent() {
        let e = Evidence::tautology(&im(2));
        let mut copy = e.clone();
        copy.set_category(NodeId(0), 0).unwrap();
        assert!(e.is_wildcard(NodeId(0)));
        let json = serde_json::to_string(&copy).unwrap();
        let back: Evidence = serde_json::from_str(&json).unwrap();
        assert_eq!(back, copy);
    }
}

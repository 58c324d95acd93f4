//! Parametric model: a DAG whose nodes are categorical variables.

use serde::{Deserialize, Serialize};
use tracing::debug;

use bn_common::{Error, NodeId, Result};
use bn_config::CategoryBounds;

use crate::graph::Dag;
use crate::random::{next_in_range, RandomSource};
use crate::variable::{default_category_name, CategoricalVariable};

/// Maps every node of a DAG to a categorical variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BayesPm {
    dag: Dag,
    variables: Vec<CategoricalVariable>,
}

impl BayesPm {
    /// Typed nodes keep their categories; every other node draws a category
    /// count uniformly from `bounds` and gets labels `value1..valueN`.
    ///
    /// Bounds are checked before anything is drawn from `rng`.
    pub fn new(dag: Dag, bounds: CategoryBounds, rng: &mut dyn RandomSource) -> Result<Self> {
        bounds.validate()?;
        let variables = dag
            .nodes()
            .map(|node| match dag.declared_categories(node) {
                Some(cats) => CategoricalVariable::new(dag.name(node), cats.to_vec()),
                None => {
                    let n = next_in_range(rng, bounds.low, bounds.high);
                    CategoricalVariable::with_default_categories(dag.name(node), n)
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { dag, variables })
    }

    /// Every untyped node gets exactly `n` default categories.
    pub fn with_fixed_categories(dag: Dag, n: usize) -> Result<Self> {
        if n == 0 {
            return Err(Error::Config("category count must be positive".into()));
        }
        let variables = dag
            .nodes()
            .map(|node| match dag.declared_categories(node) {
                Some(cats) => CategoricalVariable::new(dag.name(node), cats.to_vec()),
                None => CategoricalVariable::with_default_categories(dag.name(node), n),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { dag, variables })
    }

    /// Build over a new DAG, reusing labels from `old` for nodes whose names
    /// match.
    ///
    /// A matching node draws a fresh count from `bounds`, keeps as many old
    /// labels as fit and fills the remaining slots with default names. A
    /// default name that collides with a kept label is a `DuplicateCategory`
    /// error. Nodes absent from `old` behave as in [`BayesPm::new`].
    pub fn from_previous(
        dag: Dag,
        old: &BayesPm,
        bounds: CategoryBounds,
        rng: &mut dyn RandomSource,
    ) -> Result<Self> {
        bounds.validate()?;
        let mut variables = Vec::with_capacity(dag.num_nodes());
        for node in dag.nodes() {
            let name = dag.name(node);
            if let Some(cats) = dag.declared_categories(node) {
                variables.push(CategoricalVariable::new(name, cats.to_vec())?);
                continue;
            }
            let n = next_in_range(rng, bounds.low, bounds.high);
            let variable = match old.node_by_name(name) {
                Some(old_node) => {
                    let old_cats = old.variable(old_node).categories();
                    let mut cats: Vec<String> =
                        old_cats.iter().take(n).cloned().collect();
                    for slot in cats.len()..n {
                        cats.push(default_category_name(slot));
                    }
                    CategoricalVariable::new(name, cats)?
                }
                None => CategoricalVariable::with_default_categories(name, n)?,
            };
            variables.push(variable);
        }
        debug!(nodes = variables.len(), "built parametric model from previous");
        Ok(Self { dag, variables })
    }

    /// Build over a new DAG, copying the category list of every same-name
    /// node in `old` unchanged. Other nodes get two default categories.
    pub fn with_categories_from(dag: Dag, old: &BayesPm) -> Result<Self> {
        let variables = dag
            .nodes()
            .map(|node| {
                let name = dag.name(node);
                match (dag.declared_categories(node), old.node_by_name(name)) {
                    (Some(cats), _) => CategoricalVariable::new(name, cats.to_vec()),
                    (None, Some(old_node)) => Ok(old.variable(old_node).clone()),
                    (None, None) => CategoricalVariable::with_default_categories(name, 2),
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { dag, variables })
    }

    /// Replace a node's category list. The model is unchanged on error.
    pub fn set_categories(&mut self, node: NodeId, categories: Vec<String>) -> Result<()> {
        let variable = self
            .variables
            .get_mut(node.index())
            .ok_or_else(|| Error::UnknownNode(node.to_string()))?;
        variable.replace_categories(categories)
    }

    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    pub fn num_nodes(&self) -> usize {
        self.variables.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.dag.nodes()
    }

    /// # Panics
    ///
    /// Panics if `node` is not in this model.
    pub fn variable(&self, node: NodeId) -> &CategoricalVariable {
        &self.variables[node.index()]
    }

    pub fn variables(&self) -> &[CategoricalVariable] {
        &self.variables
    }

    pub fn name(&self, node: NodeId) -> &str {
        self.variable(node).name()
    }

    pub fn num_categories(&self, node: NodeId) -> usize {
        self.variable(node).num_categories()
    }

    pub fn category(&self, node: NodeId, index: usize) -> Option<&str> {
        self.variable(node).category(index)
    }

    pub fn category_index(&self, node: NodeId, label: &str) -> Option<usize> {
        self.variable(node).category_index(label)
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.dag.node_by_name(name)
    }
}

//! JSON network documents read and written by the `bnet` binary.
//!
//! ```json
//! {
//!   "schema_version": "1.0.0",
//!   "nodes": [
//!     { "name": "A", "categories": ["no", "yes"], "cpt": [[0.3, 0.7]] },
//!     { "name": "B", "parents": ["A"] }
//!   ]
//! }
//! ```
//!
//! Nodes without `categories` get a category count drawn from the configured
//! bounds. Nodes without `cpt` get random rows. CPT rows follow the model's
//! row encoding: parents in the order the nodes are listed, first parent most
//! significant.

use std::path::Path;

use serde::{Deserialize, Serialize};

use bn_common::schema::is_compatible;
use bn_common::{Error, Result, SCHEMA_VERSION};
use bn_config::CategoryBounds;

use crate::graph::Dag;
use crate::im::BayesIm;
use crate::pm::BayesPm;
use crate::random::RandomSource;
use crate::variable::CategoricalVariable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpt: Option<Vec<Vec<f64>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkFile {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub nodes: Vec<NodeSpec>,
}

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

impl NetworkFile {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_json(&content)
    }

    pub fn parse_json(json: &str) -> Result<Self> {
        let file: NetworkFile = serde_json::from_str(json)?;
        if !is_compatible(&file.schema_version) {
            return Err(Error::Config(format!(
                "unsupported network schema version {} (expected {SCHEMA_VERSION})",
                file.schema_version
            )));
        }
        Ok(file)
    }

    /// Build the DAG and instantiate it.
    pub fn to_model(&self, bounds: CategoryBounds, rng: &mut dyn RandomSource) -> Result<BayesIm> {
        let mut dag = Dag::new();
        for spec in &self.nodes {
            match &spec.categories {
                Some(cats) => {
                    let variable = CategoricalVariable::new(spec.name.as_str(), cats.clone())?;
                    dag.add_categorical_node(&variable)?;
                }
                None => {
                    dag.add_node(spec.name.as_str())?;
                }
            }
        }
        for spec in &self.nodes {
            let child = dag.require(&spec.name)?;
            for parent in &spec.parents {
                let parent = dag.require(parent)?;
                dag.add_edge(parent, child)?;
            }
        }

        let pm = BayesPm::new(dag, bounds, rng)?;
        let mut im = BayesIm::manual(pm)?;
        for (node, spec) in im.nodes().collect::<Vec<_>>().into_iter().zip(&self.nodes) {
            match &spec.cpt {
                Some(rows) => {
                    if rows.len() != im.num_rows(node) {
                        return Err(Error::Config(format!(
                            "node {} expects {} CPT rows, got {}",
                            spec.name,
                            im.num_rows(node),
                            rows.len()
                        )));
                    }
                    for (row, values) in rows.iter().enumerate() {
                        im.set_row(node, row, values)?;
                        im.check_row(node, row)?;
                    }
                }
                None => im.randomize_table(node, rng),
            }
        }
        Ok(im)
    }

    /// Document describing `im` completely.
    pub fn from_model(im: &BayesIm) -> Self {
        let nodes = im
            .nodes()
            .map(|node| NodeSpec {
                name: im.pm().name(node).to_string(),
                categories: Some(im.pm().variable(node).categories().to_vec()),
                parents: im
                    .parents(node)
                    .iter()
                    .map(|p| im.pm().name(*p).to_string())
                    .collect(),
                cpt: Some(
                    (0..im.num_rows(node))
                        .map(|r| im.table(node).row(r).to_vec())
                        .collect(),
                ),
            })
            .collect();
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            nodes,
        }
    }
}

//! Brute-force exact updater.
//!
//! Conditions every CPT on the evidence and answers joint marginals by
//! summing the joint probability of every consistent state.

use bn_common::{Error, NodeId, Result};
use bn_config::InferenceConfig;

use super::enumerate::JointEnumeration;
use super::{
    apply_evidence, check_complete, check_node, check_value, BayesUpdater, Recompute,
    UpdaterState,
};
use crate::evidence::Evidence;
use crate::graph::Dag;
use crate::im::BayesIm;

pub struct RowSummingUpdater<'a> {
    base: &'a BayesIm,
    config: InferenceConfig,
    state: UpdaterState,
}

impl<'a> RowSummingUpdater<'a> {
    pub fn new(base: &'a BayesIm) -> Result<Self> {
        Self::with_config(base, InferenceConfig::default())
    }

    pub fn with_config(base: &'a BayesIm, config: InferenceConfig) -> Result<Self> {
        check_complete(base)?;
        Ok(Self {
            base,
            config,
            state: UpdaterState::Uninitialized,
        })
    }

    pub fn probability_of_evidence(&self) -> Option<f64> {
        self.state.get().map(|s| s.calculator.probability_of_evidence())
    }

    /// Full conditional joint of `nodes` from one enumeration pass.
    ///
    /// Laid out like a CPT row space over `nodes`: mixed radix with the first
    /// node most significant. Every entry is `NaN` when the evidence is
    /// impossible.
    pub fn joint_distribution(&self, nodes: &[NodeId]) -> Result<Vec<f64>> {
        for node in nodes {
            check_node(self.base, *node)?;
        }
        let state = self.state.ready()?;
        let dims: Vec<usize> = nodes.iter().map(|n| self.base.num_cols(*n)).collect();
        let size: usize = dims.iter().product();
        let p_e = state.calculator.probability_of_evidence();
        if p_e <= 0.0 {
            return Ok(vec![f64::NAN; size]);
        }

        let enumeration = JointEnumeration::full(
            &state.manipulated_model,
            Some(&state.evidence),
            self.config.max_joint_states,
        )?;
        let mut joint = vec![0.0; size];
        enumeration.run(|case, weight| {
            let index = nodes
                .iter()
                .zip(&dims)
                .fold(0, |acc, (n, dim)| acc * dim + case[n.index()]);
            joint[index] += weight;
        });
        for p in &mut joint {
            *p /= p_e;
        }
        Ok(joint)
    }

    /// `P(pa(node) = r, node = c | evidence)`, laid out like the node's CPT
    /// in the manipulated model. Every entry is `NaN` when the evidence is
    /// impossible.
    ///
    /// Unlike [`Self::joint_distribution`] this needs no new enumeration:
    /// the conditioned row times its parent-context weight is the family
    /// joint.
    pub fn family_distribution(&self, node: NodeId) -> Result<Vec<f64>> {
        check_node(self.base, node)?;
        let calculator = &self.state.ready()?.calculator;
        let model = calculator.model();
        let cols = model.num_cols(node);
        let size = model.num_rows(node) * cols;
        if calculator.probability_of_evidence() <= 0.0 {
            return Ok(vec![f64::NAN; size]);
        }
        Ok((0..size)
            .map(|cell| {
                let row = cell / cols;
                calculator.row_weight(node, row) * model.probability(node, row, cell % cols)
            })
            .collect())
    }
}

impl BayesUpdater for RowSummingUpdater<'_> {
    fn base_model(&self) -> &BayesIm {
        self.base
    }

    fn set_evidence(&mut self, evidence: Evidence) -> Result<()> {
        let (state, _) = apply_evidence(
            self.base,
            evidence,
            self.config.max_joint_states,
            Recompute::All,
        )?;
        self.state = UpdaterState::Ready(Box::new(state));
        Ok(())
    }

    fn clear_evidence(&mut self) {
        self.state = UpdaterState::Uninitialized;
    }

    fn evidence(&self) -> Option<&Evidence> {
        self.state.get().map(|s| &s.evidence)
    }

    fn marginal(&self, node: NodeId, value: usize) -> Result<f64> {
        check_value(self.base, node, value)?;
        Ok(self.state.ready()?.calculator.marginal(node, value))
    }

    /// Repeating a node with conflicting values gives probability zero.
    fn joint_marginal(&self, nodes: &[NodeId], values: &[usize]) -> Result<f64> {
        if nodes.len() != values.len() {
            return Err(Error::Config(format!(
                "{} nodes but {} values in joint marginal query",
                nodes.len(),
                values.len()
            )));
        }
        for (node, value) in nodes.iter().zip(values) {
            check_value(self.base, *node, *value)?;
        }
        let state = self.state.ready()?;
        let p_e = state.calculator.probability_of_evidence();
        if p_e <= 0.0 {
            return Ok(f64::NAN);
        }

        let enumeration = JointEnumeration::full(
            &state.manipulated_model,
            Some(&state.evidence),
            self.config.max_joint_states,
        )?;
        let mut matched = 0.0;
        enumeration.run(|case, weight| {
            if nodes.iter().zip(values).all(|(n, v)| case[n.index()] == *v) {
                matched += weight;
            }
        });
        Ok(matched / p_e)
    }

    fn updated_model(&self) -> Option<&BayesIm> {
        self.state.get().map(|s| s.calculator.model())
    }

    fn manipulated_graph(&self) -> Option<&Dag> {
        self.state.get().map(|s| &s.manipulated_graph)
    }
}

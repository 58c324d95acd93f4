//! Updater that only recomputes CPTs whose conditioning context changed.
//!
//! A node with no asserted evidence on itself or any descendant satisfies
//! `P(X | pa(X), E) = P(X | pa(X))` in the manipulated graph, so its rows are
//! copied unchanged into the updated model. The enumeration covers only the
//! asserted nodes and their ancestors, which conditions exactly those nodes.
//! Parent-context weights for the remaining nodes come from forward
//! propagation out of the enumerated boundary. Marginals then combine the
//! updated rows with the evidence-weighted parent contexts.
//!
//! Joint marginals over several variables are not available from this
//! representation and are rejected.

use serde::{Deserialize, Serialize};

use bn_common::{Error, NodeId, Result};
use bn_config::InferenceConfig;

use super::{
    apply_evidence, check_complete, check_value, BayesUpdater, Recompute, UpdaterState,
};
use crate::evidence::Evidence;
use crate::graph::Dag;
use crate::im::BayesIm;

/// Counters for the most recent update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateStats {
    /// Nodes whose rows were conditioned on the evidence.
    pub recomputed_nodes: usize,
    /// Nodes whose rows were copied from the manipulated model.
    pub reused_nodes: usize,
    /// Joint states visited by the enumeration.
    pub states_visited: u64,
    /// Frontier states read while propagating into reused nodes.
    pub propagated_states: u64,
    pub probability_of_evidence: f64,
}

pub struct InvariantUpdater<'a> {
    base: &'a BayesIm,
    config: InferenceConfig,
    state: UpdaterState,
    stats: UpdateStats,
}

impl<'a> InvariantUpdater<'a> {
    pub fn new(base: &'a BayesIm) -> Result<Self> {
        Self::with_config(base, InferenceConfig::default())
    }

    /// Fails when `base` still has unknown probabilities.
    pub fn with_config(base: &'a BayesIm, config: InferenceConfig) -> Result<Self> {
        check_complete(base)?;
        Ok(Self {
            base,
            config,
            state: UpdaterState::Uninitialized,
            stats: UpdateStats::default(),
        })
    }

    /// Stats for the last successful `set_evidence`.
    pub fn stats(&self) -> &UpdateStats {
        &self.stats
    }

    /// The model built over the manipulated graph, before conditioning.
    pub fn manipulated_model(&self) -> Option<&BayesIm> {
        self.state.get().map(|s| &s.manipulated_model)
    }

    pub fn probability_of_evidence(&self) -> Option<f64> {
        self.state.get().map(|s| s.calculator.probability_of_evidence())
    }
}

impl BayesUpdater for InvariantUpdater<'_> {
    fn base_model(&self) -> &BayesIm {
        self.base
    }

    fn set_evidence(&mut self, evidence: Evidence) -> Result<()> {
        let (state, stats) = apply_evidence(
            self.base,
            evidence,
            self.config.max_joint_states,
            Recompute::Affected,
        )?;
        self.state = UpdaterState::Ready(Box::new(state));
        self.stats = stats;
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

    fn joint_marginal(&self, _nodes: &[NodeId], _values: &[usize]) -> Result<f64> {
        Err(Error::UnsupportedOperation(
            "joint marginals are not supported by the invariant updater".into(),
        ))
    }

    fn updated_model(&self) -> Option<&BayesIm> {
        self.state.get().map(|s| s.calculator.model())
    }

    fn manipulated_graph(&self) -> Option<&Dag> {
        self.state.get().map(|s| &s.manipulated_graph)
    }
}

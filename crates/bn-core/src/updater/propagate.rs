//! Forward propagation into nodes the enumeration did not visit.
//!
//! An untallied node has no evidence on itself or any descendant, so its CPT
//! is unchanged by the evidence. Only its parent-context weights
//! `P(pa(X) = r | E)` are needed. They are computed from the posterior joint
//! of the boundary nodes by pushing a frontier distribution through the
//! untallied nodes in topological order. A variable leaves the frontier as
//! soon as its last untallied child has been processed.

use std::collections::BTreeMap;

use bn_common::{Error, NodeId, Result};

use super::enumerate::FamilyTally;
use crate::im::{BayesIm, CptTable};

/// Parent-context weights for the untallied nodes.
#[derive(Debug, Clone)]
pub(crate) struct PropagatedWeights {
    /// `Some` for every untallied node once propagation has run.
    pub(crate) row_weights: Vec<Option<Vec<f64>>>,
    /// Frontier states read while computing the weights.
    pub(crate) states_visited: u64,
}

/// Joint distribution over a changing set of variables.
struct Frontier {
    vars: Vec<NodeId>,
    states: BTreeMap<Vec<usize>, f64>,
}

impl Frontier {
    fn positions(&self, im: &BayesIm, nodes: &[NodeId]) -> Result<Vec<usize>> {
        nodes
            .iter()
            .map(|n| {
                self.vars.iter().position(|v| v == n).ok_or_else(|| {
                    Error::UnsupportedOperation(format!(
                        "{} is not reachable from the evidence boundary",
                        im.pm().name(*n)
                    ))
                })
            })
            .collect()
    }

    fn row(table: &CptTable, positions: &[usize], key: &[usize]) -> usize {
        positions
            .iter()
            .zip(table.parent_dims())
            .fold(0, |row, (i, dim)| row * dim + key[*i])
    }

    /// Add `node`, drawing its value from its CPT row in each state.
    fn extend(&mut self, node: NodeId, table: &CptTable, positions: &[usize], max_states: u64) -> Result<()> {
        let mut next = BTreeMap::new();
        for (key, p) in &self.states {
            let row = table.row(Self::row(table, positions, key));
            for (value, q) in row.iter().enumerate() {
                if *q <= 0.0 {
                    continue;
                }
                let mut extended = key.clone();
                extended.push(value);
                next.insert(extended, p * q);
            }
            if next.len() as u64 > max_states {
                return Err(Error::UnsupportedOperation(format!(
                    "propagation frontier exceeds the limit of {max_states} states"
                )));
            }
        }
        self.vars.push(node);
        self.states = next;
        Ok(())
    }

    /// Sum `node` out.
    fn retire(&mut self, node: NodeId) {
        let Some(i) = self.vars.iter().position(|v| *v == node) else {
            return;
        };
        self.vars.remove(i);
        let mut next: BTreeMap<Vec<usize>, f64> = BTreeMap::new();
        for (mut key, p) in std::mem::take(&mut self.states) {
            key.remove(i);
            *next.entry(key).or_insert(0.0) += p;
        }
        self.states = next;
    }
}

/// Weights for every node `tally` left out. Nothing is propagated when the
/// evidence is impossible.
pub(crate) fn propagate_forward(im: &BayesIm, tally: &FamilyTally, max_states: u64) -> Result<PropagatedWeights> {
    let mut out = PropagatedWeights {
        row_weights: vec![None; im.num_nodes()],
        states_visited: 0,
    };
    let p_e = tally.probability_of_evidence;
    let untallied: Vec<NodeId> = im
        .dag()
        .topological_order()
        .into_iter()
        .filter(|n| !tally.is_tallied(*n))
        .collect();
    if untallied.is_empty() || p_e <= 0.0 {
        return Ok(out);
    }

    // Untallied children still to be processed, per variable.
    let mut pending = vec![0usize; im.num_nodes()];
    for node in &untallied {
        for parent in im.parents(*node) {
            pending[parent.index()] += 1;
        }
    }

    let mut frontier = Frontier {
        vars: tally.boundary.clone(),
        states: tally
            .boundary_joint
            .iter()
            .map(|(key, mass)| (key.clone(), mass / p_e))
            .collect(),
    };

    for node in untallied {
        let table = im.table(node);
        let positions = frontier.positions(im, table.parents())?;
        let mut weights = vec![0.0; table.num_rows()];
        for (key, p) in &frontier.states {
            weights[Frontier::row(table, &positions, key)] += p;
        }
        out.states_visited += frontier.states.len() as u64;
        out.row_weights[node.index()] = Some(weights);

        if pending[node.index()] > 0 {
            frontier.extend(node, table, &positions, max_states)?;
        }
        for parent in table.parents() {
            pending[parent.index()] -= 1;
            if pending[parent.index()] == 0 {
                frontier.retire(*parent);
            }
        }
    }
    Ok(out)
}

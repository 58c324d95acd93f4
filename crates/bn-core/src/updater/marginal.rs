//! Single-variable marginals from an updated model.

use serde::{Deserialize, Serialize};

use bn_common::{NodeId, Result};

use super::enumerate::FamilyTally;
use super::propagate::PropagatedWeights;
use crate::im::BayesIm;

/// Updated CPTs together with the parent-context weights needed to turn them
/// into marginals.
///
/// `P(X = v | E) = Σ_r U[X][r][v] · P(pa(X) = r | E)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginalCalculator {
    model: BayesIm,
    row_weights: Vec<Vec<f64>>,
    probability_of_evidence: f64,
}

impl MarginalCalculator {
    /// Condition every tallied node on the evidence captured by `tally`.
    /// Untallied nodes keep the rows of `manipulated` and take their
    /// parent-context weights from `propagated`.
    ///
    /// A tallied row whose parent context has zero mass keeps the
    /// manipulated row.
    pub(crate) fn build(
        manipulated: &BayesIm,
        tally: &FamilyTally,
        propagated: PropagatedWeights,
    ) -> Result<Self> {
        let p_e = tally.probability_of_evidence;
        let mut model = manipulated.clone();
        let mut row_weights = Vec::with_capacity(model.num_nodes());
        let mut propagated = propagated.row_weights.into_iter();

        for node in manipulated.nodes() {
            let forwarded = propagated.next().flatten();
            let Some(joint) = &tally.joint[node.index()] else {
                row_weights.push(forwarded.unwrap_or_else(|| vec![0.0; model.num_rows(node)]));
                continue;
            };
            let cols = model.num_cols(node);
            let mut weights = Vec::with_capacity(model.num_rows(node));
            for (row, cells) in joint.chunks(cols).enumerate() {
                let mass: f64 = cells.iter().sum();
                weights.push(if p_e > 0.0 { mass / p_e } else { 0.0 });
                if mass > 0.0 {
                    let conditioned: Vec<f64> = cells.iter().map(|c| c / mass).collect();
                    model.set_row(node, row, &conditioned)?;
                }
            }
            row_weights.push(weights);
        }

        Ok(Self {
            model,
            row_weights,
            probability_of_evidence: p_e,
        })
    }

    pub fn model(&self) -> &BayesIm {
        &self.model
    }

    pub fn probability_of_evidence(&self) -> f64 {
        self.probability_of_evidence
    }

    /// `P(pa(node) = row | E)`.
    pub fn row_weight(&self, node: NodeId, row: usize) -> f64 {
        self.row_weights[node.index()][row]
    }

    /// `NaN` when the evidence is impossible.
    pub fn marginal(&self, node: NodeId, value: usize) -> f64 {
        if self.probability_of_evidence <= 0.0 {
            return f64::NAN;
        }
        self.row_weights[node.index()]
            .iter()
            .enumerate()
            .map(|(row, w)| w * self.model.probability(node, row, value))
            .sum()
    }

    pub fn marginals(&self, node: NodeId) -> Vec<f64> {
        (0..self.model.num_cols(node))
            .map(|v| self.marginal(node, v))
            .collect()
    }
}

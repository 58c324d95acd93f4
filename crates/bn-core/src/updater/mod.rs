//! Exact belief updating.
//!
//! Both updaters work on the *manipulated* model: the base model with every
//! incoming edge of a manipulated node cut. They differ in what they
//! recompute:
//!
//! - [`RowSummingUpdater`] conditions every CPT on the evidence and answers
//!   joint marginals by enumeration.
//! - [`InvariantUpdater`] enumerates only the ancestors of asserted nodes,
//!   propagates forward into the rest, and answers single-variable marginals
//!   only.

mod enumerate;
mod invariant;
mod manipulate;
mod marginal;
mod propagate;
mod row_summing;

pub use invariant::{InvariantUpdater, UpdateStats};
pub use manipulate::{manipulated_graph, manipulated_model};
pub use marginal::MarginalCalculator;
pub use row_summing::RowSummingUpdater;

use tracing::{debug, warn};

use bn_common::{Error, NodeId, Result};

use crate::evidence::Evidence;
use crate::graph::Dag;
use crate::im::BayesIm;

/// Common surface of the exact updaters.
pub trait BayesUpdater {
    /// The model evidence is applied to.
    fn base_model(&self) -> &BayesIm;

    /// Replace the current evidence and rebuild every derived model.
    ///
    /// On error the updater keeps its previous state.
    fn set_evidence(&mut self, evidence: Evidence) -> Result<()>;

    /// Drop the evidence and every derived model.
    fn clear_evidence(&mut self);

    fn evidence(&self) -> Option<&Evidence>;

    /// `P(node = value | evidence)`. `NaN` when the evidence has probability
    /// zero.
    fn marginal(&self, node: NodeId, value: usize) -> Result<f64>;

    /// `P(nodes = values | evidence)`.
    fn joint_marginal(&self, nodes: &[NodeId], values: &[usize]) -> Result<f64>;

    /// CPTs conditioned on the current evidence.
    fn updated_model(&self) -> Option<&BayesIm>;

    fn manipulated_graph(&self) -> Option<&Dag>;

    /// Marginal over every category of `node` under the current evidence.
    fn calculate_updated_marginals(&self, node: NodeId) -> Result<Vec<f64>> {
        let cols = self.base_model().num_cols(check_node(self.base_model(), node)?);
        (0..cols).map(|c| self.marginal(node, c)).collect()
    }

    /// Marginal over every category of `node` with no evidence. The current
    /// evidence is restored afterwards, also when the computation fails.
    fn calculate_prior_marginals(&mut self, node: NodeId) -> Result<Vec<f64>> {
        let tautology = Evidence::tautology(self.base_model());
        with_temporary_evidence(self, tautology, |u| u.calculate_updated_marginals(node))
    }
}

/// Run `f` under `evidence`, then put the previous evidence back.
///
/// The restore runs whether or not `f` succeeds. An updater that had no
/// evidence is cleared again.
pub fn with_temporary_evidence<U, T>(
    updater: &mut U,
    evidence: Evidence,
    f: impl FnOnce(&U) -> Result<T>,
) -> Result<T>
where
    U: BayesUpdater + ?Sized,
{
    let saved = updater.evidence().cloned();
    updater.set_evidence(evidence)?;
    let out = f(updater);
    match saved {
        Some(previous) => updater.set_evidence(previous)?,
        None => updater.clear_evidence(),
    }
    out
}

// ── Shared update pipeline ──────────────────────────────────────────────

/// Everything derived from one `set_evidence` call.
#[derive(Debug, Clone)]
pub(crate) struct UpdatedState {
    pub(crate) evidence: Evidence,
    pub(crate) manipulated_graph: Dag,
    pub(crate) manipulated_model: BayesIm,
    pub(crate) calculator: MarginalCalculator,
}

#[derive(Debug, Clone, Default)]
pub(crate) enum UpdaterState {
    #[default]
    Uninitialized,
    Ready(Box<UpdatedState>),
}

impl UpdaterState {
    pub(crate) fn ready(&self) -> Result<&UpdatedState> {
        match self {
            UpdaterState::Ready(state) => Ok(state),
            UpdaterState::Uninitialized => Err(not_ready()),
        }
    }

    pub(crate) fn get(&self) -> Option<&UpdatedState> {
        self.ready().ok()
    }
}

/// Which nodes the enumeration covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recompute {
    All,
    /// Asserted nodes and their ancestors; the rest is reached by forward
    /// propagation.
    Affected,
}

/// Validate, manipulate, enumerate and condition. Nothing is returned on
/// error, so callers keep their previous state.
pub(crate) fn apply_evidence(
    base: &BayesIm,
    evidence: Evidence,
    max_states: u64,
    recompute: Recompute,
) -> Result<(UpdatedState, UpdateStats)> {
    if !evidence.is_compatible_with(base) {
        return Err(Error::IncompatibleEvidence(format!(
            "evidence covers {} variables, model has {} nodes with different category counts",
            evidence.num_variables(),
            base.num_nodes()
        )));
    }

    let (manipulated_graph, manipulated_model) =
        manipulate::manipulated_model(base, &evidence, max_states)?;

    let asserted = evidence.asserted_nodes();
    let order = match recompute {
        Recompute::All => manipulated_graph.topological_order(),
        Recompute::Affected => enumerate::ancestral_order(&manipulated_graph, &asserted),
    };
    let mut tallied = vec![false; base.num_nodes()];
    for node in &order {
        tallied[node.index()] = true;
    }
    // Tallied nodes that condition some untallied child.
    let boundary: Vec<NodeId> = order
        .iter()
        .copied()
        .filter(|n| manipulated_graph.children(*n).iter().any(|c| !tallied[c.index()]))
        .collect();

    let tally = enumerate::tally_families(&manipulated_model, &evidence, order, boundary, max_states)?;
    let propagated = propagate::propagate_forward(&manipulated_model, &tally, max_states)?;
    let propagated_states = propagated.states_visited;
    let calculator = MarginalCalculator::build(&manipulated_model, &tally, propagated)?;

    let recomputed_nodes = tally.num_tallied();
    let stats = UpdateStats {
        recomputed_nodes,
        reused_nodes: base.num_nodes() - recomputed_nodes,
        states_visited: tally.states_visited,
        propagated_states,
        probability_of_evidence: tally.probability_of_evidence,
    };
    if tally.probability_of_evidence <= 0.0 {
        warn!(
            asserted = asserted.len(),
            "evidence has probability zero; marginals are undefined"
        );
    }
    debug!(
        asserted = asserted.len(),
        manipulated = evidence.manipulated_nodes().len(),
        recomputed = stats.recomputed_nodes,
        reused = stats.reused_nodes,
        states = stats.states_visited,
        propagated = stats.propagated_states,
        "evidence applied"
    );

    Ok((
        UpdatedState {
            evidence,
            manipulated_graph,
            manipulated_model,
            calculator,
        },
        stats,
    ))
}

// ── Argument checks ─────────────────────────────────────────────────────

pub(crate) fn check_node(im: &BayesIm, node: NodeId) -> Result<NodeId> {
    if node.index() < im.num_nodes() {
        Ok(node)
    } else {
        Err(Error::UnknownNode(node.to_string()))
    }
}

pub(crate) fn check_value(im: &BayesIm, node: NodeId, value: usize) -> Result<()> {
    check_node(im, node)?;
    if value < im.num_cols(node) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "category {value} out of range for {}",
            im.pm().name(node)
        )))
    }
}

pub(crate) fn not_ready() -> Error {
    Error::UnsupportedOperation("no evidence has been set on this updater".into())
}

/// Every row of the base model must be a finished distribution.
pub(crate) fn check_complete(im: &BayesIm) -> Result<()> {
    im.check_rows().map_err(|e| match e {
        Error::Config(msg) => Error::Config(format!("cannot update model: {msg}")),
        other => other,
    })
}

//! Building the manipulated graph and model for a piece of evidence.

use tracing::debug;

use bn_common::{NodeId, Result};
use bn_math::normalize_in_place;

use super::enumerate::{ancestral_order, JointEnumeration};
use crate::evidence::Evidence;
use crate::graph::Dag;
use crate::im::{BayesIm, Initialization};
use crate::pm::BayesPm;

/// Copy of `dag` with every incoming edge of a manipulated node removed.
pub fn manipulated_graph(dag: &Dag, evidence: &Evidence) -> Dag {
    let mut graph = dag.clone();
    for node in evidence.manipulated_nodes() {
        graph.remove_incoming_edges(node);
    }
    graph
}

/// Model over [`manipulated_graph`].
///
/// Nodes whose parent set is unchanged keep the base CPT. Each manipulated
/// node gets one row: its prior marginal in `base`, restricted to the
/// categories the evidence allows and renormalized. The fill depends only on
/// `base` and `evidence`, so rebuilding for the same evidence reproduces the
/// same tables.
pub fn manipulated_model(base: &BayesIm, evidence: &Evidence, max_states: u64) -> Result<(Dag, BayesIm)> {
    let graph = manipulated_graph(base.dag(), evidence);
    let pm = BayesPm::with_categories_from(graph.clone(), base.pm())?;
    let mut im = BayesIm::from_previous(pm, base, Initialization::Manual)?;

    let manipulated = evidence.manipulated_nodes();
    if manipulated.is_empty() {
        return Ok((graph, im));
    }

    let priors = prior_marginals(base, &manipulated, max_states)?;
    for (node, mut row) in manipulated.iter().copied().zip(priors) {
        for (c, p) in row.iter_mut().enumerate() {
            if !evidence.is_allowed(node, c) {
                *p = 0.0;
            }
        }
        if row.iter().all(|p| *p == 0.0) {
            // Allowed categories all have prior zero: spread evenly over them.
            for (c, p) in row.iter_mut().enumerate() {
                *p = if evidence.is_allowed(node, c) { 1.0 } else { 0.0 };
            }
        }
        normalize_in_place(&mut row);
        im.set_row(node, 0, &row)?;
    }
    debug!(manipulated = manipulated.len(), "built manipulated model");
    Ok((graph, im))
}

/// Unconditional marginals of `targets` in `im`, enumerating only their
/// ancestors.
pub(crate) fn prior_marginals(im: &BayesIm, targets: &[NodeId], max_states: u64) -> Result<Vec<Vec<f64>>> {
    let order = ancestral_order(im.dag(), targets);
    let enumeration = JointEnumeration::new(im, order, None, max_states)?;
    let mut marginals: Vec<Vec<f64>> = targets.iter().map(|t| vec![0.0; im.num_cols(*t)]).collect();
    enumeration.run(|case, weight| {
        for (target, marginal) in targets.iter().zip(marginals.iter_mut()) {
            marginal[case[target.index()]] += weight;
        }
    });
    Ok(marginals)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> BayesIm {
        let dag = Dag::from_edges(&["A", "B", "C"], &[("A", "B"), ("B", "C")]).unwrap();
        let pm = BayesPm::with_fixed_categories(dag, 2).unwrap();
        BayesIm::from_rows(
            pm,
            vec![
                vec![vec![0.3, 0.7]],
                vec![vec![0.9, 0.1], vec![0.2, 0.8]],
                vec![vec![0.6, 0.4], vec![0.5, 0.5]],
            ],
        )
        .unwrap()
    }

    #[test]
    fn graph_loses_incoming_edges_only() {
        let im = chain();
        let mut e = Evidence::tautology(&im);
        e.set_manipulated(NodeId(1), true).unwrap();
        let g = manipulated_graph(im.dag(), &e);
        assert!(g.parents(NodeId(1)).is_empty());
        assert_eq!(g.parents(NodeId(2)), &[NodeId(1)]);
    }

    #[test]
    fn manipulated_node_gets_prior_row() {
        let im = chain();
        let mut e = Evidence::tautology(&im);
        e.set_manipulated(NodeId(1), true).unwrap();
        let (_, m) = manipulated_model(&im, &e, 1 << 10).unwrap();
        assert_eq!(m.num_rows(NodeId(1)), 1);
        // P(B = 0) = 0.3 * 0.9 + 0.7 * 0.2
        assert!((m.probability(NodeId(1), 0, 0) - 0.41).abs() < 1e-12);
        assert_eq!(m.table(NodeId(2)), im.table(NodeId(2)));
    }

    #[test]
    fn manipulated_and_observed_is_point_mass() {
        let im = chain();
        let mut e = Evidence::tautology(&im);
        e.set_manipulated(NodeId(1), true).unwrap();
        e.set_category(NodeId(1), 1).unwrap();
        let (_, m) = manipulated_model(&im, &e, 1 << 10).unwrap();
        assert_eq!(m.table(NodeId(1)).row(0), &[0.0, 1.0]);
    }

    #[test]
    fn no_manipulation_copies_model() {
        let im = chain();
        let e = Evidence::tautology(&im);
        let (g, m) = manipulated_model(&im, &e, 1 << 10).unwrap();
        assert_eq!(&g, im.dag());
        assert_eq!(m, im);
    }
}

//! Depth-first enumeration of joint states.
//!
//! Nodes are assigned in topological order, so every parent is fixed before
//! its child's CPT row is read. Categories outside the evidence mask and
//! zero-probability branches are pruned. Each complete assignment is passed
//! to the visitor with its joint probability.

use std::collections::BTreeMap;

use bn_common::{Error, NodeId, Result};

use crate::evidence::Evidence;
use crate::graph::Dag;
use crate::im::BayesIm;

/// Nodes that are ancestors of (or equal to) some target, in topological
/// order. Summing over the rest of the network contributes a factor of one.
pub(crate) fn ancestral_order(dag: &Dag, targets: &[NodeId]) -> Vec<NodeId> {
    dag.topological_order()
        .into_iter()
        .filter(|n| targets.iter().any(|t| dag.is_ancestor_of(*n, *t)))
        .collect()
}

pub(crate) struct JointEnumeration<'a> {
    im: &'a BayesIm,
    order: Vec<NodeId>,
    evidence: Option<&'a Evidence>,
}

impl<'a> JointEnumeration<'a> {
    /// `order` must be topological and closed under parents.
    pub(crate) fn new(
        im: &'a BayesIm,
        order: Vec<NodeId>,
        evidence: Option<&'a Evidence>,
        max_states: u64,
    ) -> Result<Self> {
        let states = order.iter().fold(1u64, |acc, node| {
            let allowed = match evidence {
                Some(e) => e.allowed_categories(*node).iter().filter(|a| **a).count(),
                None => im.num_cols(*node),
            };
            acc.saturating_mul(allowed as u64)
        });
        if states > max_states {
            return Err(Error::UnsupportedOperation(format!(
                "joint state space of {states} exceeds the limit of {max_states}"
            )));
        }
        Ok(Self {
            im,
            order,
            evidence,
        })
    }

    /// Over every node of `im`.
    pub(crate) fn full(
        im: &'a BayesIm,
        evidence: Option<&'a Evidence>,
        max_states: u64,
    ) -> Result<Self> {
        Self::new(im, im.dag().topological_order(), evidence, max_states)
    }

    /// Visit every consistent state; returns the total probability mass,
    /// which is `P(evidence)`.
    ///
    /// The slice handed to `visit` is indexed by node id. Entries for nodes
    /// outside the enumeration order are zero.
    pub(crate) fn run(&self, mut visit: impl FnMut(&[usize], f64)) -> f64 {
        let mut case = vec![0usize; self.im.num_nodes()];
        let mut total = 0.0;
        self.walk(0, 1.0, &mut case, &mut |case, weight| {
            total += weight;
            visit(case, weight);
        });
        total
    }

    fn walk(&self, depth: usize, weight: f64, case: &mut [usize], visit: &mut dyn FnMut(&[usize], f64)) {
        let Some(node) = self.order.get(depth).copied() else {
            visit(case, weight);
            return;
        };
        let table = self.im.table(node);
        let row = table.row_of_case(case);
        for (c, p) in table.row(row).iter().enumerate() {
            if *p <= 0.0 {
                continue;
            }
            if let Some(e) = self.evidence {
                if !e.is_allowed(node, c) {
                    continue;
                }
            }
            case[node.index()] = c;
            self.walk(depth + 1, weight * p, case, visit);
        }
        case[node.index()] = 0;
    }
}

/// Joint mass of the tallied families, `P(X = c, pa(X) = r, evidence)`, laid
/// out like each node's CPT, plus the total `P(evidence)`.
///
/// `boundary_joint` holds the unnormalized joint of the boundary nodes, keyed
/// by their values in `boundary` order.
pub(crate) struct FamilyTally {
    pub(crate) joint: Vec<Option<Vec<f64>>>,
    pub(crate) boundary: Vec<NodeId>,
    pub(crate) boundary_joint: BTreeMap<Vec<usize>, f64>,
    pub(crate) probability_of_evidence: f64,
    pub(crate) states_visited: u64,
}

impl FamilyTally {
    pub(crate) fn is_tallied(&self, node: NodeId) -> bool {
        self.joint[node.index()].is_some()
    }

    pub(crate) fn num_tallied(&self) -> usize {
        self.joint.iter().filter(|j| j.is_some()).count()
    }
}

/// Enumerate the nodes of `order` under `evidence`, tallying the family of
/// each one.
///
/// `order` must be topological and closed under parents. Nodes outside it
/// must not carry evidence; they are summed out for free.
pub(crate) fn tally_families(
    im: &BayesIm,
    evidence: &Evidence,
    order: Vec<NodeId>,
    boundary: Vec<NodeId>,
    max_states: u64,
) -> Result<FamilyTally> {
    let mut joint: Vec<Option<Vec<f64>>> = vec![None; im.num_nodes()];
    for node in &order {
        joint[node.index()] = Some(vec![0.0; im.num_rows(*node) * im.num_cols(*node)]);
    }
    let tallied = order.clone();
    let enumeration = JointEnumeration::new(im, order, Some(evidence), max_states)?;

    let mut boundary_joint: BTreeMap<Vec<usize>, f64> = BTreeMap::new();
    let mut states_visited = 0u64;
    let probability_of_evidence = enumeration.run(|case, weight| {
        states_visited += 1;
        for node in &tallied {
            if let Some(cells) = joint[node.index()].as_mut() {
                let table = im.table(*node);
                let row = table.row_of_case(case);
                cells[row * table.num_cols() + case[node.index()]] += weight;
            }
        }
        let key: Vec<usize> = boundary.iter().map(|n| case[n.index()]).collect();
        *boundary_joint.entry(key).or_insert(0.0) += weight;
    });
    Ok(FamilyTally {
        joint,
        boundary,
        boundary_joint,
        probability_of_evidence,
        states_visited,
    })
}

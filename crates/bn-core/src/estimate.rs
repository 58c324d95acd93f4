//! CPT estimation from discrete data.
//!
//! [`ml_estimate`] counts complete cases per family. [`em_estimate`] also
//! uses incomplete cases and latent nodes: each round spreads every
//! incomplete case over the completions consistent with its observed values
//! under the current estimate, then re-normalizes the expected counts.

use tracing::{debug, warn};

use bn_common::{Error, NodeId, Result};
use bn_math::normalize;

use crate::data::DiscreteData;
use crate::evidence::Evidence;
use crate::im::BayesIm;
use crate::pm::BayesPm;
use crate::random::RandomSource;
use crate::updater::{BayesUpdater, RowSummingUpdater};

/// Rounds after which [`em_estimate`] stops even if it has not converged.
pub const MAX_EM_ITERATIONS: usize = 500;

/// Estimate every CPT of `pm` from complete-case family counts.
///
/// `pseudo_count` is added to every cell before normalizing (0 gives the
/// plain maximum-likelihood estimate). A row with no data and no pseudo
/// count becomes uniform. Cases missing the child or any parent are skipped
/// for that family only.
pub fn ml_estimate<D: DiscreteData + ?Sized>(pm: BayesPm, data: &D, pseudo_count: f64) -> Result<BayesIm> {
    if !(pseudo_count >= 0.0 && pseudo_count.is_finite()) {
        return Err(Error::Config(format!(
            "pseudo count must be a finite non-negative number, got {pseudo_count}"
        )));
    }

    let columns = pm
        .nodes()
        .map(|node| {
            data.column_of(pm.name(node))
                .map(Some)
                .ok_or_else(|| Error::UnknownVariable(pm.name(node).to_string()))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut im = BayesIm::manual(pm)?;
    let nodes: Vec<NodeId> = im.nodes().collect();
    for node in nodes {
        let Some(counts) = family_counts(&im, node, &columns, data, pseudo_count)? else {
            continue;
        };
        for (row, cells) in counts.chunks(im.num_cols(node)).enumerate() {
            im.set_row(node, row, &normalize(cells))?;
        }
    }
    debug!(nodes = im.num_nodes(), cases = data.num_rows(), pseudo_count, "estimated model");
    Ok(im)
}

/// Expectation-maximization estimate of every CPT of `pm`.
///
/// Nodes without a data column are latent: missing in every case. The
/// estimate starts from random rows, and rows of families observed together
/// in at least one case are seeded with their complete-case frequencies.
/// Rounds repeat until the Euclidean distance between successive parameter
/// vectors is at most `threshold`, or [`MAX_EM_ITERATIONS`] is reached.
///
/// A case that has probability zero under the current estimate is an
/// [`Error::NumericalInstability`].
pub fn em_estimate<D: DiscreteData + ?Sized>(
    pm: BayesPm,
    data: &D,
    threshold: f64,
    rng: &mut dyn RandomSource,
) -> Result<BayesIm> {
    if !(threshold > 0.0 && threshold.is_finite()) {
        return Err(Error::Config(format!(
            "EM threshold must be a finite positive number, got {threshold}"
        )));
    }
    let columns: Vec<Option<usize>> = pm.nodes().map(|n| data.column_of(pm.name(n))).collect();
    let latent = columns.iter().filter(|c| c.is_none()).count();

    let mut current = BayesIm::random(pm, rng)?;
    let nodes: Vec<NodeId> = current.nodes().collect();
    let mut seeded = 0usize;
    for node in nodes {
        let Some(counts) = family_counts(&current, node, &columns, data, 0.0)? else {
            continue;
        };
        for (row, cells) in counts.chunks(current.num_cols(node)).enumerate() {
            if cells.iter().sum::<f64>() > 0.0 {
                current.set_row(node, row, &normalize(cells))?;
                seeded += 1;
            }
        }
    }

    let cases = observed_cases(&current, &columns, data)?;
    let mut distance = f64::INFINITY;
    let mut iterations = 0usize;
    while distance > threshold {
        if iterations == MAX_EM_ITERATIONS {
            warn!(iterations, distance, threshold, "EM stopped before converging");
            break;
        }
        let next = em_round(&current, &cases)?;
        distance = parameter_distance(&current, &next);
        current = next;
        iterations += 1;
    }
    debug!(iterations, distance, latent, seeded_rows = seeded, cases = cases.len(), "EM estimate finished");
    Ok(current)
}

/// Complete-case counts for one family plus `pseudo_count` per cell, or
/// `None` when a family member has no column.
fn family_counts<D: DiscreteData + ?Sized>(
    im: &BayesIm,
    node: NodeId,
    columns: &[Option<usize>],
    data: &D,
    pseudo_count: f64,
) -> Result<Option<Vec<f64>>> {
    let Some(child_column) = columns[node.index()] else {
        return Ok(None);
    };
    let Some(family_columns) = im
        .parents(node)
        .iter()
        .map(|p| columns[p.index()])
        .collect::<Option<Vec<usize>>>()
    else {
        return Ok(None);
    };
    let cols = im.num_cols(node);
    let dims = im.parent_dims(node);
    let mut counts = vec![pseudo_count; im.num_rows(node) * cols];

    'cases: for case in 0..data.num_rows() {
        let Some(value) = category(data, case, child_column, cols)? else {
            continue;
        };
        let mut row = 0;
        for (col, dim) in family_columns.iter().zip(dims) {
            match category(data, case, *col, *dim)? {
                Some(v) => row = row * dim + v,
                None => continue 'cases,
            }
        }
        counts[row * cols + value] += 1.0;
    }
    Ok(Some(counts))
}

/// Observed value per node for every case; latent nodes are always `None`.
fn observed_cases<D: DiscreteData + ?Sized>(
    im: &BayesIm,
    columns: &[Option<usize>],
    data: &D,
) -> Result<Vec<Vec<Option<usize>>>> {
    (0..data.num_rows())
        .map(|case| {
            im.nodes()
                .map(|node| match columns[node.index()] {
                    Some(col) => category(data, case, col, im.num_cols(node)),
                    None => Ok(None),
                })
                .collect()
        })
        .collect()
}

/// One expectation step over every case followed by the maximization step.
fn em_round(current: &BayesIm, cases: &[Vec<Option<usize>>]) -> Result<BayesIm> {
    let mut counts: Vec<Vec<f64>> = current
        .nodes()
        .map(|n| vec![0.0; current.num_rows(n) * current.num_cols(n)])
        .collect();
    let mut updater = RowSummingUpdater::new(current)?;

    for (case, values) in cases.iter().enumerate() {
        let mut hidden = Vec::new();
        for node in current.nodes() {
            let parents: Option<Vec<usize>> =
                current.parents(node).iter().map(|p| values[p.index()]).collect();
            match (values[node.index()], parents) {
                (Some(v), Some(pv)) => {
                    let row = current.row_index(node, &pv);
                    counts[node.index()][row * current.num_cols(node) + v] += 1.0;
                }
                _ => hidden.push(node),
            }
        }
        if hidden.is_empty() {
            continue;
        }

        let mut evidence = Evidence::tautology(current);
        for (node, value) in current.nodes().zip(values) {
            if let Some(v) = value {
                evidence.set_category(node, *v)?;
            }
        }
        updater.set_evidence(evidence)?;
        for node in hidden {
            let expected = updater.family_distribution(node)?;
            if expected.iter().any(|p| p.is_nan()) {
                return Err(Error::NumericalInstability(format!(
                    "case {case} has probability zero under the current estimate"
                )));
            }
            for (cell, p) in counts[node.index()].iter_mut().zip(expected) {
                *cell += p;
            }
        }
    }

    let mut next = current.clone();
    for (node, cells) in current.nodes().zip(&counts) {
        for (row, row_cells) in cells.chunks(current.num_cols(node)).enumerate() {
            next.set_row(node, row, &normalize(row_cells))?;
        }
    }
    Ok(next)
}

/// Euclidean distance between the parameter vectors of two models over the
/// same structure.
fn parameter_distance(a: &BayesIm, b: &BayesIm) -> f64 {
    a.nodes()
        .flat_map(|node| {
            let cells = a.num_rows(node) * a.num_cols(node);
            (0..cells).map(move |cell| (node, cell))
        })
        .map(|(node, cell)| {
            let cols = a.num_cols(node);
            let d = a.probability(node, cell / cols, cell % cols)
                - b.probability(node, cell / cols, cell % cols);
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

fn category<D: DiscreteData + ?Sized>(data: &D, case: usize, col: usize, dim: usize) -> Result<Option<usize>> {
    if data.is_missing(case, col) {
        return Ok(None);
    }
    let value = data.get_int(case, col);
    match usize::try_from(value) {
        Ok(v) if v < dim => Ok(Some(v)),
        _ => Err(Error::Config(format!(
            "data value {value} in column {col} exceeds {dim} categories"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DiscreteDataSet;
    use crate::graph::Dag;
    use crate::random::SeededRandom;
    use bn_common::MISSING_VALUE;

    fn pm() -> BayesPm {
        let dag = Dag::from_edges(&["A", "B"], &[("A", "B")]).unwrap();
        BayesPm::with_fixed_categories(dag, 2).unwrap()
    }

    #[test]
    fn counts_are_normalized() {
        let pm = pm();
        let data = DiscreteDataSet::from_rows(
            pm.variables().to_vec(),
            &[vec![0, 0], vec![0, 1], vec![0, 1], vec![1, 1]],
        )
        .unwrap();
        let im = ml_estimate(pm, &data, 0.0).unwrap();
        assert!((im.probability(NodeId(0), 0, 0) - 0.75).abs() < 1e-12);
        assert!((im.probability(NodeId(1), 0, 1) - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(im.table(NodeId(1)).row(1), &[0.0, 1.0]);
    }

    #[test]
    fn empty_rows_are_uniform_and_missing_skipped() {
        let pm = pm();
        let data = DiscreteDataSet::from_rows(
            pm.variables().to_vec(),
            &[vec![0, 0], vec![MISSING_VALUE, 1]],
        )
        .unwrap();
        let im = ml_estimate(pm, &data, 0.0).unwrap();
        assert_eq!(im.table(NodeId(1)).row(1), &[0.5, 0.5]);
        assert_eq!(im.table(NodeId(1)).row(0), &[1.0, 0.0]);
    }

    #[test]
    fn pseudo_count_smooths() {
        let pm = pm();
        let data = DiscreteDataSet::from_rows(pm.variables().to_vec(), &[vec![0, 0]]).unwrap();
        let im = ml_estimate(pm, &data, 1.0).unwrap();
        assert!((im.probability(NodeId(0), 0, 0) - 2.0 / 3.0).abs() < 1e-12);
        assert!(ml_estimate(im.pm().clone(), &data, -1.0).is_err());
    }

    #[test]
    fn recovers_simulating_model() {
        let truth = BayesIm::from_rows(
            pm(),
            vec![vec![vec![0.35, 0.65]], vec![vec![0.8, 0.2], vec![0.3, 0.7]]],
        )
        .unwrap();
        let data = truth.simulate_data(20_000, &mut SeededRandom::new(21)).unwrap();
        let im = ml_estimate(pm(), &data, 0.0).unwrap();
        for node in im.nodes() {
            for row in 0..im.num_rows(node) {
                for col in 0..im.num_cols(node) {
                    let diff = (im.probability(node, row, col) - truth.probability(node, row, col)).abs();
                    assert!(diff < 0.03, "{node} row {row} col {col} off by {diff}");
                }
            }
        }
    }

    fn chain_truth() -> BayesIm {
        let dag = Dag::from_edges(&["A", "B", "C"], &[("A", "B"), ("B", "C")]).unwrap();
        let pm = BayesPm::with_fixed_categories(dag, 2).unwrap();
        BayesIm::from_rows(
            pm,
            vec![
                vec![vec![0.35, 0.65]],
                vec![vec![0.8, 0.2], vec![0.3, 0.7]],
                vec![vec![0.9, 0.1], vec![0.25, 0.75]],
            ],
        )
        .unwrap()
    }

    #[test]
    fn em_on_complete_data_matches_ml() {
        let truth = chain_truth();
        let data = truth.simulate_data(500, &mut SeededRandom::new(31)).unwrap();
        let ml = ml_estimate(truth.pm().clone(), &data, 0.0).unwrap();
        let em = em_estimate(truth.pm().clone(), &data, 1e-8, &mut SeededRandom::new(5)).unwrap();
        for node in ml.nodes() {
            for row in 0..ml.num_rows(node) {
                for col in 0..ml.num_cols(node) {
                    let diff = (ml.probability(node, row, col) - em.probability(node, row, col)).abs();
                    assert!(diff < 1e-12, "{node} row {row} col {col} off by {diff}");
                }
            }
        }
    }

    #[test]
    fn em_recovers_parameters_with_missing_cells() {
        let truth = chain_truth();
        let mut data = truth.simulate_data(5_000, &mut SeededRandom::new(32)).unwrap();
        // Hide B in every third case and A in every fifth.
        for case in 0..data.num_rows() {
            if case % 3 == 0 {
                data.set_int(case, 1, MISSING_VALUE).unwrap();
            }
            if case % 5 == 0 {
                data.set_int(case, 0, MISSING_VALUE).unwrap();
            }
        }
        let im = em_estimate(truth.pm().clone(), &data, 1e-5, &mut SeededRandom::new(6)).unwrap();
        assert!(im.check_rows().is_ok());
        for node in im.nodes() {
            for row in 0..im.num_rows(node) {
                for col in 0..im.num_cols(node) {
                    let diff = (im.probability(node, row, col) - truth.probability(node, row, col)).abs();
                    assert!(diff < 0.05, "{node} row {row} col {col} off by {diff}");
                }
            }
        }
    }

    #[test]
    fn latent_parent_reproduces_observed_marginal() {
        // A has no column; only B is observed.
        let pm = pm();
        let b_only = vec![pm.variables()[1].clone()];
        let rows: Vec<Vec<i32>> = (0..40).map(|i| vec![i32::from(i % 4 == 0)]).collect();
        let data = DiscreteDataSet::from_rows(b_only, &rows).unwrap();

        let im = em_estimate(pm, &data, 1e-9, &mut SeededRandom::new(7)).unwrap();
        let p_b1: f64 = (0..2)
            .map(|a| im.probability(NodeId(0), 0, a) * im.probability(NodeId(1), a, 1))
            .sum();
        assert!((p_b1 - 0.25).abs() < 1e-9, "P(B = 1) = {p_b1}");
    }

    #[test]
    fn em_threshold_must_be_positive() {
        let data = DiscreteDataSet::from_rows(pm().variables().to_vec(), &[vec![0, 0]]).unwrap();
        for threshold in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                em_estimate(pm(), &data, threshold, &mut SeededRandom::new(1)),
                Err(Error::Config(_))
            ));
        }
    }
}

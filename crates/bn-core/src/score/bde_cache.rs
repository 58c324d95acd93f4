//! Memoized BDe family scores.
//!
//! Structure search rescans the same `(node, parents)` factors across many
//! candidate graphs. The cache computes each factor's BDe log score once per
//! data set and answers every later request from a map keyed by
//! [`FamilyKey`], so parent order never matters.
//!
//! # Counting
//!
//! Without a companion model, counts come from complete cases only: a case
//! with the child or any parent missing is skipped. With a companion
//! [`BayesIm`], complete cases still count one each, while an incomplete case
//! spreads one unit of expected count over the cells consistent with its
//! observed values, using a [`RowSummingUpdater`] conditioned on that case.
//! The finished table is then scaled by the number of cases.
//!
//! # Layout
//!
//! Count tables are row-major. Rows enumerate parent configurations with the
//! parents taken in ascending id order and the first parent most significant.
//!
//! # Log-gamma failures
//!
//! A term whose log-gamma cannot be evaluated is handled per
//! [`LnGammaPolicy`]: counted as zero with a warning, or turned into
//! [`Error::NumericalInstability`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use bn_common::{Error, FamilyKey, NodeId, Result};
use bn_config::{InferenceConfig, LnGammaPolicy, ScoringConfig};
use bn_math::{bde_factor_score, flat_factor_prior, FactorScore};

use crate::data::DiscreteData;
use crate::evidence::Evidence;
use crate::im::{encode_row, BayesIm};
use crate::pm::BayesPm;
use crate::updater::{BayesUpdater, RowSummingUpdater};

// ── Stats ───────────────────────────────────────────────────────────────

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Score requests answered from the map.
    pub hits: u64,
    /// Score requests that computed a new entry.
    pub misses: u64,
    /// Full passes over the data set.
    pub dataset_scans: u64,
    /// Scores currently cached.
    pub entries: usize,
    /// Log-gamma terms that failed to evaluate.
    pub lngamma_failures: u64,
}

// ── Family resolution ───────────────────────────────────────────────────

/// A family resolved against the data set and the candidate model.
struct Family {
    child_column: usize,
    parent_columns: Vec<usize>,
    parent_dims: Vec<usize>,
    num_rows: usize,
    num_cols: usize,
}

// ── Cache ───────────────────────────────────────────────────────────────

/// BDe score cache over one data set.
///
/// Node ids passed to the cache refer to `pm`. Names connect them to data
/// columns and to the candidate models supplied per call.
pub struct BdeMetricCache<'d, D: DiscreteData + ?Sized> {
    data: &'d D,
    pm: BayesPm,
    scoring: ScoringConfig,
    inference: InferenceConfig,
    scores: HashMap<FamilyKey, f64>,
    score_counts: HashMap<FamilyKey, usize>,
    hits: u64,
    misses: u64,
    dataset_scans: u64,
    lngamma_failures: u64,
}

impl<'d, D: DiscreteData + ?Sized> BdeMetricCache<'d, D> {
    pub fn new(data: &'d D, pm: BayesPm) -> Self {
        Self::with_config(data, pm, ScoringConfig::default(), InferenceConfig::default())
    }

    pub fn with_config(
        data: &'d D,
        pm: BayesPm,
        scoring: ScoringConfig,
        inference: InferenceConfig,
    ) -> Self {
        Self {
            data,
            pm,
            scoring,
            inference,
            scores: HashMap::new(),
            score_counts: HashMap::new(),
            hits: 0,
            misses: 0,
            dataset_scans: 0,
            lngamma_failures: 0,
        }
    }

    pub fn pm(&self) -> &BayesPm {
        &self.pm
    }

    /// BDe log score of `node` given `parents`.
    ///
    /// A cached value is returned without touching the data. On a miss the
    /// table shape comes from `candidate_pm`; `candidate_im`, when present,
    /// supplies expected counts for incomplete cases.
    pub fn score(
        &mut self,
        node: NodeId,
        parents: &[NodeId],
        candidate_pm: &BayesPm,
        candidate_im: Option<&BayesIm>,
    ) -> Result<f64> {
        let key = FamilyKey::new(node, parents.iter().copied());
        if let Some(score) = self.scores.get(&key) {
            self.hits += 1;
            return Ok(*score);
        }
        self.misses += 1;

        let family = self.resolve(&key, candidate_pm)?;
        let observed = match candidate_im {
            None => self.complete_case_counts(&family)?,
            Some(im) => self.expected_counts(&key, &family, im)?,
        };

        let prior = vec![flat_factor_prior(family.num_rows, family.num_cols); observed.len()];
        let factor = bde_factor_score(&prior, &observed, family.num_rows, family.num_cols);
        self.apply_lngamma_policy(&key, &factor)?;

        debug!(
            family = %key,
            rows = family.num_rows,
            cols = family.num_cols,
            score = factor.score,
            "scored family"
        );
        self.scores.insert(key, factor.score);
        Ok(factor.score)
    }

    /// Number of factors in the family, `|parents| + 1`, cached per key.
    pub fn score_count(&mut self, node: NodeId, parents: &[NodeId]) -> usize {
        let key = FamilyKey::new(node, parents.iter().copied());
        *self
            .score_counts
            .entry(key)
            .or_insert_with_key(|k| k.factor_size())
    }

    /// Counts for a family under the companion model, uncached.
    pub fn observed_counts(
        &mut self,
        node: NodeId,
        parents: &[NodeId],
        candidate_pm: &BayesPm,
        candidate_im: &BayesIm,
    ) -> Result<Vec<f64>> {
        let key = FamilyKey::new(node, parents.iter().copied());
        let family = self.resolve(&key, candidate_pm)?;
        self.expected_counts(&key, &family, candidate_im)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            dataset_scans: self.dataset_scans,
            entries: self.scores.len(),
            lngamma_failures: self.lngamma_failures,
        }
    }

    /// Drop every cached score and count.
    pub fn invalidate(&mut self) {
        self.scores.clear();
        self.score_counts.clear();
    }

    /// Count and log failed terms; under `Propagate` any failure rejects the
    /// score before it is cached.
    fn apply_lngamma_policy(&mut self, key: &FamilyKey, factor: &FactorScore) -> Result<()> {
        for failure in &factor.failures {
            self.lngamma_failures += 1;
            warn!(family = %key, error = %failure, "log-gamma term failed while scoring");
        }
        if !factor.is_clean() && self.scoring.lngamma_policy == LnGammaPolicy::Propagate {
            return Err(Error::NumericalInstability(format!(
                "{} log-gamma term(s) failed while scoring {key}",
                factor.failures.len()
            )));
        }
        Ok(())
    }

    fn resolve(&self, key: &FamilyKey, candidate_pm: &BayesPm) -> Result<Family> {
        let child_name = self.name_of(key.node())?;
        let child_column = self.column(child_name)?;
        let num_cols = candidate_pm.num_categories(candidate_pm.dag().require(child_name)?);

        let mut parent_columns = Vec::with_capacity(key.parents().len());
        let mut parent_dims = Vec::with_capacity(key.parents().len());
        let mut num_rows = 1usize;
        for parent in key.parents() {
            let name = self.name_of(*parent)?;
            parent_columns.push(self.column(name)?);
            let dim = candidate_pm.num_categories(candidate_pm.dag().require(name)?);
            parent_dims.push(dim);
            num_rows = num_rows.checked_mul(dim).ok_or_else(|| {
                Error::Config(format!("count table for {key} is too large"))
            })?;
        }

        Ok(Family {
            child_column,
            parent_columns,
            parent_dims,
            num_rows,
            num_cols,
        })
    }

    fn name_of(&self, node: NodeId) -> Result<&str> {
        if node.index() < self.pm.num_nodes() {
            Ok(self.pm.name(node))
        } else {
            Err(Error::UnknownNode(node.to_string()))
        }
    }

    fn column(&self, name: &str) -> Result<usize> {
        self.data
            .column_of(name)
            .ok_or_else(|| Error::UnknownVariable(name.to_string()))
    }

    /// Category value at `(case, column)` checked against `dim`; `None` when
    /// missing.
    fn value(&self, case: usize, column: usize, dim: usize) -> Result<Option<usize>> {
        if self.data.is_missing(case, column) {
            return Ok(None);
        }
        let value = self.data.get_int(case, column);
        match usize::try_from(value) {
            Ok(v) if v < dim => Ok(Some(v)),
            _ => Err(Error::Config(format!(
                "data value {value} in column {column} exceeds {dim} categories"
            ))),
        }
    }

    /// Child and parent values of one case, `None` entries for missing cells.
    fn case_values(&self, case: usize, family: &Family) -> Result<(Option<usize>, Vec<Option<usize>>)> {
        let child = self.value(case, family.child_column, family.num_cols)?;
        let parents = family
            .parent_columns
            .iter()
            .zip(&family.parent_dims)
            .map(|(col, dim)| self.value(case, *col, *dim))
            .collect::<Result<Vec<_>>>()?;
        Ok((child, parents))
    }

    fn complete_case_counts(&mut self, family: &Family) -> Result<Vec<f64>> {
        self.dataset_scans += 1;
        let mut counts = vec![0.0; family.num_rows * family.num_cols];
        let mut skipped = 0usize;
        for case in 0..self.data.num_rows() {
            let (child, parents) = self.case_values(case, family)?;
            let complete: Option<Vec<usize>> = parents.into_iter().collect();
            match (child, complete) {
                (Some(c), Some(pv)) => {
                    let row = encode_row(&family.parent_dims, &pv);
                    counts[row * family.num_cols + c] += 1.0;
                }
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            debug!(skipped, "skipped incomplete cases while counting");
        }
        Ok(counts)
    }

    fn expected_counts(&mut self, key: &FamilyKey, family: &Family, im: &BayesIm) -> Result<Vec<f64>> {
        let child_name = self.name_of(key.node())?;
        let im_child = im.dag().require(child_name)?;
        let mut im_family = Vec::with_capacity(key.parents().len() + 1);
        for parent in key.parents() {
            im_family.push(im.dag().require(self.name_of(*parent)?)?);
        }
        im_family.push(im_child);

        let im_dims: Vec<usize> = im_family.iter().map(|n| im.num_cols(*n)).collect();
        let mut table_dims = family.parent_dims.clone();
        table_dims.push(family.num_cols);
        if im_dims != table_dims {
            return Err(Error::Config(format!(
                "companion model categories for {key} do not match the candidate model"
            )));
        }

        // Data column → companion model node, for building per-case evidence.
        let column_nodes: Vec<Option<NodeId>> = self
            .data
            .variables()
            .iter()
            .map(|v| im.node_by_name(v.name()))
            .collect();

        let mut updater = RowSummingUpdater::with_config(im, self.inference.clone())?;
        self.dataset_scans += 1;
        let num_cases = self.data.num_rows();
        let mut counts = vec![0.0; family.num_rows * family.num_cols];
        let mut incomplete = 0usize;

        for case in 0..num_cases {
            let (child, parents) = self.case_values(case, family)?;
            if let (Some(c), Some(pv)) = (child, parents.iter().copied().collect::<Option<Vec<_>>>()) {
                let row = encode_row(&family.parent_dims, &pv);
                counts[row * family.num_cols + c] += 1.0;
                continue;
            }
            incomplete += 1;

            let mut evidence = Evidence::tautology(im);
            for (column, node) in column_nodes.iter().enumerate() {
                let Some(node) = node else { continue };
                if let Some(v) = self.value(case, column, im.num_cols(*node))? {
                    evidence.set_category(*node, v)?;
                }
            }
            updater.set_evidence(evidence)?;

            // Joint over (parents…, child): row-major exactly like `counts`.
            let joint = updater.joint_distribution(&im_family)?;
            if joint.iter().any(|p| p.is_nan()) {
                return Err(Error::NumericalInstability(format!(
                    "case {case} has probability zero under the companion model"
                )));
            }
            for (cell, p) in joint.iter().enumerate() {
                counts[cell] += p;
            }
        }

        for count in &mut counts {
            *count *= num_cases as f64;
        }
        debug!(family = %key, incomplete, num_cases, "computed expected counts");
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DiscreteDataSet;
    use crate::graph::Dag;
    use bn_common::MISSING_VALUE;
    use bn_math::{ln_gamma, LnGammaError};

    fn pm() -> BayesPm {
        let dag = Dag::from_edges(&["A", "B"], &[("A", "B")]).unwrap();
        BayesPm::with_fixed_categories(dag, 2).unwrap()
    }

    fn data(rows: &[Vec<i32>]) -> DiscreteDataSet {
        DiscreteDataSet::from_rows(pm().variables().to_vec(), rows).unwrap()
    }

    #[test]
    fn empty_parent_score_matches_closed_form() {
        let d = data(&[vec![0, 0], vec![0, 1], vec![1, 1]]);
        let pm = pm();
        let mut cache = BdeMetricCache::new(&d, pm.clone());
        let score = cache.score(NodeId(0), &[], &pm, None).unwrap();
        // One row, two cells with prior 0.5 each; counts 2 and 1.
        let expected = ln_gamma(1.0).unwrap() - ln_gamma(4.0).unwrap()
            + ln_gamma(2.5).unwrap() - ln_gamma(0.5).unwrap()
            + ln_gamma(1.5).unwrap() - ln_gamma(0.5).unwrap();
        assert!((score - expected).abs() < 1e-10);
    }

    fn failed_factor() -> FactorScore {
        FactorScore {
            score: -3.5,
            failures: vec![LnGammaError::NonPositive(0.0), LnGammaError::NotFinite(f64::NAN)],
        }
    }

    #[test]
    fn zero_contribution_policy_counts_failures() {
        let d = data(&[vec![0, 0]]);
        let mut cache = BdeMetricCache::new(&d, pm());
        let key = FamilyKey::new(NodeId(1), [NodeId(0)]);
        cache.apply_lngamma_policy(&key, &failed_factor()).unwrap();
        assert_eq!(cache.stats().lngamma_failures, 2);

        let clean = FactorScore {
            score: -1.0,
            failures: Vec::new(),
        };
        cache.apply_lngamma_policy(&key, &clean).unwrap();
        assert_eq!(cache.stats().lngamma_failures, 2);
    }

    #[test]
    fn propagate_policy_rejects_failed_terms() {
        let d = data(&[vec![0, 0]]);
        let scoring = ScoringConfig {
            lngamma_policy: LnGammaPolicy::Propagate,
        };
        let mut cache = BdeMetricCache::with_config(&d, pm(), scoring, InferenceConfig::default());
        let key = FamilyKey::new(NodeId(1), [NodeId(0)]);
        let err = cache.apply_lngamma_policy(&key, &failed_factor()).unwrap_err();
        assert!(matches!(err, Error::NumericalInstability(_)));
        assert!(err.to_string().contains("2 log-gamma term(s)"));
        assert_eq!(cache.stats().lngamma_failures, 2);
        assert_eq!(cache.stats().entries, 0);

        // Clean factors still pass, so real scores are unaffected.
        let pm = pm();
        assert!(cache.score(NodeId(1), &[NodeId(0)], &pm, None).is_ok());
        assert_eq!(cache.stats().entries, 1);
    }

    #[test]
    fn hit_skips_the_data() {
        let d = data(&[vec![0, 0], vec![1, 1]]);
        let pm = pm();
        let mut cache = BdeMetricCache::new(&d, pm.clone());
        let first = cache.score(NodeId(1), &[NodeId(0)], &pm, None).unwrap();
        let second = cache.score(NodeId(1), &[NodeId(0)], &pm, None).unwrap();
        assert_eq!(first.to_bits(), second.to_bits());
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.dataset_scans, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn complete_case_policy_skips_missing() {
        let d = data(&[vec![0, 0], vec![MISSING_VALUE, 1], vec![1, MISSING_VALUE]]);
        let only_complete = data(&[vec![0, 0]]);
        let pm = pm();
        let a = BdeMetricCache::new(&d, pm.clone())
            .score(NodeId(1), &[NodeId(0)], &pm, None)
            .unwrap();
        let b = BdeMetricCache::new(&only_complete, pm.clone())
            .score(NodeId(1), &[NodeId(0)], &pm, None)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_variable_is_reported() {
        let d = DiscreteDataSet::from_rows(vec![pm().variables()[0].clone()], &[vec![0]]).unwrap();
        let pm = pm();
        let mut cache = BdeMetricCache::new(&d, pm.clone());
        let err = cache.score(NodeId(1), &[NodeId(0)], &pm, None).unwrap_err();
        assert!(matches!(err, Error::UnknownVariable(ref n) if n == "B"));
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn score_count_is_family_size() {
        let d = data(&[]);
        let mut cache = BdeMetricCache::new(&d, pm());
        assert_eq!(cache.score_count(NodeId(1), &[NodeId(0)]), 2);
        assert_eq!(cache.score_count(NodeId(0), &[]), 1);
    }

    #[test]
    fn companion_model_on_complete_data_scales_counts() {
        let d = data(&[vec![0, 0], vec![1, 1], vec![1, 0]]);
        let pm = pm();
        let im = BayesIm::from_rows(
            pm.clone(),
            vec![vec![vec![0.5, 0.5]], vec![vec![0.5, 0.5], vec![0.5, 0.5]]],
        )
        .unwrap();
        let mut cache = BdeMetricCache::new(&d, pm.clone());
        let counts = cache.observed_counts(NodeId(1), &[NodeId(0)], &pm, &im).unwrap();
        assert_eq!(counts, vec![3.0, 0.0, 3.0, 3.0]);
    }

    #[test]
    fn companion_model_spreads_incomplete_cases() {
        let d = data(&[vec![0, MISSING_VALUE], vec![MISSING_VALUE, 1]]);
        let pm = pm();
        let im = BayesIm::from_rows(
            pm.clone(),
            vec![vec![vec![0.5, 0.5]], vec![vec![0.8, 0.2], vec![0.4, 0.6]]],
        )
        .unwrap();
        let mut cache = BdeMetricCache::new(&d, pm.clone());
        let counts = cache.observed_counts(NodeId(1), &[NodeId(0)], &pm, &im).unwrap();
        // Each incomplete case adds one unit before scaling by two cases.
        let total: f64 = counts.iter().sum();
        assert!((total - 4.0).abs() < 1e-12);
        // Case 1 (A=0): B split 0.8 / 0.2 in row 0.
        assert!((counts[0] - 1.6).abs() < 1e-12);
        // Case 2 (B=1): A posterior 0.2/0.8 and 0.6/0.8.
        assert!((counts[1] - 2.0 * (0.2 + 0.25)).abs() < 1e-12);
        assert!((counts[3] - 2.0 * 0.75).abs() < 1e-12);
    }

    #[test]
    fn parent_order_does_not_matter() {
        let dag = Dag::from_edges(&["A", "B", "C"], &[("A", "C"), ("B", "C")]).unwrap();
        let pm = BayesPm::with_fixed_categories(dag, 2).unwrap();
        let d = DiscreteDataSet::from_rows(
            pm.variables().to_vec(),
            &[vec![0, 1, 1], vec![1, 1, 0], vec![0, 0, 0]],
        )
        .unwrap();
        let mut cache = BdeMetricCache::new(&d, pm.clone());
        let ab = cache.score(NodeId(2), &[NodeId(0), NodeId(1)], &pm, None).unwrap();
        let ba = cache.score(NodeId(2), &[NodeId(1), NodeId(0)], &pm, None).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(cache.stats().hits, 1);
    }
}

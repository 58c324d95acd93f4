//! Instantiated model: one conditional probability table per node.
//!
//! # Row encoding
//!
//! A node's parents are taken in ascending id order. A vector of parent
//! category indices maps to a CPT row by mixed-radix encoding with the first
//! parent most significant:
//!
//! ```text
//! row = 0
//! for i in 0..parents:  row = row * dim[i] + value[i]
//! ```
//!
//! [`BayesIm::parent_values`] inverts this by peeling digits from the last
//! parent backwards. Every place that builds or decodes a row goes through
//! these two functions.

use serde::{Deserialize, Serialize};
use tracing::debug;

use bn_common::{Error, NodeId, Result};
use bn_config::engine::MAX_CPT_ROWS;
use bn_math::{is_distribution, normalize_in_place, random_weights, sample_index, ROW_SUM_TOLERANCE};

use crate::data::DiscreteDataSet;
use crate::graph::Dag;
use crate::pm::BayesPm;
use crate::random::RandomSource;

/// Row-major CPT for a single node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CptTable {
    parents: Vec<NodeId>,
    parent_dims: Vec<usize>,
    num_rows: usize,
    num_cols: usize,
    #[serde(with = "nan_as_null")]
    probs: Vec<f64>,
}

impl CptTable {
    fn new(parents: Vec<NodeId>, parent_dims: Vec<usize>, num_cols: usize) -> Result<Self> {
        let mut num_rows = 1usize;
        for dim in &parent_dims {
            num_rows = num_rows
                .checked_mul(*dim)
                .filter(|n| *n <= MAX_CPT_ROWS)
                .ok_or_else(|| {
                    Error::Config(format!(
                        "conditional probability table exceeds {MAX_CPT_ROWS} rows"
                    ))
                })?;
        }
        Ok(Self {
            parents,
            parent_dims,
            num_rows,
            num_cols,
            probs: vec![f64::NAN; num_rows * num_cols],
        })
    }

    pub fn parents(&self) -> &[NodeId] {
        &self.parents
    }

    pub fn parent_dims(&self) -> &[usize] {
        &self.parent_dims
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.probs[row * self.num_cols..(row + 1) * self.num_cols]
    }

    fn row_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.probs[row * self.num_cols..(row + 1) * self.num_cols]
    }

    pub fn probability(&self, row: usize, col: usize) -> f64 {
        self.probs[row * self.num_cols + col]
    }

    /// Mixed-radix encoding, first parent most significant.
    pub fn row_index(&self, values: &[usize]) -> usize {
        encode_row(&self.parent_dims, values)
    }

    /// Inverse of [`CptTable::row_index`].
    pub fn parent_values(&self, row: usize) -> Vec<usize> {
        decode_row(&self.parent_dims, row)
    }

    /// Row selected by a full assignment indexed by node id.
    pub fn row_of_case(&self, case: &[usize]) -> usize {
        self.parents
            .iter()
            .zip(&self.parent_dims)
            .fold(0, |row, (p, dim)| row * dim + case[p.index()])
    }
}

/// Mixed-radix encoding shared by CPTs and count tables.
pub fn encode_row(dims: &[usize], values: &[usize]) -> usize {
    debug_assert_eq!(dims.len(), values.len());
    dims.iter()
        .zip(values)
        .fold(0, |row, (dim, value)| row * dim + value)
}

/// Inverse of [`encode_row`].
pub fn decode_row(dims: &[usize], mut row: usize) -> Vec<usize> {
    let mut values = vec![0; dims.len()];
    for i in (0..dims.len()).rev() {
        values[i] = row % dims[i];
        row /= dims[i];
    }
    values
}

/// How rows without a usable source are filled.
pub enum Initialization<'r> {
    /// Rows are left unknown (NaN) for the caller to fill.
    Manual,
    /// Rows get random distributions.
    Random(&'r mut dyn RandomSource),
}

/// A parametric model with a CPT per node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BayesIm {
    pm: BayesPm,
    tables: Vec<CptTable>,
}

impl BayesIm {
    /// Every row gets a random distribution from normalized uniform draws.
    pub fn random(pm: BayesPm, rng: &mut dyn RandomSource) -> Result<Self> {
        let mut im = Self::allocate(pm)?;
        for node in 0..im.tables.len() {
            im.randomize_table(NodeId(node), rng);
        }
        Ok(im)
    }

    /// Every row unknown (NaN).
    pub fn manual(pm: BayesPm) -> Result<Self> {
        Self::allocate(pm)
    }

    /// Build from explicit rows: `rows[node][row]` is one distribution over
    /// the node's categories. Every row must sum to 1.
    pub fn from_rows(pm: BayesPm, rows: Vec<Vec<Vec<f64>>>) -> Result<Self> {
        let mut im = Self::allocate(pm)?;
        if rows.len() != im.tables.len() {
            return Err(Error::Config(format!(
                "expected tables for {} nodes, got {}",
                im.tables.len(),
                rows.len()
            )));
        }
        for (node, table_rows) in rows.into_iter().enumerate() {
            let node = NodeId(node);
            if table_rows.len() != im.num_rows(node) {
                return Err(Error::Config(format!(
                    "node {} expects {} rows, got {}",
                    im.pm.name(node),
                    im.num_rows(node),
                    table_rows.len()
                )));
            }
            for (row, values) in table_rows.iter().enumerate() {
                im.set_row(node, row, values)?;
                im.check_row(node, row)?;
            }
        }
        Ok(im)
    }

    /// Build over `pm`, copying rows from `old` wherever a unique compatible
    /// row exists.
    ///
    /// A row is copied when the same-name node in `old` has the same number
    /// of categories, every new parent is also an old parent with the value in
    /// range, and every old parent is pinned by the new row. Other rows are
    /// filled per `init`.
    pub fn from_previous(pm: BayesPm, old: &BayesIm, mut init: Initialization<'_>) -> Result<Self> {
        let mut im = Self::allocate(pm)?;
        let mut copied = 0usize;
        let mut filled = 0usize;
        for node in 0..im.tables.len() {
            let node = NodeId(node);
            let old_node = im
                .corresponding_node(node, old)
                .filter(|o| old.num_cols(*o) == im.num_cols(node));
            for row in 0..im.num_rows(node) {
                let source = old_node.and_then(|o| {
                    im.unique_compatible_old_row(node, row, old, o)
                        .map(|r| (o, r))
                });
                match source {
                    Some((o, r)) => {
                        let values = old.table(o).row(r).to_vec();
                        im.tables[node.index()].row_mut(row).copy_from_slice(&values);
                        copied += 1;
                    }
                    None => {
                        if let Initialization::Random(ref mut rng) = init {
                            im.randomize_row(node, row, &mut **rng);
                        }
                        filled += 1;
                    }
                }
            }
        }
        debug!(copied, filled, "initialized model from previous");
        Ok(im)
    }

    fn allocate(pm: BayesPm) -> Result<Self> {
        let tables = pm
            .nodes()
            .map(|node| {
                let parents = pm.dag().parents(node).to_vec();
                let dims = parents.iter().map(|p| pm.num_categories(*p)).collect();
                CptTable::new(parents, dims, pm.num_categories(node))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { pm, tables })
    }

    fn unique_compatible_old_row(
        &self,
        node: NodeId,
        row: usize,
        old: &BayesIm,
        old_node: NodeId,
    ) -> Option<usize> {
        let old_table = old.table(old_node);
        let mut old_values: Vec<Option<usize>> = vec![None; old_table.parents.len()];
        let values = self.parent_values(node, row);

        for (i, parent) in self.parents(node).iter().enumerate() {
            let old_parent = self.corresponding_node(*parent, old)?;
            let pos = old_table.parents.iter().position(|p| *p == old_parent)?;
            if values[i] >= old_table.parent_dims[pos] {
                return None;
            }
            old_values[pos] = Some(values[i]);
        }

        // An old parent not pinned by this row leaves more than one candidate.
        let old_values: Option<Vec<usize>> = old_values.into_iter().collect();
        Some(old_table.row_index(&old_values?))
    }

    pub fn pm(&self) -> &BayesPm {
        &self.pm
    }

    pub fn dag(&self) -> &Dag {
        self.pm.dag()
    }

    pub fn num_nodes(&self) -> usize {
        self.tables.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.pm.nodes()
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.pm.node_by_name(name)
    }

    /// # Panics
    ///
    /// Panics if `node` is not in this model.
    pub fn table(&self, node: NodeId) -> &CptTable {
        &self.tables[node.index()]
    }

    pub fn num_rows(&self, node: NodeId) -> usize {
        self.table(node).num_rows
    }

    pub fn num_cols(&self, node: NodeId) -> usize {
        self.table(node).num_cols
    }

    pub fn parents(&self, node: NodeId) -> &[NodeId] {
        &self.table(node).parents
    }

    pub fn parent_dims(&self, node: NodeId) -> &[usize] {
        &self.table(node).parent_dims
    }

    pub fn num_parents(&self, node: NodeId) -> usize {
        self.table(node).parents.len()
    }

    pub fn row_index(&self, node: NodeId, parent_values: &[usize]) -> usize {
        self.table(node).row_index(parent_values)
    }

    pub fn parent_values(&self, node: NodeId, row: usize) -> Vec<usize> {
        self.table(node).parent_values(row)
    }

    /// `P(node = col | parents = row)`.
    pub fn probability(&self, node: NodeId, row: usize, col: usize) -> f64 {
        self.table(node).probability(row, col)
    }

    /// Set one cell. Rows are not re-normalized; the value must be in
    /// `[0, 1]` or NaN (unknown).
    pub fn set_probability(&mut self, node: NodeId, row: usize, col: usize, value: f64) -> Result<()> {
        self.check_cell(node, row, col)?;
        self.check_value(node, value)?;
        let cols = self.num_cols(node);
        self.tables[node.index()].probs[row * cols + col] = value;
        Ok(())
    }

    /// Replace a whole row. Nothing is written unless every value is valid.
    pub fn set_row(&mut self, node: NodeId, row: usize, values: &[f64]) -> Result<()> {
        self.check_cell(node, row, 0)?;
        if values.len() != self.num_cols(node) {
            return Err(Error::Config(format!(
                "row for {} needs {} values, got {}",
                self.pm.name(node),
                self.num_cols(node),
                values.len()
            )));
        }
        for v in values {
            self.check_value(node, *v)?;
        }
        self.tables[node.index()].row_mut(row).copy_from_slice(values);
        Ok(())
    }

    fn check_cell(&self, node: NodeId, row: usize, col: usize) -> Result<()> {
        let table = self
            .tables
            .get(node.index())
            .ok_or_else(|| Error::UnknownNode(node.to_string()))?;
        if row >= table.num_rows || col >= table.num_cols {
            return Err(Error::Config(format!(
                "cell ({row}, {col}) out of range for {}",
                self.pm.name(node)
            )));
        }
        Ok(())
    }

    fn check_value(&self, node: NodeId, value: f64) -> Result<()> {
        if value.is_nan() || (0.0..=1.0).contains(&value) {
            Ok(())
        } else {
            Err(Error::InvalidProbability {
                node: self.pm.name(node).to_string(),
                value,
            })
        }
    }

    /// Scale a row to sum to 1; an all-zero row becomes uniform.
    pub fn normalize_row(&mut self, node: NodeId, row: usize) {
        normalize_in_place(self.tables[node.index()].row_mut(row));
    }

    pub fn normalize_node(&mut self, node: NodeId) {
        for row in 0..self.num_rows(node) {
            self.normalize_row(node, row);
        }
    }

    pub fn normalize_all(&mut self) {
        for node in 0..self.tables.len() {
            self.normalize_node(NodeId(node));
        }
    }

    /// Mark every cell of a row unknown.
    pub fn clear_row(&mut self, node: NodeId, row: usize) {
        self.tables[node.index()].row_mut(row).fill(f64::NAN);
    }

    pub fn clear_table(&mut self, node: NodeId) {
        self.tables[node.index()].probs.fill(f64::NAN);
    }

    /// Fails on the first row that is unknown or does not sum to 1.
    pub fn check_rows(&self) -> Result<()> {
        for node in self.nodes() {
            for row in 0..self.num_rows(node) {
                self.check_row(node, row)?;
            }
        }
        Ok(())
    }

    pub(crate) fn check_row(&self, node: NodeId, row: usize) -> Result<()> {
        let values = self.table(node).row(row);
        if values.iter().any(|p| p.is_nan()) {
            return Err(Error::Config(format!(
                "row {row} of {} has unknown probabilities",
                self.pm.name(node)
            )));
        }
        if !is_distribution(values, ROW_SUM_TOLERANCE) {
            let sum: f64 = values.iter().sum();
            return Err(Error::Config(format!(
                "row {row} of {} sums to {sum}, not 1",
                self.pm.name(node)
            )));
        }
        Ok(())
    }

    pub fn is_row_incomplete(&self, node: NodeId, row: usize) -> bool {
        self.table(node).row(row).iter().any(|p| p.is_nan())
    }

    pub fn is_incomplete(&self, node: NodeId) -> bool {
        self.table(node).probs.iter().any(|p| p.is_nan())
    }

    pub fn randomize_row(&mut self, node: NodeId, row: usize, rng: &mut dyn RandomSource) {
        let cols = self.num_cols(node);
        let weights = random_weights(cols, || rng.next_double());
        self.tables[node.index()].row_mut(row).copy_from_slice(&weights);
    }

    pub fn randomize_table(&mut self, node: NodeId, rng: &mut dyn RandomSource) {
        for row in 0..self.num_rows(node) {
            self.randomize_row(node, row, rng);
        }
    }

    /// Fill only the rows that still contain unknowns.
    pub fn randomize_incomplete_rows(&mut self, node: NodeId, rng: &mut dyn RandomSource) {
        for row in 0..self.num_rows(node) {
            if self.is_row_incomplete(node, row) {
                self.randomize_row(node, row, rng);
            }
        }
    }

    /// The node with the same name in `other`.
    pub fn corresponding_node(&self, node: NodeId, other: &BayesIm) -> Option<NodeId> {
        other.node_by_name(self.pm.name(node))
    }

    /// Forward-sample `sample_size` complete cases.
    ///
    /// Nodes are visited in topological order and each consumes one
    /// `next_double` per case. Columns follow node order.
    pub fn simulate_data(
        &self,
        sample_size: usize,
        rng: &mut dyn RandomSource,
    ) -> Result<DiscreteDataSet> {
        self.check_rows()?;
        let order = self.dag().topological_order();
        let mut data = DiscreteDataSet::new(self.pm.variables().to_vec(), sample_size);
        let mut case = vec![0usize; self.num_nodes()];

        for i in 0..sample_size {
            for node in &order {
                let table = self.table(*node);
                let row = table.row_of_case(&case);
                let value = sample_index(table.row(row), rng.next_double());
                case[node.index()] = value;
                data.set_int(i, node.index(), value as i32)?;
            }
        }
        debug!(sample_size, nodes = self.num_nodes(), "simulated data");
        Ok(data)
    }
}

/// Unknown cells are NaN in memory and `null` in JSON.
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(probs: &[f64], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(probs.iter().map(|p| (!p.is_nan()).then_some(*p)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let cells = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(cells.into_iter().map(|p| p.unwrap_or(f64::NAN)).collect())
    }
}

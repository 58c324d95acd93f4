//! Discrete tabular data.
//!
//! Cells hold a category index or [`MISSING_VALUE`]. The [`DiscreteData`]
//! trait is the read-only view the scorer and estimator consume; tests wrap it
//! to observe how often the data is touched.

use serde::{Deserialize, Serialize};

use bn_common::{Error, Result, MISSING_VALUE};

use crate::variable::CategoricalVariable;

/// Read access to a discrete data set.
pub trait DiscreteData {
    fn num_rows(&self) -> usize;

    fn variables(&self) -> &[CategoricalVariable];

    /// Category index at `(row, col)`, or [`MISSING_VALUE`].
    fn get_int(&self, row: usize, col: usize) -> i32;

    fn num_columns(&self) -> usize {
        self.variables().len()
    }

    fn column_of(&self, name: &str) -> Option<usize> {
        self.variables().iter().position(|v| v.name() == name)
    }

    fn is_missing(&self, row: usize, col: usize) -> bool {
        self.get_int(row, col) == MISSING_VALUE
    }
}

/// Column-major in-memory data set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteDataSet {
    variables: Vec<CategoricalVariable>,
    num_rows: usize,
    columns: Vec<Vec<i32>>,
}

impl DiscreteDataSet {
    /// A data set with every cell missing.
    pub fn new(variables: Vec<CategoricalVariable>, num_rows: usize) -> Self {
        let columns = vec![vec![MISSING_VALUE; num_rows]; variables.len()];
        Self {
            variables,
            num_rows,
            columns,
        }
    }

    /// Build from row-major cases, validating every cell.
    pub fn from_rows(variables: Vec<CategoricalVariable>, rows: &[Vec<i32>]) -> Result<Self> {
        let mut data = Self::new(variables, rows.len());
        for (r, row) in rows.iter().enumerate() {
            if row.len() != data.variables.len() {
                return Err(Error::Config(format!(
                    "row {r} has {} values, expected {}",
                    row.len(),
                    data.variables.len()
                )));
            }
            for (c, value) in row.iter().enumerate() {
                data.set_int(r, c, *value)?;
            }
        }
        Ok(data)
    }

    /// Set one cell; the value must be a valid category or [`MISSING_VALUE`].
    pub fn set_int(&mut self, row: usize, col: usize, value: i32) -> Result<()> {
        let variable = self
            .variables
            .get(col)
            .ok_or_else(|| Error::Config(format!("column {col} out of range")))?;
        if row >= self.num_rows {
            return Err(Error::Config(format!("row {row} out of range")));
        }
        let valid = value == MISSING_VALUE
            || (value >= 0 && (value as usize) < variable.num_categories());
        if !valid {
            return Err(Error::Config(format!(
                "value {value} is not a category of {}",
                variable.name()
            )));
        }
        self.columns[col][row] = value;
        Ok(())
    }

    /// Check shape and cell values, e.g. after deserializing.
    pub fn validate(&self) -> Result<()> {
        if self.columns.len() != self.variables.len() {
            return Err(Error::Config(format!(
                "{} columns for {} variables",
                self.columns.len(),
                self.variables.len()
            )));
        }
        for (variable, column) in self.variables.iter().zip(&self.columns) {
            if column.len() != self.num_rows {
                return Err(Error::Config(format!(
                    "column {} has {} rows, expected {}",
                    variable.name(),
                    column.len(),
                    self.num_rows
                )));
            }
            let bad = column.iter().find(|v| {
                **v != MISSING_VALUE && !(**v >= 0 && (**v as usize) < variable.num_categories())
            });
            if let Some(value) = bad {
                return Err(Error::Config(format!(
                    "value {value} is not a category of {}",
                    variable.name()
                )));
            }
        }
        Ok(())
    }

    /// Copy of one case, in column order.
    pub fn row(&self, row: usize) -> Vec<i32> {
        self.columns.iter().map(|c| c[row]).collect()
    }

    /// Number of cells holding [`MISSING_VALUE`].
    pub fn num_missing(&self) -> usize {
        self.columns
            .iter()
            .map(|c| c.iter().filter(|v| **v == MISSING_VALUE).count())
            .sum()
    }
}

impl DiscreteData for DiscreteDataSet {
    fn num_rows(&self) -> usize {
        self.num_rows
    }

    fn variables(&self) -> &[CategoricalVariable] {
        &self.variables
    }

    fn get_int(&self, row: usize, col: usize) -> i32 {
        self.columns[col][row]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> Vec<CategoricalVariable> {
        vec![
            CategoricalVariable::with_default_categories("A", 2).unwrap(),
            CategoricalVariable::with_default_categories("B", 3).unwrap(),
        ]
    }

    #[test]
    fn new_is_all_missing() {
        let data = DiscreteDataSet::new(vars(), 3);
        assert_eq!(data.num_missing(), 6);
        assert!(data.is_missing(2, 1));
    }

    #[test]
    fn from_rows_roundtrip() {
        let data = DiscreteDataSet::from_rows(vars(), &[vec![0, 2], vec![1, MISSING_VALUE]])
            .unwrap();
        assert_eq!(data.num_rows(), 2);
        assert_eq!(data.get_int(0, 1), 2);
        assert_eq!(data.row(1), vec![1, MISSING_VALUE]);
        assert_eq!(data.num_missing(), 1);
    }

    #[test]
    fn rejects_out_of_range_value() {
        assert!(DiscreteDataSet::from_rows(vars(), &[vec![2, 0]]).is_err());
        assert!(DiscreteDataSet::from_rows(vars(), &[vec![-1, 0]]).is_err());
    }

    #[test]
    fn rejects_ragged_rows() {
        assert!(DiscreteDataSet::from_rows(vars(), &[vec![0]]).is_err());
    }

    #[test]
    fn validate_catches_tampered_json() {
        let data = DiscreteDataSet::from_rows(vars(), &[vec![1, 2]]).unwrap();
        let json = serde_json::to_string(&data).unwrap().replace("[2]", "[7]");
        let back: DiscreteDataSet = serde_json::from_str(&json).unwrap();
        assert!(back.validate().is_err());
        assert!(data.validate().is_ok());
    }

    #[test]
    fn column_lookup_by_name() {
        let data = DiscreteDataSet::new(vars(), 0);
        assert_eq!(data.column_of("B"), Some(1));
        assert_eq!(data.column_of("Z"), None);
        assert_eq!(data.num_columns(), 2);
    }
}
